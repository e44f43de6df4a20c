use crate::handlers::{self, AppState};
use crate::webhook_handler;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// An automation module exposed under `/automations/{slug}`.
pub struct AutomationModule {
    pub slug: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub webhooks: &'static [&'static str],
}

pub const AUTOMATIONS: &[AutomationModule] = &[AutomationModule {
    slug: "lead-management",
    name: "Lead Management",
    description: "Inbound email intake, accept/reject from chat, booking sync and marketplace onboarding",
    webhooks: &["gmail", "calcom", "slack", "notion-marketplace", "test"],
}];

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// How often idle rate-limiter keys are pruned.
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Build the application router.
///
/// `rate_limited` attaches per-IP rate limiting to the webhook routes. The
/// limiter keys on the client address, so the server must be run with
/// `into_make_service_with_connect_info`.
pub fn build_router(state: Arc<AppState>, rate_limited: bool) -> anyhow::Result<Router> {
    let webhooks: Router<Arc<AppState>> = Router::new()
        .route("/gmail", post(webhook_handler::gmail_webhook))
        .route("/calcom", post(webhook_handler::calcom_webhook))
        .route("/slack", post(webhook_handler::slack_webhook))
        .route(
            "/notion-marketplace",
            post(webhook_handler::marketplace_webhook),
        )
        .route("/test", post(webhook_handler::test_webhook))
        // Request size limit: 1MB max payload
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES));

    let webhooks = if rate_limited {
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(state.config.rate_limit_per_second)
                .burst_size(state.config.rate_limit_burst)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?,
        );

        // Reset stale limiter state on a timer so the key map doesn't grow unbounded
        let limiter = governor_conf.limiter().clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                tracing::debug!("Rate limiter tracking {} keys", limiter.len());
                limiter.retain_recent();
            }
        });

        webhooks.layer(ServiceBuilder::new().layer(GovernorLayer {
            config: governor_conf,
        }))
    } else {
        webhooks
    };

    let app = Router::new()
        .route("/", get(handlers::index))
        .route("/automations", get(handlers::list_automations))
        .route(
            "/automations/lead-management/health",
            get(handlers::lead_management_health),
        )
        .nest("/automations/lead-management/webhooks", webhooks)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    Ok(app)
}
