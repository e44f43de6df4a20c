use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::{Config, StateMachine};
use std::time::Duration;

/// Circuit breaker guarding one upstream API.
pub type UpstreamBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Creates a circuit breaker for an upstream API to prevent hammering a
/// service that is already down.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failed calls (after retries) trigger OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// The breaker is cloneable; clones share state.
pub fn create_upstream_circuit_breaker() -> UpstreamBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_opens_after_failures() {
        let cb = create_upstream_circuit_breaker();

        for _ in 0..5 {
            assert!(cb.is_call_permitted());
            cb.on_error();
        }

        assert!(!cb.is_call_permitted());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let cb = create_upstream_circuit_breaker();

        for _ in 0..4 {
            cb.on_error();
        }
        cb.on_success();
        cb.on_error();

        assert!(cb.is_call_permitted());
    }
}
