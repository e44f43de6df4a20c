//! Webhook signature verification.

use crate::errors::AppError;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const CALCOM_SIGNATURE_HEADER: &str = "x-cal-signature-256";
pub const SLACK_SIGNATURE_HEADER: &str = "x-slack-signature";
pub const SLACK_TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Slack requests older than this are rejected as possible replays.
const SLACK_MAX_SKEW_SECS: u64 = 60 * 5;

/// Hex HMAC-SHA256 of `payload` under `secret`.
pub fn sign_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature, with optional `sha256=` prefix.
pub fn verify_hex_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let hex_sig = signature.trim();
    let hex_sig = hex_sig.strip_prefix("sha256=").unwrap_or(hex_sig);
    let Ok(sig_bytes) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&sig_bytes).is_ok()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Verify a Cal.com webhook: hex HMAC-SHA256 of the raw body.
pub fn verify_calcom(headers: &HeaderMap, body: &[u8], secret: &str) -> Result<(), AppError> {
    let signature = header_str(headers, CALCOM_SIGNATURE_HEADER).ok_or_else(|| {
        AppError::Unauthorized("Missing X-Cal-Signature-256 header".to_string())
    })?;

    if !verify_hex_signature(secret, body, signature) {
        return Err(AppError::Unauthorized(
            "Invalid Cal.com webhook signature".to_string(),
        ));
    }
    Ok(())
}

/// Verify a Slack request: `v0=` + hex HMAC-SHA256 of `v0:{timestamp}:{body}`.
pub fn verify_slack(
    headers: &HeaderMap,
    body: &[u8],
    secret: &str,
    now_unix: i64,
) -> Result<(), AppError> {
    let signature = header_str(headers, SLACK_SIGNATURE_HEADER)
        .ok_or_else(|| AppError::Unauthorized("Missing X-Slack-Signature header".to_string()))?;
    let timestamp = header_str(headers, SLACK_TIMESTAMP_HEADER).ok_or_else(|| {
        AppError::Unauthorized("Missing X-Slack-Request-Timestamp header".to_string())
    })?;

    let sent_at: i64 = timestamp
        .parse()
        .map_err(|_| AppError::Unauthorized("Invalid Slack request timestamp".to_string()))?;
    let skew = now_unix.checked_sub(sent_at).map(i64::unsigned_abs);
    if skew.map_or(true, |skew| skew > SLACK_MAX_SKEW_SECS) {
        return Err(AppError::Unauthorized(
            "Slack request timestamp outside allowed window".to_string(),
        ));
    }

    let hex_sig = signature
        .strip_prefix("v0=")
        .ok_or_else(|| AppError::Unauthorized("Unsupported Slack signature version".to_string()))?;

    let mut base = format!("v0:{}:", timestamp).into_bytes();
    base.extend_from_slice(body);
    if !verify_hex_signature(secret, &base, hex_sig) {
        return Err(AppError::Unauthorized("Invalid Slack signature".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        assert_eq!(
            sign_hex("Jefe", b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hex_signature_accepts_prefix_and_rejects_tampering() {
        let sig = sign_hex("secret", b"{\"a\":1}");
        assert!(verify_hex_signature("secret", b"{\"a\":1}", &sig));
        assert!(verify_hex_signature("secret", b"{\"a\":1}", &format!("sha256={}", sig)));
        assert!(!verify_hex_signature("secret", b"{\"a\":2}", &sig));
        assert!(!verify_hex_signature("other", b"{\"a\":1}", &sig));
        assert!(!verify_hex_signature("secret", b"{\"a\":1}", "not-hex"));
    }

    #[test]
    fn test_calcom_missing_header_is_unauthorized() {
        let err = verify_calcom(&HeaderMap::new(), b"{}", "s").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_slack_signature_and_skew() {
        let body = b"payload=%7B%7D";
        let ts = 1_700_000_000i64;
        let mut base = format!("v0:{}:", ts).into_bytes();
        base.extend_from_slice(body);
        let sig = format!("v0={}", sign_hex("slack-secret", &base));

        let mut headers = HeaderMap::new();
        headers.insert(SLACK_SIGNATURE_HEADER, HeaderValue::from_str(&sig).unwrap());
        headers.insert(SLACK_TIMESTAMP_HEADER, HeaderValue::from_str(&ts.to_string()).unwrap());

        assert!(verify_slack(&headers, body, "slack-secret", ts + 10).is_ok());
        assert!(verify_slack(&headers, body, "wrong", ts + 10).is_err());
        assert!(verify_slack(&headers, body, "slack-secret", ts + 600).is_err());
    }

    #[test]
    fn test_slack_extreme_timestamp_is_unauthorized() {
        let mut headers = HeaderMap::new();
        headers.insert(SLACK_SIGNATURE_HEADER, HeaderValue::from_static("v0=00"));
        headers.insert(
            SLACK_TIMESTAMP_HEADER,
            HeaderValue::from_str(&i64::MIN.to_string()).unwrap(),
        );

        let err = verify_slack(&headers, b"", "slack-secret", 1_700_000_000).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        headers.insert(
            SLACK_TIMESTAMP_HEADER,
            HeaderValue::from_str(&i64::MAX.to_string()).unwrap(),
        );
        let err = verify_slack(&headers, b"", "slack-secret", -1_700_000_000).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
