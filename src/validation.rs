//! Target URL validation, SSRF protection, and event type validation.

use std::net::IpAddr;

use crate::catalog::WebhookEventType;
use crate::error::WebhookError;
use crate::models::WebhookSubscription;

// ---------------------------------------------------------------------------
// Admin-time URL validation
// ---------------------------------------------------------------------------

/// Validate a webhook target URL at subscription create/update time.
///
/// Checks:
/// 1. URL is parseable
/// 2. Scheme is HTTPS (or HTTP if `allow_http` is set for dev/test)
/// 3. Host is not a private/internal address (SSRF protection)
pub fn validate_target_url(url: &str, allow_http: bool) -> Result<(), WebhookError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| WebhookError::InvalidUrl(format!("Invalid URL format: {e}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" if allow_http => {}
        "http" => {
            return Err(WebhookError::InvalidUrl(
                "Webhook URLs must use HTTPS".to_string(),
            ));
        }
        scheme => {
            return Err(WebhookError::InvalidUrl(format!(
                "Unsupported URL scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| WebhookError::InvalidUrl("URL must have a host".to_string()))?;

    validate_host_not_internal(host)
}

/// Validate that a host is not a private/internal address.
///
/// Blocks loopback, RFC 1918 ranges, link-local (cloud metadata endpoints),
/// CGNAT, IPv6 loopback/unspecified, and internal hostname suffixes.
pub fn validate_host_not_internal(host: &str) -> Result<(), WebhookError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_internal_ip(&ip) {
            return Err(WebhookError::SsrfDetected(format!(
                "Destination host {host} is a private/internal address"
            )));
        }
    }

    let lower = host.to_ascii_lowercase();
    if lower == "localhost"
        || lower == "metadata.google.internal"
        || lower.ends_with(".internal")
        || lower.ends_with(".local")
    {
        return Err(WebhookError::SsrfDetected(format!(
            "Destination host {host} is a restricted internal hostname"
        )));
    }

    Ok(())
}

fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64) // 100.64.0.0/10
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ---------------------------------------------------------------------------
// Delivery-time configuration check
// ---------------------------------------------------------------------------

/// Validate the shape of a subscription just before delivery.
///
/// A failure here is a `Configuration` error: the delivery engine records it
/// with zero HTTP attempts and never enters the retry loop. This check does
/// not re-run SSRF validation — that happened at admin time, and delivery
/// must not start resolving hostnames on its own.
pub fn validate_subscription_for_delivery(
    subscription: &WebhookSubscription,
) -> Result<(), WebhookError> {
    if subscription.target_url.trim().is_empty() {
        return Err(WebhookError::Configuration(
            "Subscription has no target URL".to_string(),
        ));
    }

    let parsed = url::Url::parse(&subscription.target_url)
        .map_err(|e| WebhookError::Configuration(format!("Malformed target URL: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(WebhookError::Configuration(format!(
            "Unsupported target URL scheme: {}",
            parsed.scheme()
        )));
    }

    if parsed.host_str().is_none() {
        return Err(WebhookError::Configuration(
            "Target URL has no host".to_string(),
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Event type validation
// ---------------------------------------------------------------------------

/// Validate that all event type strings are in the closed catalog.
pub fn validate_event_types(event_types: &[String]) -> Result<(), WebhookError> {
    if event_types.is_empty() {
        return Err(WebhookError::Validation(
            "Subscription must register at least one event type".to_string(),
        ));
    }
    for et in event_types {
        if WebhookEventType::parse(et).is_none() {
            return Err(WebhookError::Validation(format!(
                "Unknown event type: {et}"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::types::Json;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn subscription_with_url(url: &str) -> WebhookSubscription {
        WebhookSubscription {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "test".into(),
            description: None,
            target_url: url.into(),
            event_types: vec!["user.created".into()],
            secret_encrypted: None,
            custom_headers: Json(HashMap::new()),
            max_retries: 3,
            retry_delay_base_ms: 1000,
            is_active: true,
            success_count: 0,
            failure_count: 0,
            last_triggered_at: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    // --- URL validation ---

    #[test]
    fn test_valid_https_url() {
        assert!(validate_target_url("https://example.com/webhooks", false).is_ok());
        assert!(validate_target_url("https://hooks.example.com:8443/cb", false).is_ok());
    }

    #[test]
    fn test_http_rejected_unless_allowed() {
        assert!(validate_target_url("http://example.com/webhooks", false).is_err());
        assert!(validate_target_url("http://example.com/webhooks", true).is_ok());
    }

    #[test]
    fn test_invalid_format_and_scheme() {
        assert!(validate_target_url("not-a-url", false).is_err());
        assert!(validate_target_url("ftp://example.com/hook", false).is_err());
    }

    // --- SSRF protection ---

    #[test]
    fn test_ssrf_blocks_private_ranges() {
        for host in [
            "127.0.0.1",
            "10.0.0.1",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "::1",
            "::",
        ] {
            assert!(validate_host_not_internal(host).is_err(), "{host}");
        }
    }

    #[test]
    fn test_ssrf_blocks_internal_hostnames() {
        assert!(validate_host_not_internal("localhost").is_err());
        assert!(validate_host_not_internal("LOCALHOST").is_err());
        assert!(validate_host_not_internal("metadata.google.internal").is_err());
        assert!(validate_host_not_internal("db.internal").is_err());
        assert!(validate_host_not_internal("printer.local").is_err());
    }

    #[test]
    fn test_ssrf_allows_public_hosts() {
        assert!(validate_host_not_internal("8.8.8.8").is_ok());
        assert!(validate_host_not_internal("example.com").is_ok());
        assert!(validate_host_not_internal("hooks.myapp.io").is_ok());
    }

    #[test]
    fn test_ssrf_detected_through_url_validation() {
        let result = validate_target_url("https://10.0.0.1/webhook", false);
        assert!(matches!(result, Err(WebhookError::SsrfDetected(_))));
    }

    // --- Delivery-time configuration check ---

    #[test]
    fn test_delivery_check_accepts_valid_subscription() {
        let sub = subscription_with_url("https://example.com/hook");
        assert!(validate_subscription_for_delivery(&sub).is_ok());
    }

    #[test]
    fn test_delivery_check_rejects_malformed_urls() {
        for url in ["", "   ", "not a url", "ftp://example.com/x"] {
            let sub = subscription_with_url(url);
            let err = validate_subscription_for_delivery(&sub).unwrap_err();
            assert!(err.is_configuration(), "{url}: {err}");
        }
    }

    #[test]
    fn test_delivery_check_does_not_redo_ssrf() {
        // Mock servers in tests live on loopback; delivery must not reject them.
        let sub = subscription_with_url("http://127.0.0.1:9999/hook");
        assert!(validate_subscription_for_delivery(&sub).is_ok());
    }

    // --- Event type validation ---

    #[test]
    fn test_valid_event_types() {
        let types = vec!["user.created".to_string(), "quiz.passed".to_string()];
        assert!(validate_event_types(&types).is_ok());
    }

    #[test]
    fn test_unknown_event_type_rejected() {
        let types = vec!["user.created".to_string(), "invoice.paid".to_string()];
        let result = validate_event_types(&types);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("invoice.paid"));
    }

    #[test]
    fn test_empty_event_types_rejected() {
        assert!(validate_event_types(&[]).is_err());
    }

    #[test]
    fn test_whole_catalog_valid() {
        let types: Vec<String> = WebhookEventType::all()
            .iter()
            .map(|et| et.as_str().to_string())
            .collect();
        assert!(validate_event_types(&types).is_ok());
    }
}
