//! Delivery engine: one subscription's bounded retry loop over HTTP.
//!
//! The engine owns everything between "we have an envelope for this
//! subscription" and "we have a terminal outcome": header assembly, signing,
//! the POST itself, retryable-failure classification, and linear backoff.
//! It never touches storage — recording outcomes is the recorder's job.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use uuid::Uuid;

use crate::catalog::WebhookEvent;
use crate::crypto;
use crate::error::WebhookError;
use crate::models::{DeliveryOutcome, Envelope, WebhookSubscription, RESPONSE_BODY_LIMIT};
use crate::validation;

/// Hard per-attempt timeout.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the wire event type.
pub const EVENT_HEADER: &str = "X-Webhook-Event";

/// Header carrying the delivery id, stable across retries of one dispatch.
pub const DELIVERY_ID_HEADER: &str = "X-Webhook-Delivery-Id";

/// Header carrying the HMAC-SHA256 signature, present iff a secret is set.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Predicate deciding whether a non-2xx status is worth retrying.
///
/// The default treats every non-2xx as transient — 4xx and 5xx alike — which
/// may hammer a permanently broken endpoint but guarantees no delivery is
/// given up on early. Swap in a stricter predicate to stop retrying on 4xx.
pub type RetryPolicy = Arc<dyn Fn(u16) -> bool + Send + Sync>;

// ---------------------------------------------------------------------------
// Prepared delivery
// ---------------------------------------------------------------------------

/// The envelope for one (dispatch, subscription) pair, serialized exactly
/// once. The same `body` bytes are transmitted and signed on every retry, and
/// `delivery_id` stays stable across them.
#[derive(Debug, Clone)]
pub struct PreparedDelivery {
    pub delivery_id: Uuid,
    pub event_type_str: &'static str,
    pub envelope: serde_json::Value,
    pub body: Vec<u8>,
}

impl PreparedDelivery {
    /// Build the envelope `{event, data, timestamp, webhookId}` for a
    /// subscription and freeze its bytes.
    pub fn new(event: &WebhookEvent, subscription_id: Uuid) -> Result<Self, WebhookError> {
        let envelope = Envelope {
            event: event.event_type.as_str().to_string(),
            data: event.data.clone(),
            timestamp: event.occurred_at,
            webhook_id: subscription_id,
        };
        let body = serde_json::to_vec(&envelope)
            .map_err(|e| WebhookError::Internal(format!("Failed to serialize envelope: {e}")))?;
        let envelope = serde_json::to_value(&envelope)
            .map_err(|e| WebhookError::Internal(format!("Failed to snapshot envelope: {e}")))?;

        Ok(Self {
            delivery_id: Uuid::new_v4(),
            event_type_str: event.event_type.as_str(),
            envelope,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Delivery engine
// ---------------------------------------------------------------------------

/// Executes one subscription's retry loop.
#[derive(Clone)]
pub struct DeliveryEngine {
    http_client: Client,
    encryption_key: Vec<u8>,
    attempt_timeout: Duration,
    retryable: RetryPolicy,
}

impl DeliveryEngine {
    /// Create a new engine with a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the HTTP client cannot be built.
    pub fn new(encryption_key: Vec<u8>) -> Result<Self, WebhookError> {
        let http_client = Client::builder()
            .user_agent("lms-webhooks/1.0")
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| WebhookError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            encryption_key,
            attempt_timeout: ATTEMPT_TIMEOUT,
            retryable: Arc::new(|_status| true),
        })
    }

    /// Override the per-attempt timeout (tests).
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Install a retryable-status predicate.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retryable = policy;
        self
    }

    /// Run the bounded retry loop for one subscription.
    ///
    /// Always returns an outcome — transport and protocol failures are data
    /// here, not errors. A malformed subscription yields a configuration
    /// failure with `attempts_used == 0` and no HTTP traffic at all.
    pub async fn attempt(
        &self,
        subscription: &WebhookSubscription,
        prepared: &PreparedDelivery,
    ) -> DeliveryOutcome {
        if let Err(e) = validation::validate_subscription_for_delivery(subscription) {
            tracing::warn!(
                target: "webhook_delivery",
                subscription_id = %subscription.id,
                tenant_id = %subscription.tenant_id,
                delivery_id = %prepared.delivery_id,
                error = %e,
                "Skipping delivery for misconfigured subscription"
            );
            return DeliveryOutcome::configuration_failure(e.to_string());
        }

        let headers = match self.build_headers(subscription, prepared) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(
                    target: "webhook_delivery",
                    subscription_id = %subscription.id,
                    delivery_id = %prepared.delivery_id,
                    error = %e,
                    "Cannot build request headers for subscription"
                );
                return DeliveryOutcome::configuration_failure(e.to_string());
            }
        };

        let budget = subscription.attempt_budget();
        let backoff_base = subscription.backoff_base();

        let mut total_response_time_ms: i64 = 0;
        let mut last_status: Option<u16> = None;
        let mut last_body: Option<String> = None;
        let mut last_error: Option<String> = None;

        for attempt_number in 1..=budget {
            let start = Instant::now();
            let result = self
                .http_client
                .post(&subscription.target_url)
                .headers(headers.clone())
                .timeout(self.attempt_timeout)
                .body(prepared.body.clone())
                .send()
                .await;
            total_response_time_ms += start.elapsed().as_millis() as i64;

            match result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body: String = response
                        .text()
                        .await
                        .unwrap_or_default()
                        .chars()
                        .take(RESPONSE_BODY_LIMIT)
                        .collect();

                    if (200..300).contains(&status) {
                        tracing::info!(
                            target: "webhook_delivery",
                            subscription_id = %subscription.id,
                            tenant_id = %subscription.tenant_id,
                            delivery_id = %prepared.delivery_id,
                            event_type = prepared.event_type_str,
                            response_code = status,
                            attempts_used = attempt_number,
                            latency_ms = total_response_time_ms,
                            "Webhook delivery succeeded"
                        );
                        return DeliveryOutcome {
                            succeeded: true,
                            status_code: Some(status),
                            response_body: Some(body),
                            error: None,
                            attempts_used: attempt_number,
                            response_time_ms: total_response_time_ms,
                        };
                    }

                    last_status = Some(status);
                    last_body = Some(body);
                    last_error = Some(format!("HTTP {status}"));

                    if !(self.retryable)(status) {
                        tracing::warn!(
                            target: "webhook_delivery",
                            subscription_id = %subscription.id,
                            delivery_id = %prepared.delivery_id,
                            response_code = status,
                            attempts_used = attempt_number,
                            "Status marked non-retryable by policy, giving up"
                        );
                        return DeliveryOutcome {
                            succeeded: false,
                            status_code: last_status,
                            response_body: last_body,
                            error: last_error,
                            attempts_used: attempt_number,
                            response_time_ms: total_response_time_ms,
                        };
                    }
                }
                Err(e) => {
                    let message = if e.is_timeout() {
                        format!("Request timeout ({}s)", self.attempt_timeout.as_secs())
                    } else if e.is_connect() {
                        format!("Connection failed: {e}")
                    } else {
                        format!("Request error: {e}")
                    };
                    last_status = None;
                    last_body = None;
                    last_error = Some(message);
                }
            }

            tracing::warn!(
                target: "webhook_delivery",
                subscription_id = %subscription.id,
                tenant_id = %subscription.tenant_id,
                delivery_id = %prepared.delivery_id,
                event_type = prepared.event_type_str,
                attempt_number,
                max_retries = budget,
                error = last_error.as_deref().unwrap_or("unknown"),
                "Webhook delivery attempt failed"
            );

            // Linear backoff: base × attempt number, no sleep after the last try.
            if attempt_number < budget {
                tokio::time::sleep(backoff_base * attempt_number as u32).await;
            }
        }

        DeliveryOutcome {
            succeeded: false,
            status_code: last_status,
            response_body: last_body,
            error: last_error,
            attempts_used: budget,
            response_time_ms: total_response_time_ms,
        }
    }

    /// Assemble the request headers once per dispatch; they are identical on
    /// every retry.
    ///
    /// Custom headers are merged in last and never override the protocol
    /// headers. A secret that is present but cannot be decrypted is a
    /// configuration failure — delivering unsigned would break the
    /// signature-present-iff-secret invariant.
    fn build_headers(
        &self,
        subscription: &WebhookSubscription,
        prepared: &PreparedDelivery,
    ) -> Result<HeaderMap, WebhookError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("x-webhook-event"),
            HeaderValue::from_str(prepared.event_type_str)
                .map_err(|e| WebhookError::Internal(e.to_string()))?,
        );
        headers.insert(
            HeaderName::from_static("x-webhook-delivery-id"),
            HeaderValue::from_str(&prepared.delivery_id.to_string())
                .map_err(|e| WebhookError::Internal(e.to_string()))?,
        );

        if let Some(ref secret_encrypted) = subscription.secret_encrypted {
            let secret = crypto::decrypt_secret(secret_encrypted, &self.encryption_key)
                .map_err(|e| {
                    WebhookError::Configuration(format!("Cannot decrypt signing secret: {e}"))
                })?;
            let signature = crypto::sign_payload(&secret, &prepared.body);
            headers.insert(
                HeaderName::from_static("x-webhook-signature"),
                HeaderValue::from_str(&signature)
                    .map_err(|e| WebhookError::Internal(e.to_string()))?,
            );
        }

        for (name, value) in subscription.custom_headers.0.iter() {
            let Ok(header_name) = name.parse::<HeaderName>() else {
                tracing::warn!(
                    target: "webhook_delivery",
                    subscription_id = %subscription.id,
                    header = name.as_str(),
                    "Ignoring custom header with invalid name"
                );
                continue;
            };
            if headers.contains_key(&header_name) {
                // Protocol headers win over subscriber-supplied ones.
                continue;
            }
            match HeaderValue::from_str(value) {
                Ok(v) => {
                    headers.insert(header_name, v);
                }
                Err(_) => {
                    tracing::warn!(
                        target: "webhook_delivery",
                        subscription_id = %subscription.id,
                        header = name.as_str(),
                        "Ignoring custom header with invalid value"
                    );
                }
            }
        }

        Ok(headers)
    }
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

    fn test_key() -> Vec<u8> {
        vec![0x42u8; 32]
    }

    fn subscription(custom_headers: HashMap<String, String>) -> WebhookSubscription {
        WebhookSubscription {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "s".into(),
            description: None,
            target_url: "https://example.com/hook".into(),
            event_types: vec!["user.created".into()],
            secret_encrypted: None,
            custom_headers: Json(custom_headers),
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

    fn prepared() -> PreparedDelivery {
        let event = WebhookEvent::user_created(
            Uuid::new_v4(),
            &crate::catalog::UserPayload {
                user_id: Uuid::new_v4(),
                email: "t@example.com".into(),
                display_name: None,
            },
        );
        PreparedDelivery::new(&event, Uuid::new_v4()).unwrap()
    }

    #[test]
    fn test_prepared_body_matches_envelope_snapshot() {
        let p = prepared();
        let from_bytes: serde_json::Value = serde_json::from_slice(&p.body).unwrap();
        assert_eq!(from_bytes, p.envelope);
        assert!(p.envelope.get("webhookId").is_some());
    }

    #[test]
    fn test_headers_without_secret_have_no_signature() {
        let engine = DeliveryEngine::new(test_key()).unwrap();
        let sub = subscription(HashMap::new());
        let headers = engine.build_headers(&sub, &prepared()).unwrap();

        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert!(headers.get("x-webhook-event").is_some());
        assert!(headers.get("x-webhook-delivery-id").is_some());
        assert!(headers.get("x-webhook-signature").is_none());
    }

    #[test]
    fn test_headers_with_secret_carry_valid_signature() {
        let engine = DeliveryEngine::new(test_key()).unwrap();
        let mut sub = subscription(HashMap::new());
        sub.secret_encrypted = Some(crypto::encrypt_secret("whsec_abc", &test_key()).unwrap());

        let p = prepared();
        let headers = engine.build_headers(&sub, &p).unwrap();
        let sig = headers.get("x-webhook-signature").unwrap().to_str().unwrap();

        assert!(crypto::verify_signature(sig, "whsec_abc", &p.body));
    }

    #[test]
    fn test_undecryptable_secret_is_configuration_error() {
        let engine = DeliveryEngine::new(test_key()).unwrap();
        let mut sub = subscription(HashMap::new());
        // Encrypted under a different key
        sub.secret_encrypted = Some(crypto::encrypt_secret("s", &[0x01u8; 32]).unwrap());

        let err = engine.build_headers(&sub, &prepared()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_custom_headers_merged_without_overriding_protocol() {
        let engine = DeliveryEngine::new(test_key()).unwrap();
        let mut custom = HashMap::new();
        custom.insert("Authorization".to_string(), "Bearer token123".to_string());
        custom.insert("Content-Type".to_string(), "text/plain".to_string());
        custom.insert("X-Webhook-Event".to_string(), "spoofed".to_string());
        let sub = subscription(custom);

        let p = prepared();
        let headers = engine.build_headers(&sub, &p).unwrap();

        assert_eq!(headers.get("authorization").unwrap(), "Bearer token123");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(
            headers.get("x-webhook-event").unwrap(),
            p.event_type_str
        );
    }

    #[tokio::test]
    async fn test_malformed_url_makes_zero_attempts() {
        let engine = DeliveryEngine::new(test_key()).unwrap();
        let mut sub = subscription(HashMap::new());
        sub.target_url = "not a url".into();

        let outcome = engine.attempt(&sub, &prepared()).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts_used, 0);
        assert!(outcome.error.unwrap().contains("Malformed target URL"));
    }
}
