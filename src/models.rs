//! Core data model: subscriptions, delivery records, envelopes, and reports.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Default number of HTTP attempts per dispatch per subscription.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Hard ceiling on configurable attempts.
pub const MAX_RETRIES_CEILING: i32 = 10;

/// Default linear backoff base in milliseconds.
pub const DEFAULT_RETRY_DELAY_BASE_MS: i64 = 1000;

/// Hard ceiling on the configurable backoff base. Keeps the worst-case
/// per-subscription latency bounded even for hostile admin input.
pub const MAX_RETRY_DELAY_MS: i64 = 60_000;

/// Response bodies are truncated to this many characters before being
/// written to the audit trail.
pub const RESPONSE_BODY_LIMIT: usize = 1000;

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A tenant-owned registration of an endpoint interested in event types.
///
/// `success_count`, `failure_count`, and `last_triggered_at` are written only
/// by the delivery recorder; everything else is owned by tenant admins.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub target_url: String,
    /// Wire-format event type strings this endpoint subscribed to.
    pub event_types: Vec<String>,
    /// AES-256-GCM encrypted signing secret; `None` disables signing.
    pub secret_encrypted: Option<String>,
    /// Subscriber-supplied headers merged into every request.
    pub custom_headers: Json<HashMap<String, String>>,
    pub max_retries: i32,
    pub retry_delay_base_ms: i64,
    pub is_active: bool,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookSubscription {
    /// Effective attempt budget, clamped to the allowed range.
    #[must_use]
    pub fn attempt_budget(&self) -> i32 {
        self.max_retries.clamp(1, MAX_RETRIES_CEILING)
    }

    /// Effective linear backoff base, clamped to the allowed range. Stored
    /// rows may predate the clamp at the admin surface, so the engine never
    /// trusts the raw column.
    #[must_use]
    pub fn backoff_base(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_delay_base_ms.clamp(0, MAX_RETRY_DELAY_MS) as u64)
    }
}

/// Input for creating a subscription.
#[derive(Debug, Clone)]
pub struct CreateWebhookSubscription {
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub target_url: String,
    pub event_types: Vec<String>,
    pub secret_encrypted: Option<String>,
    pub custom_headers: HashMap<String, String>,
    pub max_retries: i32,
    pub retry_delay_base_ms: i64,
    pub created_by: Option<Uuid>,
}

/// Partial update for a subscription. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateWebhookSubscription {
    pub name: Option<String>,
    pub description: Option<String>,
    pub target_url: Option<String>,
    pub event_types: Option<Vec<String>>,
    pub secret_encrypted: Option<String>,
    pub custom_headers: Option<HashMap<String, String>>,
    pub max_retries: Option<i32>,
    pub retry_delay_base_ms: Option<i64>,
    pub is_active: Option<bool>,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The exact JSON document transmitted to an endpoint and covered by the
/// signature. Built once per (dispatch, subscription) and reused byte-for-byte
/// across retries so receivers can verify against stable bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Wire event type string.
    pub event: String,
    /// Opaque event document.
    pub data: Value,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// The receiving subscription's id.
    #[serde(rename = "webhookId")]
    pub webhook_id: Uuid,
}

// ---------------------------------------------------------------------------
// Delivery outcome / report
// ---------------------------------------------------------------------------

/// Terminal state of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Succeeded,
    Exhausted,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one subscription's bounded retry loop.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub succeeded: bool,
    /// Last observed HTTP status, if any response was received.
    pub status_code: Option<u16>,
    /// Last response body, truncated to [`RESPONSE_BODY_LIMIT`] characters.
    pub response_body: Option<String>,
    /// Last observed error, if the final attempt did not succeed.
    pub error: Option<String>,
    /// Actual HTTP calls made; zero for configuration failures.
    pub attempts_used: i32,
    /// Wall-clock time across all attempts, excluding backoff sleeps.
    pub response_time_ms: i64,
}

impl DeliveryOutcome {
    /// Outcome for a subscription that failed validation before any HTTP
    /// attempt could be made.
    #[must_use]
    pub fn configuration_failure(message: String) -> Self {
        Self {
            succeeded: false,
            status_code: None,
            response_body: None,
            error: Some(message),
            attempts_used: 0,
            response_time_ms: 0,
        }
    }

    #[must_use]
    pub fn status(&self) -> DeliveryStatus {
        if self.succeeded {
            DeliveryStatus::Succeeded
        } else {
            DeliveryStatus::Exhausted
        }
    }
}

/// Per-subscription entry in the aggregate report returned by `dispatch`.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub subscription_id: Uuid,
    pub succeeded: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Delivery record (audit trail)
// ---------------------------------------------------------------------------

/// Durable audit record: exactly one per (dispatch, subscription), immutable.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subscription_id: Uuid,
    pub event_type: String,
    /// Snapshot of the envelope that was (or would have been) transmitted.
    pub envelope: Value,
    pub status: String,
    pub response_status: Option<i16>,
    pub response_body: Option<String>,
    pub response_time_ms: i64,
    pub succeeded: bool,
    pub attempts_used: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for writing a delivery record.
#[derive(Debug, Clone)]
pub struct CreateDeliveryRecord {
    /// Pre-assigned id, equal to the `X-Webhook-Delivery-Id` sent on the wire.
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subscription_id: Uuid,
    pub event_type: String,
    pub envelope: Value,
    pub status: String,
    pub response_status: Option<i16>,
    pub response_body: Option<String>,
    pub response_time_ms: i64,
    pub succeeded: bool,
    pub attempts_used: i32,
    pub error_message: Option<String>,
}

/// Paginated delivery history page.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryHistoryPage {
    pub items: Vec<DeliveryRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Paginated subscription listing page.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionPage {
    pub items: Vec<WebhookSubscription>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
