//! Error types for the webhook delivery system.

use crate::store::StoreError;

/// Webhook system error variants.
///
/// Transport failures (timeouts, connection errors) and protocol failures
/// (non-2xx responses) are deliberately *not* represented here: they are
/// retried inside the delivery engine and surface as fields of a
/// [`crate::models::DeliveryOutcome`], never as a propagating error.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The subscription cannot be delivered to at all: malformed target URL
    /// or a required field is missing. Fails before any HTTP attempt.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The subscription store is unavailable. The only error class that
    /// escapes `Dispatcher::dispatch` — without a subscriber list no partial
    /// delivery can be attempted.
    #[error("Storage error: {0}")]
    Infrastructure(#[from] StoreError),

    #[error("Subscription not found")]
    SubscriptionNotFound,

    #[error("Delivery record not found")]
    DeliveryNotFound,

    #[error("Subscription limit ({limit}) reached for tenant")]
    SubscriptionLimitExceeded { limit: i64 },

    #[error("SSRF protection: {0}")]
    SsrfDetected(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WebhookError {
    /// Whether this error aborted delivery before any HTTP attempt was made.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, WebhookError::Configuration(_))
    }

    /// Whether this error indicates the store itself failed.
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, WebhookError::Infrastructure(_))
    }
}
