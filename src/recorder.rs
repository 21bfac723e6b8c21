//! Delivery recorder: the sole writer of the audit trail and of subscription
//! aggregate counters.

use std::sync::Arc;

use crate::delivery::PreparedDelivery;
use crate::error::WebhookError;
use crate::models::{CreateDeliveryRecord, DeliveryOutcome, DeliveryRecord, WebhookSubscription};
use crate::store::WebhookStore;

/// Persists one audit record per (dispatch, subscription) and bumps exactly
/// one counter, however many HTTP attempts the engine made.
#[derive(Clone)]
pub struct DeliveryRecorder {
    store: Arc<dyn WebhookStore>,
}

impl DeliveryRecorder {
    #[must_use]
    pub fn new(store: Arc<dyn WebhookStore>) -> Self {
        Self { store }
    }

    /// Write the record for a finished delivery. The record id equals the
    /// `X-Webhook-Delivery-Id` that went out on the wire, so receivers can
    /// reference it in support requests.
    pub async fn record(
        &self,
        subscription: &WebhookSubscription,
        prepared: &PreparedDelivery,
        outcome: &DeliveryOutcome,
    ) -> Result<DeliveryRecord, WebhookError> {
        let record = self
            .store
            .record_delivery(CreateDeliveryRecord {
                id: prepared.delivery_id,
                tenant_id: subscription.tenant_id,
                subscription_id: subscription.id,
                event_type: prepared.event_type_str.to_string(),
                envelope: prepared.envelope.clone(),
                status: outcome.status().as_str().to_string(),
                response_status: outcome.status_code.map(|s| s as i16),
                response_body: outcome.response_body.clone(),
                response_time_ms: outcome.response_time_ms,
                succeeded: outcome.succeeded,
                attempts_used: outcome.attempts_used,
                error_message: outcome.error.clone(),
            })
            .await?;

        Ok(record)
    }
}
