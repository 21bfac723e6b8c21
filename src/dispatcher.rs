//! Dispatcher: fans one event out to every matching subscription and returns
//! an aggregate report.
//!
//! Each subscription is an independent unit of work — one endpoint's failure
//! or slowness never blocks or alters another's delivery. The only error that
//! escapes `dispatch` is a registry read failure, since without a subscriber
//! list nothing can even be attempted.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;
use uuid::Uuid;

use crate::catalog::{WebhookEvent, WebhookEventType};
use crate::delivery::{DeliveryEngine, PreparedDelivery};
use crate::error::WebhookError;
use crate::models::{DeliveryReport, WebhookSubscription};
use crate::recorder::DeliveryRecorder;
use crate::store::WebhookStore;

/// Orchestrates registry lookup, per-subscription delivery, and recording.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn WebhookStore>,
    engine: DeliveryEngine,
    recorder: DeliveryRecorder,
}

impl Dispatcher {
    #[must_use]
    pub fn new(store: Arc<dyn WebhookStore>, engine: DeliveryEngine) -> Self {
        let recorder = DeliveryRecorder::new(Arc::clone(&store));
        Self {
            store,
            engine,
            recorder,
        }
    }

    /// Deliver an event to every active subscription of the event's tenant
    /// that registered for its type.
    ///
    /// Zero matching subscriptions is a normal no-op: empty report, nothing
    /// written. Per-subscription failures (exhausted retries, configuration
    /// errors) are absorbed into the report.
    ///
    /// # Errors
    ///
    /// `WebhookError::Infrastructure` if the registry read fails.
    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<Vec<DeliveryReport>, WebhookError> {
        let subscriptions = self
            .store
            .find_active_by_event_type(event.tenant_id, event.event_type)
            .await?;

        if subscriptions.is_empty() {
            tracing::debug!(
                target: "webhook_delivery",
                event_id = %event.event_id,
                event_type = %event.event_type,
                tenant_id = %event.tenant_id,
                "No active subscriptions match event type"
            );
            return Ok(Vec::new());
        }

        tracing::info!(
            target: "webhook_delivery",
            event_id = %event.event_id,
            event_type = %event.event_type,
            tenant_id = %event.tenant_id,
            subscription_count = subscriptions.len(),
            "Dispatching event to matching subscriptions"
        );

        let deliveries = subscriptions
            .into_iter()
            .map(|sub| self.deliver_to_subscription(event, sub));

        Ok(join_all(deliveries).await)
    }

    /// One subscription's delivery from envelope to audit record. Infallible
    /// by construction: every failure mode becomes a report entry.
    async fn deliver_to_subscription(
        &self,
        event: &WebhookEvent,
        subscription: WebhookSubscription,
    ) -> DeliveryReport {
        let prepared = match PreparedDelivery::new(event, subscription.id) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    subscription_id = %subscription.id,
                    event_id = %event.event_id,
                    error = %e,
                    "Failed to build delivery envelope"
                );
                return DeliveryReport {
                    subscription_id: subscription.id,
                    succeeded: false,
                    status_code: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let outcome = self.engine.attempt(&subscription, &prepared).await;

        let mut report = DeliveryReport {
            subscription_id: subscription.id,
            succeeded: outcome.succeeded,
            status_code: outcome.status_code,
            error: outcome.error.clone(),
        };

        if let Err(e) = self.recorder.record(&subscription, &prepared, &outcome).await {
            // The delivery itself already happened; a failed audit write is
            // surfaced in the report instead of failing the other fan-out
            // members.
            tracing::error!(
                target: "webhook_delivery",
                subscription_id = %subscription.id,
                delivery_id = %prepared.delivery_id,
                error = %e,
                "Failed to record delivery outcome"
            );
            report.error = Some(format!("Delivery record not written: {e}"));
        }

        report
    }

    /// Manually trigger a synthetic test delivery against one subscription.
    ///
    /// Runs the exact same engine and recorder path as a real dispatch, so
    /// the result is representative — this is both the diagnostic tool for a
    /// misconfigured endpoint and the only re-entry point after exhaustion.
    /// Works on inactive subscriptions too, since the usual reason to test
    /// one is deciding whether to reactivate it.
    pub async fn send_test(
        &self,
        tenant_id: Uuid,
        subscription_id: Uuid,
    ) -> Result<DeliveryReport, WebhookError> {
        let subscription = self
            .store
            .find_subscription(tenant_id, subscription_id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;

        let event_type = subscription
            .event_types
            .iter()
            .find_map(|et| WebhookEventType::parse(et))
            .unwrap_or(WebhookEventType::UserCreated);

        let event = WebhookEvent {
            event_id: Uuid::new_v4(),
            event_type,
            tenant_id,
            subject_id: None,
            occurred_at: chrono::Utc::now(),
            data: json!({
                "test": true,
                "subscription_id": subscription_id,
                "message": "Test delivery triggered by administrator",
            }),
        };

        tracing::info!(
            target: "webhook_delivery",
            subscription_id = %subscription_id,
            tenant_id = %tenant_id,
            event_type = %event_type,
            "Triggering manual test delivery"
        );

        Ok(self.deliver_to_subscription(&event, subscription).await)
    }
}
