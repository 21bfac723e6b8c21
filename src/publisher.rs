//! Decoupled event publishing for callers that cannot afford inline dispatch.
//!
//! `Dispatcher::dispatch` blocks the producing unit of work for up to
//! `max_retries × (30s + backoff)` per subscription. Producers with a tight
//! latency budget publish onto a broadcast channel instead and let the
//! [`DispatchWorker`] carry the delivery. Same correctness semantics,
//! different timing.

use crate::catalog::WebhookEvent;
use crate::dispatcher::Dispatcher;

/// Publisher that hands webhook events to background dispatch.
#[derive(Clone)]
pub struct EventPublisher {
    sender: tokio::sync::broadcast::Sender<WebhookEvent>,
}

impl EventPublisher {
    /// Create a new publisher with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, tokio::sync::broadcast::Receiver<WebhookEvent>) {
        let (sender, receiver) = tokio::sync::broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Publish an event. Fire-and-forget — a missing consumer is logged, not
    /// an error, since at-least-once is only promised for events that reach
    /// the dispatcher.
    pub fn publish(&self, event: WebhookEvent) {
        if let Err(e) = self.sender.send(event) {
            tracing::warn!(
                target: "webhook_delivery",
                error = %e,
                "No active dispatch worker to receive event"
            );
        }
    }

    /// Get an additional receiver for the channel.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WebhookEvent> {
        self.sender.subscribe()
    }
}

/// Background loop that drains the channel into the dispatcher.
pub struct DispatchWorker {
    dispatcher: Dispatcher,
    receiver: tokio::sync::broadcast::Receiver<WebhookEvent>,
}

impl DispatchWorker {
    #[must_use]
    pub fn new(
        dispatcher: Dispatcher,
        receiver: tokio::sync::broadcast::Receiver<WebhookEvent>,
    ) -> Self {
        Self {
            dispatcher,
            receiver,
        }
    }

    /// Consume events until the channel closes. Dispatch failures are logged
    /// and the loop continues; a lagged receiver drops the missed events and
    /// keeps going.
    pub async fn run(mut self) {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = self.dispatcher.dispatch(&event).await {
                        tracing::error!(
                            target: "webhook_delivery",
                            event_id = %event.event_id,
                            event_type = %event.event_type,
                            tenant_id = %event.tenant_id,
                            error = %e,
                            "Background dispatch failed"
                        );
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        target: "webhook_delivery",
                        missed,
                        "Dispatch worker lagged behind publisher, events dropped"
                    );
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    tracing::info!(
                        target: "webhook_delivery",
                        "Event channel closed, dispatch worker stopping"
                    );
                    return;
                }
            }
        }
    }
}
