//! Webhook delivery system for training/compliance platform events.
//!
//! Fans each domain event out to every tenant-registered endpoint interested
//! in it, with HMAC-SHA256 signing, bounded linear-backoff retries, and a
//! durable per-attempt audit trail. Delivery is at-least-once with bounded
//! attempts; exhaustion is terminal until a manual test delivery re-enters
//! the machine.

pub mod catalog;
pub mod crypto;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod publisher;
pub mod recorder;
pub mod store;
pub mod subscriptions;
pub mod validation;

pub use catalog::{WebhookEvent, WebhookEventType};
pub use delivery::{DeliveryEngine, RetryPolicy};
pub use dispatcher::Dispatcher;
pub use error::WebhookError;
pub use models::{DeliveryOutcome, DeliveryRecord, DeliveryReport, WebhookSubscription};
pub use publisher::{DispatchWorker, EventPublisher};
pub use recorder::DeliveryRecorder;
pub use store::{MemoryWebhookStore, PgWebhookStore, WebhookStore};
pub use subscriptions::SubscriptionService;
