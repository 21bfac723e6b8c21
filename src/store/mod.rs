//! Storage seam for subscriptions and the delivery audit trail.
//!
//! The delivery core talks to a [`WebhookStore`] trait object so that the
//! dispatcher, engine, and recorder are exercisable without a database.
//! Production uses [`postgres::PgWebhookStore`]; tests and embedded use cases
//! get [`memory::MemoryWebhookStore`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::catalog::WebhookEventType;
use crate::models::{
    CreateDeliveryRecord, CreateWebhookSubscription, DeliveryRecord, UpdateWebhookSubscription,
    WebhookSubscription,
};

pub use memory::MemoryWebhookStore;
pub use postgres::PgWebhookStore;

/// Storage operation errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Subscription registry reads and audit-trail writes.
///
/// Lookups are always fresh point reads — no caching layer is permitted,
/// since `is_active` flips and secret rotations must take effect on the very
/// next dispatch.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    // --- Registry ---

    /// All active subscriptions for `tenant_id` registered for `event_type`.
    ///
    /// Tenant isolation is structural: there is no lookup that is not keyed
    /// by tenant.
    async fn find_active_by_event_type(
        &self,
        tenant_id: Uuid,
        event_type: WebhookEventType,
    ) -> Result<Vec<WebhookSubscription>, StoreError>;

    // --- Subscription administration ---

    async fn create_subscription(
        &self,
        input: CreateWebhookSubscription,
    ) -> Result<WebhookSubscription, StoreError>;

    async fn find_subscription(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<WebhookSubscription>, StoreError>;

    async fn list_subscriptions(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
        is_active: Option<bool>,
    ) -> Result<Vec<WebhookSubscription>, StoreError>;

    async fn count_subscriptions(
        &self,
        tenant_id: Uuid,
        is_active: Option<bool>,
    ) -> Result<i64, StoreError>;

    async fn update_subscription(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateWebhookSubscription,
    ) -> Result<Option<WebhookSubscription>, StoreError>;

    async fn delete_subscription(&self, tenant_id: Uuid, id: Uuid) -> Result<bool, StoreError>;

    // --- Recorder ---

    /// Insert one immutable delivery record and atomically bump exactly one
    /// of the subscription's counters, setting `last_triggered_at`.
    ///
    /// This is the sole write path for subscription aggregate counters. The
    /// increment happens inside the store (one SQL statement / one guarded
    /// mutation), never as an application-level read-modify-write.
    async fn record_delivery(
        &self,
        record: CreateDeliveryRecord,
    ) -> Result<DeliveryRecord, StoreError>;

    // --- Delivery history ---

    async fn list_deliveries(
        &self,
        tenant_id: Uuid,
        subscription_id: Uuid,
        limit: i64,
        offset: i64,
        status: Option<&str>,
    ) -> Result<Vec<DeliveryRecord>, StoreError>;

    async fn count_deliveries(
        &self,
        tenant_id: Uuid,
        subscription_id: Uuid,
        status: Option<&str>,
    ) -> Result<i64, StoreError>;

    async fn find_delivery(
        &self,
        tenant_id: Uuid,
        subscription_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<Option<DeliveryRecord>, StoreError>;
}
