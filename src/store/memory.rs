//! In-memory store used by tests and embedded setups.
//!
//! Behaviorally equivalent to the Postgres store: counter updates happen
//! inside one guarded mutation, lookups are always fresh reads, and every
//! query is keyed by tenant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{StoreError, WebhookStore};
use crate::catalog::WebhookEventType;
use crate::models::{
    CreateDeliveryRecord, CreateWebhookSubscription, DeliveryRecord, UpdateWebhookSubscription,
    WebhookSubscription,
};

#[derive(Default)]
struct Inner {
    subscriptions: HashMap<Uuid, WebhookSubscription>,
    deliveries: Vec<DeliveryRecord>,
}

/// In-memory implementation of [`WebhookStore`].
#[derive(Default)]
pub struct MemoryWebhookStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
}

impl MemoryWebhookStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate storage being unreachable; every operation fails with
    /// `StoreError::Unavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    /// Total number of delivery records, across all tenants. Test helper.
    pub async fn delivery_count(&self) -> usize {
        self.inner.read().await.deliveries.len()
    }
}

#[async_trait]
impl WebhookStore for MemoryWebhookStore {
    async fn find_active_by_event_type(
        &self,
        tenant_id: Uuid,
        event_type: WebhookEventType,
    ) -> Result<Vec<WebhookSubscription>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        let mut subs: Vec<WebhookSubscription> = inner
            .subscriptions
            .values()
            .filter(|s| {
                s.tenant_id == tenant_id
                    && s.is_active
                    && s.event_types.iter().any(|et| et == event_type.as_str())
            })
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.created_at);
        Ok(subs)
    }

    async fn create_subscription(
        &self,
        input: CreateWebhookSubscription,
    ) -> Result<WebhookSubscription, StoreError> {
        self.check_available()?;
        let now = Utc::now();
        let sub = WebhookSubscription {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            name: input.name,
            description: input.description,
            target_url: input.target_url,
            event_types: input.event_types,
            secret_encrypted: input.secret_encrypted,
            custom_headers: Json(input.custom_headers),
            max_retries: input.max_retries,
            retry_delay_base_ms: input.retry_delay_base_ms,
            is_active: true,
            success_count: 0,
            failure_count: 0,
            last_triggered_at: None,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .write()
            .await
            .subscriptions
            .insert(sub.id, sub.clone());
        Ok(sub)
    }

    async fn find_subscription(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<WebhookSubscription>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .get(&id)
            .filter(|s| s.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_subscriptions(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
        is_active: Option<bool>,
    ) -> Result<Vec<WebhookSubscription>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        let mut subs: Vec<WebhookSubscription> = inner
            .subscriptions
            .values()
            .filter(|s| s.tenant_id == tenant_id)
            .filter(|s| is_active.is_none_or(|a| s.is_active == a))
            .cloned()
            .collect();
        subs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_subscriptions(
        &self,
        tenant_id: Uuid,
        is_active: Option<bool>,
    ) -> Result<i64, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .values()
            .filter(|s| s.tenant_id == tenant_id)
            .filter(|s| is_active.is_none_or(|a| s.is_active == a))
            .count() as i64)
    }

    async fn update_subscription(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateWebhookSubscription,
    ) -> Result<Option<WebhookSubscription>, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let Some(sub) = inner
            .subscriptions
            .get_mut(&id)
            .filter(|s| s.tenant_id == tenant_id)
        else {
            return Ok(None);
        };

        if let Some(name) = input.name {
            sub.name = name;
        }
        if let Some(description) = input.description {
            sub.description = Some(description);
        }
        if let Some(target_url) = input.target_url {
            sub.target_url = target_url;
        }
        if let Some(event_types) = input.event_types {
            sub.event_types = event_types;
        }
        if let Some(secret_encrypted) = input.secret_encrypted {
            sub.secret_encrypted = Some(secret_encrypted);
        }
        if let Some(custom_headers) = input.custom_headers {
            sub.custom_headers = Json(custom_headers);
        }
        if let Some(max_retries) = input.max_retries {
            sub.max_retries = max_retries;
        }
        if let Some(retry_delay_base_ms) = input.retry_delay_base_ms {
            sub.retry_delay_base_ms = retry_delay_base_ms;
        }
        if let Some(is_active) = input.is_active {
            sub.is_active = is_active;
        }
        sub.updated_at = Utc::now();

        Ok(Some(sub.clone()))
    }

    async fn delete_subscription(&self, tenant_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let matches = inner
            .subscriptions
            .get(&id)
            .is_some_and(|s| s.tenant_id == tenant_id);
        if matches {
            inner.subscriptions.remove(&id);
            inner
                .deliveries
                .retain(|d| d.subscription_id != id);
        }
        Ok(matches)
    }

    async fn record_delivery(
        &self,
        record: CreateDeliveryRecord,
    ) -> Result<DeliveryRecord, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;

        let now = Utc::now();
        // Counter and record move together under one write guard, mirroring
        // the Postgres transaction.
        if let Some(sub) = inner
            .subscriptions
            .get_mut(&record.subscription_id)
            .filter(|s| s.tenant_id == record.tenant_id)
        {
            if record.succeeded {
                sub.success_count += 1;
            } else {
                sub.failure_count += 1;
            }
            sub.last_triggered_at = Some(now);
        }

        let inserted = DeliveryRecord {
            id: record.id,
            tenant_id: record.tenant_id,
            subscription_id: record.subscription_id,
            event_type: record.event_type,
            envelope: record.envelope,
            status: record.status,
            response_status: record.response_status,
            response_body: record.response_body,
            response_time_ms: record.response_time_ms,
            succeeded: record.succeeded,
            attempts_used: record.attempts_used,
            error_message: record.error_message,
            created_at: now,
        };
        inner.deliveries.push(inserted.clone());
        Ok(inserted)
    }

    async fn list_deliveries(
        &self,
        tenant_id: Uuid,
        subscription_id: Uuid,
        limit: i64,
        offset: i64,
        status: Option<&str>,
    ) -> Result<Vec<DeliveryRecord>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        let mut records: Vec<DeliveryRecord> = inner
            .deliveries
            .iter()
            .filter(|d| d.tenant_id == tenant_id && d.subscription_id == subscription_id)
            .filter(|d| status.is_none_or(|s| d.status == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_deliveries(
        &self,
        tenant_id: Uuid,
        subscription_id: Uuid,
        status: Option<&str>,
    ) -> Result<i64, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner
            .deliveries
            .iter()
            .filter(|d| d.tenant_id == tenant_id && d.subscription_id == subscription_id)
            .filter(|d| status.is_none_or(|s| d.status == s))
            .count() as i64)
    }

    async fn find_delivery(
        &self,
        tenant_id: Uuid,
        subscription_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<Option<DeliveryRecord>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner
            .deliveries
            .iter()
            .find(|d| {
                d.tenant_id == tenant_id
                    && d.subscription_id == subscription_id
                    && d.id == delivery_id
            })
            .cloned())
    }
}
