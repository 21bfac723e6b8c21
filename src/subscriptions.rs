//! Subscription administration service for external tooling.
//!
//! Create, list, update, deactivate, rotate secrets, trigger test
//! deliveries, and page through delivery history. Only the *shape* of a
//! subscription matters to delivery; richer business validation lives with
//! the callers.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::crypto;
use crate::error::WebhookError;
use crate::models::{
    CreateWebhookSubscription, DeliveryHistoryPage, DeliveryRecord, SubscriptionPage,
    UpdateWebhookSubscription, WebhookSubscription, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_DELAY_BASE_MS, MAX_RETRIES_CEILING, MAX_RETRY_DELAY_MS,
};
use crate::store::WebhookStore;
use crate::validation;

/// Default maximum active subscriptions per tenant.
pub const DEFAULT_MAX_SUBSCRIPTIONS: i64 = 25;

/// Request to create a subscription. `secret` arrives in plaintext and is
/// stored encrypted; it is never readable again through this service.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionRequest {
    pub name: String,
    pub description: Option<String>,
    pub target_url: String,
    pub event_types: Vec<String>,
    pub secret: Option<String>,
    pub custom_headers: HashMap<String, String>,
    pub max_retries: Option<i32>,
    pub retry_delay_base_ms: Option<i64>,
}

/// Partial subscription update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateSubscriptionRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub target_url: Option<String>,
    pub event_types: Option<Vec<String>>,
    pub secret: Option<String>,
    pub custom_headers: Option<HashMap<String, String>>,
    pub max_retries: Option<i32>,
    pub retry_delay_base_ms: Option<i64>,
    pub is_active: Option<bool>,
}

/// Service for webhook subscription operations.
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn WebhookStore>,
    encryption_key: Vec<u8>,
    max_subscriptions: i64,
    allow_http: bool,
}

impl SubscriptionService {
    #[must_use]
    pub fn new(store: Arc<dyn WebhookStore>, encryption_key: Vec<u8>) -> Self {
        Self {
            store,
            encryption_key,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
            allow_http: false,
        }
    }

    /// Set the maximum subscriptions per tenant.
    #[must_use]
    pub fn with_max_subscriptions(mut self, max: i64) -> Self {
        self.max_subscriptions = max;
        self
    }

    /// Allow HTTP target URLs (development/testing).
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Create a new webhook subscription.
    pub async fn create(
        &self,
        tenant_id: Uuid,
        created_by: Option<Uuid>,
        request: CreateSubscriptionRequest,
    ) -> Result<WebhookSubscription, WebhookError> {
        validation::validate_target_url(&request.target_url, self.allow_http)?;
        validation::validate_event_types(&request.event_types)?;

        if request.name.trim().is_empty() {
            return Err(WebhookError::Validation(
                "Subscription name must not be empty".to_string(),
            ));
        }

        let count = self.store.count_subscriptions(tenant_id, None).await?;
        if count >= self.max_subscriptions {
            return Err(WebhookError::SubscriptionLimitExceeded {
                limit: self.max_subscriptions,
            });
        }

        let secret_encrypted = match request.secret.as_deref() {
            Some(secret) if !secret.is_empty() => {
                Some(crypto::encrypt_secret(secret, &self.encryption_key)?)
            }
            _ => None,
        };

        let sub = self
            .store
            .create_subscription(CreateWebhookSubscription {
                tenant_id,
                name: request.name,
                description: request.description,
                target_url: request.target_url,
                event_types: request.event_types,
                secret_encrypted,
                custom_headers: request.custom_headers,
                max_retries: request
                    .max_retries
                    .unwrap_or(DEFAULT_MAX_RETRIES)
                    .clamp(1, MAX_RETRIES_CEILING),
                retry_delay_base_ms: request
                    .retry_delay_base_ms
                    .unwrap_or(DEFAULT_RETRY_DELAY_BASE_MS)
                    .clamp(0, MAX_RETRY_DELAY_MS),
                created_by,
            })
            .await?;

        tracing::info!(
            target: "webhook_delivery",
            subscription_id = %sub.id,
            tenant_id = %tenant_id,
            "Webhook subscription created"
        );

        Ok(sub)
    }

    /// List subscriptions for a tenant with pagination.
    pub async fn list(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
        is_active: Option<bool>,
    ) -> Result<SubscriptionPage, WebhookError> {
        let limit = limit.clamp(1, 100);
        let offset = offset.max(0);

        let items = self
            .store
            .list_subscriptions(tenant_id, limit, offset, is_active)
            .await?;
        let total = self.store.count_subscriptions(tenant_id, is_active).await?;

        Ok(SubscriptionPage {
            items,
            total,
            limit,
            offset,
        })
    }

    /// Get a single subscription.
    pub async fn get(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<WebhookSubscription, WebhookError> {
        self.store
            .find_subscription(tenant_id, id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)
    }

    /// Update a subscription.
    pub async fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        request: UpdateSubscriptionRequest,
    ) -> Result<WebhookSubscription, WebhookError> {
        if let Some(ref url) = request.target_url {
            validation::validate_target_url(url, self.allow_http)?;
        }
        if let Some(ref event_types) = request.event_types {
            validation::validate_event_types(event_types)?;
        }

        let secret_encrypted = match request.secret.as_deref() {
            Some(secret) if !secret.is_empty() => {
                Some(crypto::encrypt_secret(secret, &self.encryption_key)?)
            }
            _ => None,
        };

        self.store
            .update_subscription(
                tenant_id,
                id,
                UpdateWebhookSubscription {
                    name: request.name,
                    description: request.description,
                    target_url: request.target_url,
                    event_types: request.event_types,
                    secret_encrypted,
                    custom_headers: request.custom_headers,
                    max_retries: request.max_retries.map(|m| m.clamp(1, MAX_RETRIES_CEILING)),
                    retry_delay_base_ms: request
                        .retry_delay_base_ms
                        .map(|d| d.clamp(0, MAX_RETRY_DELAY_MS)),
                    is_active: request.is_active,
                },
            )
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)
    }

    /// Deactivate a subscription. It stops receiving events on the very next
    /// dispatch — registry reads are never cached.
    pub async fn deactivate(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<WebhookSubscription, WebhookError> {
        self.update(
            tenant_id,
            id,
            UpdateSubscriptionRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    /// Generate a fresh signing secret, store it encrypted, and return the
    /// plaintext exactly once. In-flight deliveries signed with the old
    /// secret stay verifiable against it; the new secret applies from the
    /// next dispatch.
    pub async fn rotate_secret(&self, tenant_id: Uuid, id: Uuid) -> Result<String, WebhookError> {
        // 404 before generating anything
        self.get(tenant_id, id).await?;

        let plaintext = crypto::generate_secret();
        let secret_encrypted = crypto::encrypt_secret(&plaintext, &self.encryption_key)?;

        self.store
            .update_subscription(
                tenant_id,
                id,
                UpdateWebhookSubscription {
                    secret_encrypted: Some(secret_encrypted),
                    ..Default::default()
                },
            )
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;

        tracing::info!(
            target: "webhook_delivery",
            subscription_id = %id,
            tenant_id = %tenant_id,
            "Webhook signing secret rotated"
        );

        Ok(plaintext)
    }

    /// Delete a subscription and its delivery history.
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), WebhookError> {
        if !self.store.delete_subscription(tenant_id, id).await? {
            return Err(WebhookError::SubscriptionNotFound);
        }
        Ok(())
    }

    /// Page through a subscription's delivery history, newest first.
    pub async fn list_deliveries(
        &self,
        tenant_id: Uuid,
        subscription_id: Uuid,
        limit: i64,
        offset: i64,
        status: Option<&str>,
    ) -> Result<DeliveryHistoryPage, WebhookError> {
        // Verify the subscription exists and belongs to this tenant
        self.get(tenant_id, subscription_id).await?;

        let limit = limit.clamp(1, 100);
        let offset = offset.max(0);

        let items = self
            .store
            .list_deliveries(tenant_id, subscription_id, limit, offset, status)
            .await?;
        let total = self
            .store
            .count_deliveries(tenant_id, subscription_id, status)
            .await?;

        Ok(DeliveryHistoryPage {
            items,
            total,
            limit,
            offset,
        })
    }

    /// Fetch one delivery record.
    pub async fn get_delivery(
        &self,
        tenant_id: Uuid,
        subscription_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<DeliveryRecord, WebhookError> {
        self.get(tenant_id, subscription_id).await?;

        self.store
            .find_delivery(tenant_id, subscription_id, delivery_id)
            .await?
            .ok_or(WebhookError::DeliveryNotFound)
    }
}
