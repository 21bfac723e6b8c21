//! Postgres-backed store using `sqlx`.
//!
//! Counter updates are single-statement `SET x = x + 1` increments executed
//! in the same transaction as the delivery record insert, so aggregates stay
//! correct under concurrent dispatch.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{StoreError, WebhookStore};
use crate::catalog::WebhookEventType;
use crate::models::{
    CreateDeliveryRecord, CreateWebhookSubscription, DeliveryRecord, UpdateWebhookSubscription,
    WebhookSubscription,
};

/// Postgres implementation of [`WebhookStore`].
#[derive(Clone)]
pub struct PgWebhookStore {
    pool: PgPool,
}

impl PgWebhookStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the webhook tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS webhook_subscriptions (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                tenant_id UUID NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                target_url TEXT NOT NULL,
                event_types TEXT[] NOT NULL,
                secret_encrypted TEXT,
                custom_headers JSONB NOT NULL DEFAULT '{}'::jsonb,
                max_retries INT NOT NULL DEFAULT 3,
                retry_delay_base_ms BIGINT NOT NULL DEFAULT 1000,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                success_count BIGINT NOT NULL DEFAULT 0,
                failure_count BIGINT NOT NULL DEFAULT 0,
                last_triggered_at TIMESTAMPTZ,
                created_by UUID,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS webhook_deliveries (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                subscription_id UUID NOT NULL REFERENCES webhook_subscriptions(id) ON DELETE CASCADE,
                event_type TEXT NOT NULL,
                envelope JSONB NOT NULL,
                status TEXT NOT NULL,
                response_status SMALLINT,
                response_body TEXT,
                response_time_ms BIGINT NOT NULL DEFAULT 0,
                succeeded BOOLEAN NOT NULL,
                attempts_used INT NOT NULL,
                error_message TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_webhook_subscriptions_lookup
                ON webhook_subscriptions (tenant_id) WHERE is_active
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_webhook_deliveries_subscription
                ON webhook_deliveries (tenant_id, subscription_id, created_at DESC)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl WebhookStore for PgWebhookStore {
    async fn find_active_by_event_type(
        &self,
        tenant_id: Uuid,
        event_type: WebhookEventType,
    ) -> Result<Vec<WebhookSubscription>, StoreError> {
        let subs = sqlx::query_as(
            r"
            SELECT * FROM webhook_subscriptions
            WHERE tenant_id = $1
              AND is_active
              AND $2 = ANY(event_types)
            ORDER BY created_at
            ",
        )
        .bind(tenant_id)
        .bind(event_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(subs)
    }

    async fn create_subscription(
        &self,
        input: CreateWebhookSubscription,
    ) -> Result<WebhookSubscription, StoreError> {
        let sub = sqlx::query_as(
            r"
            INSERT INTO webhook_subscriptions (
                tenant_id, name, description, target_url, event_types,
                secret_encrypted, custom_headers, max_retries,
                retry_delay_base_ms, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            ",
        )
        .bind(input.tenant_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.target_url)
        .bind(&input.event_types)
        .bind(&input.secret_encrypted)
        .bind(Json(&input.custom_headers))
        .bind(input.max_retries)
        .bind(input.retry_delay_base_ms)
        .bind(input.created_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(sub)
    }

    async fn find_subscription(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<WebhookSubscription>, StoreError> {
        let sub = sqlx::query_as(
            r"
            SELECT * FROM webhook_subscriptions
            WHERE tenant_id = $1 AND id = $2
            ",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sub)
    }

    async fn list_subscriptions(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
        is_active: Option<bool>,
    ) -> Result<Vec<WebhookSubscription>, StoreError> {
        let subs = sqlx::query_as(
            r"
            SELECT * FROM webhook_subscriptions
            WHERE tenant_id = $1
              AND ($2::boolean IS NULL OR is_active = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(tenant_id)
        .bind(is_active)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(subs)
    }

    async fn count_subscriptions(
        &self,
        tenant_id: Uuid,
        is_active: Option<bool>,
    ) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*) FROM webhook_subscriptions
            WHERE tenant_id = $1
              AND ($2::boolean IS NULL OR is_active = $2)
            ",
        )
        .bind(tenant_id)
        .bind(is_active)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn update_subscription(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateWebhookSubscription,
    ) -> Result<Option<WebhookSubscription>, StoreError> {
        let sub = sqlx::query_as(
            r"
            UPDATE webhook_subscriptions SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                target_url = COALESCE($5, target_url),
                event_types = COALESCE($6, event_types),
                secret_encrypted = COALESCE($7, secret_encrypted),
                custom_headers = COALESCE($8, custom_headers),
                max_retries = COALESCE($9, max_retries),
                retry_delay_base_ms = COALESCE($10, retry_delay_base_ms),
                is_active = COALESCE($11, is_active),
                updated_at = now()
            WHERE tenant_id = $1 AND id = $2
            RETURNING *
            ",
        )
        .bind(tenant_id)
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.target_url)
        .bind(&input.event_types)
        .bind(&input.secret_encrypted)
        .bind(input.custom_headers.as_ref().map(Json))
        .bind(input.max_retries)
        .bind(input.retry_delay_base_ms)
        .bind(input.is_active)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sub)
    }

    async fn delete_subscription(&self, tenant_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            DELETE FROM webhook_subscriptions
            WHERE tenant_id = $1 AND id = $2
            ",
        )
        .bind(tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_delivery(
        &self,
        record: CreateDeliveryRecord,
    ) -> Result<DeliveryRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted: DeliveryRecord = sqlx::query_as(
            r"
            INSERT INTO webhook_deliveries (
                id, tenant_id, subscription_id, event_type, envelope, status,
                response_status, response_body, response_time_ms, succeeded,
                attempts_used, error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            ",
        )
        .bind(record.id)
        .bind(record.tenant_id)
        .bind(record.subscription_id)
        .bind(&record.event_type)
        .bind(&record.envelope)
        .bind(&record.status)
        .bind(record.response_status)
        .bind(&record.response_body)
        .bind(record.response_time_ms)
        .bind(record.succeeded)
        .bind(record.attempts_used)
        .bind(&record.error_message)
        .fetch_one(&mut *tx)
        .await?;

        // Exactly one counter moves, in the same transaction as the insert.
        if record.succeeded {
            sqlx::query(
                r"
                UPDATE webhook_subscriptions
                SET success_count = success_count + 1,
                    last_triggered_at = $3
                WHERE tenant_id = $1 AND id = $2
                ",
            )
        } else {
            sqlx::query(
                r"
                UPDATE webhook_subscriptions
                SET failure_count = failure_count + 1,
                    last_triggered_at = $3
                WHERE tenant_id = $1 AND id = $2
                ",
            )
        }
        .bind(record.tenant_id)
        .bind(record.subscription_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
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
        let records = sqlx::query_as(
            r"
            SELECT * FROM webhook_deliveries
            WHERE tenant_id = $1
              AND subscription_id = $2
              AND ($3::text IS NULL OR status = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            ",
        )
        .bind(tenant_id)
        .bind(subscription_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn count_deliveries(
        &self,
        tenant_id: Uuid,
        subscription_id: Uuid,
        status: Option<&str>,
    ) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*) FROM webhook_deliveries
            WHERE tenant_id = $1
              AND subscription_id = $2
              AND ($3::text IS NULL OR status = $3)
            ",
        )
        .bind(tenant_id)
        .bind(subscription_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn find_delivery(
        &self,
        tenant_id: Uuid,
        subscription_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<Option<DeliveryRecord>, StoreError> {
        let record = sqlx::query_as(
            r"
            SELECT * FROM webhook_deliveries
            WHERE tenant_id = $1 AND subscription_id = $2 AND id = $3
            ",
        )
        .bind(tenant_id)
        .bind(subscription_id)
        .bind(delivery_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
