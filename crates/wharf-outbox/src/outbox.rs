//! The transactional outbox. Writers call [`Outbox::enqueue_in_tx`]
//! inside the same database transaction as the business write it needs to
//! accompany, so the message row only durably exists if that write
//! committed. [`Outbox::enqueue`] is the convenience form for callers with
//! no surrounding transaction of their own.

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use wharf_core::WharfError;

#[derive(Clone)]
pub struct Outbox {
    pool: PgPool,
}

impl Outbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a `Ready` row in its own transaction. Prefer
    /// [`Outbox::enqueue_in_tx`] whenever the enqueue should be atomic with
    /// some other write. `correlation_id` is opaque bookkeeping the caller
    /// can use to trace this message back to the business operation that
    /// produced it; it plays no role in dispatch.
    pub async fn enqueue(
        &self,
        topic: &str,
        payload: Value,
        correlation_id: Option<Uuid>,
    ) -> Result<Uuid, WharfError> {
        if topic.is_empty() {
            return Err(WharfError::Configuration("topic must not be empty".to_string()));
        }
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO outbox_messages (id, topic, payload, correlation_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(topic)
        .bind(payload)
        .bind(correlation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| WharfError::Transient(e.into()))?;
        Ok(id)
    }

    /// Inserts a `Ready` row using the caller's open transaction. The row
    /// becomes visible to dispatchers iff and only if `tx` commits.
    pub async fn enqueue_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        topic: &str,
        payload: Value,
        correlation_id: Option<Uuid>,
    ) -> Result<Uuid, WharfError> {
        if topic.is_empty() {
            return Err(WharfError::Configuration("topic must not be empty".to_string()));
        }
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO outbox_messages (id, topic, payload, correlation_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(topic)
        .bind(payload)
        .bind(correlation_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| WharfError::Transient(e.into()))?;
        Ok(id)
    }

    /// Deletes `Done` rows older than `older_than`, mirroring the
    /// maintenance sweep a dispatcher's operator runs periodically to keep
    /// the table small. Failed rows are left for operator inspection.
    pub async fn purge_delivered_before(&self, older_than: chrono::DateTime<Utc>) -> Result<u64, WharfError> {
        let result = sqlx::query(
            "DELETE FROM outbox_messages WHERE status = 'done' AND created_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(|e| WharfError::Transient(e.into()))?;
        Ok(result.rows_affected())
    }
}

/// Caches one [`Outbox`] per tenant pool, mirroring
/// `wharf_core::DynamicStoreProvider`'s discovery cache so a multi-tenant
/// process doesn't reconnect on every enqueue.
#[derive(Default)]
pub struct OutboxRegistry {
    outboxes: DashMap<String, Outbox>,
}

impl OutboxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert(&self, tenant: &str, pool: &PgPool) -> Outbox {
        self.outboxes
            .entry(tenant.to_string())
            .or_insert_with(|| Outbox::new(pool.clone()))
            .clone()
    }
}
