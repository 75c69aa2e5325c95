//! The transactional inbox. Deduplicates messages from an upstream system
//! by their caller-supplied id before they ever reach a handler.
//! `enqueue_if_new` is a single `INSERT ... ON CONFLICT DO NOTHING`, so two
//! concurrent deliveries of the same id race safely and exactly one wins.

use serde_json::Value;
use sqlx::PgPool;

use wharf_core::WharfError;

#[derive(Clone)]
pub struct Inbox {
    pool: PgPool,
}

impl Inbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns `true` if this is the first time `message_id` has been seen
    /// (the row was inserted and is now `Ready`); `false` if it was already
    /// present, in which case the caller must not process it again. `source`
    /// names the upstream system the message came from; `hash` is an
    /// optional content fingerprint later compared by `already_processed`.
    pub async fn enqueue_if_new(
        &self,
        message_id: &str,
        source: &str,
        topic: &str,
        payload: Value,
        hash: Option<&str>,
    ) -> Result<bool, WharfError> {
        if message_id.is_empty() {
            return Err(WharfError::Configuration("message id must not be empty".to_string()));
        }
        let result = sqlx::query(
            "INSERT INTO inbox_messages (id, source, hash, topic, payload) VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(message_id)
        .bind(source)
        .bind(hash)
        .bind(topic)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| WharfError::Transient(e.into()))?;

        Ok(result.rows_affected() == 1)
    }

    /// `true` iff a `Done` record exists for `message_id` from `source`. A
    /// message still `Ready`/`InProgress` (awaiting a processor) is not yet
    /// processed and returns `false`, matching the dedup contract: a caller
    /// that enqueues, then immediately checks, must see `false` until some
    /// processor has run the message to completion. When `hash` is given it
    /// must match the hash recorded at enqueue time, so a same-id delivery
    /// with different content is never mistaken for the original.
    pub async fn already_processed(
        &self,
        message_id: &str,
        source: &str,
        hash: Option<&str>,
    ) -> Result<bool, WharfError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM inbox_messages
             WHERE id = $1 AND source = $2 AND status = 'done'
               AND ($3::text IS NULL OR hash = $3)",
        )
        .bind(message_id)
        .bind(source)
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| WharfError::Transient(e.into()))?;
        Ok(row.is_some())
    }
}
