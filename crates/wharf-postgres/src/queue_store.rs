//! A `QueueStore<Id>` backed by Postgres, shared by the outbox, inbox,
//! timer, and job-run tables: one generic implementation over two id
//! shapes, rather than one hand-written store per table.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use sqlx::Row as _;
use std::marker::PhantomData;

use wharf_core::{async_trait, IdentifiedStore, OwnerToken, QueueRecord, QueueStore, WharfError};

/// The closed set of tables this store knows how to drive. Table names are
/// never taken from caller input, only this enum, so string interpolation
/// into SQL below can't be steered by anything outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueTable {
    Outbox,
    Inbox,
    Timers,
    JobRuns,
}

impl QueueTable {
    fn name(self) -> &'static str {
        match self {
            QueueTable::Outbox => "outbox_messages",
            QueueTable::Inbox => "inbox_messages",
            QueueTable::Timers => "timers",
            QueueTable::JobRuns => "job_runs",
        }
    }

    /// Outbox/inbox are unordered queues, claimed in arrival order; timers
    /// and job runs are scheduled queues, claimed in due-time order so an
    /// earlier-due row is never left behind a later-due one inserted first.
    fn claim_order(self) -> &'static str {
        match self {
            QueueTable::Outbox | QueueTable::Inbox => "created_at ASC",
            QueueTable::Timers | QueueTable::JobRuns => "due_time ASC NULLS LAST",
        }
    }
}

/// Bound satisfied by `Uuid` (outbox/timers/job-runs) and `String` (inbox),
/// the two id shapes this store is instantiated over.
pub trait PgId:
    wharf_core::QueueId
    + for<'q> sqlx::Encode<'q, sqlx::Postgres>
    + sqlx::Type<sqlx::Postgres>
    + for<'r> sqlx::Decode<'r, sqlx::Postgres>
    + Unpin
{
}

impl<T> PgId for T where
    T: wharf_core::QueueId
        + for<'q> sqlx::Encode<'q, sqlx::Postgres>
        + sqlx::Type<sqlx::Postgres>
        + for<'r> sqlx::Decode<'r, sqlx::Postgres>
        + Unpin
{
}

pub struct PgQueueStore<Id> {
    pool: PgPool,
    table: QueueTable,
    identifier: String,
    _marker: PhantomData<Id>,
}

impl<Id> PgQueueStore<Id> {
    pub fn new(pool: PgPool, table: QueueTable, identifier: impl Into<String>) -> Self {
        Self {
            pool,
            table,
            identifier: identifier.into(),
            _marker: PhantomData,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl<Id> IdentifiedStore for PgQueueStore<Id> {
    fn identifier(&self) -> String {
        self.identifier.clone()
    }
}

impl<Id> Clone for PgQueueStore<Id> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            table: self.table,
            identifier: self.identifier.clone(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<Id: PgId> QueueStore<Id> for PgQueueStore<Id> {
    async fn claim(
        &self,
        owner: OwnerToken,
        lease_for: Duration,
        batch_size: u32,
    ) -> Result<Vec<Id>, WharfError> {
        let table = self.table.name();
        let order = self.table.claim_order();
        let locked_until = Utc::now() + lease_for;

        let sql = format!(
            r#"
            WITH claimable AS (
                SELECT id FROM {table}
                WHERE (status = 'ready' OR (status = 'in_progress' AND locked_until <= now()))
                  AND (due_time IS NULL OR due_time <= now())
                ORDER BY {order}
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE {table}
            SET status = 'in_progress', owner_token = $2, locked_until = $3
            WHERE id IN (SELECT id FROM claimable)
            RETURNING id
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(batch_size as i64)
            .bind(owner.as_uuid())
            .bind(locked_until)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| WharfError::Transient(e.into()))?;

        rows.into_iter()
            .map(|row| row.try_get::<Id, _>("id").map_err(|e| WharfError::Transient(e.into())))
            .collect()
    }

    async fn ack(&self, owner: OwnerToken, ids: &[Id]) -> Result<(), WharfError> {
        if ids.is_empty() {
            return Ok(());
        }
        let table = self.table.name();
        let sql = format!(
            "UPDATE {table}
             SET status = 'done', owner_token = NULL, locked_until = NULL
             WHERE id = ANY($1) AND status = 'in_progress' AND owner_token = $2"
        );
        sqlx::query(&sql)
            .bind(ids)
            .bind(owner.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| WharfError::Transient(e.into()))?;
        Ok(())
    }

    async fn abandon(
        &self,
        owner: OwnerToken,
        ids: &[Id],
        error: Option<String>,
        delay: Option<Duration>,
    ) -> Result<(), WharfError> {
        if ids.is_empty() {
            return Ok(());
        }
        let table = self.table.name();
        let due_time: Option<DateTime<Utc>> = delay.map(|d| Utc::now() + d);

        let sql = format!(
            "UPDATE {table}
             SET status = 'ready', owner_token = NULL, locked_until = NULL,
                 attempts = attempts + 1, last_error = $3, due_time = $4
             WHERE id = ANY($1) AND status = 'in_progress' AND owner_token = $2"
        );
        sqlx::query(&sql)
            .bind(ids)
            .bind(owner.as_uuid())
            .bind(error)
            .bind(due_time)
            .execute(&self.pool)
            .await
            .map_err(|e| WharfError::Transient(e.into()))?;
        Ok(())
    }

    async fn fail(&self, owner: OwnerToken, ids: &[Id], error: String) -> Result<(), WharfError> {
        if ids.is_empty() {
            return Ok(());
        }
        let table = self.table.name();
        let sql = format!(
            "UPDATE {table}
             SET status = 'failed', owner_token = NULL, locked_until = NULL, last_error = $3
             WHERE id = ANY($1) AND status = 'in_progress' AND owner_token = $2"
        );
        sqlx::query(&sql)
            .bind(ids)
            .bind(owner.as_uuid())
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(|e| WharfError::Transient(e.into()))?;
        Ok(())
    }

    async fn reap_expired(&self) -> Result<u64, WharfError> {
        let table = self.table.name();
        let sql = format!(
            "UPDATE {table}
             SET status = 'ready', owner_token = NULL, locked_until = NULL
             WHERE status = 'in_progress' AND locked_until <= now()"
        );
        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| WharfError::Transient(e.into()))?;
        Ok(result.rows_affected())
    }

    async fn attempts(&self, id: &Id) -> Result<i32, WharfError> {
        let table = self.table.name();
        let sql = format!("SELECT attempts FROM {table} WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| WharfError::Transient(e.into()))?;
        Ok(row.map(|r| r.get::<i32, _>("attempts")).unwrap_or(0))
    }

    async fn fetch_record(&self, id: &Id) -> Result<Option<QueueRecord<Id>>, WharfError> {
        let table = self.table.name();
        let sql = format!("SELECT id, topic, payload, attempts FROM {table} WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| WharfError::Transient(e.into()))?;

        Ok(match row {
            None => None,
            Some(row) => Some(QueueRecord {
                id: row.try_get::<Id, _>("id").map_err(|e| WharfError::Transient(e.into()))?,
                topic: row.get::<String, _>("topic"),
                payload: row.get::<serde_json::Value, _>("payload"),
                attempts: row.get::<i32, _>("attempts"),
            }),
        })
    }
}
