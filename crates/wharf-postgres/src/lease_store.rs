//! `LeaseStore` backed by a single `leases` row per resource. Grounded
//! on the same guarded-UPDATE idiom as the queue store's ownership checks:
//! every mutation's `WHERE` clause encodes the only condition under which it
//! is allowed to take effect, so the database itself enforces the
//! distributed-lease invariants rather than a lock held in application code.

use chrono::{Duration, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row as _};

use wharf_core::{async_trait, FencingToken, LeaseOutcome, LeaseStore, OwnerToken, WharfError};

#[derive(Clone)]
pub struct PgLeaseStore {
    pool: PgPool,
}

impl PgLeaseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LeaseStore for PgLeaseStore {
    async fn acquire(
        &self,
        resource: &str,
        owner: OwnerToken,
        lease_for: Duration,
        context: Option<Value>,
    ) -> Result<LeaseOutcome, WharfError> {
        let lease_until = Utc::now() + lease_for;

        let row = sqlx::query(
            r#"
            INSERT INTO leases (resource, owner_token, lease_until, fencing_token, context, updated_at)
            VALUES ($1, $2, $3, 1, $4, now())
            ON CONFLICT (resource) DO UPDATE
            SET owner_token = EXCLUDED.owner_token,
                lease_until = EXCLUDED.lease_until,
                fencing_token = leases.fencing_token + 1,
                context = EXCLUDED.context,
                updated_at = now()
            WHERE leases.owner_token IS NULL
               OR leases.lease_until <= now()
               OR leases.owner_token = EXCLUDED.owner_token
            RETURNING fencing_token
            "#,
        )
        .bind(resource)
        .bind(owner.as_uuid())
        .bind(lease_until)
        .bind(context)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| WharfError::Transient(e.into()))?;

        Ok(match row {
            Some(row) => LeaseOutcome::granted(FencingToken::from_raw(row.get::<i64, _>("fencing_token"))),
            None => LeaseOutcome::denied(),
        })
    }

    async fn renew(
        &self,
        resource: &str,
        owner: OwnerToken,
        lease_for: Duration,
    ) -> Result<LeaseOutcome, WharfError> {
        let lease_until = Utc::now() + lease_for;

        let row = sqlx::query(
            r#"
            UPDATE leases
            SET lease_until = $1, fencing_token = fencing_token + 1, updated_at = now()
            WHERE resource = $2 AND owner_token = $3 AND lease_until > now()
            RETURNING fencing_token
            "#,
        )
        .bind(lease_until)
        .bind(resource)
        .bind(owner.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| WharfError::Transient(e.into()))?;

        Ok(match row {
            Some(row) => LeaseOutcome::granted(FencingToken::from_raw(row.get::<i64, _>("fencing_token"))),
            None => LeaseOutcome::denied(),
        })
    }

    async fn release(&self, resource: &str, owner: OwnerToken) -> Result<(), WharfError> {
        sqlx::query(
            "UPDATE leases
             SET owner_token = NULL, lease_until = NULL, updated_at = now()
             WHERE resource = $1 AND owner_token = $2",
        )
        .bind(resource)
        .bind(owner.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| WharfError::Transient(e.into()))?;
        Ok(())
    }
}
