//! Idempotent schema bootstrap. Every statement is `IF NOT EXISTS` so the
//! same pool can be pointed at a fresh or an already-provisioned database.
//! This is what `SchemaReadyGate` awaits before a dispatcher or planner
//! starts polling (see `wharf_core::readiness`).

use sqlx::PgPool;

const QUEUE_COLUMNS: &str = r#"
    status TEXT NOT NULL DEFAULT 'ready',
    owner_token UUID,
    locked_until TIMESTAMPTZ,
    due_time TIMESTAMPTZ,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    seq BIGSERIAL
"#;

/// Builds a claimable-rows index on whichever column `claim()` orders that
/// table by (see `wharf_postgres::queue_store::QueueTable::claim_order`).
async fn create_claimable_index(pool: &PgPool, table: &str, order_column: &str) -> Result<(), sqlx::Error> {
    let idx = format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_claimable
            ON {table} ({order_column})
            WHERE status = 'ready' OR status = 'in_progress'"
    );
    sqlx::query(&idx).execute(pool).await?;
    Ok(())
}

/// Timers and job runs: claimed in `due_time` order.
async fn create_uuid_keyed_queue(pool: &PgPool, table: &str) -> Result<(), sqlx::Error> {
    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id UUID PRIMARY KEY,
            topic TEXT NOT NULL,
            payload JSONB NOT NULL,
            {QUEUE_COLUMNS}
        )"
    );
    sqlx::query(&ddl).execute(pool).await?;
    create_claimable_index(pool, table, "due_time").await
}

/// The outbox: claimed in arrival order, and carries an optional caller
/// correlation id for tracing a message back to the business operation that
/// produced it.
async fn create_outbox_table(pool: &PgPool) -> Result<(), sqlx::Error> {
    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS outbox_messages (
            id UUID PRIMARY KEY,
            topic TEXT NOT NULL,
            payload JSONB NOT NULL,
            correlation_id UUID,
            {QUEUE_COLUMNS}
        )"
    );
    sqlx::query(&ddl).execute(pool).await?;
    create_claimable_index(pool, "outbox_messages", "created_at").await
}

/// The inbox's id is caller-supplied (the upstream system's own message id),
/// so it is `TEXT` rather than `UUID`. Carries the upstream `source` and an
/// optional content `hash` so `already_processed` can disambiguate and
/// verify duplicate deliveries, claimed in arrival order.
async fn create_inbox_table(pool: &PgPool) -> Result<(), sqlx::Error> {
    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS inbox_messages (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            hash TEXT,
            topic TEXT NOT NULL,
            payload JSONB NOT NULL,
            {QUEUE_COLUMNS}
        )"
    );
    sqlx::query(&ddl).execute(pool).await?;
    create_claimable_index(pool, "inbox_messages", "created_at").await
}

async fn create_leases_table(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS leases (
            resource TEXT PRIMARY KEY,
            owner_token UUID,
            lease_until TIMESTAMPTZ,
            fencing_token BIGINT NOT NULL DEFAULT 0,
            context JSONB,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_scheduled_jobs_table(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS scheduler_jobs (
            name TEXT PRIMARY KEY,
            cron_expression TEXT NOT NULL,
            topic TEXT NOT NULL,
            payload JSONB NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT true,
            last_planned_through TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Creates every table and index this crate's stores depend on, all
/// idempotently. Safe to call from every process on every startup; the
/// `DynamicStoreProvider`'s `with_schema_bootstrap` hook calls this once per
/// newly discovered tenant database.
pub async fn ensure_all(pool: &PgPool) -> Result<(), sqlx::Error> {
    create_outbox_table(pool).await?;
    create_inbox_table(pool).await?;
    create_uuid_keyed_queue(pool, "timers").await?;
    create_uuid_keyed_queue(pool, "job_runs").await?;
    create_leases_table(pool).await?;
    create_scheduled_jobs_table(pool).await?;
    Ok(())
}
