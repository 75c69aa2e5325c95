use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::{PgPool, Row};

use crate::SchedulerPlanner;

async fn ensure_schema(pool: &PgPool) {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS job_runs (
            id UUID PRIMARY KEY,
            topic TEXT NOT NULL,
            payload JSONB NOT NULL,
            status TEXT NOT NULL DEFAULT 'ready',
            owner_token UUID,
            locked_until TIMESTAMPTZ,
            due_time TIMESTAMPTZ,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            seq BIGSERIAL
        )",
    )
    .execute(pool)
    .await
    .unwrap();

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
    .await
    .unwrap();
}

async fn insert_job(pool: &PgPool, name: &str, cron_expression: &str, last_planned_through: Option<chrono::DateTime<Utc>>) {
    sqlx::query(
        "INSERT INTO scheduler_jobs (name, cron_expression, topic, payload, last_planned_through)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(name)
    .bind(cron_expression)
    .bind("nightly-rollup")
    .bind(json!({}))
    .bind(last_planned_through)
    .execute(pool)
    .await
    .unwrap();
}

#[sqlx::test]
async fn a_job_already_planned_through_the_future_plans_nothing(pool: PgPool) {
    ensure_schema(&pool).await;
    // Every second, but already planned an hour into the future.
    insert_job(&pool, "every-second", "* * * * * *", Some(Utc::now() + Duration::hours(1))).await;

    let planner = SchedulerPlanner::new(pool.clone());
    let planned = planner.tick().await.unwrap();

    assert_eq!(planned, 0);
    let count: (i64,) = sqlx::query_as("SELECT count(*) FROM job_runs").fetch_one(&pool).await.unwrap();
    assert_eq!(count.0, 0);
}

#[sqlx::test]
async fn a_never_planned_job_gets_exactly_one_run_inserted(pool: PgPool) {
    ensure_schema(&pool).await;
    insert_job(&pool, "every-second", "* * * * * *", None).await;

    let planner = SchedulerPlanner::new(pool.clone());
    let planned = planner.tick().await.unwrap();
    assert_eq!(planned, 1);

    let count: (i64,) = sqlx::query_as("SELECT count(*) FROM job_runs").fetch_one(&pool).await.unwrap();
    assert_eq!(count.0, 1);

    let row = sqlx::query("SELECT last_planned_through FROM scheduler_jobs WHERE name = $1")
        .bind("every-second")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(row.get::<Option<chrono::DateTime<Utc>>, _>("last_planned_through").is_some());
}

#[sqlx::test]
async fn falling_behind_by_many_occurrences_still_plans_only_one_per_tick(pool: PgPool) {
    ensure_schema(&pool).await;
    // Last planned an hour ago on a once-a-second schedule: thousands of
    // occurrences are due, but the planner must not burst them all at once.
    insert_job(&pool, "every-second", "* * * * * *", Some(Utc::now() - Duration::hours(1))).await;

    let planner = SchedulerPlanner::new(pool.clone());
    let planned = planner.tick().await.unwrap();
    assert_eq!(planned, 1);

    let count: (i64,) = sqlx::query_as("SELECT count(*) FROM job_runs").fetch_one(&pool).await.unwrap();
    assert_eq!(count.0, 1);
}

#[sqlx::test]
async fn a_job_with_an_unparseable_cron_expression_is_skipped_not_fatal(pool: PgPool) {
    ensure_schema(&pool).await;
    insert_job(&pool, "broken", "not a cron expression", None).await;
    insert_job(&pool, "every-second", "* * * * * *", None).await;

    let planner = SchedulerPlanner::new(pool.clone());
    let planned = planner.tick().await.unwrap();
    assert_eq!(planned, 1, "the broken job must not prevent the healthy one from planning");
}
