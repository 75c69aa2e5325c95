//! Expands `scheduler_jobs` cron definitions into `job_runs` rows. One
//! planning pass inserts at most one run per job; a planner that was down
//! for an hour replays its missed occurrences one tick at a time rather
//! than flooding the queue.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde_json::Value;
use sqlx::{PgPool, Row as _};
use uuid::Uuid;
use wharf_core::WharfError;

struct JobDefinition {
    name: String,
    cron_expression: String,
    topic: String,
    payload: Value,
    last_planned_through: Option<DateTime<Utc>>,
}

pub struct SchedulerPlanner {
    pool: PgPool,
}

impl SchedulerPlanner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// For each enabled job, computes the next cron occurrence after
    /// `last_planned_through` (or its first ever occurrence, for a job that
    /// has never been planned). If that occurrence has already arrived,
    /// inserts the corresponding `job_runs` row and advances
    /// `last_planned_through` to it, both in the same transaction. Returns
    /// the number of runs planned.
    pub async fn tick(&self) -> Result<u64, WharfError> {
        let now = Utc::now();
        let jobs = self.load_enabled_jobs().await?;
        let mut planned = 0u64;

        for job in jobs {
            let schedule = match Schedule::from_str(&job.cron_expression) {
                Ok(schedule) => schedule,
                Err(err) => {
                    tracing::warn!(job = %job.name, error = %err, "skipping job with an unparseable cron expression");
                    continue;
                }
            };

            // `Schedule::after` returns occurrences strictly after the given
            // instant, so a job that has never been planned needs a seed
            // strictly before `now` or its very first due occurrence is
            // skipped on every tick until one happens to land in the past.
            let after = job
                .last_planned_through
                .unwrap_or_else(|| now - chrono::Duration::seconds(1));
            let Some(next) = schedule.after(&after).next() else {
                continue;
            };
            if next > now {
                continue;
            }

            let mut tx = self.pool.begin().await.map_err(|e| WharfError::Transient(e.into()))?;

            sqlx::query("INSERT INTO job_runs (id, topic, payload, due_time) VALUES ($1, $2, $3, $4)")
                .bind(Uuid::new_v4())
                .bind(&job.topic)
                .bind(&job.payload)
                .bind(next)
                .execute(&mut *tx)
                .await
                .map_err(|e| WharfError::Transient(e.into()))?;

            sqlx::query("UPDATE scheduler_jobs SET last_planned_through = $1, updated_at = now() WHERE name = $2")
                .bind(next)
                .bind(&job.name)
                .execute(&mut *tx)
                .await
                .map_err(|e| WharfError::Transient(e.into()))?;

            tx.commit().await.map_err(|e| WharfError::Transient(e.into()))?;
            planned += 1;
        }

        Ok(planned)
    }

    async fn load_enabled_jobs(&self) -> Result<Vec<JobDefinition>, WharfError> {
        let rows = sqlx::query(
            "SELECT name, cron_expression, topic, payload, last_planned_through
             FROM scheduler_jobs WHERE enabled",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WharfError::Transient(e.into()))?;

        Ok(rows
            .into_iter()
            .map(|row| JobDefinition {
                name: row.get("name"),
                cron_expression: row.get("cron_expression"),
                topic: row.get("topic"),
                payload: row.get("payload"),
                last_planned_through: row.get("last_planned_through"),
            })
            .collect())
    }
}
