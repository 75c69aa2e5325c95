//! Producer-facing facade over timers and cron job definitions. The
//! planning loop that turns a cron definition into `job_runs` rows lives
//! in `wharf-scheduler::SchedulerPlanner`; this type is what application
//! code calls to register that work in the first place.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use wharf_core::WharfError;

#[derive(Clone)]
pub struct Scheduler {
    pool: PgPool,
}

impl Scheduler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a one-shot timer row directly into `timers`, visible to
    /// dispatchers once `due_time` arrives.
    pub async fn schedule_timer(
        &self,
        topic: &str,
        payload: Value,
        due_time: DateTime<Utc>,
    ) -> Result<Uuid, WharfError> {
        if topic.is_empty() {
            return Err(WharfError::Configuration("topic must not be empty".to_string()));
        }
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO timers (id, topic, payload, due_time) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(topic)
            .bind(payload)
            .bind(due_time)
            .execute(&self.pool)
            .await
            .map_err(|e| WharfError::Transient(e.into()))?;
        Ok(id)
    }

    /// Removes a timer iff it hasn't fired yet. Returns `false` if it was
    /// already claimed, delivered, or never existed.
    pub async fn cancel_timer(&self, id: Uuid) -> Result<bool, WharfError> {
        let result = sqlx::query("DELETE FROM timers WHERE id = $1 AND status = 'ready'")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| WharfError::Transient(e.into()))?;
        Ok(result.rows_affected() == 1)
    }

    /// Registers or updates a cron job definition. Validates the cron
    /// expression up front so a typo is rejected synchronously rather than
    /// silently stalling the planner.
    pub async fn create_or_update_job(
        &self,
        name: &str,
        cron_expression: &str,
        topic: &str,
        payload: Value,
    ) -> Result<(), WharfError> {
        CronSchedule::from_str(cron_expression)
            .map_err(|e| WharfError::Configuration(format!("invalid cron expression: {e}")))?;

        sqlx::query(
            "INSERT INTO scheduler_jobs (name, cron_expression, topic, payload)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (name) DO UPDATE
             SET cron_expression = EXCLUDED.cron_expression,
                 topic = EXCLUDED.topic,
                 payload = EXCLUDED.payload,
                 updated_at = now()",
        )
        .bind(name)
        .bind(cron_expression)
        .bind(topic)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| WharfError::Transient(e.into()))?;
        Ok(())
    }

    pub async fn delete_job(&self, name: &str) -> Result<(), WharfError> {
        sqlx::query("DELETE FROM scheduler_jobs WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| WharfError::Transient(e.into()))?;
        Ok(())
    }

    /// Plans one job run immediately, out of band from the cron schedule:
    /// an operator's "run now" button. Does not disturb `last_planned_through`.
    pub async fn trigger_job(&self, name: &str) -> Result<Uuid, WharfError> {
        let row: Option<(String, Value)> =
            sqlx::query_as("SELECT topic, payload FROM scheduler_jobs WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| WharfError::Transient(e.into()))?;

        let Some((topic, payload)) = row else {
            return Err(WharfError::Configuration(format!("no job named `{name}`")));
        };

        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO job_runs (id, topic, payload, due_time) VALUES ($1, $2, $3, now())")
            .bind(id)
            .bind(topic)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| WharfError::Transient(e.into()))?;
        Ok(id)
    }
}
