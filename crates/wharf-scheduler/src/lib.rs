//! Durable cron planning: expands `scheduler_jobs` rows into `job_runs`
//! queue rows one tick at a time. The producer-facing facade
//! (`schedule_timer`, `create_or_update_job`, ...) lives in `wharf-outbox`,
//! built on top of this crate's tables; this crate owns only the planner
//! loop itself.

mod planner;

pub use planner::SchedulerPlanner;

#[cfg(test)]
mod tests;
