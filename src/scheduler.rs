//! Fires the daily jobs at fixed wall-clock times (UTC) and records the
//! outcome of every run for the `/health/jobs` endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::{OffsetDateTime, Time};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::gateway::Gateway;
use crate::jobs::{self, JobError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    DeletionSweep,
    RecurringPayments,
}

impl Job {
    pub const ALL: [Job; 2] = [Job::DeletionSweep, Job::RecurringPayments];

    pub fn name(self) -> &'static str {
        match self {
            Job::DeletionSweep => "delete-marked-users",
            Job::RecurringPayments => "process-recurring-payments",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded { affected: usize },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRun {
    pub job: Job,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

/// Last run of every job, shared between the scheduler and the HTTP layer.
#[derive(Clone, Default)]
pub struct JobHealth {
    runs: Arc<RwLock<HashMap<Job, JobRun>>>,
}

impl JobHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, run: JobRun) {
        self.runs.write().await.insert(run.job, run);
    }

    pub async fn last_run(&self, job: Job) -> Option<JobRun> {
        self.runs.read().await.get(&job).cloned()
    }

    /// Last runs in [`Job::ALL`] order; jobs that never ran are left out.
    pub async fn snapshot(&self) -> Vec<JobRun> {
        let runs = self.runs.read().await;
        Job::ALL
            .iter()
            .filter_map(|job| runs.get(job).cloned())
            .collect()
    }
}

/// Daily fire times for each job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub deletion_sweep_at: Time,
    pub recurring_payments_at: Time,
}

impl Schedule {
    pub fn time_of(&self, job: Job) -> Time {
        match job {
            Job::DeletionSweep => self.deletion_sweep_at,
            Job::RecurringPayments => self.recurring_payments_at,
        }
    }
}

#[derive(Clone)]
pub struct Scheduler {
    gateway: Gateway,
    health: JobHealth,
    schedule: Schedule,
}

impl Scheduler {
    pub fn new(gateway: Gateway, health: JobHealth, schedule: Schedule) -> Self {
        Self {
            gateway,
            health,
            schedule,
        }
    }

    /// Spawns one timer loop per job. A job's next firing is only computed
    /// after its current run has finished, so runs of the same job never
    /// overlap.
    pub fn start(self) -> Vec<JoinHandle<()>> {
        Job::ALL
            .into_iter()
            .map(|job| {
                let scheduler = self.clone();
                tokio::spawn(async move { scheduler.run_forever(job).await })
            })
            .collect()
    }

    async fn run_forever(&self, job: Job) {
        let at = self.schedule.time_of(job);
        loop {
            let wait = duration_until_next(OffsetDateTime::now_utc(), at);
            tracing::debug!(job = job.name(), wait_secs = wait.as_secs(), "job scheduled");
            tokio::time::sleep(wait).await;

            // Failures are recorded in the job health and logged by run_now.
            let _ = self.run_now(job).await;
        }
    }

    /// Runs `job` immediately at the current time and records the outcome.
    /// Returns the number of records created or deleted.
    pub async fn run_now(&self, job: Job) -> Result<usize, JobError> {
        self.run_at(job, OffsetDateTime::now_utc()).await
    }

    /// Runs `job` as if the clock read `now`.
    pub async fn run_at(&self, job: Job, now: OffsetDateTime) -> Result<usize, JobError> {
        tracing::info!(job = job.name(), "job started");
        let started_at = OffsetDateTime::now_utc();

        let result = match job {
            Job::DeletionSweep => jobs::delete_marked_users(&self.gateway, now.date())
                .await
                .map(|deleted| deleted.len()),
            Job::RecurringPayments => jobs::process_recurring_payments(&self.gateway, now)
                .await
                .map(|created| created.len()),
        };

        let outcome = match &result {
            Ok(affected) => {
                tracing::info!(job = job.name(), affected, "job finished");
                JobOutcome::Succeeded {
                    affected: *affected,
                }
            }
            Err(e) => {
                tracing::error!(job = job.name(), error = %e, "job failed, run rolled back");
                JobOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };

        self.health
            .record(JobRun {
                job,
                started_at,
                finished_at: OffsetDateTime::now_utc(),
                outcome,
            })
            .await;

        result
    }
}

/// Time left until the next occurrence of `at`, strictly after `now`.
pub fn duration_until_next(now: OffsetDateTime, at: Time) -> Duration {
    let today = now.replace_time(at);
    let next = if today > now {
        today
    } else {
        today + time::Duration::days(1)
    };

    (next - now).try_into().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, time};

    #[test]
    fn fires_later_today_when_time_is_ahead() {
        let wait = duration_until_next(datetime!(2026-10-19 00:10 UTC), time!(00:30));
        assert_eq!(wait, Duration::from_secs(20 * 60));
    }

    #[test]
    fn fires_tomorrow_once_time_has_passed() {
        let wait = duration_until_next(datetime!(2026-10-19 01:45 UTC), time!(01:30));
        assert_eq!(wait, Duration::from_secs(23 * 3600 + 45 * 60));
    }

    #[test]
    fn fire_time_reached_exactly_waits_a_full_day() {
        let wait = duration_until_next(datetime!(2026-10-19 01:30 UTC), time!(01:30));
        assert_eq!(wait, Duration::from_secs(24 * 3600));
    }

    #[test]
    fn crosses_month_boundary() {
        let wait = duration_until_next(datetime!(2026-10-31 23:00 UTC), time!(00:30));
        assert_eq!(wait, Duration::from_secs(90 * 60));
    }

    #[test]
    fn schedule_maps_each_job_to_its_time() {
        let schedule = Schedule {
            deletion_sweep_at: time!(00:30),
            recurring_payments_at: time!(01:30),
        };
        assert_eq!(schedule.time_of(Job::DeletionSweep), time!(00:30));
        assert_eq!(schedule.time_of(Job::RecurringPayments), time!(01:30));
    }

    #[tokio::test]
    async fn health_snapshot_keeps_only_the_latest_run_per_job() {
        let health = JobHealth::new();
        let at = datetime!(2026-10-19 01:30 UTC);
        for affected in [1, 2] {
            health
                .record(JobRun {
                    job: Job::RecurringPayments,
                    started_at: at,
                    finished_at: at,
                    outcome: JobOutcome::Succeeded { affected },
                })
                .await;
        }

        let snapshot = health.snapshot().await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].outcome, JobOutcome::Succeeded { affected: 2 });
        assert!(health.last_run(Job::DeletionSweep).await.is_none());
    }
}
