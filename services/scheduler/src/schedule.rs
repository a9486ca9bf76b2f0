//! Wall-clock trigger
//!
//! Three daily firings in one fixed UTC offset, run by a single task so a
//! job never overlaps itself or another job. Firing times must be ordered
//! square-off, then cancel-pending, then cleanup within the trading day.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Offset, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::jobs::{JobKind, LifecycleJobs, SweepReport};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("{earlier} ({earlier_at}) must fire before {later} ({later_at})")]
    OutOfOrder {
        earlier: JobKind,
        earlier_at: NaiveTime,
        later: JobKind,
        later_at: NaiveTime,
    },

    #[error("Retention must be positive, got {0} days")]
    Retention(i64),
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub square_off_at: NaiveTime,
    pub cancel_pending_at: NaiveTime,
    pub cleanup_at: NaiveTime,
    /// Exchange time zone
    pub utc_offset: FixedOffset,
    pub retention_days: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            square_off_at: NaiveTime::from_hms_opt(15, 20, 0).unwrap_or_default(),
            cancel_pending_at: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or_default(),
            cleanup_at: NaiveTime::from_hms_opt(23, 30, 0).unwrap_or_default(),
            utc_offset: FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap_or_else(|| Utc.fix()),
            retention_days: 30,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        let steps = self.steps();
        for pair in steps.windows(2) {
            let ((earlier, earlier_at), (later, later_at)) = (pair[0], pair[1]);
            if earlier_at >= later_at {
                return Err(ScheduleError::OutOfOrder {
                    earlier,
                    earlier_at,
                    later,
                    later_at,
                });
            }
        }
        if self.retention_days <= 0 {
            return Err(ScheduleError::Retention(self.retention_days));
        }
        Ok(())
    }

    pub fn retention(&self) -> Duration {
        Duration::days(self.retention_days)
    }

    fn steps(&self) -> [(JobKind, NaiveTime); 3] {
        [
            (JobKind::SquareOff, self.square_off_at),
            (JobKind::CancelPending, self.cancel_pending_at),
            (JobKind::Cleanup, self.cleanup_at),
        ]
    }

    /// The first job to fire strictly after `now`, with its firing time.
    pub fn next_job(&self, now: DateTime<Utc>) -> (JobKind, DateTime<Utc>) {
        let mut best = (JobKind::SquareOff, next_run(now, self.square_off_at, self.utc_offset));
        for (job, at) in self.steps().into_iter().skip(1) {
            let when = next_run(now, at, self.utc_offset);
            if when < best.1 {
                best = (job, when);
            }
        }
        best
    }
}

/// Next instant strictly after `now` at local time `at` in `offset`.
pub fn next_run(now: DateTime<Utc>, at: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let local_now = now.with_timezone(&offset).naive_local();
    let mut local = local_now.date().and_time(at);
    if local <= local_now {
        local += Duration::days(1);
    }
    let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, Utc)
}

pub struct Scheduler {
    jobs: Arc<LifecycleJobs>,
    config: ScheduleConfig,
}

impl Scheduler {
    pub fn new(jobs: Arc<LifecycleJobs>, config: ScheduleConfig) -> Result<Self, ScheduleError> {
        config.validate()?;
        Ok(Self { jobs, config })
    }

    /// Fire jobs until `shutdown` flips to true. A running job is finished
    /// before shutdown is observed.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            square_off_at = %self.config.square_off_at,
            cancel_pending_at = %self.config.cancel_pending_at,
            cleanup_at = %self.config.cleanup_at,
            utc_offset = %self.config.utc_offset,
            "Scheduler started"
        );

        loop {
            let now = Utc::now();
            let (job, when) = self.config.next_job(now);
            let wait = (when - now).to_std().unwrap_or_default();
            info!(job = %job, at = %when, "Next job scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scheduler stopped");
                        return;
                    }
                    continue;
                }
            }

            let report = self.fire(job).await;
            if report.failed > 0 {
                warn!(job = %job, failed = report.failed, "Job finished with failures");
            }
        }
    }

    pub async fn fire(&self, job: JobKind) -> SweepReport {
        info!(job = %job, "Running job");
        self.jobs.run(job, Utc::now(), self.config.retention()).await
    }
}
