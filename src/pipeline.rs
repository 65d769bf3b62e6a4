//! Stage-gated pipeline coordinator
//!
//! Advances a multi-stage batch job pipeline recorded in a tracking table.
//! Each completion notification marks its job successful; once no job in
//! that stage is still pending or processing, every job of the next stage is
//! triggered. Completion notifications for already-successful jobs are
//! acknowledged and ignored, so at-least-once delivery cannot double-trigger
//! a stage.

use crate::error::{ShipError, ShipResult};

/// Status of one tracked job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl StageStatus {
    /// Still holding its stage open
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

/// One row of the tracking table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageJob {
    pub job_id: String,
    pub stage: u32,
    pub status: StageStatus,
}

/// Boundary to the tracking table and the job runner
pub trait StageTracker {
    /// All tracked jobs
    fn jobs(&self) -> ShipResult<Vec<StageJob>>;

    /// Record a status transition
    fn mark(&self, job_id: &str, status: StageStatus) -> ShipResult<()>;

    /// Start one job running
    fn trigger(&self, job_id: &str) -> ShipResult<()>;
}

/// What a completion notification led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Duplicate notification; nothing changed
    AlreadyComplete,
    /// Same-stage jobs are still open
    Waiting { stage: u32, remaining: usize },
    /// The next stage was started
    Triggered { stage: u32, jobs: Vec<String> },
    /// No next stage exists; the pipeline is done
    Finished { stage: u32 },
}

/// Drives the pipeline from completion notifications
pub struct PipelineCoordinator<T> {
    tracker: T,
}

impl<T: StageTracker> PipelineCoordinator<T> {
    pub fn new(tracker: T) -> Self {
        Self { tracker }
    }

    /// Handle one completion notification for `job_id`.
    pub fn on_completion(&self, job_id: &str) -> ShipResult<Advance> {
        let jobs = self.tracker.jobs()?;
        let job = jobs
            .iter()
            .find(|j| j.job_id == job_id)
            .ok_or_else(|| ShipError::NotFound {
                name: job_id.to_string(),
            })?;

        // Idempotency guard: a job can only complete once.
        if job.status == StageStatus::Success {
            return Ok(Advance::AlreadyComplete);
        }
        self.tracker.mark(job_id, StageStatus::Success)?;

        let stage = job.stage;
        let remaining = jobs
            .iter()
            .filter(|j| j.stage == stage && j.job_id != job_id && j.status.is_open())
            .count();
        if remaining > 0 {
            return Ok(Advance::Waiting { stage, remaining });
        }

        let next: Vec<&StageJob> = jobs.iter().filter(|j| j.stage == stage + 1).collect();
        if next.is_empty() {
            return Ok(Advance::Finished { stage });
        }

        let mut triggered = Vec::new();
        for job in next {
            self.tracker.trigger(&job.job_id)?;
            self.tracker.mark(&job.job_id, StageStatus::Processing)?;
            triggered.push(job.job_id.clone());
        }
        Ok(Advance::Triggered {
            stage: stage + 1,
            jobs: triggered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory tracking table recording every trigger
    #[derive(Default)]
    struct MemoryTracker {
        jobs: Mutex<Vec<StageJob>>,
        triggered: Mutex<Vec<String>>,
    }

    impl MemoryTracker {
        fn with_jobs(jobs: Vec<(&str, u32, StageStatus)>) -> Self {
            Self {
                jobs: Mutex::new(
                    jobs.into_iter()
                        .map(|(id, stage, status)| StageJob {
                            job_id: id.to_string(),
                            stage,
                            status,
                        })
                        .collect(),
                ),
                triggered: Mutex::new(Vec::new()),
            }
        }

        fn triggered(&self) -> Vec<String> {
            self.triggered.lock().unwrap().clone()
        }

        fn status_of(&self, job_id: &str) -> StageStatus {
            self.jobs
                .lock()
                .unwrap()
                .iter()
                .find(|j| j.job_id == job_id)
                .unwrap()
                .status
        }
    }

    impl StageTracker for MemoryTracker {
        fn jobs(&self) -> ShipResult<Vec<StageJob>> {
            Ok(self.jobs.lock().unwrap().clone())
        }

        fn mark(&self, job_id: &str, status: StageStatus) -> ShipResult<()> {
            for job in self.jobs.lock().unwrap().iter_mut() {
                if job.job_id == job_id {
                    job.status = status;
                }
            }
            Ok(())
        }

        fn trigger(&self, job_id: &str) -> ShipResult<()> {
            self.triggered.lock().unwrap().push(job_id.to_string());
            Ok(())
        }
    }

    #[test]
    fn waits_while_same_stage_jobs_are_open() {
        let tracker = MemoryTracker::with_jobs(vec![
            ("extract_orders", 1, StageStatus::Processing),
            ("extract_customers", 1, StageStatus::Processing),
            ("transform", 2, StageStatus::Pending),
        ]);
        let coordinator = PipelineCoordinator::new(tracker);

        let advance = coordinator.on_completion("extract_orders").unwrap();
        assert_eq!(
            advance,
            Advance::Waiting {
                stage: 1,
                remaining: 1
            }
        );
        assert!(coordinator.tracker.triggered().is_empty());
        assert_eq!(
            coordinator.tracker.status_of("extract_orders"),
            StageStatus::Success
        );
    }

    #[test]
    fn last_job_of_a_stage_triggers_the_whole_next_stage() {
        let tracker = MemoryTracker::with_jobs(vec![
            ("extract_orders", 1, StageStatus::Success),
            ("extract_customers", 1, StageStatus::Processing),
            ("transform_a", 2, StageStatus::Pending),
            ("transform_b", 2, StageStatus::Pending),
        ]);
        let coordinator = PipelineCoordinator::new(tracker);

        let advance = coordinator.on_completion("extract_customers").unwrap();
        assert_eq!(
            advance,
            Advance::Triggered {
                stage: 2,
                jobs: vec!["transform_a".to_string(), "transform_b".to_string()]
            }
        );
        assert_eq!(
            coordinator.tracker.triggered(),
            vec!["transform_a", "transform_b"]
        );
        assert_eq!(
            coordinator.tracker.status_of("transform_a"),
            StageStatus::Processing
        );
    }

    #[test]
    fn no_next_stage_means_finished() {
        let tracker = MemoryTracker::with_jobs(vec![
            ("extract", 1, StageStatus::Success),
            ("load", 2, StageStatus::Processing),
        ]);
        let coordinator = PipelineCoordinator::new(tracker);

        let advance = coordinator.on_completion("load").unwrap();
        assert_eq!(advance, Advance::Finished { stage: 2 });
    }

    #[test]
    fn duplicate_completion_is_ignored() {
        let tracker = MemoryTracker::with_jobs(vec![
            ("extract", 1, StageStatus::Processing),
            ("load", 2, StageStatus::Pending),
        ]);
        let coordinator = PipelineCoordinator::new(tracker);

        let first = coordinator.on_completion("extract").unwrap();
        assert!(matches!(first, Advance::Triggered { .. }));
        assert_eq!(coordinator.tracker.triggered(), vec!["load"]);

        // Redelivery of the same notification must not re-trigger stage 2.
        let second = coordinator.on_completion("extract").unwrap();
        assert_eq!(second, Advance::AlreadyComplete);
        assert_eq!(coordinator.tracker.triggered(), vec!["load"]);
    }

    #[test]
    fn failed_same_stage_job_does_not_hold_the_gate() {
        let tracker = MemoryTracker::with_jobs(vec![
            ("extract_orders", 1, StageStatus::Processing),
            ("extract_customers", 1, StageStatus::Failed),
            ("transform", 2, StageStatus::Pending),
        ]);
        let coordinator = PipelineCoordinator::new(tracker);

        let advance = coordinator.on_completion("extract_orders").unwrap();
        assert!(matches!(advance, Advance::Triggered { .. }));
    }

    #[test]
    fn unknown_job_is_an_error() {
        let tracker = MemoryTracker::with_jobs(vec![]);
        let coordinator = PipelineCoordinator::new(tracker);

        let err = coordinator.on_completion("ghost").unwrap_err();
        assert!(matches!(err, ShipError::NotFound { .. }));
    }
}
