//! Job state machine and the job record it drives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;
use crate::storage::StagedInput;

/// Status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Record created, submission not yet attempted.
    Initializing,
    /// Remote backend accepted the job.
    Generating,
    /// Polling the remote backend for an outcome.
    Processing,
    /// Remote backend produced a result.
    Completed,
    /// Submission failed, the remote backend reported failure, or the driver died.
    Failed,
    /// A status query itself failed.
    Error,
    /// Cancelled by its owner.
    Cancelled,
    /// Poll budget exhausted without an outcome.
    Timeout,
}

impl JobStatus {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Initializing, Generating) | (Initializing, Failed) | (Initializing, Cancelled) |
            (Generating, Processing) | (Generating, Failed) | (Generating, Cancelled) |
            (Processing, Completed) | (Processing, Failed) | (Processing, Error) |
            (Processing, Timeout) | (Processing, Cancelled)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Error | Self::Cancelled | Self::Timeout
        )
    }

    /// Check if the job is still in flight.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Progress value a job has on entering this state.
    pub fn entry_progress(&self) -> f64 {
        match self {
            Self::Initializing => 10.0,
            Self::Generating => 20.0,
            Self::Processing => 40.0,
            Self::Completed => 100.0,
            Self::Failed | Self::Error | Self::Cancelled | Self::Timeout => 0.0,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Generating => "generating",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initializing" => Ok(Self::Initializing),
            "generating" => Ok(Self::Generating),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            "timeout" => Ok(Self::Timeout),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Mutable state of one generation request.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_id: Uuid,
    /// Principal that created the job.
    pub owner_id: String,
    pub status: JobStatus,
    /// 0–100. Non-decreasing while active; 100 on `completed`, 0 on other terminal states.
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    /// The remote backend's identifier for its own task.
    pub remote_task_handle: Option<String>,
    /// Fixed at creation.
    pub cost_credits: u32,
    /// Set only on `completed`.
    pub result_location: Option<String>,
    /// Set only on failure-class terminal states and `cancelled`.
    pub error_message: Option<String>,
    /// Staged upload owned by this job. Taken exactly once when it is released.
    pub ephemeral_input_ref: Option<StagedInput>,
}

impl JobRecord {
    /// Create a record in the `initializing` state.
    pub fn new(
        owner_id: impl Into<String>,
        cost_credits: u32,
        ephemeral_input_ref: Option<StagedInput>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            status: JobStatus::Initializing,
            progress: JobStatus::Initializing.entry_progress(),
            created_at: Utc::now(),
            remote_task_handle: None,
            cost_credits,
            result_location: None,
            error_message: None,
            ephemeral_input_ref,
        }
    }

    /// Transition to a new state.
    ///
    /// Terminal records refuse every transition. `reason` becomes the
    /// error message when the target is a non-completed terminal state.
    pub fn transition_to(
        &mut self,
        target: JobStatus,
        reason: Option<String>,
    ) -> Result<(), JobError> {
        if self.status.is_terminal() {
            return Err(JobError::InvalidState {
                id: self.job_id,
                state: self.status,
            });
        }
        if !self.status.can_transition_to(target) {
            return Err(JobError::InvalidTransition {
                id: self.job_id,
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        self.progress = if target.is_terminal() {
            target.entry_progress()
        } else {
            self.progress.max(target.entry_progress())
        };
        if target.is_terminal() && target != JobStatus::Completed {
            self.error_message = reason;
        }

        Ok(())
    }

    /// Move to `completed`, storing where the result can be fetched.
    pub fn complete(&mut self, result_location: Option<String>) -> Result<(), JobError> {
        self.transition_to(JobStatus::Completed, None)?;
        self.result_location = result_location;
        Ok(())
    }

    /// Raise progress while active. Never lowers it and never exceeds 100.
    ///
    /// Returns whether the stored value changed.
    pub fn record_progress(&mut self, value: f64) -> bool {
        if self.status.is_terminal() || value <= self.progress {
            return false;
        }
        self.progress = value.min(100.0);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions_valid() {
        assert!(JobStatus::Initializing.can_transition_to(JobStatus::Generating));
        assert!(JobStatus::Generating.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Timeout));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Error));
        assert!(JobStatus::Initializing.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn state_transitions_invalid() {
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Initializing.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Generating.can_transition_to(JobStatus::Timeout));
    }

    #[test]
    fn terminal_states() {
        for status in [
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Error,
            JobStatus::Cancelled,
            JobStatus::Timeout,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
        assert!(JobStatus::Initializing.is_active());
        assert!(JobStatus::Generating.is_active());
        assert!(JobStatus::Processing.is_active());
    }

    #[test]
    fn new_record_starts_initializing() {
        let record = JobRecord::new("user-1", 25, None);
        assert_eq!(record.status, JobStatus::Initializing);
        assert_eq!(record.progress, 10.0);
        assert_eq!(record.cost_credits, 25);
        assert!(record.remote_task_handle.is_none());
    }

    #[test]
    fn happy_path_progress() {
        let mut record = JobRecord::new("user-1", 25, None);
        record.transition_to(JobStatus::Generating, None).unwrap();
        assert_eq!(record.progress, 20.0);
        record.transition_to(JobStatus::Processing, None).unwrap();
        assert_eq!(record.progress, 40.0);
        assert!(record.record_progress(65.0));
        record.complete(Some("https://x/video.mp4".into())).unwrap();
        assert_eq!(record.progress, 100.0);
        assert_eq!(record.result_location.as_deref(), Some("https://x/video.mp4"));
        assert!(record.error_message.is_none());
    }

    #[test]
    fn failure_zeroes_progress_and_sets_message() {
        let mut record = JobRecord::new("user-1", 25, None);
        record.transition_to(JobStatus::Generating, None).unwrap();
        record.transition_to(JobStatus::Processing, None).unwrap();
        record.record_progress(80.0);
        record
            .transition_to(JobStatus::Timeout, Some("Generation timeout exceeded".into()))
            .unwrap();
        assert_eq!(record.progress, 0.0);
        assert_eq!(
            record.error_message.as_deref(),
            Some("Generation timeout exceeded")
        );
    }

    #[test]
    fn terminal_is_terminal() {
        let mut record = JobRecord::new("user-1", 25, None);
        record
            .transition_to(JobStatus::Cancelled, Some("Task cancelled by user".into()))
            .unwrap();
        let err = record
            .transition_to(JobStatus::Failed, Some("late".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidState {
                state: JobStatus::Cancelled,
                ..
            }
        ));
        assert_eq!(record.error_message.as_deref(), Some("Task cancelled by user"));
        assert!(!record.record_progress(50.0));
        assert_eq!(record.progress, 0.0);
    }

    #[test]
    fn progress_never_decreases() {
        let mut record = JobRecord::new("user-1", 25, None);
        record.transition_to(JobStatus::Generating, None).unwrap();
        record.transition_to(JobStatus::Processing, None).unwrap();
        assert!(record.record_progress(70.0));
        assert!(!record.record_progress(55.0));
        assert_eq!(record.progress, 70.0);
    }

    #[test]
    fn job_status_display_and_parse() {
        assert_eq!(JobStatus::Timeout.to_string(), "timeout");
        assert_eq!("cancelled".parse::<JobStatus>(), Ok(JobStatus::Cancelled));
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn job_status_serde_roundtrip() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        let parsed: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, JobStatus::Processing);
    }
}
