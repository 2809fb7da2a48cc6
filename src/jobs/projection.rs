//! Client-facing views of job records.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::EstimateConfig;
use crate::jobs::state::{JobRecord, JobStatus};

/// Status snapshot returned by get-status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    pub cost_credits: u32,
}

/// Project a record as of `now`.
pub fn project(record: &JobRecord, now: DateTime<Utc>, estimate: &EstimateConfig) -> StatusSnapshot {
    let estimated_completion = match record.status {
        JobStatus::Generating | JobStatus::Processing => {
            Some(estimate_completion(record.created_at, now, estimate))
        }
        _ => None,
    };

    StatusSnapshot {
        job_id: record.job_id,
        status: record.status,
        progress: record.progress,
        result_location: if record.status == JobStatus::Completed {
            record.result_location.clone()
        } else {
            None
        },
        error_message: record.error_message.clone(),
        created_at: record.created_at,
        estimated_completion,
        cost_credits: record.cost_credits,
    }
}

/// `now + max(budget - elapsed, floor)`.
fn estimate_completion(
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    estimate: &EstimateConfig,
) -> DateTime<Utc> {
    let budget = TimeDelta::from_std(estimate.budget).unwrap_or(TimeDelta::MAX);
    let floor = TimeDelta::from_std(estimate.floor).unwrap_or(TimeDelta::zero());
    let elapsed = now.signed_duration_since(created_at);
    let remaining = budget
        .checked_sub(&elapsed)
        .unwrap_or(TimeDelta::MAX)
        .max(floor);
    now.checked_add_signed(remaining).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// One row of list-jobs.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub progress: f64,
    pub cost_credits: u32,
    pub result_location: Option<String>,
    pub error_message: Option<String>,
}

impl From<&JobRecord> for JobSummary {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            status: record.status,
            created_at: record.created_at,
            progress: record.progress,
            cost_credits: record.cost_credits,
            result_location: record.result_location.clone(),
            error_message: record.error_message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn processing_record() -> JobRecord {
        let mut record = JobRecord::new("user-1", 25, None);
        record.transition_to(JobStatus::Generating, None).unwrap();
        record.transition_to(JobStatus::Processing, None).unwrap();
        record
    }

    #[test]
    fn in_flight_estimate_uses_remaining_budget() {
        let record = processing_record();
        let now = record.created_at + TimeDelta::seconds(30);
        let snapshot = project(&record, now, &EstimateConfig::default());
        assert_eq!(
            snapshot.estimated_completion,
            Some(now + TimeDelta::seconds(90))
        );
        assert!(snapshot.result_location.is_none());
    }

    #[test]
    fn estimate_never_below_floor() {
        let record = processing_record();
        let now = record.created_at + TimeDelta::seconds(600);
        let snapshot = project(&record, now, &EstimateConfig::default());
        assert_eq!(
            snapshot.estimated_completion,
            Some(now + TimeDelta::seconds(10))
        );
    }

    #[test]
    fn custom_budget() {
        let record = processing_record();
        let estimate = EstimateConfig {
            budget: Duration::from_secs(60),
            floor: Duration::from_secs(5),
        };
        let now = record.created_at + TimeDelta::seconds(20);
        assert_eq!(
            project(&record, now, &estimate).estimated_completion,
            Some(now + TimeDelta::seconds(40))
        );
    }

    #[test]
    fn no_estimate_when_initializing_or_terminal() {
        let now = Utc::now();
        let record = JobRecord::new("user-1", 25, None);
        assert!(project(&record, now, &EstimateConfig::default())
            .estimated_completion
            .is_none());

        let mut record = processing_record();
        record.complete(Some("https://x/video.mp4".into())).unwrap();
        let snapshot = project(&record, now, &EstimateConfig::default());
        assert!(snapshot.estimated_completion.is_none());
        assert_eq!(snapshot.progress, 100.0);
        assert_eq!(snapshot.result_location.as_deref(), Some("https://x/video.mp4"));
    }

    #[test]
    fn failed_snapshot_carries_message() {
        let mut record = processing_record();
        record
            .transition_to(JobStatus::Error, Some("Status check failed: reset".into()))
            .unwrap();
        let snapshot = project(&record, Utc::now(), &EstimateConfig::default());
        assert_eq!(snapshot.status, JobStatus::Error);
        assert_eq!(snapshot.progress, 0.0);
        assert_eq!(
            snapshot.error_message.as_deref(),
            Some("Status check failed: reset")
        );
    }

    #[test]
    fn snapshot_serializes_rfc3339_and_skips_absent() {
        let record = JobRecord::new("user-1", 25, None);
        let json = serde_json::to_value(project(&record, Utc::now(), &EstimateConfig::default()))
            .unwrap();
        assert_eq!(json["status"], "initializing");
        assert!(json["created_at"].as_str().unwrap().contains('T'));
        assert!(json.get("estimated_completion").is_none());
        assert!(json.get("result_location").is_none());
    }
}
