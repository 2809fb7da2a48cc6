//! Retention sweeper.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::jobs::state::JobRecord;
use crate::jobs::store::JobStore;

/// Remove terminal records created at or before `now - max_age`.
///
/// Non-terminal records are never touched. A terminal record still holding
/// its staged input belongs to a driver that has not exited yet; it is left
/// for a later sweep so the input is released by its owner.
pub async fn sweep(store: &dyn JobStore, max_age: Duration, now: DateTime<Utc>) -> usize {
    let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
    let cutoff = now
        .checked_sub_signed(max_age)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let expired = store
        .list(&|r: &JobRecord| {
            r.status.is_terminal() && r.created_at <= cutoff && r.ephemeral_input_ref.is_none()
        })
        .await;

    let mut removed = 0;
    for record in expired {
        // A concurrent sweep may have got there first.
        if store.delete(record.job_id).await.is_ok() {
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::info!(removed, cutoff = %cutoff, "Swept expired jobs");
    }
    removed
}

/// Sweep `store` every `interval`. The first sweep runs one interval after start.
pub fn spawn_sweeper(
    store: Arc<dyn JobStore>,
    interval: Duration,
    max_age: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep(&*store, max_age, Utc::now()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::state::JobStatus;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::testing::staged;

    async fn with_status(store: &InMemoryJobStore, status: JobStatus) -> uuid::Uuid {
        let job_id = store.create("user-1", 25, None).await.unwrap();
        let path = match status {
            JobStatus::Initializing => vec![],
            JobStatus::Generating => vec![JobStatus::Generating],
            JobStatus::Processing => vec![JobStatus::Generating, JobStatus::Processing],
            JobStatus::Cancelled => vec![JobStatus::Cancelled],
            terminal => vec![JobStatus::Generating, JobStatus::Processing, terminal],
        };
        store
            .update(
                job_id,
                Box::new(move |r| {
                    for step in path {
                        r.transition_to(step, Some("done".into())).unwrap();
                    }
                }),
            )
            .await
            .unwrap();
        job_id
    }

    #[tokio::test]
    async fn zero_age_removes_all_terminal_and_is_idempotent() {
        let store = InMemoryJobStore::new();
        for status in [
            JobStatus::Initializing,
            JobStatus::Generating,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Error,
            JobStatus::Timeout,
            JobStatus::Cancelled,
        ] {
            with_status(&store, status).await;
        }

        let now = Utc::now();
        assert_eq!(sweep(&store, Duration::ZERO, now).await, 5);
        assert_eq!(sweep(&store, Duration::ZERO, now).await, 0);

        let remaining = store.list(&|_: &JobRecord| true).await;
        assert_eq!(remaining.len(), 3);
        assert!(remaining.iter().all(|r| r.status.is_active()));
    }

    #[tokio::test]
    async fn young_records_survive() {
        let store = InMemoryJobStore::new();
        with_status(&store, JobStatus::Completed).await;
        assert_eq!(
            sweep(&store, Duration::from_secs(24 * 3600), Utc::now()).await,
            0
        );

        let later = Utc::now() + TimeDelta::hours(25);
        assert_eq!(sweep(&store, Duration::from_secs(24 * 3600), later).await, 1);
    }

    #[tokio::test]
    async fn old_active_records_are_never_removed() {
        let store = InMemoryJobStore::new();
        with_status(&store, JobStatus::Processing).await;
        let far_future = Utc::now() + TimeDelta::days(365);
        assert_eq!(sweep(&store, Duration::ZERO, far_future).await, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn records_awaiting_release_are_kept() {
        let store = InMemoryJobStore::new();
        let job_id = store.create("user-1", 25, Some(staged())).await.unwrap();
        store
            .update(
                job_id,
                Box::new(|r| {
                    r.transition_to(JobStatus::Cancelled, Some("Task cancelled by user".into()))
                        .unwrap();
                }),
            )
            .await
            .unwrap();

        assert_eq!(sweep(&store, Duration::ZERO, Utc::now()).await, 0);

        store
            .update(job_id, Box::new(|r| r.ephemeral_input_ref = None))
            .await
            .unwrap();
        assert_eq!(sweep(&store, Duration::ZERO, Utc::now()).await, 1);
    }

    #[tokio::test]
    async fn huge_max_age_does_not_overflow() {
        let store = InMemoryJobStore::new();
        with_status(&store, JobStatus::Failed).await;
        assert_eq!(sweep(&store, Duration::MAX, Utc::now()).await, 0);
    }
}
