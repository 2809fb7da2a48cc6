//! Lifecycle driver: one background task per job.
//!
//! Submits the job upstream, polls until the backend reports an outcome or
//! the attempt budget runs out, and writes each step into the job record.
//! Every write is refused once the record is terminal, so a job cancelled
//! by its owner is never resurrected. Whatever happens, the driver's exit
//! leaves the record terminal and releases the staged input exactly once.
//!
//! Shutdown is cooperative: [`LifecycleDriver::stop`] interrupts the
//! submit/poll phase of every run, and each run still finalizes its own job.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::PollConfig;
use crate::error::{Error, JobError};
use crate::jobs::request::GenerationSpec;
use crate::jobs::state::{JobRecord, JobStatus};
use crate::jobs::store::JobStore;
use crate::remote::{RemoteBackend, RemoteTaskStatus};
use crate::storage::EphemeralStorage;

/// Progress reported once polling starts.
const POLL_START_PROGRESS: f64 = 40.0;
/// Progress range covered by the poll loop.
const POLL_PROGRESS_SPAN: f64 = 50.0;
/// Polling never reports more than this.
const POLL_PROGRESS_CEILING: f64 = 90.0;

/// Failure reason recorded for jobs interrupted by shutdown.
pub(crate) const SHUTDOWN_MESSAGE: &str = "service shutting down";

/// Linear progress for the `attempt`-th (0-based) in-progress poll.
pub fn progress_for_attempt(attempt: u32, max_attempts: u32) -> f64 {
    if max_attempts == 0 {
        return POLL_START_PROGRESS;
    }
    let fraction = f64::from(attempt) / f64::from(max_attempts);
    (POLL_START_PROGRESS + fraction * POLL_PROGRESS_SPAN).min(POLL_PROGRESS_CEILING)
}

/// Drives job records through submission and polling.
pub struct LifecycleDriver {
    store: Arc<dyn JobStore>,
    remote: Arc<dyn RemoteBackend>,
    storage: Arc<dyn EphemeralStorage>,
    poll: PollConfig,
    shutdown: CancellationToken,
}

impl LifecycleDriver {
    pub fn new(
        store: Arc<dyn JobStore>,
        remote: Arc<dyn RemoteBackend>,
        storage: Arc<dyn EphemeralStorage>,
        poll: PollConfig,
    ) -> Self {
        Self {
            store,
            remote,
            storage,
            poll,
            shutdown: CancellationToken::new(),
        }
    }

    /// Interrupt every current and future run.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Run one job to a terminal state.
    ///
    /// Errors and panics inside the lifecycle are captured into the record;
    /// nothing is returned to the caller. A stop request abandons the
    /// lifecycle but the job is still finalized before this returns.
    pub async fn run(&self, job_id: Uuid, spec: GenerationSpec) {
        let lifecycle = AssertUnwindSafe(self.drive(job_id, &spec)).catch_unwind();

        let failure = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                info!(job_id = %job_id, "Lifecycle interrupted by shutdown");
                Some(SHUTDOWN_MESSAGE.to_string())
            }
            outcome = lifecycle => match outcome {
                Ok(Ok(())) => None,
                // Swept after an external cancel.
                Ok(Err(Error::Job(JobError::NotFound { .. }))) => {
                    info!(job_id = %job_id, "Job record removed; driver stopping");
                    None
                }
                Ok(Err(e)) => {
                    error!(job_id = %job_id, error = %e, "Lifecycle driver failed");
                    Some(e.to_string())
                }
                Err(panic) => {
                    let reason = format!("Lifecycle driver panicked: {}", panic_message(&*panic));
                    error!(job_id = %job_id, error = %reason, "Lifecycle driver failed");
                    Some(reason)
                }
            },
        };

        finalize(&*self.store, &*self.storage, job_id, failure).await;
    }

    async fn drive(&self, job_id: Uuid, spec: &GenerationSpec) -> Result<(), Error> {
        let handle = match self.remote.submit(spec).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Remote submission failed");
                self.terminate(job_id, JobStatus::Failed, format!("Submission failed: {e}"))
                    .await?;
                return Ok(());
            }
        };

        let remote_handle = handle.clone();
        let advanced = self
            .write(job_id, move |r| {
                r.transition_to(JobStatus::Generating, None)?;
                r.remote_task_handle = Some(remote_handle);
                Ok(())
            })
            .await?;
        if !advanced {
            return Ok(());
        }
        info!(job_id = %job_id, remote_task = %handle, "Job submitted upstream");

        if !self
            .write(job_id, |r| r.transition_to(JobStatus::Processing, None))
            .await?
        {
            return Ok(());
        }

        let max_attempts = self.poll.max_attempts;
        for attempt in 0..max_attempts {
            tokio::time::sleep(self.poll.interval).await;

            let current = self.store.get(job_id).await?;
            if current.status.is_terminal() {
                info!(job_id = %job_id, status = %current.status, "Job ended externally; stopping poll");
                return Ok(());
            }

            match self.remote.query(&handle).await {
                Ok(RemoteTaskStatus::Succeeded { output }) => {
                    if self.write(job_id, |r| r.complete(output)).await? {
                        info!(job_id = %job_id, attempt, "Generation completed");
                    }
                    return Ok(());
                }
                Ok(RemoteTaskStatus::Failed { reason }) => {
                    let reason = reason.unwrap_or_else(|| "Generation failed".to_string());
                    error!(job_id = %job_id, reason = %reason, "Remote generation failed");
                    self.terminate(job_id, JobStatus::Failed, reason).await?;
                    return Ok(());
                }
                Ok(RemoteTaskStatus::InProgress { status }) => {
                    let progress = progress_for_attempt(attempt, max_attempts);
                    tracing::debug!(job_id = %job_id, attempt, remote_status = %status, progress, "Still generating");
                    if !self
                        .write(job_id, move |r| {
                            r.record_progress(progress);
                            Ok(())
                        })
                        .await?
                    {
                        return Ok(());
                    }
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Status check failed");
                    self.terminate(job_id, JobStatus::Error, format!("Status check failed: {e}"))
                        .await?;
                    return Ok(());
                }
            }
        }

        error!(job_id = %job_id, attempts = max_attempts, "Generation timeout exceeded");
        self.terminate(
            job_id,
            JobStatus::Timeout,
            "Generation timeout exceeded".to_string(),
        )
        .await?;
        Ok(())
    }

    async fn terminate(&self, job_id: Uuid, status: JobStatus, reason: String) -> Result<bool, Error> {
        self.write(job_id, move |r| r.transition_to(status, Some(reason)))
            .await
    }

    /// Apply `change` unless the record is already terminal.
    ///
    /// Returns `Ok(false)` when the record was terminal and nothing was written.
    async fn write<F>(&self, job_id: Uuid, change: F) -> Result<bool, Error>
    where
        F: FnOnce(&mut JobRecord) -> Result<(), JobError> + Send,
    {
        let mut applied = Ok(false);
        let record = self
            .store
            .update(
                job_id,
                Box::new(|r| {
                    if r.status.is_active() {
                        applied = change(r).map(|()| true);
                    }
                }),
            )
            .await?;

        let applied = applied?;
        if !applied {
            info!(job_id = %job_id, status = %record.status, "Job already terminal; driver stopping");
        }
        Ok(applied)
    }
}

/// Force a record terminal if it is not already, then release its staged input.
///
/// The input reference is taken out of the record in the same atomic update,
/// so concurrent callers release it at most once between them.
pub(crate) async fn finalize(
    store: &dyn JobStore,
    storage: &dyn EphemeralStorage,
    job_id: Uuid,
    failure: Option<String>,
) {
    let mut forced = false;
    let mut staged = None;
    let updated = store
        .update(
            job_id,
            Box::new(|r| {
                if r.status.is_active() {
                    let reason = failure.unwrap_or_else(|| {
                        "Lifecycle driver exited without reaching a terminal state".to_string()
                    });
                    forced = r.transition_to(JobStatus::Failed, Some(reason)).is_ok();
                }
                staged = r.ephemeral_input_ref.take();
            }),
        )
        .await;

    match updated {
        Ok(record) if forced => {
            warn!(job_id = %job_id, error = ?record.error_message, "Job forced to failed");
        }
        Ok(_) | Err(JobError::NotFound { .. }) => {}
        Err(e) => warn!(job_id = %job_id, error = %e, "Could not finalize job record"),
    }

    if let Some(input) = staged {
        if let Err(e) = storage.release(&input).await {
            warn!(job_id = %job_id, file = %input.file_name, error = %e, "Failed to release staged input");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
