//! Generation service: the operations the HTTP layer calls.
//!
//! Owns the job store, spawns one [`LifecycleDriver`] task per job and keeps
//! its handle so shutdown can wait for every driver to finalize its job.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::auth::Principal;
use crate::config::{EstimateConfig, PollConfig};
use crate::error::{Error, JobError, ValidationError};
use crate::jobs::driver::{LifecycleDriver, SHUTDOWN_MESSAGE, finalize};
use crate::jobs::pricing::estimate_cost;
use crate::jobs::projection::{JobSummary, StatusSnapshot, project};
use crate::jobs::request::{GenerationRequest, GenerationSpec};
use crate::jobs::retention;
use crate::jobs::state::{JobRecord, JobStatus};
use crate::jobs::store::JobStore;
use crate::remote::RemoteBackend;
use crate::storage::{EphemeralStorage, StagedInput};

/// Default page size for [`GenerationService::list_jobs`].
pub const DEFAULT_LIST_LIMIT: usize = 20;

const CANCEL_MESSAGE: &str = "Task cancelled by user";

/// Response to a successful create-job.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedJob {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
    pub estimated_cost: u32,
    /// Seconds.
    pub estimated_duration: u64,
}

/// One page of list-jobs.
#[derive(Debug, Clone, Serialize)]
pub struct JobList {
    pub tasks: Vec<JobSummary>,
    pub total: usize,
}

pub struct GenerationService {
    store: Arc<dyn JobStore>,
    storage: Arc<dyn EphemeralStorage>,
    driver: Arc<LifecycleDriver>,
    estimate: EstimateConfig,
    drivers: RwLock<HashMap<Uuid, JoinHandle<()>>>,
}

impl GenerationService {
    pub fn new(
        store: Arc<dyn JobStore>,
        remote: Arc<dyn RemoteBackend>,
        storage: Arc<dyn EphemeralStorage>,
        poll: PollConfig,
        estimate: EstimateConfig,
    ) -> Self {
        let driver = Arc::new(LifecycleDriver::new(
            Arc::clone(&store),
            remote,
            Arc::clone(&storage),
            poll,
        ));
        Self {
            store,
            storage,
            driver,
            estimate,
            drivers: RwLock::new(HashMap::new()),
        }
    }

    pub fn storage(&self) -> &Arc<dyn EphemeralStorage> {
        &self.storage
    }

    /// Validate, price and start a job.
    ///
    /// `staged` is an already-staged reference image; it becomes owned by the
    /// job, or is released here if the job is never created.
    pub async fn create_job(
        &self,
        principal: &Principal,
        request: GenerationRequest,
        staged: Option<StagedInput>,
    ) -> Result<CreatedJob, Error> {
        let prepared = self.prepare(principal, request, staged.as_ref()).await;
        let (spec, cost) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                if let Some(input) = &staged {
                    self.release_unowned(input).await;
                }
                return Err(e);
            }
        };

        let job_id = match self
            .store
            .create(&principal.principal_id, cost, staged.clone())
            .await
        {
            Ok(job_id) => job_id,
            Err(e) => {
                if let Some(input) = &staged {
                    self.release_unowned(input).await;
                }
                return Err(e.into());
            }
        };

        tracing::info!(
            job_id = %job_id,
            owner = %principal.principal_id,
            model = %spec.model,
            duration = spec.duration,
            cost,
            "Created generation job"
        );

        if !self.launch(job_id, spec).await {
            finalize(
                &*self.store,
                &*self.storage,
                job_id,
                Some(SHUTDOWN_MESSAGE.to_string()),
            )
            .await;
            return Err(Error::ShuttingDown);
        }

        Ok(CreatedJob {
            job_id,
            status: JobStatus::Processing,
            message: "Video generation started".to_string(),
            estimated_cost: cost,
            estimated_duration: self.estimate.budget.as_secs(),
        })
    }

    async fn prepare(
        &self,
        principal: &Principal,
        request: GenerationRequest,
        staged: Option<&StagedInput>,
    ) -> Result<(GenerationSpec, u32), Error> {
        if self.driver.is_stopping() {
            return Err(Error::ShuttingDown);
        }
        let mut spec = request.validate()?;
        let cost = estimate_cost(spec.duration, spec.model.id()).cost_credits;
        if i64::from(cost) > principal.credit_balance {
            return Err(ValidationError::InsufficientCredits {
                required: cost,
                available: principal.credit_balance,
            }
            .into());
        }
        if let Some(input) = staged {
            spec.prompt_image = Some(self.storage.publish(input).await?);
        }
        Ok((spec, cost))
    }

    async fn release_unowned(&self, input: &StagedInput) {
        if let Err(e) = self.storage.release(input).await {
            tracing::warn!(file = %input.file_name, error = %e, "Failed to release staged input");
        }
    }

    /// Spawn the job's driver and record its handle under one lock.
    ///
    /// Returns `false` without spawning once shutdown has begun.
    async fn launch(&self, job_id: Uuid, spec: GenerationSpec) -> bool {
        let mut drivers = self.drivers.write().await;
        if self.driver.is_stopping() {
            return false;
        }
        drivers.retain(|_, h| !h.is_finished());
        let driver = Arc::clone(&self.driver);
        drivers.insert(
            job_id,
            tokio::spawn(async move { driver.run(job_id, spec).await }),
        );
        true
    }

    /// Fetch a record the caller owns.
    async fn owned(&self, principal: &Principal, job_id: Uuid) -> Result<JobRecord, JobError> {
        let record = self.store.get(job_id).await?;
        if record.owner_id != principal.principal_id {
            return Err(JobError::Forbidden { id: job_id });
        }
        Ok(record)
    }

    pub async fn get_status(
        &self,
        principal: &Principal,
        job_id: Uuid,
    ) -> Result<StatusSnapshot, JobError> {
        let record = self.owned(principal, job_id).await?;
        Ok(project(&record, Utc::now(), &self.estimate))
    }

    /// The caller's jobs, newest first.
    pub async fn list_jobs(
        &self,
        principal: &Principal,
        status: Option<JobStatus>,
        limit: usize,
    ) -> JobList {
        let owner = principal.principal_id.as_str();
        let mut records = self
            .store
            .list(&|r: &JobRecord| {
                r.owner_id == owner && status.is_none_or(|s| r.status == s)
            })
            .await;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);

        let tasks: Vec<JobSummary> = records.iter().map(JobSummary::from).collect();
        JobList {
            total: tasks.len(),
            tasks,
        }
    }

    /// Where a completed job's video can be fetched from.
    pub async fn result_location(
        &self,
        principal: &Principal,
        job_id: Uuid,
    ) -> Result<String, JobError> {
        let record = self.owned(principal, job_id).await?;
        match (record.status, record.result_location) {
            (JobStatus::Completed, Some(location)) => Ok(location),
            _ => Err(JobError::NoResult { id: job_id }),
        }
    }

    /// Cancel a job the caller owns.
    ///
    /// The driver notices on its next poll and releases the job's input.
    pub async fn cancel(&self, principal: &Principal, job_id: Uuid) -> Result<(), JobError> {
        let mut outcome = Ok(());
        let owner = principal.principal_id.as_str();
        self.store
            .update(
                job_id,
                Box::new(|r| {
                    outcome = if r.owner_id != owner {
                        Err(JobError::Forbidden { id: job_id })
                    } else {
                        r.transition_to(JobStatus::Cancelled, Some(CANCEL_MESSAGE.to_string()))
                    };
                }),
            )
            .await?;
        outcome?;

        tracing::info!(job_id = %job_id, owner = %owner, "Job cancelled");
        Ok(())
    }

    /// Remove terminal jobs older than `max_age`.
    pub async fn sweep(&self, max_age: Duration) -> usize {
        retention::sweep(&*self.store, max_age, Utc::now()).await
    }

    /// Number of jobs not yet in a terminal state.
    pub async fn active_count(&self) -> usize {
        self.store
            .list(&|r: &JobRecord| r.status.is_active())
            .await
            .len()
    }

    /// Stop every outstanding driver and wait for each to finalize its job.
    ///
    /// Jobs left non-terminal become `failed` and their inputs are released.
    /// New jobs are refused from here on.
    pub async fn shutdown(&self) {
        self.driver.stop();
        let drivers: Vec<(Uuid, JoinHandle<()>)> = self.drivers.write().await.drain().collect();
        let count = drivers.len();

        for (job_id, handle) in drivers {
            if let Err(e) = handle.await {
                tracing::warn!(job_id = %job_id, error = %e, "Driver task failed");
                finalize(
                    &*self.store,
                    &*self.storage,
                    job_id,
                    Some(SHUTDOWN_MESSAGE.to_string()),
                )
                .await;
            }
        }

        tracing::info!(drivers = count, "Generation service stopped");
    }
}
