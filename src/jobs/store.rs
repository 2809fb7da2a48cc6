//! Job record store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::state::JobRecord;
use crate::storage::StagedInput;

/// A mutation applied to one record while the store holds its write lock.
pub type Mutator<'a> = Box<dyn FnOnce(&mut JobRecord) + Send + 'a>;

/// Filter used by [`JobStore::list`].
pub type Predicate<'a> = &'a (dyn Fn(&JobRecord) -> bool + Send + Sync);

/// Shared job state.
///
/// Updates are atomic with respect to readers: a reader sees a record either
/// entirely before or entirely after a mutator ran.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a fresh `initializing` record and return its id.
    async fn create(
        &self,
        owner_id: &str,
        cost_credits: u32,
        ephemeral_input_ref: Option<StagedInput>,
    ) -> Result<Uuid, JobError>;

    /// Snapshot of one record.
    async fn get(&self, job_id: Uuid) -> Result<JobRecord, JobError>;

    /// Apply `mutator` to a record and return the record as it was left.
    async fn update<'a>(&self, job_id: Uuid, mutator: Mutator<'a>) -> Result<JobRecord, JobError>;

    /// Remove a record.
    async fn delete(&self, job_id: Uuid) -> Result<JobRecord, JobError>;

    /// Snapshots of every record matching `predicate`, in no particular order.
    async fn list<'a>(&self, predicate: Predicate<'a>) -> Vec<JobRecord>;
}

/// In-memory job store.
pub struct InMemoryJobStore {
    records: RwLock<HashMap<Uuid, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records (all statuses).
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(
        &self,
        owner_id: &str,
        cost_credits: u32,
        ephemeral_input_ref: Option<StagedInput>,
    ) -> Result<Uuid, JobError> {
        let mut records = self.records.write().await;
        let mut record = JobRecord::new(owner_id, cost_credits, ephemeral_input_ref);
        // Keys must stay unique for the life of the process.
        while records.contains_key(&record.job_id) {
            record.job_id = Uuid::new_v4();
        }
        let job_id = record.job_id;
        records.insert(job_id, record);
        Ok(job_id)
    }

    async fn get(&self, job_id: Uuid) -> Result<JobRecord, JobError> {
        self.records
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(JobError::NotFound { id: job_id })
    }

    async fn update<'a>(&self, job_id: Uuid, mutator: Mutator<'a>) -> Result<JobRecord, JobError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&job_id)
            .ok_or(JobError::NotFound { id: job_id })?;
        mutator(record);
        Ok(record.clone())
    }

    async fn delete(&self, job_id: Uuid) -> Result<JobRecord, JobError> {
        self.records
            .write()
            .await
            .remove(&job_id)
            .ok_or(JobError::NotFound { id: job_id })
    }

    async fn list<'a>(&self, predicate: Predicate<'a>) -> Vec<JobRecord> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }
}
