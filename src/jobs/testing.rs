//! Test doubles for the job lifecycle.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RemoteError, StorageError};
use crate::jobs::request::GenerationSpec;
use crate::remote::{RemoteBackend, RemoteTaskStatus};
use crate::storage::{EphemeralStorage, PublishedFile, StagedInput};

/// What the fake backend answers to one status query.
#[derive(Debug, Clone)]
pub enum QueryBehavior {
    Pending,
    Succeed(String),
    Fail(Option<String>),
    Error,
    Panic,
}

pub struct FakeBackend {
    submit_fails: bool,
    script: Mutex<VecDeque<QueryBehavior>>,
    fallback: QueryBehavior,
    pub submits: AtomicUsize,
    pub queries: AtomicUsize,
}

impl FakeBackend {
    pub fn scripted(script: Vec<QueryBehavior>, fallback: QueryBehavior) -> Self {
        Self {
            submit_fails: false,
            script: Mutex::new(script.into()),
            fallback,
            submits: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn with_query(behavior: QueryBehavior) -> Self {
        Self::scripted(Vec::new(), behavior)
    }

    pub fn succeeding(url: &str) -> Self {
        Self::with_query(QueryBehavior::Succeed(url.to_string()))
    }

    pub fn failing_submit() -> Self {
        Self {
            submit_fails: true,
            ..Self::with_query(QueryBehavior::Pending)
        }
    }
}

#[async_trait]
impl RemoteBackend for FakeBackend {
    async fn submit(&self, _spec: &GenerationSpec) -> Result<String, RemoteError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        if self.submit_fails {
            return Err(RemoteError::Rejected {
                status: 400,
                body: "bad request".into(),
            });
        }
        Ok(format!("remote-{n}"))
    }

    async fn query(&self, _remote_handle: &str) -> Result<RemoteTaskStatus, RemoteError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let behavior = {
            let mut script = self.script.lock().unwrap();
            script.pop_front().unwrap_or_else(|| self.fallback.clone())
        };
        match behavior {
            QueryBehavior::Pending => Ok(RemoteTaskStatus::InProgress {
                status: "RUNNING".into(),
            }),
            QueryBehavior::Succeed(url) => Ok(RemoteTaskStatus::Succeeded { output: Some(url) }),
            QueryBehavior::Fail(reason) => Ok(RemoteTaskStatus::Failed { reason }),
            QueryBehavior::Error => Err(RemoteError::Network("connection reset".into())),
            QueryBehavior::Panic => panic!("backend exploded"),
        }
    }
}

/// Storage that only counts calls.
#[derive(Default)]
pub struct FakeStorage {
    pub publishes: AtomicUsize,
    pub releases_started: AtomicUsize,
    /// Releases that ran to completion.
    pub releases: AtomicUsize,
    pub fail_publish: bool,
    pub release_delay: Option<Duration>,
}

#[async_trait]
impl EphemeralStorage for FakeStorage {
    async fn stage(
        &self,
        owner_id: &str,
        extension: &str,
        _bytes: &[u8],
    ) -> Result<StagedInput, StorageError> {
        Ok(StagedInput {
            file_name: format!("runway_{owner_id}_fake.{extension}"),
        })
    }

    async fn publish(&self, input: &StagedInput) -> Result<String, StorageError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        if self.fail_publish {
            return Err(StorageError::FileNotFound(input.file_name.clone()));
        }
        Ok(format!("http://relay.test/public/{}", input.file_name))
    }

    async fn release(&self, _input: &StagedInput) -> Result<(), StorageError> {
        self.releases_started.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.release_delay {
            tokio::time::sleep(delay).await;
        }
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn open_published(&self, file_name: &str) -> Result<PublishedFile, StorageError> {
        Err(StorageError::FileNotFound(file_name.to_string()))
    }
}

pub fn staged() -> StagedInput {
    StagedInput {
        file_name: "runway_user-1_fake.png".into(),
    }
}
