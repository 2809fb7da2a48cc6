//! Asynchronous generation job lifecycle.

pub mod driver;
pub mod pricing;
pub mod projection;
pub mod request;
pub mod retention;
pub mod service;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use driver::LifecycleDriver;
pub use pricing::{CostEstimate, ModelTier, estimate_cost, list_models};
pub use projection::{JobSummary, StatusSnapshot};
pub use request::{GenerationRequest, GenerationSpec};
pub use service::{CreatedJob, DEFAULT_LIST_LIMIT, GenerationService, JobList};
pub use state::{JobRecord, JobStatus};
pub use store::{InMemoryJobStore, JobStore};
