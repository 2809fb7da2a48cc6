//! Error types for the relay.

use uuid::Uuid;

use crate::jobs::state::JobStatus;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Remote backend error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Service is shutting down")]
    ShuttingDown,
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Request validation errors. Raised before any job record exists.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Prompt text must not be empty")]
    EmptyPrompt,

    #[error("Duration must be between {min} and {max} seconds, got {got}")]
    Duration { got: u32, min: u32, max: u32 },

    #[error("Invalid aspect ratio: {0}")]
    AspectRatio(String),

    #[error("Unknown status filter: {0}")]
    StatusFilter(String),

    #[error("Insufficient credits. Required: {required}, Available: {available}")]
    InsufficientCredits { required: u32, available: i64 },

    #[error("File must be an image")]
    NotAnImage,

    #[error("Image file too large (max {max_bytes} bytes)")]
    FileTooLarge { max_bytes: usize },

    #[error("Missing form field: {0}")]
    MissingField(String),

    #[error("Invalid form field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Errors talking to the remote generation backend.
///
/// The same variants cover submission and status queries; the lifecycle
/// driver knows which phase it is in and records the failure accordingly.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Authentication with the remote backend failed")]
    AuthFailed,

    #[error("Remote backend rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response from remote backend: {0}")]
    InvalidResponse(String),
}

/// Job lookup, ownership and state errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job {id} belongs to another user")]
    Forbidden { id: Uuid },

    #[error("Job {id} is already {state}")]
    InvalidState { id: Uuid, state: JobStatus },

    #[error("Job {id} has no result available")]
    NoResult { id: Uuid },

    #[error("Job {id} cannot transition from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },
}

/// Ephemeral input storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
