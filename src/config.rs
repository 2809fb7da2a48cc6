//! Configuration types.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default Runway API endpoint.
pub const DEFAULT_RUNWAY_BASE_URL: &str = "https://api.dev.runwayml.com/v1";

/// Default value for the `X-Runway-Version` header.
pub const DEFAULT_RUNWAY_API_VERSION: &str = "2024-11-06";

/// Polling parameters for the lifecycle driver.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Wait before each status query.
    pub interval: Duration,
    /// Maximum number of status queries before the job times out.
    pub max_attempts: u32,
}

impl PollConfig {
    /// Wall-clock budget a job gets before it is marked `timeout`.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

/// Parameters for the completion-time hint in status snapshots.
#[derive(Debug, Clone)]
pub struct EstimateConfig {
    /// Expected total generation time, measured from job creation.
    pub budget: Duration,
    /// Smallest remaining time ever reported.
    pub floor: Duration,
}

impl Default for EstimateConfig {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(120),
            floor: Duration::from_secs(10),
        }
    }
}

/// Remote backend connection settings.
#[derive(Debug, Clone)]
pub struct RunwayConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub api_version: String,
}

/// Full service configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub runway: RunwayConfig,
    pub bind: SocketAddr,
    /// Externally reachable base URL of this service (used for published inputs).
    pub public_base_url: String,
    /// Where uploaded reference images are staged.
    pub upload_dir: PathBuf,
    /// Where staged images are copied so the remote backend can fetch them.
    pub public_dir: PathBuf,
    pub poll: PollConfig,
    pub estimate: EstimateConfig,
    /// Terminal jobs older than this are removed by the periodic sweeper.
    pub retention: Duration,
    /// Sweeper period. `None` disables the periodic sweep.
    pub sweep_interval: Option<Duration>,
    pub max_upload_bytes: usize,
    /// Raw `token:principal:credits` entries for the static authenticator.
    pub api_tokens: String,
}

impl ServiceConfig {
    /// Build the configuration from environment variables.
    ///
    /// Only `RUNWAY_API_KEY` is required. Unparseable numeric values fall
    /// back to their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("RUNWAY_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("RUNWAY_API_KEY".to_string()))?;

        let bind_raw = std::env::var("RELAY_BIND").unwrap_or_else(|_| "0.0.0.0:8001".to_string());
        let bind: SocketAddr = bind_raw.parse().map_err(|e| ConfigError::InvalidValue {
            key: "RELAY_BIND".to_string(),
            message: format!("{bind_raw}: {e}"),
        })?;

        let sweep_secs = env_u64("RELAY_SWEEP_INTERVAL_SECS", 3600);

        Ok(Self {
            runway: RunwayConfig {
                api_key: SecretString::from(api_key),
                base_url: std::env::var("RUNWAY_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_RUNWAY_BASE_URL.to_string()),
                api_version: std::env::var("RUNWAY_API_VERSION")
                    .unwrap_or_else(|_| DEFAULT_RUNWAY_API_VERSION.to_string()),
            },
            bind,
            public_base_url: std::env::var("RELAY_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            upload_dir: std::env::var("RELAY_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/runway_uploads")),
            public_dir: std::env::var("RELAY_PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/public")),
            poll: PollConfig {
                interval: Duration::from_secs(env_u64("RELAY_POLL_INTERVAL_SECS", 5)),
                max_attempts: u32::try_from(env_u64("RELAY_POLL_MAX_ATTEMPTS", 60)).unwrap_or(u32::MAX),
            },
            estimate: EstimateConfig {
                budget: Duration::from_secs(env_u64("RELAY_ESTIMATE_BUDGET_SECS", 120)),
                floor: Duration::from_secs(env_u64("RELAY_ESTIMATE_FLOOR_SECS", 10)),
            },
            retention: Duration::from_secs(env_u64("RELAY_RETENTION_HOURS", 24).saturating_mul(3600)),
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            max_upload_bytes: usize::try_from(env_u64("RELAY_MAX_UPLOAD_BYTES", 16 * 1024 * 1024))
                .unwrap_or(usize::MAX),
            api_tokens: std::env::var("RELAY_API_TOKENS").unwrap_or_default(),
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
