use std::sync::Arc;

use runway_relay::api::{API_PREFIX, AppState, relay_routes};
use runway_relay::auth::{Authenticator, StaticTokenAuthenticator};
use runway_relay::config::ServiceConfig;
use runway_relay::jobs::retention;
use runway_relay::jobs::{GenerationService, InMemoryJobStore, JobStore};
use runway_relay::remote::RunwayClient;
use runway_relay::storage::LocalStorage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export RUNWAY_API_KEY=key_...");
        std::process::exit(1);
    });

    let auth = StaticTokenAuthenticator::parse(&config.api_tokens).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export RELAY_API_TOKENS=token:user_id:credits[,...]");
        std::process::exit(1);
    });
    if auth.is_empty() {
        tracing::warn!("RELAY_API_TOKENS is empty; every authenticated route will return 401");
    }

    // ── Storage ──────────────────────────────────────────────────────────
    let public_prefix = format!(
        "{}{API_PREFIX}/public",
        config.public_base_url.trim_end_matches('/')
    );
    let storage = LocalStorage::new(
        config.upload_dir.clone(),
        config.public_dir.clone(),
        public_prefix,
    );
    storage.ensure_dirs().await?;

    // ── Jobs ─────────────────────────────────────────────────────────────
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let service = Arc::new(GenerationService::new(
        Arc::clone(&store),
        Arc::new(RunwayClient::new(config.runway.clone())),
        Arc::new(storage),
        config.poll.clone(),
        config.estimate.clone(),
    ));

    let sweeper = config
        .sweep_interval
        .map(|interval| retention::spawn_sweeper(Arc::clone(&store), interval, config.retention));

    eprintln!("🎬 Runway Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}{}", config.bind, API_PREFIX);
    eprintln!("   Remote: {}", config.runway.base_url);
    eprintln!(
        "   Poll: every {:?}, up to {} attempts",
        config.poll.interval, config.poll.max_attempts
    );
    eprintln!("   Uploads: {}", config.upload_dir.display());
    match config.sweep_interval {
        Some(interval) => eprintln!(
            "   Retention: {:?} (sweep every {:?})",
            config.retention, interval
        ),
        None => eprintln!("   Retention: periodic sweep disabled"),
    }

    let auth: Arc<dyn Authenticator> = Arc::new(auth);
    let app = relay_routes(AppState {
        service: Arc::clone(&service),
        auth,
        http: reqwest::Client::new(),
        max_upload_bytes: config.max_upload_bytes,
    });

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    eprintln!("\nShutting down...");
    if let Some(handle) = sweeper {
        handle.abort();
    }
    service.shutdown().await;

    Ok(())
}
