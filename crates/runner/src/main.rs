use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use evalflow_core::config::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use evalflow_core::{
    load_config, validate_config, Config, ContainerRunner, DockerRunner, EvaluationOrchestrator,
    HttpRegistryClient, RegistryClient, RunSummary, SanitizedConfig, ScriptRegistry,
};

use evalflow_runner::api::create_router;
use evalflow_runner::state::{config_fingerprint, AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Selects JSON log output when set to `json`.
const LOG_FORMAT_ENV: &str = "EVALFLOW_LOG_FORMAT";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn run() -> Result<()> {
    init_logging();

    // Determine config path
    let config_path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    // Load configuration
    info!("evalflow {} loading configuration from {:?}", VERSION, config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default();
    info!(config_hash = %config_fingerprint(&config), "Configuration loaded: {}", sanitized);

    let orchestrator = Arc::new(build_orchestrator(&config)?);
    orchestrator
        .validate()
        .context("Run configuration is not usable")?;

    if config.daemon.enabled {
        run_daemon(config, orchestrator).await
    } else {
        run_once(&orchestrator).await
    }
}

/// Wires the concrete collaborators into an orchestrator.
fn build_orchestrator(config: &Config) -> Result<EvaluationOrchestrator> {
    info!("Using registry at {}", config.registry.url);
    let registry: Arc<dyn RegistryClient> = Arc::new(
        HttpRegistryClient::new(config.registry.clone())
            .context("Failed to create registry client")?,
    );

    let containers: Arc<dyn ContainerRunner> =
        Arc::new(DockerRunner::new(config.executor.clone()));
    info!("Using container runner: {}", containers.name());

    let scripts =
        ScriptRegistry::from_config(&config.scripts).context("Failed to register scripts")?;

    Ok(EvaluationOrchestrator::new(
        config.run.clone(),
        registry,
        containers,
        scripts,
        config.notification.clone(),
        config.retry.clone(),
    ))
}

/// One orchestration pass; a fatal run error makes the process exit non-zero.
async fn run_once(orchestrator: &EvaluationOrchestrator) -> Result<()> {
    let summary = match orchestrator.run_once().await {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(aborted) = orchestrator.status().await.last_run {
                log_summary(&aborted);
            }
            return Err(e).context("Run aborted");
        }
    };
    log_summary(&summary);
    if summary.failed > 0 {
        warn!("{} submission(s) failed; see log for details", summary.failed);
    }
    Ok(())
}

fn log_summary(summary: &RunSummary) {
    for outcome in &summary.outcomes {
        info!(
            run_id = %summary.run_id,
            submission = %outcome.submission_id,
            "{} {}{}",
            outcome.state,
            outcome.status,
            outcome
                .failed_stage
                .map(|s| format!(" (failed at {})", s))
                .unwrap_or_default()
        );
    }
    match serde_json::to_string(summary) {
        Ok(json) => info!(run_id = %summary.run_id, "Run summary: {}", json),
        Err(e) => warn!("Failed to serialize run summary: {}", e),
    }
}

/// Repeats runs on the poll interval and serves the HTTP status surface.
async fn run_daemon(config: Config, orchestrator: Arc<EvaluationOrchestrator>) -> Result<()> {
    let addr = SocketAddr::new(config.daemon.host, config.daemon.port);
    let poll_interval = Duration::from_millis(config.daemon.poll_interval_ms);

    let polling = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run_polling(poll_interval).await })
    };

    let state = Arc::new(AppState::new(config, Arc::clone(&orchestrator)));
    let app = create_router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Stopping orchestrator; the current run will finish first");
    orchestrator.shutdown();
    if let Err(e) = polling.await {
        error!("Polling task ended abnormally: {}", e);
    }
    info!("Orchestrator stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
