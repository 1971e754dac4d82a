// # cfsyncd - Cloudflare Dynamic DNS Daemon
//
// This is a THIN integration layer. Reconciliation, scheduling and error
// classification live in cfsync-core; this binary only wires the pieces
// together.
//
// The cfsyncd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Building the IP resolver and the Cloudflare record store
// 4. Running the scheduler until SIGTERM or SIGINT
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// - `CF_TOKEN`: API token (Zone:Read, DNS:Edit)
// - `CF_DOMAINS`: Comma-separated list of record names to manage
// - `CF_IPV4_ENABLED` / `CF_IPV6_ENABLED`: Families to reconcile
// - `CF_PROXIED`: Proxy flag written on create/update
// - `CF_UPDATE_INTERVAL`: Seconds between cycle starts
// - `CF_LOG_LEVEL`: trace, debug, info, warn, error
// - `CF_DRY_RUN`: Look up records but never write
// - `CF_HTTP_TIMEOUT`, `CF_MAX_CONCURRENCY`, `CF_IPV4_URL`, `CF_IPV6_URL`
//
// ## Example
//
// ```bash
// export CF_TOKEN=your_token
// export CF_DOMAINS=home.example.com,vpn.example.com
// export CF_IPV6_ENABLED=true
//
// cfsyncd
// ```

use anyhow::{Context, Result};
use cfsync_core::{Config, Reconciler, Scheduler, Shutdown, ShutdownTrigger};
use cfsync_ip_http::HttpIpResolver;
use cfsync_provider_cloudflare::CloudflareStore;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum CfsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<CfsyncExitCode> for ExitCode {
    fn from(code: CfsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return CfsyncExitCode::ConfigError.into();
        }
    };

    let log_level = match config.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CfsyncExitCode::ConfigError.into();
    }

    info!("Starting cfsyncd {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {:?}", config);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CfsyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => CfsyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                CfsyncExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Build the components and run until a shutdown signal arrives
async fn run_daemon(config: Config) -> Result<()> {
    if config.dry_run {
        warn!("Dry-run mode: records are looked up but never written");
    }

    let resolver = HttpIpResolver::from_config(&config).context("failed to create IP resolver")?;
    let store = CloudflareStore::from_config(&config).context("failed to create record store")?;

    for domain in &config.domains {
        info!("Managing record: {}", domain);
    }

    let reconciler = Reconciler::new(Arc::new(resolver), Arc::new(store), config)
        .context("invalid configuration")?;
    let scheduler = Scheduler::new(reconciler);

    let (trigger, shutdown) = Shutdown::channel();
    let signals = spawn_signal_handler(trigger)?;

    let cycles = scheduler.run(shutdown).await;
    signals.abort();

    info!("Shut down cleanly after {} cycle(s)", cycles);
    Ok(())
}

/// Trigger shutdown on the first SIGTERM or SIGINT
///
/// Handlers are installed before this returns.
#[cfg(unix)]
fn spawn_signal_handler(trigger: ShutdownTrigger) -> Result<JoinHandle<()>> {
    let mut sigterm = signal(SignalKind::terminate()).context("failed to set up SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to set up SIGINT handler")?;

    Ok(tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!("Received {}, shutting down", name);
        trigger.trigger();
    }))
}

/// Trigger shutdown on CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn spawn_signal_handler(trigger: ShutdownTrigger) -> Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received CTRL-C, shutting down"),
            Err(e) => {
                error!("Failed to wait for CTRL-C: {}", e);
                return;
            }
        }
        trigger.trigger();
    }))
}
