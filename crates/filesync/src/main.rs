//! `filesync`: mirror server binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from the YAML file and environment.
//! 2. Initialise the telemetry pipeline (JSON logs, optional OTLP export).
//! 3. Create the mirror root and build the [`MirrorSynchronizer`].
//! 4. Spawn the [`SyncScheduler`] and the shutdown-signal watcher.
//! 5. Build the Axum router and serve until shutdown.
//! 6. Wait for the scheduler to finish (or abandon) its current pass.

mod config;
mod mirror;
mod schedule;
mod scheduler;
mod server;
mod telemetry;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use config::Config;
use mirror::{MirrorSynchronizer, ResourceFetcher};
use scheduler::SyncScheduler;
use server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::load().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(&cfg.log)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cfg.server.port,
        mirror_root = %cfg.sync.mirror_root.display(),
        "filesync starting"
    );

    // -----------------------------------------------------------------------
    // 3. Mirror synchronizer
    // -----------------------------------------------------------------------
    tokio::fs::create_dir_all(&cfg.sync.mirror_root)
        .await
        .with_context(|| {
            format!(
                "failed to create mirror root {}",
                cfg.sync.mirror_root.display()
            )
        })?;

    let mapping = cfg.files.mirror_mapping()?;
    if mapping.is_empty() {
        warn!("files.mirror is empty; passes will have nothing to do");
    } else {
        info!(files = mapping.len(), "mirror mapping loaded");
    }
    let fetcher = ResourceFetcher::new(cfg.sync.fetch_timeout())
        .context("failed to build HTTP client")?;
    let synchronizer = Arc::new(MirrorSynchronizer::new(
        cfg.sync.mirror_root.clone(),
        mapping,
        fetcher,
        cfg.sync.max_concurrent_fetches,
    ));

    // -----------------------------------------------------------------------
    // 4. Background tasks
    // -----------------------------------------------------------------------
    let shutdown = CancellationToken::new();
    let schedule = cfg.sync.schedule_set()?;
    info!(rules = schedule.len(), "schedule loaded");
    let (scheduler, sync_handle) = SyncScheduler::new(
        schedule,
        synchronizer,
        cfg.sync.scheduler_settings(),
    );
    let scheduler_task = scheduler.spawn(shutdown.clone());
    tokio::spawn(shutdown_signal(shutdown.clone()));

    // -----------------------------------------------------------------------
    // 5. HTTP server
    // -----------------------------------------------------------------------
    let router = server::router::build(
        AppState::new(sync_handle),
        &cfg.sync.mirror_root,
        cfg.files.public.as_deref(),
        cfg.server.request_timeout(),
    );

    if let Some(public) = &cfg.files.public {
        info!(dir = %public.display(), "serving public directory");
    }

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.server.port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    let server_shutdown = shutdown.clone();
    let served = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
    .await;

    // The server may also exit on its own error; stop the scheduler either way.
    shutdown.cancel();

    // -----------------------------------------------------------------------
    // 6. Drain
    // -----------------------------------------------------------------------
    if let Err(e) = scheduler_task.await {
        error!(error = %e, "sync scheduler task failed");
    }
    info!("filesync stopped");
    telemetry::shutdown_telemetry();

    served.context("HTTP server failed")
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
    token.cancel();
}
