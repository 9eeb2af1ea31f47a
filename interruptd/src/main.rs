//! interruptd
//!
//! Kubernetes controller that consumes cloud interruption notices (spot
//! interruptions, rebalance recommendations, scheduled maintenance and
//! instance state changes) and remediates the affected NodeClaims.

mod cli;
mod config;
mod spool;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;
use config::Config;
use interruptd_core::cache::UnavailableOfferings;
use interruptd_core::controller::{ControllerConfig, InterruptionController};
use interruptd_core::metrics::MetricsRegistry;
use interruptd_core::scheduler::InterruptionScheduler;
use interruptd_k8s::{K8sClient, KubeClusterState, KubeEventRecorder};
use spool::SpoolQueue;

/// Initialize the tracing/logging subsystem
fn init_logging(log_level: &str, json_format: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

/// Wire the controller from configuration
async fn build_scheduler(config: &Config) -> Result<(InterruptionScheduler, Arc<UnavailableOfferings>)> {
    let metrics = Arc::new(
        MetricsRegistry::new(prometheus::default_registry())
            .context("Failed to register metrics")?,
    );

    let k8s_client = K8sClient::new().await?;
    let recorder = KubeEventRecorder::new(
        k8s_client.inner().clone(),
        config.kubernetes.reporter.clone(),
    );
    let cluster = KubeClusterState::new(k8s_client);

    let queue = SpoolQueue::new(
        config.queue.name.clone(),
        config.queue.spool_dir.clone(),
        config.queue.batch_size,
    );
    info!(queue = %config.queue.name, dir = ?queue.dir(), "Using spool queue");

    let unavailable_offerings = Arc::new(UnavailableOfferings::with_ttl(
        config.unavailable_offerings_ttl,
    ));

    let controller = InterruptionController::new(
        Arc::new(queue),
        Arc::new(cluster),
        Arc::new(recorder),
        unavailable_offerings.clone(),
        metrics,
        ControllerConfig {
            max_concurrent_messages: config.max_concurrent_messages,
            dry_run: config.dry_run,
        },
    );

    Ok((
        InterruptionScheduler::new(Arc::new(controller), config.interval),
        unavailable_offerings,
    ))
}

/// Run the main reconciliation loop
async fn run(config: Config, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
    let (scheduler, unavailable_offerings) = build_scheduler(&config).await?;

    // Start metrics server if enabled
    if config.metrics.enabled {
        let port = config.metrics.port;
        let path = config.metrics.path.clone();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(port, path).await {
                error!(error = %e, "Metrics server failed");
            }
        });
    }

    // Expire unavailable offerings
    let mut evict_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(unavailable_offerings.ttl());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = unavailable_offerings.evict_expired();
                    if evicted > 0 {
                        debug!(evicted, "Evicted expired unavailable offerings");
                    }
                }
                _ = evict_shutdown.changed() => break,
            }
        }
    });

    scheduler.run(shutdown_rx).await;

    info!("interruptd shutdown complete");
    Ok(())
}

/// Build the HTTP response for a metrics scrape request
fn metrics_response(request: &str, path: &str) -> String {
    let requested = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default();

    if requested != path {
        let body = "not found\n";
        return format!(
            "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
    }

    let metrics_output = prometheus::TextEncoder::new()
        .encode_to_string(&prometheus::gather())
        .unwrap_or_default();

    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
        metrics_output.len(),
        metrics_output
    )
}

/// Start the Prometheus metrics HTTP server
async fn start_metrics_server(port: u16, path: String) -> Result<()> {
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = port, path = %path, "Metrics server listening");

    let path = Arc::new(path);
    loop {
        let (mut socket, _) = listener.accept().await?;
        let path = path.clone();

        tokio::spawn(async move {
            let mut buf = [0; 1024];
            let n = socket.read(&mut buf).await.unwrap_or(0);
            let request = String::from_utf8_lossy(&buf[..n]);

            let response = metrics_response(&request, &path);
            let _ = socket.write_all(response.as_bytes()).await;
        });
    }
}

/// Resolve once Ctrl+C or SIGTERM arrives
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(&cli.log_level, cli.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), "interruptd starting");

    // Load configuration
    let mut config = if cli.config.exists() {
        Config::from_file(&cli.config)
            .with_context(|| format!("Failed to load config from {:?}", cli.config))?
    } else {
        warn!(path = ?cli.config, "Config file not found, using defaults");
        Config::default()
    };

    // Apply CLI overrides
    if cli.dry_run {
        config.dry_run = true;
    }

    // Validate configuration
    config.validate().context("Invalid configuration")?;

    info!(
        dry_run = config.dry_run,
        queue = %config.queue.name,
        max_concurrent_messages = config.max_concurrent_messages,
        "Configuration loaded"
    );

    // Setup shutdown signal handler
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // Run single reconciliation if --once flag is set
    if cli.once {
        info!("Running single reconciliation (--once mode)");
        let (scheduler, _) = build_scheduler(&config).await?;
        let summary = scheduler
            .run_once(&shutdown_rx)
            .await
            .context("Reconciliation failed")?;
        info!(
            received = summary.received,
            deleted = summary.deleted,
            handled = summary.handled,
            "Single reconciliation complete"
        );
        return Ok(());
    }

    // Run main loop
    run(config, shutdown_rx).await
}
