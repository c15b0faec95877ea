//! uptime-sentinel: health-probing supervisor daemon.
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │                        uptime-sentinel                        │
//!   │                                                                │
//!   │  timer ─▶ HealthProbe ─▶ FailureTracker ─▶ RestartController ──┼──▶ supervised
//!   │               │                │                               │    process
//!   │               ▼                ▼                               │
//!   │        MetricsRecorder ─▶ metrics.json      log file ◀─ tracing│
//!   │                                                                │
//!   │  signals: TERM/INT → shutdown, USR1 → status, USR2 → check     │
//!   │  admin API (optional): status / metrics / check / reset        │
//!   └──────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use uptime_sentinel::admin::{self, AdminState};
use uptime_sentinel::config::loader;
use uptime_sentinel::lifecycle::{spawn_signal_router, Shutdown, SignalEvent};
use uptime_sentinel::observability::{logging, metrics};
use uptime_sentinel::supervisor::SystemProcessControl;
use uptime_sentinel::HealthMonitor;

#[derive(Parser)]
#[command(name = "uptime-sentinel", version)]
#[command(about = "Probe a health endpoint and restart the service when it stays down", long_about = None)]
struct Args {
    /// TOML configuration file. Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = loader::load(args.config.as_deref())?;

    logging::init_logging(&config.observability, &config.files.log_file)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        health_check_url = %config.monitor.health_check_url,
        check_interval_ms = config.monitor.check_interval_ms,
        max_failures = config.monitor.max_failures,
        "uptime-sentinel starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start Prometheus exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let monitor = HealthMonitor::new(&config, Arc::new(SystemProcessControl))?;
    let monitor_task = tokio::spawn(Arc::clone(&monitor).run(shutdown.subscribe()));

    let admin_task = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(Arc::clone(&monitor), &config.admin.api_key);
        Some(tokio::spawn(admin::serve(listener, state, shutdown.subscribe())))
    } else {
        None
    };

    let (tx, mut events) = mpsc::channel(8);
    let _signals = spawn_signal_router(tx)?;

    while let Some(event) = events.recv().await {
        match event {
            SignalEvent::Shutdown => break,
            SignalEvent::StatusDump => match serde_json::to_string_pretty(&monitor.status()) {
                Ok(json) => {
                    println!("Current status:\n{}", json);
                    tracing::info!("Status dumped");
                }
                Err(e) => tracing::error!(error = %e, "Failed to encode status"),
            },
            SignalEvent::ForceCheck => {
                monitor.trigger_check();
            }
        }
    }

    shutdown.trigger();
    monitor_task.await?;
    if let Some(task) = admin_task {
        task.await??;
    }

    Ok(())
}
