use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use kitbook::notify::NotifyHub;
use kitbook::scheduler::Scheduler;
use kitbook::{maintenance, wire};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("KITBOOK_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    kitbook::observability::init(metrics_port);

    let port = std::env::var("KITBOOK_PORT").unwrap_or_else(|_| "7411".into());
    let bind = std::env::var("KITBOOK_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("KITBOOK_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let token = std::env::var("KITBOOK_TOKEN").unwrap_or_else(|_| "kitbook".into());
    let max_connections: usize = std::env::var("KITBOOK_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(256);
    let compact_threshold: u64 = std::env::var("KITBOOK_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    // How long ended reservations stay queryable before the reaper prunes
    // them. Default one week.
    let retention_ms: i64 = std::env::var("KITBOOK_RETENTION_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(7 * 24 * 3_600_000);

    std::fs::create_dir_all(&data_dir)?;
    let journal_path = PathBuf::from(&data_dir).join("ledger.journal");

    let notify = Arc::new(NotifyHub::new());
    let scheduler = Arc::new(Scheduler::new(journal_path, notify)?);
    let semaphore = Arc::new(Semaphore::new(max_connections));

    tokio::spawn(maintenance::run_reaper(scheduler.clone(), retention_ms));
    tokio::spawn(maintenance::run_compactor(
        scheduler.clone(),
        compact_threshold,
    ));

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("kitbook listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  max_connections: {max_connections}");
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!(
            "http://0.0.0.0:{p}/metrics"
        ))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(kitbook::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(kitbook::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(kitbook::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let scheduler = scheduler.clone();
                let token = token.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, scheduler, token).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(kitbook::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("kitbook stopped");
    Ok(())
}
