// Eloquas API server entry point.
//
// Startup sequence:
// 1. Load config (.env, config/app.toml, config/credentials.toml)
// 2. Initialize tracing from RUST_LOG or [logging]
// 3. Open database, purge expired sessions
// 4. Build the application context (LLM, search and integration clients)
// 5. Spawn the email queue worker
// 6. Serve HTTP until Ctrl+C
// 7. Stop the worker and exit

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use eloquas_core::config::{self, LoggingConfig};
use eloquas_core::db::Database;
use eloquas_sales::queue;
use eloquas_server::routes::routes;
use eloquas_server::state::AppContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = config::load_config().context("failed to load configuration")?;

    // 2. Initialize tracing
    init_tracing(&config.logging)?;
    info!("Eloquas starting up");

    // 3. Open database
    let db_path = config.database_path().context("failed to resolve database path")?;
    let db_path = db_path.to_string_lossy().into_owned();
    let db = Arc::new(Database::open(&db_path).context("failed to open database")?);
    info!("Database opened at {db_path}");
    match db.purge_expired_sessions(Utc::now()) {
        Ok(0) => {}
        Ok(n) => info!("Purged {n} expired sessions"),
        Err(e) => warn!("Session purge failed: {e:#}"),
    }

    // 4. Build the application context
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    let ctx = Arc::new(AppContext::from_config(config, Arc::clone(&db)).context("failed to build application context")?);

    // 5. Spawn the email queue worker
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(queue::run_worker(
        Arc::clone(&db),
        Arc::clone(&ctx.mailer),
        ctx.config.queue.clone(),
        shutdown_rx,
    ));

    // 6. Serve until Ctrl+C
    let mut server_shutdown = shutdown_tx.subscribe();
    let (bound, server) = warp::serve(routes(Arc::clone(&ctx)))
        .try_bind_with_graceful_shutdown(addr, async move {
            let _ = server_shutdown.changed().await;
        })
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{bound}");
    let server = tokio::spawn(server);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {e}");
    }
    info!("Shutdown requested");

    // 7. Cleanup
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(10), async {
        let _ = server.await;
        let _ = worker.await;
    })
    .await;

    info!("Eloquas shut down cleanly");
    Ok(())
}

/// Log to stdout, or to `[logging] file` when set. `RUST_LOG` wins over the
/// configured filter.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true);

    match logging.file.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
        Some(path) => {
            let path = std::path::Path::new(path);
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let subscriber = builder.with_writer(std::sync::Mutex::new(file)).with_ansi(false).finish();
            tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;
        }
        None => {
            let subscriber = builder.finish();
            tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;
        }
    }

    Ok(())
}
