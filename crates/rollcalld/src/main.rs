use std::sync::Arc;

use anyhow::{Context, Result};
use rollcall_core::enhance::PhotoEnhancer;
use rollcall_core::notify::{LogNotifier, Notifier};
use rollcall_store::SqliteStore;
use tracing_subscriber::EnvFilter;

mod config;
mod enhancer;
mod error;
mod imaging;
mod mailer;
mod oracle_client;
mod routes;
mod state;

use config::Config;
use state::{AppState, Backends};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env()?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        db = %config.db_path.display(),
        oracle = %config.oracle_url,
        "configuration loaded"
    );

    std::fs::create_dir_all(config.images_dir())
        .with_context(|| format!("creating {}", config.images_dir().display()))?;
    let store = Arc::new(SqliteStore::open(&config.db_path).await?);

    let oracle = Arc::new(oracle_client::HttpOracle::new(
        &config.oracle_url,
        config.oracle_timeout(),
    )?);

    let enhancer: Option<Arc<dyn PhotoEnhancer>> = match &config.enhance_api_key {
        Some(key) => {
            tracing::info!(base_url = %config.enhance_base_url, "photo enhancement enabled");
            Some(Arc::new(enhancer::LetsEnhance::new(
                &config.enhance_base_url,
                key,
                config.enhance_timeout(),
            )?))
        }
        None => {
            tracing::info!("photo enhancement disabled");
            None
        }
    };

    let notifier: Arc<dyn Notifier> = match mailer::SmtpNotifier::from_config(&config)? {
        Some(smtp) => Arc::new(smtp),
        None => {
            tracing::warn!("no SMTP host configured; notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let imaging = imaging::spawn_imaging(config.last_attendance_path(), config.label_font.as_deref())?;

    let state = AppState::new(
        &config,
        Backends {
            store,
            oracle,
            enhancer,
            notifier,
            imaging,
        },
    );
    let app = routes::router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "rollcalld ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_on(tokio::signal::ctrl_c()))
        .await?;

    tracing::info!("rollcalld shutting down");
    Ok(())
}

/// Resolves when `signal` fires. A handler that cannot be installed is logged
/// and never resolves.
async fn shutdown_on<F>(signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!(error = %e, "failed to listen for ctrl-c; graceful shutdown disabled");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_on_signal() {
        tokio::time::timeout(Duration::from_secs(1), shutdown_on(async { Ok(()) }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_signal_handler_keeps_serving() {
        let broken = async { Err(std::io::Error::new(std::io::ErrorKind::Other, "no signal driver")) };
        let waited = tokio::time::timeout(Duration::from_millis(50), shutdown_on(broken)).await;
        assert!(waited.is_err());
    }
}
