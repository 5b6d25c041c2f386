//! Storefront commerce service

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::{build_app, AppConfig, AppState, EventPublisher, MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env().context("invalid configuration")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.as_str().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    tracing::info!(?config, "configuration loaded");

    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(url) => {
            let pg = PgStore::connect(url, config.db_max_connections).await.context("failed to connect to database")?;
            pg.migrate().await.context("failed to apply migrations")?;
            tracing::info!("database ready");
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store, data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let nats = match config.nats_url.as_deref() {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => {
                tracing::info!(%url, "connected to NATS");
                Some(client)
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "NATS unavailable; events will not be published");
                None
            }
        },
        None => None,
    };
    let publisher = EventPublisher::new(nats, config.nats_subject_prefix.clone());

    let addr = config.bind_addr;
    let app = build_app(AppState::new(store, config, publisher));
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "storefront listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
