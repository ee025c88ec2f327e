use anyhow::{Context, Result};
use facedesk_core::OnnxExtractor;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod registry;
mod server;
mod sms;
mod store;

use config::Config;
use engine::EngineHandle;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facedeskd starting");

    let config = Config::load()?;
    tracing::info!(
        bind = %config.bind_addr,
        static_dir = %config.static_dir.display(),
        upload_dir = %config.upload_dir.display(),
        model_dir = %config.model_dir.display(),
        workers = config.engine_workers,
        sms_configured = config.sms.account_sid.is_some(),
        "configuration loaded"
    );

    // Models load on the main thread so a bad install is reported once at startup.
    let model_dir = config.model_dir.clone();
    let engine = match engine::spawn_engine(config.engine_workers, || OnnxExtractor::load(&model_dir))
    {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(
                error = %e,
                model_dir = %model_dir.display(),
                "face models unavailable; registry builds and recognition will fail"
            );
            EngineHandle::unavailable(e.to_string())
        }
    };

    let state = server::AppState::new(&config, engine)?;
    let app = server::create_app(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "facedeskd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facedeskd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
