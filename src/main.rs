use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use services::{preview_store::PreviewStore, s3_backend::S3Backend};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + init-only flag ---
    let (cfg, init_only) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting preview-store with config: {:?}", cfg);

    // --- Connect to object storage ---
    let backend = S3Backend::connect(&cfg.store).await;
    let store = PreviewStore::new(Arc::new(backend));

    // --- Make sure the bucket is there before serving ---
    store
        .initialize()
        .await
        .context("Failed to initialize storage service")?;

    if init_only {
        tracing::info!("Storage initialization complete.");
        return Ok(()); // exit after bootstrap
    }

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(store);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
