use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;

use services::{
    identity::SupabaseIdentity, object_store::s3::S3ObjectStore, storage_gateway::StorageGateway,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting file-gateway with config: {:?}", cfg);

    // --- Object store + bucket provisioning ---
    let store = S3ObjectStore::new(&cfg.store);
    let gateway = StorageGateway::new(Arc::new(store));
    gateway
        .ensure_bucket()
        .await
        .context("bucket provisioning failed")?;
    tracing::info!("Bucket {} is ready", gateway.bucket());

    // --- Identity provider ---
    let identity = SupabaseIdentity::new(
        &cfg.identity.supabase_url,
        &cfg.identity.supabase_anon_key,
    )
    .context("building identity client")?;

    let state = state::AppState {
        gateway,
        policy: Arc::new(cfg.upload_policy()),
        identity: Arc::new(identity),
        default_presign_expiry_secs: cfg.presign_expiry_secs,
    };

    // --- Build router ---
    let app: Router = routes::routes::routes(state);

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
