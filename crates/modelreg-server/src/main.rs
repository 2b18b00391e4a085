mod args;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use modelreg_meta::{EtcdMetaStore, MemoryMetaStore, MetaStore};
use modelreg_server::{
    build_internal_router, build_public_router, lease_sweep_loop, AppState, ManagerConfig,
    ModelManager,
};

use crate::args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let otel_guard = modelreg_common::telemetry::init_tracing(
        "modelreg-server",
        args.otlp_url.as_deref(),
        args.otlp_token.as_deref(),
    );

    let meta: Arc<dyn MetaStore> = match args.etcd_endpoint.as_ref() {
        Some(endpoint) => {
            let store = EtcdMetaStore::connect(std::slice::from_ref(endpoint)).await?;
            tracing::info!(endpoint = %endpoint, "connected to etcd");
            Arc::new(store)
        }
        None => {
            tracing::warn!("no etcd endpoint configured, using in-memory store");
            Arc::new(MemoryMetaStore::new())
        }
    };

    let manager = ModelManager::new(
        meta,
        ManagerConfig {
            lease_ms: args.lease_ms,
            default_page_size: args.default_page_size,
            max_page_size: args.max_page_size,
            ..ManagerConfig::default()
        },
    );

    tokio::spawn(lease_sweep_loop(
        manager.clone(),
        Duration::from_millis(args.sweep_interval_ms.max(1)),
    ));

    let st = AppState {
        manager,
        auth: modelreg_common::auth::parse_auth_from_env(&args.default_tenant),
    };

    let public = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    let internal = tokio::net::TcpListener::bind(&args.internal_listen_addr).await?;
    tracing::info!(
        public = %args.listen_addr,
        internal = %args.internal_listen_addr,
        "modelreg-server listening"
    );

    let public_app = build_public_router(st.clone());
    let internal_app = build_internal_router(st);
    tokio::select! {
        res = axum::serve(public, public_app) => res?,
        res = axum::serve(internal, internal_app) => res?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    if let Some(provider) = otel_guard {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "failed to flush traces");
        }
    }
    Ok(())
}
