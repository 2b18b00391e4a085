use clap::Parser;
use tokio_util::sync::CancellationToken;

use modelreg_loader::args::Args;
use modelreg_loader::{Loader, WorkerClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let otel_guard = modelreg_common::telemetry::init_tracing(
        "modelreg-loader",
        args.otlp_url.as_deref(),
        args.otlp_token.as_deref(),
    );

    let client = WorkerClient::new(&args.server_url, args.token.clone())?;
    let loader = Loader::new(client, args.worker_config());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down");
            on_signal.cancel();
        }
    });

    let res = loader.run(cancel, args.once).await;

    if let Some(provider) = otel_guard {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "failed to flush traces");
        }
    }
    res
}
