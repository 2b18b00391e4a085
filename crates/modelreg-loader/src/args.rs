use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::worker::WorkerConfig;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Base URL of the registry's internal worker API.
    #[arg(long, env = "MODELREG_WORKER_URL", default_value = "http://127.0.0.1:8082")]
    pub server_url: String,

    #[arg(long, env = "MODELREG_TOKEN")]
    pub token: Option<String>,

    /// Reported on claims; a random id is used when unset.
    #[arg(long, env = "MODELREG_WORKER_ID")]
    pub worker_id: Option<String>,

    /// Local mirror of the object store and model hubs.
    #[arg(long, env = "MODELREG_SOURCE_ROOT", default_value = "/var/lib/modelreg/source")]
    pub source_root: PathBuf,

    /// Root under which storage paths handed out by the registry live.
    #[arg(long, env = "MODELREG_DEST_ROOT", default_value = "/var/lib/modelreg/models")]
    pub dest_root: PathBuf,

    #[arg(long, default_value_t = 500)]
    pub poll_min_ms: u64,

    #[arg(long, default_value_t = 10_000)]
    pub poll_max_ms: u64,

    /// Interval of progress reports, which also renew the claim's lease.
    #[arg(long, default_value_t = 60_000)]
    pub status_interval_ms: u64,

    /// Long-poll duration per acquire.
    #[arg(long, default_value_t = 10_000)]
    pub wait_ms: u64,

    /// Only load base models.
    #[arg(long)]
    pub base_models_only: bool,

    /// Process at most one job, then exit.
    #[arg(long)]
    pub once: bool,

    #[arg(long, env = "MODELREG_OTLP_URL")]
    pub otlp_url: Option<String>,

    #[arg(long, env = "MODELREG_OTLP_TOKEN")]
    pub otlp_token: Option<String>,
}

impl Args {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            worker_id: self
                .worker_id
                .clone()
                .unwrap_or_else(|| format!("loader-{}", uuid::Uuid::new_v4().simple())),
            source_root: self.source_root.clone(),
            dest_root: self.dest_root.clone(),
            poll_min: Duration::from_millis(self.poll_min_ms.max(1)),
            poll_max: Duration::from_millis(self.poll_max_ms.max(self.poll_min_ms.max(1))),
            status_interval: Duration::from_millis(self.status_interval_ms.max(100)),
            wait_ms: self.wait_ms,
            base_models_only: self.base_models_only,
        }
    }
}
