use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Public registry API.
    #[arg(long, env = "MODELREG_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Internal worker API.
    #[arg(long, env = "MODELREG_INTERNAL_ADDR", default_value = "0.0.0.0:8082")]
    pub internal_listen_addr: String,

    /// etcd endpoint. Without one, state lives in memory and is lost on exit.
    #[arg(long, env = "ETCD_ENDPOINT")]
    pub etcd_endpoint: Option<String>,

    /// Lease granted to a worker per claim, renewed by status updates.
    #[arg(long, env = "MODELREG_LEASE_MS", default_value_t = 600_000)]
    pub lease_ms: u64,

    #[arg(long, env = "MODELREG_SWEEP_INTERVAL_MS", default_value_t = 30_000)]
    pub sweep_interval_ms: u64,

    #[arg(long, default_value_t = 50)]
    pub default_page_size: u32,

    #[arg(long, default_value_t = 500)]
    pub max_page_size: u32,

    /// Tenant of callers when auth is disabled or a token names no tenant.
    #[arg(long, env = "MODELREG_DEFAULT_TENANT", default_value = "default")]
    pub default_tenant: String,

    /// OTLP/HTTP endpoint for trace export.
    #[arg(long, env = "MODELREG_OTLP_URL")]
    pub otlp_url: Option<String>,

    #[arg(long, env = "MODELREG_OTLP_TOKEN")]
    pub otlp_token: Option<String>,
}
