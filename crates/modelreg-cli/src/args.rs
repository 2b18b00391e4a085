use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "modelreg")]
#[command(about = "Model registry CLI", long_about = None)]
pub struct Args {
    /// Public registry API
    #[arg(long, env = "MODELREG_URL", default_value = "http://127.0.0.1:8080")]
    pub server_url: String,

    /// Internal worker API, used for storage configuration
    #[arg(long, env = "MODELREG_WORKER_URL", default_value = "http://127.0.0.1:8082")]
    pub internal_url: String,

    /// API token (Authorization: Bearer)
    #[arg(long, env = "MODELREG_TOKEN")]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Model management
    Models {
        #[command(subcommand)]
        subcommand: ModelCommand,
    },
    /// Base models ready for use
    BaseModels {
        #[command(subcommand)]
        subcommand: BaseModelCommand,
    },
    /// Tenant storage configuration
    StorageConfig {
        #[command(subcommand)]
        subcommand: StorageConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ModelCommand {
    /// List models
    List {
        /// Include models that are not loaded yet
        #[arg(long)]
        all: bool,
        #[arg(long)]
        after: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    Get {
        id: String,
        #[arg(long)]
        all: bool,
    },
    /// Request a model to be loaded
    Create {
        /// Model id; generated when omitted
        #[arg(long)]
        id: Option<String>,
        /// object_store, hugging_face or ollama
        #[arg(long, default_value = "hugging_face")]
        source: String,
        /// Source location, e.g. s3://bucket/path
        #[arg(long)]
        location: Option<String>,
        /// Request a fine-tuned model of this base
        #[arg(long)]
        base_model_id: Option<String>,
        #[arg(long)]
        suffix: Option<String>,
    },
    Delete {
        id: String,
    },
    Activate {
        id: String,
    },
    Deactivate {
        id: String,
    },
    /// Requeue a failed model
    Retry {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum BaseModelCommand {
    List,
}

#[derive(Debug, Subcommand)]
pub enum StorageConfigCommand {
    Get,
    /// Set the tenant's path prefix (once)
    Create {
        path_prefix: String,
    },
}
