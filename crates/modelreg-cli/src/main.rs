mod args;
mod client;
mod output;

use anyhow::{Context, Result};
use clap::Parser;

use modelreg_common::{CreateModelRequest, SourceRepository};

use crate::args::{Args, BaseModelCommand, Command, ModelCommand, StorageConfigCommand};
use crate::client::RegistryClient;
use crate::output::{print_base_models, print_model, print_models, print_storage_config};

fn parse_source(raw: &str) -> Result<SourceRepository> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .with_context(|| format!("unknown source repository {raw:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = RegistryClient::new(&args.server_url, &args.internal_url, args.token);

    match args.command {
        Command::Models { subcommand } => match subcommand {
            ModelCommand::List { all, after, limit } => {
                let list = client.list_models(all, after.as_deref(), limit).await?;
                print_models(&list);
            }
            ModelCommand::Get { id, all } => {
                let model = client.get_model(&id, all).await?;
                print_model(&model);
            }
            ModelCommand::Create {
                id,
                source,
                location,
                base_model_id,
                suffix,
            } => {
                let req = CreateModelRequest {
                    is_fine_tuned_model: base_model_id.is_some(),
                    id,
                    source_repository: parse_source(&source)?,
                    base_model_id,
                    suffix,
                    model_file_location: location,
                    config: None,
                };
                let model = client.create_model(&req).await?;
                println!("✓ Model {} requested", model.id);
                print_model(&model);
            }
            ModelCommand::Delete { id } => {
                let resp = client.delete_model(&id).await?;
                println!("✓ Model {} deleted", resp.id);
            }
            ModelCommand::Activate { id } => {
                client.activate_model(&id).await?;
                println!("✓ Model {id} activated");
            }
            ModelCommand::Deactivate { id } => {
                client.deactivate_model(&id).await?;
                println!("✓ Model {id} deactivated");
            }
            ModelCommand::Retry { id } => {
                let model = client.retry_model(&id).await?;
                println!("✓ Model {} requeued ({})", model.id, model.loading_status);
            }
        },
        Command::BaseModels { subcommand } => match subcommand {
            BaseModelCommand::List => print_base_models(&client.list_base_models().await?),
        },
        Command::StorageConfig { subcommand } => match subcommand {
            StorageConfigCommand::Get => print_storage_config(&client.get_storage_config().await?),
            StorageConfigCommand::Create { path_prefix } => {
                let cfg = client.create_storage_config(path_prefix).await?;
                println!("✓ Storage config created");
                print_storage_config(&cfg);
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source() {
        assert_eq!(parse_source("hugging_face").unwrap(), SourceRepository::HuggingFace);
        assert_eq!(parse_source("object_store").unwrap(), SourceRepository::ObjectStore);
        assert!(parse_source("ftp").is_err());
    }
}
