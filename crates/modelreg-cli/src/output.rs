use modelreg_common::{ListBaseModelsResponse, ListModelsResponse, Model, StorageConfig};

pub fn print_models(list: &ListModelsResponse) {
    println!("\n=== Models ===\n");
    if list.data.is_empty() {
        println!("No models found.");
        return;
    }
    println!(
        "{:<40} {:<12} {:<10} {:<14} {:<10}",
        "ID", "Status", "Active", "Source", "Base"
    );
    println!("{:-<90}", "");
    for m in &list.data {
        println!(
            "{:<40} {:<12} {:<10} {:<14} {:<10}",
            m.id,
            m.loading_status.as_str(),
            format!("{:?}", m.activation_status).to_lowercase(),
            format!("{:?}", m.source_repository),
            if m.is_base_model { "yes" } else { "no" }
        );
    }
    println!(
        "\n{} shown, {} total{}",
        list.data.len(),
        list.total_items,
        if list.has_more {
            format!(", more after {}", list.data.last().map(|m| m.id.as_str()).unwrap_or(""))
        } else {
            String::new()
        }
    );
    println!();
}

pub fn print_model(m: &Model) {
    println!("\n=== Model Detail ===\n");
    println!("  ID:          {}", m.id);
    println!("  Owned by:    {}", m.owned_by);
    println!("  Created:     {}", m.created);
    println!("  Status:      {}", m.loading_status);
    println!("  Activation:  {:?}", m.activation_status);
    println!("  Source:      {:?}", m.source_repository);
    if let Some(base) = &m.base_model_id {
        println!("  Base model:  {base}");
    }
    if !m.formats.is_empty() {
        println!("  Formats:     {:?}", m.formats);
    }
    if let Some(reason) = &m.loading_failure_reason {
        println!("  Failure:     {reason}");
    }
    if let Some(msg) = &m.status_message {
        println!("  Message:     {msg}");
    }
    println!();
}

pub fn print_base_models(list: &ListBaseModelsResponse) {
    println!("\n=== Base Models ===\n");
    if list.data.is_empty() {
        println!("No base models found.");
        return;
    }
    println!("{:<50} {:<12}", "ID", "Created");
    println!("{:-<64}", "");
    for m in &list.data {
        println!("{:<50} {:<12}", m.id, m.created);
    }
    println!();
}

pub fn print_storage_config(cfg: &StorageConfig) {
    println!("Path prefix: {}", cfg.path_prefix);
}
