use serde::{Deserialize, Serialize};

/// Where the loader fetches a model from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceRepository {
    #[default]
    Unspecified,
    ObjectStore,
    HuggingFace,
    Ollama,
    FineTuning,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    #[default]
    Unspecified,
    Gguf,
    HuggingFace,
    NvidiaTriton,
    Ollama,
}

/// Loading lifecycle of a model.
///
/// `requested -> loading -> {succeeded, failed}`, `failed -> requested` on
/// retry and `loading -> requested` when a claim's lease runs out.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LoadingStatus {
    #[default]
    Unspecified,
    Requested,
    Loading,
    Succeeded,
    Failed,
}

impl LoadingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadingStatus::Unspecified => "unspecified",
            LoadingStatus::Requested => "requested",
            LoadingStatus::Loading => "loading",
            LoadingStatus::Succeeded => "succeeded",
            LoadingStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LoadingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStatus {
    #[default]
    Unspecified,
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AdapterType {
    #[default]
    Unspecified,
    Lora,
    Qlora,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuantizationType {
    #[default]
    Unspecified,
    Gguf,
    Awq,
}

/// Runtime hints attached to a model. Stored and echoed, never interpreted
/// by the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_gpus: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,

    /// Extra launch arguments for the inference runtime.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,

    /// Clusters allowed to serve this model; empty means any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_allocation: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&SourceRepository::ObjectStore).unwrap(),
            "\"object_store\""
        );
        assert_eq!(
            serde_json::from_str::<LoadingStatus>("\"succeeded\"").unwrap(),
            LoadingStatus::Succeeded
        );
        assert_eq!(LoadingStatus::Loading.to_string(), "loading");
    }

    #[test]
    fn test_model_config_skips_empty_fields() {
        let cfg = ModelConfig {
            replicas: Some(2),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&cfg).unwrap(), serde_json::json!({"replicas": 2}));
    }
}
