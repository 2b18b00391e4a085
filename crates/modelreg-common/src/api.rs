//! Request and response bodies of the public registry API and the internal
//! worker API.

use serde::{Deserialize, Serialize};

use crate::model::{
    ActivationStatus, AdapterType, LoadingStatus, ModelConfig, ModelFormat, QuantizationType,
    SourceRepository,
};

pub const LIST_OBJECT: &str = "list";
pub const MODEL_OBJECT: &str = "model";
pub const BASE_MODEL_OBJECT: &str = "basemodel";

/// Body of every successful mutation that has nothing to return.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Empty {}

/// A model as seen by API callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub id: String,
    pub object: String,
    /// Unix seconds.
    pub created: i64,
    pub owned_by: String,
    pub loading_status: LoadingStatus,
    pub source_repository: SourceRepository,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loading_failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default)]
    pub is_base_model: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formats: Vec<ModelFormat>,
    #[serde(default)]
    pub activation_status: ActivationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ModelConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListModelsQuery {
    #[serde(default)]
    pub include_loading_models: bool,
    /// Id of the last model of the previous page.
    #[serde(default)]
    pub after: Option<String>,
    /// Page size; `0` or absent selects the server default.
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListModelsResponse {
    pub object: String,
    pub data: Vec<Model>,
    pub has_more: bool,
    pub total_items: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetModelQuery {
    #[serde(default)]
    pub include_loading_model: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetModelRequest {
    pub id: String,
    #[serde(default)]
    pub include_loading_model: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteModelResponse {
    pub id: String,
    pub object: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateModelRequest {
    /// Explicit id for a base model, e.g. a hub repository name.
    pub id: Option<String>,
    pub source_repository: SourceRepository,
    pub is_fine_tuned_model: bool,
    pub base_model_id: Option<String>,
    pub suffix: Option<String>,
    pub model_file_location: Option<String>,
    pub config: Option<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BaseModel {
    pub id: String,
    pub object: String,
    pub created: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListBaseModelsResponse {
    pub object: String,
    pub data: Vec<BaseModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    pub path_prefix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateStorageConfigRequest {
    #[serde(default)]
    pub path_prefix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterModelRequest {
    pub id: Option<String>,
    pub base_model: String,
    pub suffix: Option<String>,
    pub organization_id: String,
    pub project_id: String,
    pub adapter: AdapterType,
    pub quantization: QuantizationType,
    /// Where the artifact already lives; derived from the storage config
    /// when absent.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterModelResponse {
    pub id: String,
    pub path: String,
}

/// Request addressing a single model by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelIdRequest {
    #[serde(default)]
    pub id: String,
}

pub type PublishModelRequest = ModelIdRequest;
pub type GetModelPathRequest = ModelIdRequest;
pub type GetModelAttributesRequest = ModelIdRequest;
pub type GetBaseModelPathRequest = ModelIdRequest;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetModelPathResponse {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelAttributes {
    pub path: String,
    pub base_model: String,
    pub adapter: AdapterType,
    pub quantization: QuantizationType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateBaseModelRequest {
    pub id: String,
    pub path: String,
    pub formats: Vec<ModelFormat>,
    pub gguf_model_path: Option<String>,
    pub source_repository: SourceRepository,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetBaseModelPathResponse {
    pub formats: Vec<ModelFormat>,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gguf_model_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HfModelRepoRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HfModelRepo {
    pub name: String,
    pub model_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquireRequest {
    /// Long-poll for up to this many milliseconds when nothing is claimable.
    pub wait_ms: Option<u64>,
    /// Free-form identity of the worker, recorded on the claim.
    pub worker_id: Option<String>,
}

/// A claimed model, or `{}` when nothing was available.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AcquireUnloadedModelResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_base_model: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_repository: Option<SourceRepository>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_file_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_expires_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AcquireUnloadedBaseModelResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_repository: Option<SourceRepository>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_file_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_expires_at_ms: Option<u64>,
}

/// Outcome reported by a worker, `{"success": {..}}` or `{"failure": {..}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadingResult {
    Success(LoadSuccess),
    Failure(LoadFailure),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoadSuccess {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub formats: Vec<ModelFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gguf_model_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadFailure {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateLoadingStatusRequest {
    pub id: String,
    pub is_base_model: Option<bool>,
    pub loading_result: Option<LoadingResult>,
    /// Progress note while loading; also renews the claim's lease.
    pub status_message: Option<String>,
    pub claim_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loading_result_is_tagged() {
        let req: UpdateLoadingStatusRequest = serde_json::from_value(serde_json::json!({
            "id": "m0",
            "loading_result": {"failure": {"reason": "disk full"}}
        }))
        .unwrap();
        assert_eq!(
            req.loading_result,
            Some(LoadingResult::Failure(LoadFailure {
                reason: "disk full".to_string()
            }))
        );

        let success = LoadingResult::Success(LoadSuccess::default());
        assert_eq!(
            serde_json::to_value(&success).unwrap(),
            serde_json::json!({"success": {}})
        );
    }

    #[test]
    fn test_empty_acquire_response_is_empty_object() {
        let resp = AcquireUnloadedModelResponse::default();
        assert_eq!(serde_json::to_string(&resp).unwrap(), "{}");
        assert_eq!(serde_json::to_string(&Empty::default()).unwrap(), "{}");
    }
}
