use serde::{Deserialize, Serialize};

use modelreg_common::{
    ActivationStatus, AdapterType, BaseModel, LoadingStatus, Model, ModelConfig, ModelFormat,
    QuantizationType, SourceRepository, BASE_MODEL_OBJECT, MODEL_OBJECT,
};

/// A worker's exclusive right to load a model until `lease_expires_at_ms`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claim {
    pub claim_id: String,
    #[serde(default)]
    pub worker_id: Option<String>,
    pub claimed_at_ms: u64,
    pub lease_expires_at_ms: u64,
}

/// Stored form of a base or derived model, one per `(tenant_id, id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelRecord {
    pub id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    pub seq: u64,
    pub created: i64,

    pub is_base_model: bool,
    #[serde(default)]
    pub base_model_id: Option<String>,
    pub source_repository: SourceRepository,
    #[serde(default)]
    pub model_file_location: Option<String>,

    #[serde(default)]
    pub formats: Vec<ModelFormat>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub gguf_model_path: Option<String>,
    #[serde(default)]
    pub adapter: AdapterType,
    #[serde(default)]
    pub quantization: QuantizationType,

    pub loading_status: LoadingStatus,
    #[serde(default)]
    pub loading_failure_reason: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub claim: Option<Claim>,
    #[serde(default)]
    pub load_attempts: u32,

    #[serde(default)]
    pub activation_status: ActivationStatus,
    #[serde(default)]
    pub auto_activate: bool,
    #[serde(default)]
    pub published: bool,

    #[serde(default)]
    pub config: Option<ModelConfig>,

    /// Bumped each time a derived model is attached to this base.
    #[serde(default)]
    pub dependent_links: u64,
}

impl ModelRecord {
    /// A fresh record with every optional attribute unset.
    pub fn new(
        tenant_id: &str,
        id: &str,
        seq: u64,
        created: i64,
        source_repository: SourceRepository,
        loading_status: LoadingStatus,
    ) -> Self {
        Self {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            organization_id: None,
            project_id: None,
            seq,
            created,
            is_base_model: true,
            base_model_id: None,
            source_repository,
            model_file_location: None,
            formats: Vec::new(),
            path: None,
            gguf_model_path: None,
            adapter: AdapterType::Unspecified,
            quantization: QuantizationType::Unspecified,
            loading_status,
            loading_failure_reason: None,
            status_message: None,
            claim: None,
            load_attempts: 0,
            activation_status: ActivationStatus::Unspecified,
            auto_activate: false,
            published: false,
            config: None,
            dependent_links: 0,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.loading_status == LoadingStatus::Succeeded
    }

    /// Whether the public surface may show this record.
    pub fn is_visible(&self, include_loading: bool) -> bool {
        self.published && (include_loading || self.is_succeeded())
    }

    /// `requested`, or `loading` whose lease has run out.
    pub fn is_claimable(&self, now_ms: u64) -> bool {
        match self.loading_status {
            LoadingStatus::Requested => true,
            LoadingStatus::Loading => self.lease_expired(now_ms),
            _ => false,
        }
    }

    pub fn lease_expired(&self, now_ms: u64) -> bool {
        self.loading_status == LoadingStatus::Loading
            && self
                .claim
                .as_ref()
                .map(|c| c.lease_expires_at_ms <= now_ms)
                .unwrap_or(true)
    }

    pub fn claim_id(&self) -> Option<&str> {
        self.claim.as_ref().map(|c| c.claim_id.as_str())
    }

    /// Formats as reported to callers. A GGUF path without formats is GGUF.
    pub fn effective_formats(&self) -> Vec<ModelFormat> {
        if self.formats.is_empty() && self.gguf_model_path.is_some() {
            return vec![ModelFormat::Gguf];
        }
        self.formats.clone()
    }

    pub fn to_view(&self) -> Model {
        Model {
            id: self.id.clone(),
            object: MODEL_OBJECT.to_string(),
            created: self.created,
            owned_by: if self.is_base_model { "system" } else { "user" }.to_string(),
            loading_status: self.loading_status,
            source_repository: self.source_repository,
            loading_failure_reason: self.loading_failure_reason.clone(),
            status_message: self.status_message.clone(),
            is_base_model: self.is_base_model,
            base_model_id: self.base_model_id.clone(),
            formats: self.effective_formats(),
            activation_status: self.activation_status,
            config: self.config.clone(),
        }
    }

    pub fn to_base_view(&self) -> BaseModel {
        BaseModel {
            id: self.id.clone(),
            object: BASE_MODEL_OBJECT.to_string(),
            created: self.created,
        }
    }
}

/// A decoded value together with the store revision it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub revision: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: LoadingStatus) -> ModelRecord {
        ModelRecord::new("t0", "m0", 1, 0, SourceRepository::HuggingFace, status)
    }

    #[test]
    fn test_visibility() {
        let mut rec = record(LoadingStatus::Loading);
        assert!(!rec.is_visible(true));

        rec.published = true;
        assert!(rec.is_visible(true));
        assert!(!rec.is_visible(false));

        rec.loading_status = LoadingStatus::Succeeded;
        assert!(rec.is_visible(false));
    }

    #[test]
    fn test_claimable_after_lease_expiry() {
        let mut rec = record(LoadingStatus::Loading);
        rec.claim = Some(Claim {
            claim_id: "c0".to_string(),
            worker_id: None,
            claimed_at_ms: 1_000,
            lease_expires_at_ms: 5_000,
        });
        assert!(!rec.is_claimable(4_999));
        assert!(rec.is_claimable(5_000));
        assert!(record(LoadingStatus::Requested).is_claimable(0));
        assert!(!record(LoadingStatus::Failed).is_claimable(u64::MAX));
    }

    #[test]
    fn test_gguf_path_implies_gguf_format() {
        let mut rec = record(LoadingStatus::Succeeded);
        rec.gguf_model_path = Some("/m/model.gguf".to_string());
        assert_eq!(rec.to_view().formats, vec![ModelFormat::Gguf]);
    }
}
