use modelreg_common::{
    ActivationStatus, BaseModel, CreateBaseModelRequest, GetBaseModelPathResponse,
    GetModelPathResponse, LoadingStatus, ModelAttributes, ModelFormat, RegisterModelRequest,
    RegisterModelResponse, RegistryError, SourceRepository,
};

use crate::lifecycle::Transition;
use crate::manager::ModelManager;
use crate::record::ModelRecord;
use crate::registry::fine_tuned_model_id;

/// Storage location of a model under the tenant's prefix.
pub fn derive_path(prefix: &str, tenant: &str, project_id: Option<&str>, model_id: &str) -> String {
    match project_id.filter(|p| !p.is_empty()) {
        Some(project) => format!("{prefix}/{tenant}/{project}/{model_id}"),
        None => format!("{prefix}/{tenant}/{model_id}"),
    }
}

fn require_id(id: &str) -> Result<(), RegistryError> {
    if id.is_empty() {
        Err(RegistryError::invalid_argument("id is required"))
    } else {
        Ok(())
    }
}

impl ModelManager {
    /// Stored path, or one derived from the storage config.
    async fn resolve_path(&self, rec: &ModelRecord) -> Result<String, RegistryError> {
        if let Some(path) = rec.path.as_ref().filter(|p| !p.is_empty()) {
            return Ok(path.clone());
        }
        let config = self
            .find_storage_config(&rec.tenant_id)
            .await?
            .ok_or_else(|| RegistryError::not_found("storage config not found"))?;
        Ok(derive_path(
            &config.path_prefix,
            &rec.tenant_id,
            rec.project_id.as_deref(),
            &rec.id,
        ))
    }

    async fn load_succeeded(&self, tenant: &str, id: &str) -> Result<ModelRecord, RegistryError> {
        require_id(id)?;
        match self.store.get_model(tenant, id).await? {
            Some(m) if m.value.is_succeeded() => Ok(m.value),
            _ => Err(RegistryError::not_found(format!("model {id:?} not found"))),
        }
    }

    pub async fn get_model_path(
        &self,
        tenant: &str,
        id: &str,
    ) -> Result<GetModelPathResponse, RegistryError> {
        let rec = self.load_succeeded(tenant, id).await?;
        Ok(GetModelPathResponse {
            path: self.resolve_path(&rec).await?,
        })
    }

    pub async fn get_base_model_path(
        &self,
        tenant: &str,
        id: &str,
    ) -> Result<GetBaseModelPathResponse, RegistryError> {
        let rec = self.load_succeeded(tenant, id).await?;
        if !rec.is_base_model {
            return Err(RegistryError::not_found(format!("base model {id:?} not found")));
        }
        Ok(GetBaseModelPathResponse {
            formats: rec.effective_formats(),
            path: self.resolve_path(&rec).await?,
            gguf_model_path: rec.gguf_model_path.clone(),
        })
    }

    pub async fn get_model_attributes(
        &self,
        tenant: &str,
        id: &str,
    ) -> Result<ModelAttributes, RegistryError> {
        let rec = self.load_succeeded(tenant, id).await?;
        let Some(base_model) = rec.base_model_id.clone().filter(|_| !rec.is_base_model) else {
            return Err(RegistryError::failed_precondition(format!(
                "{id:?} is a base model and has no attributes"
            )));
        };
        Ok(ModelAttributes {
            path: self.resolve_path(&rec).await?,
            base_model,
            adapter: rec.adapter,
            quantization: rec.quantization,
        })
    }

    /// Records a derived model whose artifact already exists. It starts out
    /// loaded but unpublished.
    pub async fn register_model(
        &self,
        tenant: &str,
        req: RegisterModelRequest,
    ) -> Result<RegisterModelResponse, RegistryError> {
        let explicit_id = req.id.filter(|id| !id.is_empty());
        let suffix = req.suffix.filter(|s| !s.is_empty());
        if explicit_id.is_none() && suffix.is_none() {
            return Err(RegistryError::invalid_argument("id or suffix is required"));
        }
        if req.base_model.is_empty() {
            return Err(RegistryError::invalid_argument("base_model is required"));
        }
        if req.organization_id.is_empty() {
            return Err(RegistryError::invalid_argument("organization_id is required"));
        }
        if req.project_id.is_empty() {
            return Err(RegistryError::invalid_argument("project_id is required"));
        }
        match self.store.get_model(tenant, &req.base_model).await? {
            Some(base) if base.value.is_base_model => {}
            _ => {
                return Err(RegistryError::invalid_argument(format!(
                    "base model {:?} not found",
                    req.base_model
                )))
            }
        }

        let mut record = ModelRecord::new(
            tenant,
            "",
            0,
            self.now_secs(),
            SourceRepository::FineTuning,
            LoadingStatus::Succeeded,
        );
        record.is_base_model = false;
        record.base_model_id = Some(req.base_model.clone());
        record.organization_id = Some(req.organization_id);
        record.project_id = Some(req.project_id);
        record.adapter = req.adapter;
        record.quantization = req.quantization;
        record.activation_status = ActivationStatus::Inactive;

        let path = req.path.filter(|p| !p.is_empty());
        let prefix = match path {
            Some(_) => None,
            None => Some(
                self.find_storage_config(tenant)
                    .await?
                    .ok_or_else(|| RegistryError::not_found("storage config not found"))?
                    .path_prefix,
            ),
        };
        let place = |rec: &mut ModelRecord| {
            rec.path = match &prefix {
                Some(prefix) => Some(derive_path(
                    prefix,
                    &rec.tenant_id,
                    rec.project_id.as_deref(),
                    &rec.id,
                )),
                None => path.clone(),
            };
        };

        let record = match explicit_id {
            Some(id) => self.insert_derived(record, &id, false, place).await?,
            None => {
                let id = fine_tuned_model_id(&req.base_model, &suffix.unwrap_or_default());
                self.insert_derived(record, &id, true, place).await?
            }
        };
        let id = record.id;
        let path = record.path.unwrap_or_default();
        tracing::info!(tenant, model_id = %id, base_model_id = %req.base_model, path = %path, "model registered");
        Ok(RegisterModelResponse { id, path })
    }

    /// Records a base model the worker has loaded on its own, or completes the
    /// claimed load of an existing one.
    pub async fn create_base_model(
        &self,
        tenant: &str,
        req: CreateBaseModelRequest,
    ) -> Result<BaseModel, RegistryError> {
        require_id(&req.id)?;
        if req.path.is_empty() {
            return Err(RegistryError::invalid_argument("path is required"));
        }
        let formats = if req.formats.is_empty() {
            vec![ModelFormat::Gguf]
        } else {
            req.formats.clone()
        };
        let gguf_model_path = req.gguf_model_path.clone().filter(|p| !p.is_empty());
        if formats.contains(&ModelFormat::Gguf) && gguf_model_path.is_none() {
            return Err(RegistryError::invalid_argument(
                "gguf_model_path is required for the gguf format",
            ));
        }

        let fill = |rec: &mut ModelRecord| {
            rec.path = Some(req.path.clone());
            rec.formats = formats.clone();
            rec.gguf_model_path = gguf_model_path.clone();
            rec.activation_status = if rec.auto_activate {
                ActivationStatus::Active
            } else {
                ActivationStatus::Inactive
            };
        };

        if self.store.get_model(tenant, &req.id).await?.is_none() {
            let mut record = ModelRecord::new(
                tenant,
                &req.id,
                self.store.next_seq(tenant).await?,
                self.now_secs(),
                req.source_repository,
                LoadingStatus::Succeeded,
            );
            record.published = true;
            record.auto_activate = true;
            fill(&mut record);
            if self.store.insert_model(&record).await? {
                tracing::info!(tenant, model_id = %record.id, "base model created");
                return Ok(record.to_base_view());
            }
        }

        let record = self
            .update_model(tenant, &req.id, |rec| {
                if !rec.is_base_model {
                    return Err(RegistryError::failed_precondition(format!(
                        "{:?} is not a base model",
                        rec.id
                    )));
                }
                match rec.loading_status {
                    LoadingStatus::Succeeded => Err(RegistryError::already_exists(format!(
                        "base model {:?} already exists",
                        rec.id
                    ))),
                    LoadingStatus::Loading => {
                        rec.apply(Transition::Succeed)?;
                        fill(rec);
                        Ok(true)
                    }
                    status => Err(RegistryError::failed_precondition(format!(
                        "base model {:?} is {status}",
                        rec.id
                    ))),
                }
            })
            .await?;
        tracing::info!(tenant, model_id = %record.id, "base model load completed");
        Ok(record.to_base_view())
    }
}
