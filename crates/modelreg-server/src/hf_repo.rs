use serde::{Deserialize, Serialize};

use modelreg_common::{HfModelRepo, HfModelRepoRequest, RegistryError};

use crate::manager::ModelManager;
use crate::store::hf_repo_key;

/// A hosted-hub repository that has already been downloaded as a base model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HfRepoRecord {
    pub name: String,
    pub model_id: String,
    pub created: i64,
}

impl HfRepoRecord {
    fn to_view(&self) -> HfModelRepo {
        HfModelRepo {
            name: self.name.clone(),
            model_id: self.model_id.clone(),
        }
    }
}

impl ModelManager {
    pub async fn create_hf_model_repo(
        &self,
        tenant: &str,
        req: HfModelRepoRequest,
    ) -> Result<HfModelRepo, RegistryError> {
        if req.name.is_empty() {
            return Err(RegistryError::invalid_argument("name is required"));
        }
        let record = HfRepoRecord {
            model_id: req.name.replace('/', "-"),
            name: req.name,
            created: self.now_secs(),
        };
        if !self
            .store
            .create_json(&hf_repo_key(tenant, &record.name), &record)
            .await?
        {
            return Err(RegistryError::already_exists(format!(
                "hf repo {:?} already exists",
                record.name
            )));
        }
        tracing::info!(tenant, repo = %record.name, model_id = %record.model_id, "hf repo recorded");
        Ok(record.to_view())
    }

    pub async fn get_hf_model_repo(
        &self,
        tenant: &str,
        name: &str,
    ) -> Result<HfModelRepo, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::invalid_argument("name is required"));
        }
        self.store
            .get_json::<HfRepoRecord>(&hf_repo_key(tenant, name))
            .await?
            .map(|r| r.value.to_view())
            .ok_or_else(|| RegistryError::not_found(format!("hf repo {name:?} not found")))
    }
}
