use modelreg_common::{CreateStorageConfigRequest, RegistryError, StorageConfig};

use crate::manager::ModelManager;
use crate::store::storage_config_key;

impl ModelManager {
    /// Initialises the tenant's storage config. Only the first caller wins.
    pub async fn create_storage_config(
        &self,
        tenant: &str,
        req: CreateStorageConfigRequest,
    ) -> Result<StorageConfig, RegistryError> {
        let path_prefix = req.path_prefix.trim_end_matches('/').to_string();
        if path_prefix.is_empty() {
            return Err(RegistryError::invalid_argument("path_prefix is required"));
        }

        let config = StorageConfig { path_prefix };
        if !self
            .store
            .create_json(&storage_config_key(tenant), &config)
            .await?
        {
            return Err(RegistryError::already_exists(format!(
                "storage config for tenant {tenant:?} already exists"
            )));
        }
        tracing::info!(tenant, path_prefix = %config.path_prefix, "storage config created");
        Ok(config)
    }

    pub async fn get_storage_config(&self, tenant: &str) -> Result<StorageConfig, RegistryError> {
        self.find_storage_config(tenant)
            .await?
            .ok_or_else(|| RegistryError::not_found("storage config not found"))
    }

    pub(crate) async fn find_storage_config(
        &self,
        tenant: &str,
    ) -> Result<Option<StorageConfig>, RegistryError> {
        Ok(self
            .store
            .get_json::<StorageConfig>(&storage_config_key(tenant))
            .await?
            .map(|c| c.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::testing::{manager, TENANT};

    fn request(prefix: &str) -> CreateStorageConfigRequest {
        CreateStorageConfigRequest {
            path_prefix: prefix.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let m = manager();
        assert!(matches!(
            m.get_storage_config(TENANT).await.unwrap_err(),
            RegistryError::NotFound(_)
        ));
        assert!(matches!(
            m.create_storage_config(TENANT, request("")).await.unwrap_err(),
            RegistryError::InvalidArgument(_)
        ));

        let created = m.create_storage_config(TENANT, request("s3-models/")).await.unwrap();
        assert_eq!(created.path_prefix, "s3-models");
        assert_eq!(m.get_storage_config(TENANT).await.unwrap(), created);

        assert!(matches!(
            m.create_storage_config(TENANT, request("other")).await.unwrap_err(),
            RegistryError::AlreadyExists(_)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_init_has_one_winner() {
        let m = manager();
        let mut handles = Vec::new();
        for i in 0..8 {
            let m = m.clone();
            handles.push(tokio::spawn(async move {
                m.create_storage_config(TENANT, request(&format!("prefix-{i}")))
                    .await
            }));
        }
        let mut winners = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => winners += 1,
                Err(e) => assert!(matches!(e, RegistryError::AlreadyExists(_))),
            }
        }
        assert_eq!(winners, 1);
    }
}
