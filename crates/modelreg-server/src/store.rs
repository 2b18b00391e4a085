use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use modelreg_common::RegistryError;
use modelreg_meta::{MetaStore, WatchStream};

use crate::record::{ModelRecord, Versioned};

/// Upper bound on compare-and-swap retries for a single-record update.
pub(crate) const MAX_CAS_ATTEMPTS: usize = 32;

const MODELS_ROOT: &str = "/models/";

pub(crate) fn models_prefix(tenant: &str) -> String {
    format!("{MODELS_ROOT}{tenant}/")
}

pub(crate) fn model_key(tenant: &str, id: &str) -> String {
    format!("/models/{tenant}/{id}")
}

fn sequence_key(tenant: &str) -> String {
    format!("/sequences/{tenant}/models")
}

pub(crate) fn storage_config_key(tenant: &str) -> String {
    format!("/storage_configs/{tenant}")
}

pub(crate) fn hf_repos_prefix(tenant: &str) -> String {
    format!("/hf_repos/{tenant}/")
}

pub(crate) fn hf_repo_key(tenant: &str, name: &str) -> String {
    format!("/hf_repos/{tenant}/{name}")
}

/// Typed JSON view over a [`MetaStore`].
#[derive(Clone)]
pub struct RegistryStore {
    meta: Arc<dyn MetaStore>,
}

impl RegistryStore {
    pub fn new(meta: Arc<dyn MetaStore>) -> Self {
        Self { meta }
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<Versioned<T>>, RegistryError> {
        let Some((raw, revision)) = self.meta.get(key).await? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&raw)?;
        Ok(Some(Versioned { value, revision }))
    }

    /// Lists every decodable value under `prefix`; undecodable entries are
    /// skipped with a warning.
    pub(crate) async fn list_json<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<Versioned<T>>, RegistryError> {
        let kvs = self.meta.list_prefix(prefix).await?;
        let mut out = Vec::with_capacity(kvs.len());
        for kv in kvs {
            match serde_json::from_slice::<T>(&kv.value) {
                Ok(value) => out.push(Versioned {
                    value,
                    revision: kv.revision,
                }),
                Err(e) => tracing::warn!(key=%kv.key, error=%e, "skipping undecodable record"),
            }
        }
        Ok(out)
    }

    /// Create-if-absent. `false` when the key already exists.
    pub(crate) async fn create_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<bool, RegistryError> {
        let raw = serde_json::to_vec(value)?;
        let (ok, _) = self.meta.compare_and_swap(key, 0, raw).await?;
        Ok(ok)
    }

    /// Writes only if the key is still at `revision`; returns the new revision.
    pub(crate) async fn swap_json<T: Serialize>(
        &self,
        key: &str,
        revision: u64,
        value: &T,
    ) -> Result<Option<u64>, RegistryError> {
        let raw = serde_json::to_vec(value)?;
        let (ok, rev) = self.meta.compare_and_swap(key, revision, raw).await?;
        Ok(ok.then_some(rev))
    }

    pub(crate) async fn delete_at(&self, key: &str, revision: u64) -> Result<bool, RegistryError> {
        Ok(self.meta.compare_and_delete(key, revision).await?)
    }

    pub async fn get_model(
        &self,
        tenant: &str,
        id: &str,
    ) -> Result<Option<Versioned<ModelRecord>>, RegistryError> {
        self.get_json(&model_key(tenant, id)).await
    }

    /// All of a tenant's models in creation order.
    pub async fn list_models(
        &self,
        tenant: &str,
    ) -> Result<Vec<Versioned<ModelRecord>>, RegistryError> {
        let mut models: Vec<Versioned<ModelRecord>> =
            self.list_json(&models_prefix(tenant)).await?;
        models.sort_by_key(|m| m.value.seq);
        Ok(models)
    }

    /// Models of every tenant, unordered.
    pub async fn list_all_models(&self) -> Result<Vec<Versioned<ModelRecord>>, RegistryError> {
        self.list_json(MODELS_ROOT).await
    }

    pub async fn insert_model(&self, record: &ModelRecord) -> Result<bool, RegistryError> {
        self.create_json(&model_key(&record.tenant_id, &record.id), record)
            .await
    }

    pub async fn swap_model(
        &self,
        record: &ModelRecord,
        revision: u64,
    ) -> Result<Option<u64>, RegistryError> {
        self.swap_json(&model_key(&record.tenant_id, &record.id), revision, record)
            .await
    }

    pub async fn remove_model(
        &self,
        tenant: &str,
        id: &str,
        revision: u64,
    ) -> Result<bool, RegistryError> {
        self.delete_at(&model_key(tenant, id), revision).await
    }

    pub async fn watch_models(&self, tenant: &str) -> Result<WatchStream, RegistryError> {
        Ok(self.meta.watch_prefix(&models_prefix(tenant), None).await?)
    }

    /// Allocates the next creation sequence number for `tenant`.
    pub async fn next_seq(&self, tenant: &str) -> Result<u64, RegistryError> {
        let key = sequence_key(tenant);
        for _ in 0..MAX_CAS_ATTEMPTS {
            let (next, revision) = match self.get_json::<u64>(&key).await? {
                Some(current) => (current.value + 1, current.revision),
                None => (1, 0),
            };
            if self.swap_json(&key, revision, &next).await?.is_some() {
                return Ok(next);
            }
        }
        Err(RegistryError::Unavailable(format!(
            "sequence counter for tenant {tenant:?} is contended"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelreg_common::{LoadingStatus, SourceRepository};
    use modelreg_meta::MemoryMetaStore;

    fn store() -> RegistryStore {
        RegistryStore::new(Arc::new(MemoryMetaStore::new()))
    }

    #[tokio::test]
    async fn test_next_seq_is_monotonic_per_tenant() {
        let store = store();
        assert_eq!(store.next_seq("t0").await.unwrap(), 1);
        assert_eq!(store.next_seq("t0").await.unwrap(), 2);
        assert_eq!(store.next_seq("t1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_seq_allocation_is_unique() {
        let store = store();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.next_seq("t0").await.unwrap() }));
        }
        let mut seqs = Vec::new();
        for h in handles {
            seqs.push(h.await.unwrap());
        }
        seqs.sort_unstable();
        assert_eq!(seqs, (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_list_models_sorted_by_seq() {
        let store = store();
        for (id, seq) in [("b", 2), ("a", 3), ("c", 1)] {
            let rec = ModelRecord::new(
                "t0",
                id,
                seq,
                0,
                SourceRepository::ObjectStore,
                LoadingStatus::Requested,
            );
            assert!(store.insert_model(&rec).await.unwrap());
        }
        let ids: Vec<_> = store
            .list_models("t0")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.value.id)
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }
}
