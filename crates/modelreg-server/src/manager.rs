use std::sync::Arc;

use modelreg_common::RegistryError;
use modelreg_meta::MetaStore;

use crate::clock::{Clock, SystemClock};
use crate::record::ModelRecord;
use crate::store::{RegistryStore, MAX_CAS_ATTEMPTS};

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How long a claim stays valid without a status update.
    pub lease_ms: u64,
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Cap on the long-poll wait of acquire calls.
    pub max_acquire_wait_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            lease_ms: 10 * 60 * 1000,
            default_page_size: 50,
            max_page_size: 500,
            max_acquire_wait_ms: 30_000,
        }
    }
}

/// Model registry, storage configs and the loading coordinator over one
/// metadata store. Operations live in the `registry`, `gate`,
/// `storage_config`, `coordinator`, `resolver` and `hf_repo` modules.
#[derive(Clone)]
pub struct ModelManager {
    pub(crate) store: RegistryStore,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: ManagerConfig,
}

impl ModelManager {
    pub fn new(meta: Arc<dyn MetaStore>, config: ManagerConfig) -> Self {
        Self::with_clock(meta, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        meta: Arc<dyn MetaStore>,
        config: ManagerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store: RegistryStore::new(meta),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub(crate) fn now_secs(&self) -> i64 {
        self.clock.now_secs()
    }

    /// Read-modify-write of one record under compare-and-swap, retried on
    /// conflict. `mutate` returns `Ok(false)` to leave the record untouched.
    pub(crate) async fn update_model<F>(
        &self,
        tenant: &str,
        id: &str,
        mut mutate: F,
    ) -> Result<ModelRecord, RegistryError>
    where
        F: FnMut(&mut ModelRecord) -> Result<bool, RegistryError>,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .store
                .get_model(tenant, id)
                .await?
                .ok_or_else(|| RegistryError::not_found(format!("model {id:?} not found")))?;

            let mut next = current.value.clone();
            if !mutate(&mut next)? {
                return Ok(current.value);
            }
            if self
                .store
                .swap_model(&next, current.revision)
                .await?
                .is_some()
            {
                return Ok(next);
            }
            tracing::debug!(tenant, model_id = id, "model update conflicted, retrying");
        }
        Err(RegistryError::Unavailable(format!(
            "model {id:?} is being modified concurrently"
        )))
    }
}
