//! Hands unloaded models to workers and records what they report back.
//!
//! A claim is a compare-and-swap of the record from `requested` (or from
//! `loading` with a lapsed lease) to `loading`. A worker that loses the race
//! moves on to the next candidate, so no model is ever handed out twice
//! under a live lease.

use std::collections::HashSet;
use std::time::Duration;

use tokio_stream::StreamExt;
use uuid::Uuid;

use modelreg_common::{
    AcquireRequest, AcquireUnloadedBaseModelResponse, AcquireUnloadedModelResponse,
    ActivationStatus, Empty, LoadingResult, LoadingStatus, RegistryError, StorageConfig,
    UpdateLoadingStatusRequest,
};

use crate::lifecycle::Transition;
use crate::manager::ModelManager;
use crate::record::{Claim, ModelRecord};
use crate::resolver::derive_path;

/// Longest a long-polling acquire sleeps before rescanning for lapsed leases.
const LONG_POLL_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquireScope {
    AnyModel,
    BaseModelsOnly,
}

#[derive(Debug, Clone)]
struct ClaimedModel {
    record: ModelRecord,
    dest_path: String,
}

impl ClaimedModel {
    fn lease_expires_at_ms(&self) -> Option<u64> {
        self.record.claim.as_ref().map(|c| c.lease_expires_at_ms)
    }
}

impl ModelManager {
    pub async fn acquire_unloaded_model(
        &self,
        tenant: &str,
        req: AcquireRequest,
    ) -> Result<AcquireUnloadedModelResponse, RegistryError> {
        let Some(claimed) = self.acquire(tenant, AcquireScope::AnyModel, req).await? else {
            return Ok(AcquireUnloadedModelResponse::default());
        };
        Ok(AcquireUnloadedModelResponse {
            lease_expires_at_ms: claimed.lease_expires_at_ms(),
            claim_id: claimed.record.claim_id().map(str::to_string),
            model_id: Some(claimed.record.id),
            is_base_model: Some(claimed.record.is_base_model),
            source_repository: Some(claimed.record.source_repository),
            model_file_location: claimed.record.model_file_location,
            dest_path: Some(claimed.dest_path),
        })
    }

    pub async fn acquire_unloaded_base_model(
        &self,
        tenant: &str,
        req: AcquireRequest,
    ) -> Result<AcquireUnloadedBaseModelResponse, RegistryError> {
        let Some(claimed) = self
            .acquire(tenant, AcquireScope::BaseModelsOnly, req)
            .await?
        else {
            return Ok(AcquireUnloadedBaseModelResponse::default());
        };
        Ok(AcquireUnloadedBaseModelResponse {
            lease_expires_at_ms: claimed.lease_expires_at_ms(),
            claim_id: claimed.record.claim_id().map(str::to_string),
            base_model_id: Some(claimed.record.id),
            source_repository: Some(claimed.record.source_repository),
            model_file_location: claimed.record.model_file_location,
            dest_path: Some(claimed.dest_path),
        })
    }

    async fn acquire(
        &self,
        tenant: &str,
        scope: AcquireScope,
        req: AcquireRequest,
    ) -> Result<Option<ClaimedModel>, RegistryError> {
        let storage = self
            .find_storage_config(tenant)
            .await?
            .ok_or_else(|| RegistryError::not_found("storage config not found"))?;
        let worker_id = req.worker_id.filter(|w| !w.is_empty());
        let wait_ms = req
            .wait_ms
            .unwrap_or(0)
            .min(self.config.max_acquire_wait_ms);

        if wait_ms == 0 {
            return self
                .try_claim(tenant, scope, &storage, worker_id.as_deref())
                .await;
        }

        // Subscribe before scanning so that a write landing between the scan
        // and the wait still wakes us up.
        let mut events = self.store.watch_models(tenant).await?;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(wait_ms);
        loop {
            if let Some(claimed) = self
                .try_claim(tenant, scope, &storage, worker_id.as_deref())
                .await?
            {
                return Ok(Some(claimed));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let step = (deadline - now).min(LONG_POLL_TICK);
            match tokio::time::timeout(step, events.next()).await {
                Ok(Some(_)) | Err(_) => {}
                Ok(None) => tokio::time::sleep(step).await,
            }
        }
    }

    /// One pass over the tenant's queue in creation order.
    async fn try_claim(
        &self,
        tenant: &str,
        scope: AcquireScope,
        storage: &StorageConfig,
        worker_id: Option<&str>,
    ) -> Result<Option<ClaimedModel>, RegistryError> {
        let now = self.now_ms();
        let models = self.store.list_models(tenant).await?;
        let loaded_bases: HashSet<&str> = models
            .iter()
            .filter(|m| m.value.is_base_model && m.value.is_succeeded())
            .map(|m| m.value.id.as_str())
            .collect();

        for candidate in &models {
            let rec = &candidate.value;
            if scope == AcquireScope::BaseModelsOnly && !rec.is_base_model {
                continue;
            }
            if !rec.is_claimable(now) {
                continue;
            }
            if !rec.is_base_model
                && !rec
                    .base_model_id
                    .as_deref()
                    .is_some_and(|b| loaded_bases.contains(b))
            {
                continue;
            }

            let mut next = rec.clone();
            let previous_claim = next.claim_id().map(str::to_string);
            if next.lease_expired(now) {
                next.apply(Transition::ExpireLease)?;
            }
            next.apply(Transition::Claim)?;
            next.claim = Some(Claim {
                claim_id: format!("claim-{}", Uuid::new_v4()),
                worker_id: worker_id.map(str::to_string),
                claimed_at_ms: now,
                lease_expires_at_ms: now.saturating_add(self.config.lease_ms),
            });
            next.load_attempts = next.load_attempts.saturating_add(1);

            if self
                .store
                .swap_model(&next, candidate.revision)
                .await?
                .is_none()
            {
                tracing::debug!(tenant, model_id = %rec.id, "lost claim race, trying next candidate");
                continue;
            }

            if let Some(previous) = previous_claim {
                tracing::warn!(tenant, model_id = %next.id, claim_id = %previous, "lease expired, model reclaimed");
            }
            tracing::info!(
                tenant,
                model_id = %next.id,
                claim_id = next.claim_id().unwrap_or_default(),
                worker_id = worker_id.unwrap_or_default(),
                attempt = next.load_attempts,
                "model claimed"
            );
            let dest_path = derive_path(
                &storage.path_prefix,
                tenant,
                next.project_id.as_deref(),
                &next.id,
            );
            return Ok(Some(ClaimedModel {
                record: next,
                dest_path,
            }));
        }
        Ok(None)
    }

    pub async fn update_model_loading_status(
        &self,
        tenant: &str,
        req: UpdateLoadingStatusRequest,
    ) -> Result<Empty, RegistryError> {
        self.update_loading_status(tenant, req, false).await
    }

    pub async fn update_base_model_loading_status(
        &self,
        tenant: &str,
        req: UpdateLoadingStatusRequest,
    ) -> Result<Empty, RegistryError> {
        self.update_loading_status(tenant, req, true).await
    }

    async fn update_loading_status(
        &self,
        tenant: &str,
        req: UpdateLoadingStatusRequest,
        base_only: bool,
    ) -> Result<Empty, RegistryError> {
        if req.id.is_empty() {
            return Err(RegistryError::invalid_argument("id is required"));
        }
        let message = req.status_message.clone().filter(|m| !m.is_empty());
        match &req.loading_result {
            None if message.is_none() => {
                return Err(RegistryError::invalid_argument(
                    "loading_result or status_message is required",
                ));
            }
            Some(LoadingResult::Failure(f)) if f.reason.is_empty() => {
                return Err(RegistryError::invalid_argument("failure reason is required"));
            }
            _ => {}
        }

        let now = self.now_ms();
        let lease_ms = self.config.lease_ms;
        let record = self
            .update_model(tenant, &req.id, |rec| {
                if base_only && !rec.is_base_model {
                    return Err(RegistryError::invalid_argument(format!(
                        "{:?} is not a base model",
                        rec.id
                    )));
                }
                if req.is_base_model.is_some_and(|b| b != rec.is_base_model) {
                    return Err(RegistryError::invalid_argument(format!(
                        "is_base_model does not match model {:?}",
                        rec.id
                    )));
                }
                if let Some(claim_id) = req.claim_id.as_deref().filter(|c| !c.is_empty()) {
                    if rec.claim_id() != Some(claim_id) {
                        tracing::warn!(tenant, model_id = %rec.id, claim_id, "rejecting report from stale claim");
                        return Err(RegistryError::failed_precondition(format!(
                            "claim {claim_id:?} no longer holds model {:?}",
                            rec.id
                        )));
                    }
                }

                match &req.loading_result {
                    Some(LoadingResult::Success(success)) => {
                        rec.apply(Transition::Succeed)?;
                        if let Some(path) = success.path.as_ref().filter(|p| !p.is_empty()) {
                            rec.path = Some(path.clone());
                        }
                        if !success.formats.is_empty() {
                            rec.formats = success.formats.clone();
                        }
                        if let Some(gguf) = success.gguf_model_path.as_ref().filter(|p| !p.is_empty()) {
                            rec.gguf_model_path = Some(gguf.clone());
                        }
                        rec.activation_status = if rec.auto_activate {
                            ActivationStatus::Active
                        } else {
                            ActivationStatus::Inactive
                        };
                        rec.status_message = message.clone();
                    }
                    Some(LoadingResult::Failure(failure)) => {
                        rec.apply(Transition::Fail)?;
                        rec.loading_failure_reason = Some(failure.reason.clone());
                        rec.status_message = message.clone();
                    }
                    None => {
                        if rec.loading_status != LoadingStatus::Loading {
                            return Err(RegistryError::failed_precondition(format!(
                                "model {:?} is {}, not loading",
                                rec.id, rec.loading_status
                            )));
                        }
                        rec.status_message = message.clone();
                        if let Some(claim) = rec.claim.as_mut() {
                            claim.lease_expires_at_ms = now.saturating_add(lease_ms);
                        }
                    }
                }
                Ok(true)
            })
            .await?;

        match record.loading_status {
            LoadingStatus::Succeeded => {
                tracing::info!(tenant, model_id = %record.id, activation = ?record.activation_status, "model loaded")
            }
            LoadingStatus::Failed => tracing::warn!(
                tenant,
                model_id = %record.id,
                reason = record.loading_failure_reason.as_deref().unwrap_or_default(),
                "model load failed"
            ),
            _ => tracing::debug!(tenant, model_id = %record.id, message = ?record.status_message, "load progress"),
        }
        Ok(Empty::default())
    }

    /// Requeues every `loading` record whose lease has lapsed, across all
    /// tenants. Returns how many were requeued.
    pub async fn expire_stale_claims(&self) -> Result<usize, RegistryError> {
        let now = self.now_ms();
        let mut expired = 0;
        for candidate in self.store.list_all_models().await? {
            if !candidate.value.lease_expired(now) {
                continue;
            }
            let mut next = candidate.value.clone();
            let previous = next.claim_id().unwrap_or_default().to_string();
            next.apply(Transition::ExpireLease)?;
            // A conflict means the record moved on since the scan.
            if self
                .store
                .swap_model(&next, candidate.revision)
                .await?
                .is_some()
            {
                tracing::warn!(
                    tenant = %next.tenant_id,
                    model_id = %next.id,
                    claim_id = %previous,
                    "lease expired, model requeued"
                );
                expired += 1;
            }
        }
        Ok(expired)
    }
}

/// Periodically runs [`ModelManager::expire_stale_claims`].
pub async fn lease_sweep_loop(manager: ModelManager, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match manager.expire_stale_claims().await {
            Ok(0) => {}
            Ok(n) => tracing::info!(expired = n, "lease sweep requeued models"),
            Err(e) => tracing::error!(error = %e, "lease sweep failed"),
        }
    }
}
