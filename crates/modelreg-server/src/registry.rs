use rand::{distributions::Alphanumeric, Rng};
use uuid::Uuid;

use modelreg_common::{
    CreateModelRequest, DeleteModelResponse, ListBaseModelsResponse, ListModelsQuery,
    ListModelsResponse, LoadingStatus, Model, RegistryError, SourceRepository, LIST_OBJECT,
    MODEL_OBJECT,
};

use crate::hf_repo::HfRepoRecord;
use crate::lifecycle::Transition;
use crate::manager::ModelManager;
use crate::record::ModelRecord;
use crate::scope::Scope;
use crate::store::{hf_repo_key, hf_repos_prefix, MAX_CAS_ATTEMPTS};

const FINE_TUNED_ID_ATTEMPTS: usize = 8;

pub(crate) fn random_tail() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

pub(crate) fn fine_tuned_model_id(base_model_id: &str, suffix: &str) -> String {
    format!("ft:{}:{}", base_model_id.replace('/', "-"), suffix)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl ModelManager {
    pub async fn list_models<'a>(
        &self,
        scope: impl Into<Scope<'a>>,
        query: ListModelsQuery,
    ) -> Result<ListModelsResponse, RegistryError> {
        let scope = scope.into();
        let limit = match query.limit {
            None | Some(0) => self.config.default_page_size,
            Some(n) if n > self.config.max_page_size => {
                return Err(RegistryError::invalid_argument(format!(
                    "limit must be at most {}",
                    self.config.max_page_size
                )));
            }
            Some(n) => n,
        } as usize;

        let all: Vec<_> = self
            .store
            .list_models(scope.tenant)
            .await?
            .into_iter()
            .filter(|m| scope.admits(&m.value))
            .collect();

        // The cursor may have become invisible since it was handed out, so it
        // is resolved against every record in scope rather than the visible page.
        let after_seq = match non_empty(query.after) {
            Some(after) => Some(
                all.iter()
                    .find(|m| m.value.id == after)
                    .map(|m| m.value.seq)
                    .ok_or_else(|| {
                        RegistryError::invalid_argument(format!("unknown cursor {after:?}"))
                    })?,
            ),
            None => None,
        };

        let visible: Vec<ModelRecord> = all
            .into_iter()
            .map(|m| m.value)
            .filter(|m| m.is_visible(query.include_loading_models))
            .collect();

        let start = after_seq
            .map(|seq| visible.partition_point(|m| m.seq <= seq))
            .unwrap_or(0);
        let end = visible.len().min(start.saturating_add(limit));

        Ok(ListModelsResponse {
            object: LIST_OBJECT.to_string(),
            data: visible[start..end].iter().map(ModelRecord::to_view).collect(),
            has_more: end < visible.len(),
            total_items: visible.len() as u64,
        })
    }

    /// A model visible on the public surface; hidden records are `NotFound`.
    pub async fn get_model<'a>(
        &self,
        scope: impl Into<Scope<'a>>,
        id: &str,
        include_loading: bool,
    ) -> Result<Model, RegistryError> {
        let scope = scope.into();
        if id.is_empty() {
            return Err(RegistryError::invalid_argument("id is required"));
        }
        match self.store.get_model(scope.tenant, id).await? {
            Some(m) if m.value.is_visible(include_loading) && scope.admits(&m.value) => {
                Ok(m.value.to_view())
            }
            _ => Err(RegistryError::not_found(format!("model {id:?} not found"))),
        }
    }

    pub async fn delete_model<'a>(
        &self,
        scope: impl Into<Scope<'a>>,
        id: &str,
    ) -> Result<DeleteModelResponse, RegistryError> {
        let scope = scope.into();
        let tenant = scope.tenant;
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .store
                .get_model(tenant, id)
                .await?
                .filter(|m| scope.admits(&m.value))
                .ok_or_else(|| RegistryError::not_found(format!("model {id:?} not found")))?;

            if current.value.is_base_model {
                let dependents: Vec<String> = self
                    .store
                    .list_models(tenant)
                    .await?
                    .into_iter()
                    .filter(|m| m.value.base_model_id.as_deref() == Some(id))
                    .map(|m| m.value.id)
                    .collect();
                if !dependents.is_empty() {
                    return Err(RegistryError::failed_precondition(format!(
                        "base model {id:?} is still used by {}",
                        dependents.join(", ")
                    )));
                }
            }

            if !self.store.remove_model(tenant, id, current.revision).await? {
                continue;
            }

            if current.value.is_base_model {
                self.forget_hf_repos_of(tenant, id).await?;
            }
            tracing::info!(tenant, model_id = id, status = %current.value.loading_status, "model deleted");
            return Ok(DeleteModelResponse {
                id: id.to_string(),
                object: MODEL_OBJECT.to_string(),
                deleted: true,
            });
        }
        Err(RegistryError::Unavailable(format!(
            "model {id:?} is being modified concurrently"
        )))
    }

    /// Drops the hub repository records that resolved to `model_id`, so the
    /// repository can be downloaded again.
    async fn forget_hf_repos_of(&self, tenant: &str, model_id: &str) -> Result<(), RegistryError> {
        let repos = self
            .store
            .list_json::<HfRepoRecord>(&hf_repos_prefix(tenant))
            .await?;
        for repo in repos.into_iter().filter(|r| r.value.model_id == model_id) {
            let key = hf_repo_key(tenant, &repo.value.name);
            if self.store.delete_at(&key, repo.revision).await? {
                tracing::info!(tenant, repo = %repo.value.name, model_id, "hf repo record removed");
            }
        }
        Ok(())
    }

    pub async fn create_model<'a>(
        &self,
        scope: impl Into<Scope<'a>>,
        req: CreateModelRequest,
    ) -> Result<Model, RegistryError> {
        let scope = scope.into();
        let tenant = scope.tenant;
        if req.source_repository == SourceRepository::Unspecified {
            return Err(RegistryError::invalid_argument(
                "source_repository is required",
            ));
        }

        let mut record = ModelRecord::new(
            tenant,
            "",
            0,
            self.now_secs(),
            req.source_repository,
            LoadingStatus::Requested,
        );
        record.model_file_location = non_empty(req.model_file_location);
        record.config = req.config;
        record.published = true;
        record.auto_activate = true;

        if req.is_fine_tuned_model {
            if non_empty(req.id).is_some() {
                return Err(RegistryError::invalid_argument(
                    "id must not be set for a fine-tuned model",
                ));
            }
            let base_model_id = non_empty(req.base_model_id).ok_or_else(|| {
                RegistryError::invalid_argument("base_model_id is required for a fine-tuned model")
            })?;
            let suffix = non_empty(req.suffix).ok_or_else(|| {
                RegistryError::invalid_argument("suffix is required for a fine-tuned model")
            })?;
            match self.store.get_model(tenant, &base_model_id).await? {
                Some(base) if base.value.is_base_model => {}
                _ => {
                    return Err(RegistryError::invalid_argument(format!(
                        "base model {base_model_id:?} not found"
                    )))
                }
            }

            record.is_base_model = false;
            record.base_model_id = Some(base_model_id.clone());
            record.project_id = scope.project.map(str::to_string);
            let id = fine_tuned_model_id(&base_model_id, &suffix);
            let record = self.insert_derived(record, &id, true, |_| {}).await?;
            tracing::info!(
                tenant,
                model_id = %record.id,
                base_model_id = %base_model_id,
                project_id = ?record.project_id,
                "fine-tuned model requested"
            );
            Ok(record.to_view())
        } else {
            let explicit = non_empty(req.id);
            record.id = explicit
                .clone()
                .unwrap_or_else(|| format!("model-{}", Uuid::new_v4()));
            record.seq = self.store.next_seq(tenant).await?;
            if !self.store.insert_model(&record).await? {
                return Err(RegistryError::already_exists(format!(
                    "model {:?} already exists",
                    record.id
                )));
            }
            tracing::info!(tenant, model_id = %record.id, source = ?record.source_repository, "model requested");
            Ok(record.to_view())
        }
    }

    /// Inserts a derived model under `id` and links it to its base. With
    /// `retry_tail`, a taken id is retried as `{id}-{tail}`; `place` fills in
    /// whatever depends on the final id.
    pub(crate) async fn insert_derived<F>(
        &self,
        mut record: ModelRecord,
        id: &str,
        retry_tail: bool,
        place: F,
    ) -> Result<ModelRecord, RegistryError>
    where
        F: Fn(&mut ModelRecord),
    {
        record.seq = self.store.next_seq(&record.tenant_id).await?;
        record.id = id.to_string();
        let attempts = if retry_tail { FINE_TUNED_ID_ATTEMPTS } else { 1 };
        let mut inserted = false;
        for _ in 0..attempts {
            place(&mut record);
            if self.store.insert_model(&record).await? {
                inserted = true;
                break;
            }
            record.id = format!("{id}-{}", random_tail());
        }
        if !inserted {
            return Err(RegistryError::already_exists(if retry_tail {
                format!("could not allocate a unique id for {id:?}")
            } else {
                format!("model {id:?} already exists")
            }));
        }
        self.link_to_base(&record).await?;
        Ok(record)
    }

    /// Bumps the base model's revision after a dependent was inserted, so a
    /// delete of the base that scanned before the insert fails its
    /// compare-and-delete. Removes the dependent again when the base is gone.
    async fn link_to_base(&self, record: &ModelRecord) -> Result<(), RegistryError> {
        let tenant = record.tenant_id.as_str();
        let base_id = record.base_model_id.as_deref().unwrap_or_default();
        let linked = self
            .update_model(tenant, base_id, |base| {
                if !base.is_base_model {
                    return Err(RegistryError::not_found(format!(
                        "base model {base_id:?} not found"
                    )));
                }
                base.dependent_links = base.dependent_links.wrapping_add(1);
                Ok(true)
            })
            .await;
        let Err(err) = linked else {
            return Ok(());
        };

        if let Some(current) = self.store.get_model(tenant, &record.id).await? {
            self.store
                .remove_model(tenant, &record.id, current.revision)
                .await?;
        }
        tracing::warn!(tenant, model_id = %record.id, base_model_id = base_id, error = %err, "base model vanished, dependent removed");
        Err(match err {
            RegistryError::NotFound(_) => {
                RegistryError::invalid_argument(format!("base model {base_id:?} not found"))
            }
            other => other,
        })
    }

    pub async fn list_base_models(
        &self,
        tenant: &str,
    ) -> Result<ListBaseModelsResponse, RegistryError> {
        let data = self
            .store
            .list_models(tenant)
            .await?
            .into_iter()
            .filter(|m| m.value.is_base_model && m.value.is_succeeded())
            .map(|m| m.value.to_base_view())
            .collect();
        Ok(ListBaseModelsResponse {
            object: LIST_OBJECT.to_string(),
            data,
        })
    }

    /// Requeues a failed model.
    pub async fn retry_model<'a>(
        &self,
        scope: impl Into<Scope<'a>>,
        id: &str,
    ) -> Result<Model, RegistryError> {
        let scope = scope.into();
        let tenant = scope.tenant;
        let record = self
            .update_model(tenant, id, |rec| {
                if !scope.admits(rec) {
                    return Err(RegistryError::not_found(format!("model {id:?} not found")));
                }
                rec.apply(Transition::Retry)?;
                Ok(true)
            })
            .await?;
        tracing::info!(tenant, model_id = id, "failed model requeued");
        Ok(record.to_view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use modelreg_meta::{KeyValue, MemoryMetaStore, MetaStore, WatchStream};

    use crate::manager::testing::{manager, seed, TENANT};
    use crate::manager::ManagerConfig;
    use crate::store::model_key;
    use modelreg_common::HfModelRepoRequest;

    /// Removes the base model just before the first fine-tuned insert lands,
    /// the way a delete that scanned for dependents a moment earlier would.
    struct BaseDeletedBeforeInsert {
        inner: MemoryMetaStore,
        fired: AtomicBool,
    }

    #[async_trait]
    impl MetaStore for BaseDeletedBeforeInsert {
        async fn get(&self, key: &str) -> anyhow::Result<Option<(Vec<u8>, u64)>> {
            self.inner.get(key).await
        }

        async fn list_prefix(&self, prefix: &str) -> anyhow::Result<Vec<KeyValue>> {
            self.inner.list_prefix(prefix).await
        }

        async fn compare_and_swap(
            &self,
            key: &str,
            expected_revision: u64,
            value: Vec<u8>,
        ) -> anyhow::Result<(bool, u64)> {
            if expected_revision == 0
                && key.starts_with(&model_key(TENANT, "ft:"))
                && !self.fired.swap(true, Ordering::SeqCst)
            {
                let base = model_key(TENANT, "base");
                if let Some((_, rev)) = self.inner.get(&base).await? {
                    assert!(self.inner.compare_and_delete(&base, rev).await?);
                }
            }
            self.inner
                .compare_and_swap(key, expected_revision, value)
                .await
        }

        async fn compare_and_delete(&self, key: &str, expected_revision: u64) -> anyhow::Result<bool> {
            self.inner.compare_and_delete(key, expected_revision).await
        }

        async fn watch_prefix(
            &self,
            prefix: &str,
            start_revision_exclusive: Option<u64>,
        ) -> anyhow::Result<WatchStream> {
            self.inner.watch_prefix(prefix, start_revision_exclusive).await
        }
    }

    fn base_request(id: &str) -> CreateModelRequest {
        CreateModelRequest {
            id: Some(id.to_string()),
            source_repository: SourceRepository::HuggingFace,
            ..Default::default()
        }
    }

    fn fine_tuned_request(base: &str, suffix: &str) -> CreateModelRequest {
        CreateModelRequest {
            source_repository: SourceRepository::ObjectStore,
            is_fine_tuned_model: true,
            base_model_id: Some(base.to_string()),
            suffix: Some(suffix.to_string()),
            model_file_location: Some("s3://bucket/adapter".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_model_rejects_unspecified_source() {
        let m = manager();
        let err = m
            .create_model(TENANT, CreateModelRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_create_base_model_with_and_without_id() {
        let m = manager();
        let created = m
            .create_model(TENANT, base_request("meta-llama/Llama-3-8B"))
            .await
            .unwrap();
        assert_eq!(created.id, "meta-llama/Llama-3-8B");
        assert_eq!(created.loading_status, LoadingStatus::Requested);
        assert!(created.is_base_model);

        let err = m
            .create_model(TENANT, base_request("meta-llama/Llama-3-8B"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));

        let anonymous = m
            .create_model(
                TENANT,
                CreateModelRequest {
                    source_repository: SourceRepository::ObjectStore,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(anonymous.id.starts_with("model-"));
    }

    #[tokio::test]
    async fn test_create_fine_tuned_model_ids() {
        let m = manager();
        seed(&m, "org/base", None, LoadingStatus::Succeeded).await;

        let first = m
            .create_model(TENANT, fine_tuned_request("org/base", "v1"))
            .await
            .unwrap();
        assert_eq!(first.id, "ft:org-base:v1");
        assert_eq!(first.base_model_id.as_deref(), Some("org/base"));
        assert!(!first.is_base_model);

        let second = m
            .create_model(TENANT, fine_tuned_request("org/base", "v1"))
            .await
            .unwrap();
        let tail = second.id.strip_prefix("ft:org-base:v1-").unwrap();
        assert_eq!(tail.len(), 10);
        assert!(tail.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_create_fine_tuned_model_validation() {
        let m = manager();
        seed(&m, "base", None, LoadingStatus::Succeeded).await;
        seed(&m, "ft:base:x", Some("base"), LoadingStatus::Succeeded).await;

        let missing_base = m
            .create_model(TENANT, fine_tuned_request("nope", "v1"))
            .await
            .unwrap_err();
        assert!(matches!(missing_base, RegistryError::InvalidArgument(_)));

        let derived_as_base = m
            .create_model(TENANT, fine_tuned_request("ft:base:x", "v1"))
            .await
            .unwrap_err();
        assert!(matches!(derived_as_base, RegistryError::InvalidArgument(_)));

        let mut no_suffix = fine_tuned_request("base", "v1");
        no_suffix.suffix = None;
        assert!(matches!(
            m.create_model(TENANT, no_suffix).await.unwrap_err(),
            RegistryError::InvalidArgument(_)
        ));

        let mut with_id = fine_tuned_request("base", "v1");
        with_id.id = Some("mine".to_string());
        assert!(matches!(
            m.create_model(TENANT, with_id).await.unwrap_err(),
            RegistryError::InvalidArgument(_)
        ));
    }

    #[tokio::test]
    async fn test_hidden_models_are_not_found() {
        let m = manager();
        seed(&m, "loading", None, LoadingStatus::Loading).await;
        let mut unpublished = seed(&m, "unpublished", None, LoadingStatus::Requested).await;
        unpublished.published = false;
        let current = m.store.get_model(TENANT, "unpublished").await.unwrap().unwrap();
        m.store.swap_model(&unpublished, current.revision).await.unwrap();

        assert!(matches!(
            m.get_model(TENANT, "loading", false).await.unwrap_err(),
            RegistryError::NotFound(_)
        ));
        let shown = m.get_model(TENANT, "loading", true).await.unwrap();
        assert_eq!(shown.loading_status, LoadingStatus::Loading);

        assert!(matches!(
            m.get_model(TENANT, "unpublished", true).await.unwrap_err(),
            RegistryError::NotFound(_)
        ));
        assert!(matches!(
            m.get_model(TENANT, "absent", true).await.unwrap_err(),
            RegistryError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_models_pagination() {
        let m = manager();
        for i in 0..25 {
            seed(&m, &format!("m{i:02}"), None, LoadingStatus::Succeeded).await;
        }
        seed(&m, "pending", None, LoadingStatus::Requested).await;

        let mut seen = Vec::new();
        let mut after = None;
        let mut pages = 0;
        loop {
            let page = m
                .list_models(
                    TENANT,
                    ListModelsQuery {
                        include_loading_models: false,
                        after: after.clone(),
                        limit: Some(10),
                    },
                )
                .await
                .unwrap();
            pages += 1;
            assert_eq!(page.total_items, 25);
            seen.extend(page.data.iter().map(|d| d.id.clone()));
            if !page.has_more {
                assert_eq!(page.data.len(), 5);
                break;
            }
            assert_eq!(page.data.len(), 10);
            after = page.data.last().map(|d| d.id.clone());
        }
        assert_eq!(pages, 3);
        let expected: Vec<String> = (0..25).map(|i| format!("m{i:02}")).collect();
        assert_eq!(seen, expected);

        let with_loading = m
            .list_models(
                TENANT,
                ListModelsQuery {
                    include_loading_models: true,
                    after: None,
                    limit: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(with_loading.total_items, 26);
    }

    #[tokio::test]
    async fn test_list_models_rejects_bad_paging() {
        let m = manager();
        let too_big = m
            .list_models(
                TENANT,
                ListModelsQuery {
                    limit: Some(501),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(too_big, RegistryError::InvalidArgument(_)));

        let unknown_cursor = m
            .list_models(
                TENANT,
                ListModelsQuery {
                    after: Some("nope".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(unknown_cursor, RegistryError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_delete_base_model_with_dependents_is_rejected() {
        let m = manager();
        seed(&m, "base", None, LoadingStatus::Succeeded).await;
        seed(&m, "ft:base:a", Some("base"), LoadingStatus::Requested).await;

        let err = m.delete_model(TENANT, "base").await.unwrap_err();
        assert!(matches!(err, RegistryError::FailedPrecondition(_)));

        let resp = m.delete_model(TENANT, "ft:base:a").await.unwrap();
        assert!(resp.deleted);
        assert_eq!(resp.object, "model");
        m.delete_model(TENANT, "base").await.unwrap();

        assert!(matches!(
            m.delete_model(TENANT, "base").await.unwrap_err(),
            RegistryError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_base_model_forgets_hf_repo() {
        let m = manager();
        seed(&m, "org-repo", None, LoadingStatus::Succeeded).await;
        m.create_hf_model_repo(
            TENANT,
            HfModelRepoRequest {
                name: "org/repo".to_string(),
            },
        )
        .await
        .unwrap();

        m.delete_model(TENANT, "org-repo").await.unwrap();
        assert!(matches!(
            m.get_hf_model_repo(TENANT, "org/repo").await.unwrap_err(),
            RegistryError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_base_models_only_succeeded() {
        let m = manager();
        seed(&m, "b0", None, LoadingStatus::Succeeded).await;
        seed(&m, "b1", None, LoadingStatus::Loading).await;
        seed(&m, "ft:b0:x", Some("b0"), LoadingStatus::Succeeded).await;

        let resp = m.list_base_models(TENANT).await.unwrap();
        assert_eq!(resp.object, "list");
        let ids: Vec<_> = resp.data.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b0"]);
        assert_eq!(resp.data[0].object, "basemodel");
    }

    #[tokio::test]
    async fn test_retry_only_from_failed() {
        let m = manager();
        seed(&m, "ok", None, LoadingStatus::Succeeded).await;
        let mut failed = seed(&m, "bad", None, LoadingStatus::Failed).await;
        failed.loading_failure_reason = Some("boom".to_string());
        let current = m.store.get_model(TENANT, "bad").await.unwrap().unwrap();
        m.store.swap_model(&failed, current.revision).await.unwrap();

        assert!(matches!(
            m.retry_model(TENANT, "ok").await.unwrap_err(),
            RegistryError::FailedPrecondition(_)
        ));
        let retried = m.retry_model(TENANT, "bad").await.unwrap();
        assert_eq!(retried.loading_status, LoadingStatus::Requested);
        assert!(retried.loading_failure_reason.is_none());
    }

    #[tokio::test]
    async fn test_fine_tuned_model_is_rolled_back_when_base_vanishes() {
        let m = ModelManager::new(
            Arc::new(BaseDeletedBeforeInsert {
                inner: MemoryMetaStore::new(),
                fired: AtomicBool::new(false),
            }),
            ManagerConfig::default(),
        );
        m.create_model(TENANT, base_request("base")).await.unwrap();

        let err = m
            .create_model(TENANT, fine_tuned_request("base", "v1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)), "{err}");
        assert!(m.store.get_model(TENANT, "ft:base:v1").await.unwrap().is_none());
        assert!(m.store.list_models(TENANT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attaching_a_dependent_invalidates_a_scanned_base_delete() {
        let m = manager();
        seed(&m, "base", None, LoadingStatus::Succeeded).await;
        let scanned = m.store.get_model(TENANT, "base").await.unwrap().unwrap();

        m.create_model(TENANT, fine_tuned_request("base", "v1"))
            .await
            .unwrap();

        assert!(!m
            .store
            .remove_model(TENANT, "base", scanned.revision)
            .await
            .unwrap());
        assert!(matches!(
            m.delete_model(TENANT, "base").await.unwrap_err(),
            RegistryError::FailedPrecondition(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_and_base_delete_leave_no_orphan() {
        for round in 0..50 {
            let m = manager();
            seed(&m, "base", None, LoadingStatus::Succeeded).await;

            let creator = {
                let m = m.clone();
                tokio::spawn(async move {
                    m.create_model(TENANT, fine_tuned_request("base", "v1"))
                        .await
                })
            };
            let deleter = {
                let m = m.clone();
                tokio::spawn(async move { m.delete_model(TENANT, "base").await })
            };
            let created = creator.await.unwrap();
            let deleted = deleter.await.unwrap();

            let base = m.store.get_model(TENANT, "base").await.unwrap();
            let derived = m.store.get_model(TENANT, "ft:base:v1").await.unwrap();
            assert_ne!(created.is_ok(), deleted.is_ok(), "round {round}");
            if created.is_ok() {
                assert!(base.is_some(), "round {round}: base deleted under a dependent");
                assert!(derived.is_some(), "round {round}");
            } else {
                assert!(base.is_none(), "round {round}");
                assert!(derived.is_none(), "round {round}: orphaned dependent");
            }
        }
    }

    #[tokio::test]
    async fn test_project_scope_on_public_operations() {
        let m = manager();
        seed(&m, "base", None, LoadingStatus::Succeeded).await;
        let p1 = Scope::new(TENANT, Some("p1"));
        let p2 = Scope::new(TENANT, Some("p2"));

        let created = m
            .create_model(p1, fine_tuned_request("base", "v1"))
            .await
            .unwrap();
        let stored = m.store.get_model(TENANT, &created.id).await.unwrap().unwrap();
        assert_eq!(stored.value.project_id.as_deref(), Some("p1"));

        let listing = |scope: Scope<'static>| {
            m.list_models(
                scope,
                ListModelsQuery {
                    include_loading_models: true,
                    ..Default::default()
                },
            )
        };
        let seen: Vec<_> = listing(p1).await.unwrap().data.into_iter().map(|v| v.id).collect();
        assert_eq!(seen, vec!["base", "ft:base:v1"]);
        let seen: Vec<_> = listing(p2).await.unwrap().data.into_iter().map(|v| v.id).collect();
        assert_eq!(seen, vec!["base"]);

        assert!(m.get_model(p2, "base", true).await.is_ok());
        assert!(matches!(
            m.get_model(p2, "ft:base:v1", true).await.unwrap_err(),
            RegistryError::NotFound(_)
        ));
        assert!(matches!(
            m.delete_model(p2, "ft:base:v1").await.unwrap_err(),
            RegistryError::NotFound(_)
        ));
        assert!(matches!(
            m.activate_model(p2, "ft:base:v1").await.unwrap_err(),
            RegistryError::NotFound(_)
        ));

        // Tenant-wide callers see every project.
        assert!(m.get_model(TENANT, "ft:base:v1", true).await.is_ok());
        m.delete_model(p1, "ft:base:v1").await.unwrap();
    }
}
