//! The loading worker: claims unloaded models, copies their artifacts into
//! the registry-assigned storage path and reports the outcome.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio_util::sync::CancellationToken;

use modelreg_common::{
    AcquireRequest, AcquireUnloadedBaseModelResponse, AcquireUnloadedModelResponse, LoadFailure,
    LoadSuccess, LoadingResult, RegistryError, SourceRepository, UpdateLoadingStatusRequest,
};

use crate::client::WorkerClient;
use crate::source::{detect_formats, install_tree, join_within, resolve_source};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
    pub poll_min: Duration,
    pub poll_max: Duration,
    pub status_interval: Duration,
    pub wait_ms: u64,
    pub base_models_only: bool,
}

/// Exponential poll delay between `min` and `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            current: min,
        }
    }

    pub fn next(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

/// A claimed model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub model_id: String,
    pub is_base_model: bool,
    pub source_repository: SourceRepository,
    pub model_file_location: Option<String>,
    pub dest_path: Option<String>,
    pub claim_id: Option<String>,
    /// Claimed through the base-model queue, so reports go there too.
    pub base_queue: bool,
}

impl Job {
    fn from_model(resp: AcquireUnloadedModelResponse) -> Option<Self> {
        Some(Self {
            model_id: resp.model_id?,
            is_base_model: resp.is_base_model.unwrap_or(false),
            source_repository: resp.source_repository.unwrap_or_default(),
            model_file_location: resp.model_file_location,
            dest_path: resp.dest_path,
            claim_id: resp.claim_id,
            base_queue: false,
        })
    }

    fn from_base_model(resp: AcquireUnloadedBaseModelResponse) -> Option<Self> {
        Some(Self {
            model_id: resp.base_model_id?,
            is_base_model: true,
            source_repository: resp.source_repository.unwrap_or_default(),
            model_file_location: resp.model_file_location,
            dest_path: resp.dest_path,
            claim_id: resp.claim_id,
            base_queue: true,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Loaded { path: String },
    Failed { reason: String },
    /// The claim was taken over by another worker; nothing was recorded.
    ClaimLost,
}

struct Copied {
    formats: Vec<modelreg_common::ModelFormat>,
    gguf: Option<PathBuf>,
    files: u64,
    bytes: u64,
}

pub struct Loader {
    client: WorkerClient,
    config: WorkerConfig,
}

impl Loader {
    pub fn new(client: WorkerClient, config: WorkerConfig) -> Self {
        Self { client, config }
    }

    pub async fn acquire(&self) -> Result<Option<Job>, RegistryError> {
        let req = AcquireRequest {
            wait_ms: Some(self.config.wait_ms).filter(|w| *w > 0),
            worker_id: Some(self.config.worker_id.clone()),
        };
        if self.config.base_models_only {
            let resp = self.client.acquire_unloaded_base_model(&req).await?;
            Ok(Job::from_base_model(resp))
        } else {
            let resp = self.client.acquire_unloaded_model(&req).await?;
            Ok(Job::from_model(resp))
        }
    }

    /// Loads one job and reports its result.
    pub async fn process(&self, job: &Job) -> Result<JobOutcome, RegistryError> {
        tracing::info!(model_id = %job.model_id, source = ?job.source_repository, "loading model");

        let copied = match self.copy_with_progress(job).await {
            Ok(Some(copied)) => copied,
            Ok(None) => return Ok(JobOutcome::ClaimLost),
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::warn!(model_id = %job.model_id, reason = %reason, "load failed");
                let result = LoadingResult::Failure(LoadFailure {
                    reason: reason.clone(),
                });
                return self
                    .finish(job, result, JobOutcome::Failed { reason })
                    .await;
            }
        };

        let path = job.dest_path.clone().unwrap_or_default();
        let gguf_model_path = copied.gguf.map(|rel| {
            format!(
                "{}/{}",
                path.trim_end_matches('/'),
                rel.to_string_lossy().replace('\\', "/")
            )
        });
        tracing::info!(
            model_id = %job.model_id,
            files = copied.files,
            bytes = copied.bytes,
            formats = ?copied.formats,
            "model copied"
        );
        let result = LoadingResult::Success(LoadSuccess {
            path: Some(path.clone()),
            formats: copied.formats,
            gguf_model_path,
        });
        self.finish(job, result, JobOutcome::Loaded { path }).await
    }

    async fn finish(
        &self,
        job: &Job,
        result: LoadingResult,
        outcome: JobOutcome,
    ) -> Result<JobOutcome, RegistryError> {
        match self.report(job, Some(result), None).await {
            Ok(()) => Ok(outcome),
            Err(RegistryError::FailedPrecondition(msg)) => {
                tracing::warn!(model_id = %job.model_id, error = %msg, "result rejected, claim no longer held");
                Ok(JobOutcome::ClaimLost)
            }
            Err(e) => Err(e),
        }
    }

    /// Copies the artifacts while sending periodic progress reports. `None`
    /// when the claim was lost mid-copy, in which case the copy is stopped
    /// and its partial output discarded.
    async fn copy_with_progress(&self, job: &Job) -> anyhow::Result<Option<Copied>> {
        let dest_path = job
            .dest_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| anyhow!("registry assigned no destination path"))?;
        let src = resolve_source(
            &self.config.source_root,
            job.model_file_location.as_deref(),
            &job.model_id,
        )?;
        let target = join_within(&self.config.dest_root, dest_path)?;

        let cancel = CancellationToken::new();
        let _stop_on_drop = cancel.clone().drop_guard();
        let copy_cancel = cancel.clone();
        let mut copy = tokio::task::spawn_blocking(move || {
            let stats = install_tree(&src, &target, &copy_cancel)?;
            let (formats, gguf) = detect_formats(&target);
            Ok::<_, anyhow::Error>(Copied {
                formats,
                gguf,
                files: stats.files,
                bytes: stats.bytes,
            })
        });

        let mut ticker = tokio::time::interval(self.config.status_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                joined = &mut copy => {
                    return joined.context("copy task panicked")?.map(Some);
                }
                _ = ticker.tick() => {
                    let message = format!("copying into {dest_path}");
                    match self.report(job, None, Some(message)).await {
                        Ok(()) => {}
                        Err(RegistryError::FailedPrecondition(msg)) => {
                            tracing::warn!(model_id = %job.model_id, error = %msg, "claim lost during copy");
                            cancel.cancel();
                            if let Ok(Ok(_)) = copy.await {
                                tracing::debug!(model_id = %job.model_id, "copy finished before it could be stopped");
                            }
                            return Ok(None);
                        }
                        Err(e) => tracing::warn!(model_id = %job.model_id, error = %e, "progress report failed"),
                    }
                }
            }
        }
    }

    async fn report(
        &self,
        job: &Job,
        loading_result: Option<LoadingResult>,
        status_message: Option<String>,
    ) -> Result<(), RegistryError> {
        let req = UpdateLoadingStatusRequest {
            id: job.model_id.clone(),
            is_base_model: Some(job.is_base_model),
            loading_result,
            status_message,
            claim_id: job.claim_id.clone(),
        };
        if job.base_queue {
            self.client.update_base_model_loading_status(&req).await?;
        } else {
            self.client.update_model_loading_status(&req).await?;
        }
        Ok(())
    }

    /// Polls for work until cancelled. With `once`, returns after the first
    /// job or the first empty poll.
    pub async fn run(&self, cancel: CancellationToken, once: bool) -> anyhow::Result<()> {
        let mut backoff = Backoff::new(self.config.poll_min, self.config.poll_max);
        tracing::info!(worker_id = %self.config.worker_id, base_only = self.config.base_models_only, "loader started");

        loop {
            let acquired = tokio::select! {
                _ = cancel.cancelled() => break,
                r = self.acquire() => r,
            };

            let delay = match acquired {
                Ok(Some(job)) => {
                    backoff.reset();
                    match self.process(&job).await {
                        Ok(outcome) => {
                            tracing::debug!(model_id = %job.model_id, ?outcome, "job finished")
                        }
                        Err(e) if once => return Err(e.into()),
                        Err(e) => {
                            tracing::warn!(model_id = %job.model_id, error = %e, "failed to report job")
                        }
                    }
                    if once {
                        return Ok(());
                    }
                    Duration::ZERO
                }
                Ok(None) if once => return Ok(()),
                Ok(None) => backoff.next(),
                Err(e) if once => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(error = %e, "acquire failed");
                    backoff.next()
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::info!(worker_id = %self.config.worker_id, "loader stopped");
        Ok(())
    }
}
