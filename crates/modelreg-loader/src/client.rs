use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use modelreg_common::{
    AcquireRequest, AcquireUnloadedBaseModelResponse, AcquireUnloadedModelResponse, Empty,
    ErrorBody, RegistryError, UpdateLoadingStatusRequest,
};

const WORKER_SERVICE_PREFIX: &str = "/modelreg.v1.ModelsWorkerService";

/// JSON client for the worker API.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl WorkerClient {
    pub fn new(server_url: &str, token: Option<String>) -> anyhow::Result<Self> {
        // Long-polling acquires hold the request open for up to 30s.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base_url: format!(
                "{}{WORKER_SERVICE_PREFIX}",
                server_url.trim_end_matches('/')
            ),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    async fn call<Req, Resp>(&self, method: &str, req: &Req) -> Result<Resp, RegistryError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let mut builder = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .json(req);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| RegistryError::Unavailable(format!("{method}: {e}")))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| RegistryError::Unavailable(format!("{method}: {e}")))?;

        if !status.is_success() {
            return Err(match serde_json::from_slice::<ErrorBody>(&bytes) {
                Ok(body) => RegistryError::from_body(status.as_u16(), &body),
                Err(_) => RegistryError::Internal(format!(
                    "{method}: status {status}: {}",
                    String::from_utf8_lossy(&bytes)
                )),
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn acquire_unloaded_model(
        &self,
        req: &AcquireRequest,
    ) -> Result<AcquireUnloadedModelResponse, RegistryError> {
        self.call("AcquireUnloadedModel", req).await
    }

    pub async fn acquire_unloaded_base_model(
        &self,
        req: &AcquireRequest,
    ) -> Result<AcquireUnloadedBaseModelResponse, RegistryError> {
        self.call("AcquireUnloadedBaseModel", req).await
    }

    pub async fn update_model_loading_status(
        &self,
        req: &UpdateLoadingStatusRequest,
    ) -> Result<Empty, RegistryError> {
        self.call("UpdateModelLoadingStatus", req).await
    }

    pub async fn update_base_model_loading_status(
        &self,
        req: &UpdateLoadingStatusRequest,
    ) -> Result<Empty, RegistryError> {
        self.call("UpdateBaseModelLoadingStatus", req).await
    }
}
