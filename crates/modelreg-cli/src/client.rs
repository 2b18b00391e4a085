use anyhow::Result;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};

use modelreg_common::{
    CreateModelRequest, CreateStorageConfigRequest, DeleteModelResponse, Empty, ErrorBody,
    ListBaseModelsResponse, ListModelsResponse, Model, RegistryError, StorageConfig,
};

pub fn auth(builder: RequestBuilder, token: Option<&String>) -> RequestBuilder {
    match token {
        Some(t) => builder.bearer_auth(t),
        None => builder,
    }
}

pub struct RegistryClient {
    http: Client,
    server_url: String,
    internal_url: String,
    token: Option<String>,
}

impl RegistryClient {
    pub fn new(server_url: &str, internal_url: &str, token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
            internal_url: format!(
                "{}/modelreg.v1.ModelsWorkerService",
                internal_url.trim_end_matches('/')
            ),
            token,
        }
    }

    fn model_url(&self, id: &str) -> String {
        format!("{}/v1/models/{}", self.server_url, urlencoding::encode(id))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let resp = auth(builder, self.token.as_ref()).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let text = resp.text().await?;
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => Err(RegistryError::from_body(status.as_u16(), &body).into()),
            Err(_) => anyhow::bail!("status {status}: {text}"),
        }
    }

    async fn worker<Req: Serialize, T: DeserializeOwned>(&self, method: &str, req: &Req) -> Result<T> {
        let url = format!("{}/{method}", self.internal_url);
        self.send(self.http.post(url).json(req)).await
    }

    pub async fn list_models(
        &self,
        include_loading: bool,
        after: Option<&str>,
        limit: Option<u32>,
    ) -> Result<ListModelsResponse> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if include_loading {
            query.push(("include_loading_models", "true".to_string()));
        }
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        let url = format!("{}/v1/models", self.server_url);
        self.send(self.http.get(url).query(&query)).await
    }

    pub async fn get_model(&self, id: &str, include_loading: bool) -> Result<Model> {
        let builder = self
            .http
            .get(self.model_url(id))
            .query(&[("include_loading_model", include_loading)]);
        self.send(builder).await
    }

    pub async fn create_model(&self, req: &CreateModelRequest) -> Result<Model> {
        let url = format!("{}/v1/models", self.server_url);
        self.send(self.http.post(url).json(req)).await
    }

    pub async fn delete_model(&self, id: &str) -> Result<DeleteModelResponse> {
        self.send(self.http.delete(self.model_url(id))).await
    }

    pub async fn activate_model(&self, id: &str) -> Result<Empty> {
        self.action(id, "activate").await
    }

    pub async fn deactivate_model(&self, id: &str) -> Result<Empty> {
        self.action(id, "deactivate").await
    }

    pub async fn retry_model(&self, id: &str) -> Result<Model> {
        self.action(id, "retry").await
    }

    async fn action<T: DeserializeOwned>(&self, id: &str, action: &str) -> Result<T> {
        let url = format!("{}:{action}", self.model_url(id));
        self.send(self.http.post(url)).await
    }

    pub async fn list_base_models(&self) -> Result<ListBaseModelsResponse> {
        let url = format!("{}/v1/basemodels", self.server_url);
        self.send(self.http.get(url)).await
    }

    pub async fn get_storage_config(&self) -> Result<StorageConfig> {
        self.worker("GetStorageConfig", &Empty::default()).await
    }

    pub async fn create_storage_config(&self, path_prefix: String) -> Result<StorageConfig> {
        self.worker(
            "CreateStorageConfig",
            &CreateStorageConfigRequest { path_prefix },
        )
        .await
    }
}
