use std::sync::Arc;

use serde_json::{json, Value};

use modelreg_common::auth::AuthConfig;
use modelreg_meta::MemoryMetaStore;
use modelreg_server::{
    build_internal_router, build_public_router, AppState, ManagerConfig, ModelManager,
};

struct TestServer {
    public: String,
    internal: String,
    http: reqwest::Client,
}

impl TestServer {
    async fn start(auth: AuthConfig) -> Self {
        let manager = ModelManager::new(Arc::new(MemoryMetaStore::new()), ManagerConfig::default());
        let st = AppState { manager, auth };

        let public = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let internal = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let public_addr = public.local_addr().unwrap();
        let internal_addr = internal.local_addr().unwrap();

        let public_app = build_public_router(st.clone());
        let internal_app = build_internal_router(st);
        tokio::spawn(async move { axum::serve(public, public_app).await.unwrap() });
        tokio::spawn(async move { axum::serve(internal, internal_app).await.unwrap() });

        Self {
            public: format!("http://{public_addr}"),
            internal: format!("http://{internal_addr}/modelreg.v1.ModelsWorkerService"),
            http: reqwest::Client::new(),
        }
    }

    async fn worker(&self, method: &str, body: Value) -> (u16, Value) {
        let resp = self
            .http
            .post(format!("{}/{method}", self.internal))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self
            .http
            .get(format!("{}{path}", self.public))
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .http
            .post(format!("{}{path}", self.public))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_model_round_trip_over_http() {
    let srv = TestServer::start(AuthConfig::disabled("t0")).await;

    let (status, _) = srv.get("/healthz").await;
    assert_eq!(status, 200);

    let (status, body) = srv
        .worker("CreateStorageConfig", json!({"path_prefix": "models"}))
        .await;
    assert_eq!(status, 200, "{body}");

    let (status, body) = srv.worker("AcquireUnloadedModel", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({}));

    let (status, created) = srv
        .post(
            "/v1/models",
            json!({"id": "org/llm", "source_repository": "hugging_face"}),
        )
        .await;
    assert_eq!(status, 200, "{created}");
    assert_eq!(created["loading_status"], "requested");

    // Not visible until loaded, unless asked for.
    let (status, body) = srv.get("/v1/models/org%2Fllm").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");
    assert!(body["error"]["request_id"]
        .as_str()
        .unwrap()
        .starts_with("req_"));
    let (status, _) = srv
        .get("/v1/models/org%2Fllm?include_loading_model=true")
        .await;
    assert_eq!(status, 200);

    let (status, claimed) = srv
        .worker("AcquireUnloadedModel", json!({"worker_id": "w0"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(claimed["model_id"], "org/llm");
    assert_eq!(claimed["dest_path"], "models/t0/org/llm");
    let claim_id = claimed["claim_id"].as_str().unwrap().to_string();

    let (status, body) = srv
        .worker(
            "UpdateModelLoadingStatus",
            json!({
                "id": "org/llm",
                "claim_id": claim_id,
                "loading_result": {"success": {"path": "models/t0/org/llm", "formats": ["hugging_face"]}}
            }),
        )
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body, json!({}));

    let (status, listed) = srv.get("/v1/models").await;
    assert_eq!(status, 200);
    assert_eq!(listed["object"], "list");
    assert_eq!(listed["total_items"], 1);
    assert_eq!(listed["data"][0]["id"], "org/llm");
    assert_eq!(listed["data"][0]["activation_status"], "active");

    let (status, base) = srv.get("/v1/basemodels").await;
    assert_eq!(status, 200);
    assert_eq!(base["data"][0]["object"], "basemodel");

    let (status, body) = srv
        .worker("GetBaseModelPath", json!({"id": "org/llm"}))
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["path"], "models/t0/org/llm");
}

#[tokio::test]
async fn test_actions_and_errors_over_http() {
    let srv = TestServer::start(AuthConfig::disabled("t0")).await;
    srv.worker("CreateStorageConfig", json!({"path_prefix": "models"}))
        .await;

    let (status, body) = srv
        .worker("CreateStorageConfig", json!({"path_prefix": "again"}))
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "already_exists");

    let (status, body) = srv.post("/v1/models", json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "invalid_argument");

    srv.post(
        "/v1/models",
        json!({"id": "base", "source_repository": "object_store"}),
    )
    .await;

    let (status, body) = srv.post("/v1/models/base:activate", json!({})).await;
    assert_eq!(status, 412, "{body}");

    let claimed = srv.worker("AcquireUnloadedModel", json!({})).await.1;
    let claim_id = claimed["claim_id"].clone();
    let (status, _) = srv
        .worker(
            "UpdateModelLoadingStatus",
            json!({"id": "base", "claim_id": claim_id, "loading_result": {"failure": {"reason": "no such object"}}}),
        )
        .await;
    assert_eq!(status, 200);

    let (status, retried) = srv.post("/v1/models/base:retry", json!({})).await;
    assert_eq!(status, 200, "{retried}");
    assert_eq!(retried["loading_status"], "requested");

    let (status, _) = srv.post("/v1/models/base:explode", json!({})).await;
    assert_eq!(status, 404);

    let resp = srv
        .http
        .delete(format!("{}/v1/models/base", srv.public))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let deleted: Value = resp.json().await.unwrap();
    assert_eq!(deleted, json!({"id": "base", "object": "model", "deleted": true}));

    let (status, _) = srv.worker("NoSuchMethod", json!({})).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_auth_roles_and_tenants() {
    let auth = AuthConfig::from_tokens("v:viewer:t1,o:operator:t1,x:operator:t2", "t0", 0);
    let srv = TestServer::start(auth).await;

    let resp = srv
        .http
        .get(format!("{}/v1/models", srv.public))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let resp = srv
        .http
        .post(format!("{}/v1/models", srv.public))
        .bearer_auth("v")
        .json(&json!({"id": "m", "source_repository": "ollama"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = srv
        .http
        .post(format!("{}/v1/models", srv.public))
        .bearer_auth("o")
        .json(&json!({"id": "m", "source_repository": "ollama"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // Another tenant does not see it.
    let listed: Value = srv
        .http
        .get(format!("{}/v1/models?include_loading_models=true", srv.public))
        .bearer_auth("x")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["total_items"], 0);

    let listed: Value = srv
        .http
        .get(format!("{}/v1/models?include_loading_models=true", srv.public))
        .header("x-api-key", "v")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["total_items"], 1);
}

#[tokio::test]
async fn test_project_tokens_only_see_their_fine_tuned_models() {
    let auth = AuthConfig::from_tokens("a:operator:t1:p1,b:operator:t1:p2", "t0", 0);
    let srv = TestServer::start(auth).await;

    let call = |method: reqwest::Method, path: &str, token: &str| {
        srv.http
            .request(method, format!("{}{path}", srv.public))
            .bearer_auth(token.to_string())
    };

    let resp = call(reqwest::Method::POST, "/v1/models", "a")
        .json(&json!({"id": "base", "source_repository": "object_store"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let created: Value = call(reqwest::Method::POST, "/v1/models", "a")
        .json(&json!({
            "source_repository": "fine_tuning",
            "is_fine_tuned_model": true,
            "base_model_id": "base",
            "suffix": "v1"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["id"], "ft:base:v1");

    let listed_by = |token: &'static str| {
        let req = call(
            reqwest::Method::GET,
            "/v1/models?include_loading_models=true",
            token,
        );
        async move {
            let body: Value = req.send().await.unwrap().json().await.unwrap();
            body["data"]
                .as_array()
                .unwrap()
                .iter()
                .map(|m| m["id"].as_str().unwrap().to_string())
                .collect::<Vec<_>>()
        }
    };
    assert_eq!(listed_by("a").await, vec!["base", "ft:base:v1"]);
    assert_eq!(listed_by("b").await, vec!["base"]);

    let resp = call(
        reqwest::Method::GET,
        "/v1/models/ft:base:v1?include_loading_model=true",
        "b",
    )
    .send()
    .await
    .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let resp = call(reqwest::Method::DELETE, "/v1/models/ft:base:v1", "b")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let resp = call(reqwest::Method::DELETE, "/v1/models/ft:base:v1", "a")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn test_malformed_query_uses_error_body() {
    let srv = TestServer::start(AuthConfig::disabled("t0")).await;

    let (status, body) = srv.get("/v1/models?limit=abc").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "invalid_argument");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("invalid query"));

    let (status, body) = srv.get("/v1/models/m?include_loading_model=maybe").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "invalid_argument");
}
