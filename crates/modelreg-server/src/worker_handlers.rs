//! Internal worker API, `POST /modelreg.v1.ModelsWorkerService/{Method}`.

use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    Extension,
};

use modelreg_common::auth::{require_role, AuthContext, Role};
use modelreg_common::{
    AcquireRequest, CreateBaseModelRequest, CreateStorageConfigRequest, GetModelRequest,
    HfModelRepoRequest, ModelIdRequest, RegisterModelRequest, RegistryError,
    UpdateLoadingStatusRequest,
};

use crate::handlers::{decode, respond};
use crate::manager::ModelManager;
use crate::state::AppState;

/// Decodes the body and runs `op` for the caller's tenant.
macro_rules! worker_call {
    ($st:expr, $ctx:expr, $body:expr, $req:ty, |$m:ident, $tenant:ident, $r:ident| $call:expr) => {{
        if let Err(resp) = require_role(&$ctx, Role::Operator) {
            return resp;
        }
        let $r: $req = match decode(&$body) {
            Ok(r) => r,
            Err(e) => return e.into_response(),
        };
        let $m: &ModelManager = &$st.manager;
        let $tenant: &str = &$ctx.tenant_id;
        respond($call.await)
    }};
}

pub async fn create_storage_config(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    worker_call!(st, ctx, body, CreateStorageConfigRequest, |m, tenant, req| m
        .create_storage_config(tenant, req))
}

pub async fn get_storage_config(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Response {
    if let Err(resp) = require_role(&ctx, Role::Operator) {
        return resp;
    }
    respond(st.manager.get_storage_config(&ctx.tenant_id).await)
}

pub async fn get_model(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    worker_call!(st, ctx, body, GetModelRequest, |m, tenant, req| m.get_model(
        tenant,
        &req.id,
        req.include_loading_model
    ))
}

pub async fn register_model(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    worker_call!(st, ctx, body, RegisterModelRequest, |m, tenant, req| m
        .register_model(tenant, req))
}

pub async fn publish_model(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    worker_call!(st, ctx, body, ModelIdRequest, |m, tenant, req| m
        .publish_model(tenant, &req.id))
}

pub async fn get_model_path(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    worker_call!(st, ctx, body, ModelIdRequest, |m, tenant, req| m
        .get_model_path(tenant, &req.id))
}

pub async fn get_model_attributes(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    worker_call!(st, ctx, body, ModelIdRequest, |m, tenant, req| m
        .get_model_attributes(tenant, &req.id))
}

pub async fn create_base_model(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    worker_call!(st, ctx, body, CreateBaseModelRequest, |m, tenant, req| m
        .create_base_model(tenant, req))
}

pub async fn get_base_model_path(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    worker_call!(st, ctx, body, ModelIdRequest, |m, tenant, req| m
        .get_base_model_path(tenant, &req.id))
}

pub async fn create_hf_model_repo(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    worker_call!(st, ctx, body, HfModelRepoRequest, |m, tenant, req| m
        .create_hf_model_repo(tenant, req))
}

pub async fn get_hf_model_repo(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    worker_call!(st, ctx, body, HfModelRepoRequest, |m, tenant, req| m
        .get_hf_model_repo(tenant, &req.name))
}

pub async fn acquire_unloaded_base_model(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    worker_call!(st, ctx, body, AcquireRequest, |m, tenant, req| m
        .acquire_unloaded_base_model(tenant, req))
}

pub async fn acquire_unloaded_model(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    worker_call!(st, ctx, body, AcquireRequest, |m, tenant, req| m
        .acquire_unloaded_model(tenant, req))
}

pub async fn update_base_model_loading_status(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    worker_call!(st, ctx, body, UpdateLoadingStatusRequest, |m, tenant, req| m
        .update_base_model_loading_status(tenant, req))
}

pub async fn update_model_loading_status(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    worker_call!(st, ctx, body, UpdateLoadingStatusRequest, |m, tenant, req| m
        .update_model_loading_status(tenant, req))
}

pub async fn unknown_method() -> Response {
    RegistryError::not_found("unknown worker method").into_response()
}
