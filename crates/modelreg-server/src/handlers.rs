//! Public registry API.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

use modelreg_common::auth::{require_role, AuthContext, Role};
use modelreg_common::{CreateModelRequest, GetModelQuery, ListModelsQuery, RegistryError};

use crate::scope::Scope;
use crate::state::AppState;

/// `Query` that rejects malformed parameters with the registry error body.
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = RegistryError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(RegistryError::invalid_argument(format!(
                "invalid query: {}",
                rejection.body_text()
            ))),
        }
    }
}

pub(crate) fn respond<T: Serialize>(result: Result<T, RegistryError>) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Decodes a JSON body; an empty body reads as `{}`.
pub(crate) fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, RegistryError> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(raw)
        .map_err(|e| RegistryError::invalid_argument(format!("invalid request body: {e}")))
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn list_models(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<ListModelsQuery>,
) -> Response {
    if let Err(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }
    respond(st.manager.list_models(Scope::from(&ctx), query).await)
}

pub async fn get_model(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<GetModelQuery>,
) -> Response {
    if let Err(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }
    respond(
        st.manager
            .get_model(Scope::from(&ctx), &id, query.include_loading_model)
            .await,
    )
}

pub async fn create_model(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Response {
    if let Err(resp) = require_role(&ctx, Role::Operator) {
        return resp;
    }
    let req = match decode::<CreateModelRequest>(&body) {
        Ok(req) => req,
        Err(e) => return e.into_response(),
    };
    respond(st.manager.create_model(Scope::from(&ctx), req).await)
}

pub async fn delete_model(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = require_role(&ctx, Role::Operator) {
        return resp;
    }
    respond(st.manager.delete_model(Scope::from(&ctx), &id).await)
}

/// `POST /v1/models/{id}:{action}`. Model ids may themselves contain `:`, so
/// the action is whatever follows the last one.
pub async fn model_action(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(target): Path<String>,
) -> Response {
    if let Err(resp) = require_role(&ctx, Role::Operator) {
        return resp;
    }
    let Some((id, action)) = target.rsplit_once(':') else {
        return RegistryError::not_found(format!("no action in {target:?}")).into_response();
    };
    let scope = Scope::from(&ctx);
    match action {
        "activate" => respond(st.manager.activate_model(scope, id).await),
        "deactivate" => respond(st.manager.deactivate_model(scope, id).await),
        "retry" => respond(st.manager.retry_model(scope, id).await),
        other => RegistryError::not_found(format!("unknown model action {other:?}")).into_response(),
    }
}

pub async fn list_base_models(
    State(st): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Response {
    if let Err(resp) = require_role(&ctx, Role::Viewer) {
        return resp;
    }
    respond(st.manager.list_base_models(&ctx.tenant_id).await)
}
