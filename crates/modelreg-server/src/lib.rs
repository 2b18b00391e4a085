pub mod clock;
pub mod coordinator;
mod gate;
pub mod handlers;
pub mod hf_repo;
pub mod lifecycle;
pub mod manager;
pub mod record;
mod registry;
pub mod resolver;
pub mod scope;
pub mod state;
mod storage_config;
pub mod store;
pub mod worker_handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use modelreg_common::auth::auth_middleware;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::lease_sweep_loop;
pub use manager::{ManagerConfig, ModelManager};
pub use scope::Scope;
pub use state::AppState;

pub const WORKER_SERVICE_PREFIX: &str = "/modelreg.v1.ModelsWorkerService";

/// Routes of the public registry API.
pub fn build_public_router(st: AppState) -> Router {
    let authed_routes = Router::new()
        .route(
            "/v1/models",
            get(handlers::list_models).post(handlers::create_model),
        )
        .route(
            "/v1/models/:id",
            get(handlers::get_model)
                .delete(handlers::delete_model)
                .post(handlers::model_action),
        )
        .route("/v1/basemodels", get(handlers::list_base_models))
        .layer(middleware::from_fn_with_state(
            st.clone(),
            auth_middleware::<AppState>,
        ));

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .merge(authed_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(st)
}

/// Routes of the internal worker API.
pub fn build_internal_router(st: AppState) -> Router {
    use worker_handlers as w;

    let methods = Router::new()
        .route("/CreateStorageConfig", post(w::create_storage_config))
        .route("/GetStorageConfig", post(w::get_storage_config))
        .route("/GetModel", post(w::get_model))
        .route("/RegisterModel", post(w::register_model))
        .route("/PublishModel", post(w::publish_model))
        .route("/GetModelPath", post(w::get_model_path))
        .route("/GetModelAttributes", post(w::get_model_attributes))
        .route("/CreateBaseModel", post(w::create_base_model))
        .route("/GetBaseModelPath", post(w::get_base_model_path))
        .route("/CreateHFModelRepo", post(w::create_hf_model_repo))
        .route("/GetHFModelRepo", post(w::get_hf_model_repo))
        .route(
            "/AcquireUnloadedBaseModel",
            post(w::acquire_unloaded_base_model),
        )
        .route("/AcquireUnloadedModel", post(w::acquire_unloaded_model))
        .route(
            "/UpdateBaseModelLoadingStatus",
            post(w::update_base_model_loading_status),
        )
        .route(
            "/UpdateModelLoadingStatus",
            post(w::update_model_loading_status),
        )
        .fallback(w::unknown_method)
        .layer(middleware::from_fn_with_state(
            st.clone(),
            auth_middleware::<AppState>,
        ));

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .nest(WORKER_SERVICE_PREFIX, methods)
        .layer(TraceLayer::new_for_http())
        .with_state(st)
}
