//! HTTP surface of the upload service.

mod middleware;
mod packages;
mod upload;

use std::{num::NonZeroU64, sync::Arc};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::registry::Registry;

use self::middleware::{log_responses, set_request_context};

pub use packages::spawn_build;

#[derive(Clone)]
pub struct HttpState {
    pub registry: Arc<Registry>,
    pub upload_limit: NonZeroU64,
}

pub fn build_router(state: HttpState) -> Router {
    let upload_limit = usize::try_from(state.upload_limit.get()).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(packages::upload_form))
        .route(
            "/compile",
            post(packages::compile).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/{id}/wait", get(packages::wait_page))
        .route("/{id}/status", get(packages::status))
        .route("/{id}", get(packages::download))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
