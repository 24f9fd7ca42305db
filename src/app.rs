//! 路由组装：上传、自检与首页重定向。

use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::Request;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Router, middleware};
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::auth;
use crate::config::PROJECT_URL;
use crate::http::{self, normalize_prefix};
use crate::locking::LockManager;
use crate::probe;
use crate::storage::MediaRoot;
use crate::tenant::TenantConfig;
use crate::upload::{self, UploadConfig};

/// Builds the router for one tenant. Everything handlers need travels in
/// request extensions; nothing is global.
pub fn build_router(tenant: Arc<TenantConfig>, upload_config: Arc<UploadConfig>) -> Router {
    let media = Arc::new(MediaRoot::new(tenant.media_root.clone()));
    let lock_manager = Arc::new(LockManager::new());
    let require_password = middleware::from_fn(auth::require_password);

    let routes = Router::new()
        .route(
            "/",
            get(index).merge(post(upload::save_upload).route_layer(require_password.clone())),
        )
        .route(
            "/test",
            post(probe::test_media_root).route_layer(require_password),
        );

    let routes = match normalize_prefix(tenant.path_prefix.as_deref()) {
        Some(prefix) => Router::new().nest(&prefix, routes),
        None => routes,
    };

    routes
        .layer(DefaultBodyLimit::max(upload_config.max_body_bytes))
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip = http::client_ip(request),
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(Extension(media))
        .layer(Extension(lock_manager))
        .layer(Extension(upload_config))
        .layer(Extension(tenant))
}

async fn index() -> Redirect {
    Redirect::to(PROJECT_URL)
}
