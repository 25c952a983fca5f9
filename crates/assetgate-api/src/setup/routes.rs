//! Route configuration and setup

use std::sync::Arc;

use assetgate_core::Config;
use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

use crate::api_doc::ApiDoc;
use crate::handlers::{definitions, health, multipart, objects, uploads};
use crate::state::AppState;

/// Request bodies are small JSON documents; object bytes never pass through.
const MAX_BODY_BYTES: usize = 1024 * 1024;
const HTTP_CONCURRENCY_LIMIT: usize = 10_000;

/// Full application router: API routes, OpenAPI docs and middleware.
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router, anyhow::Error> {
    let cors = setup_cors(config)?;

    let app = api_routes(state)
        .merge(RapiDoc::with_openapi("/api/openapi.json", ApiDoc::openapi()).path("/docs"))
        .layer(ConcurrencyLimitLayer::new(HTTP_CONCURRENCY_LIMIT))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

/// Resource routes without middleware.
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/resources/definitions", get(definitions::list_definitions))
        .route("/resources/definitions/{name}", get(definitions::get_definition))
        .route("/resources/providers", get(definitions::list_providers))
        .route("/resources/multipart/init", post(multipart::init_multipart))
        .route("/resources/multipart/urls", post(multipart::multipart_urls))
        .route("/resources/uploads", post(uploads::initiate_upload))
        .route("/resources/uploads/{id}", get(uploads::get_upload))
        .route("/resources/uploads/{id}/confirm", post(uploads::confirm_upload))
        .route("/resources/uploads/{id}/abort", post(uploads::abort_upload))
        .route("/resources/uploads/{id}/renew", post(uploads::renew_upload))
        .route("/resources/uploads/{id}/parts", post(uploads::upload_part_urls))
        .route(
            "/resources/{provider}/{*rest}",
            post(objects::post_object)
                .get(objects::get_object)
                .put(objects::put_object)
                .delete(objects::delete_object),
        )
        .with_state(state)
}

fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let cors = if config.cors_origins().iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins()
            .iter()
            .map(|o| {
                o.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {}: {}", o, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    };
    Ok(cors)
}
