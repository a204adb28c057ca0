//! Omnidoc server library logic.

pub mod api;
pub mod api_abonnes;
pub mod api_auth;
pub mod api_conjoints;
pub mod api_documents;
pub mod api_enfants;
pub mod api_rapports;
pub mod api_users;
pub mod api_ws;
pub mod config;
pub mod events;
pub mod middleware;
pub mod storage;

use api::ApiError;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, Request},
    routing::{get, post, put},
    Extension, Json, Router,
};
use config::NotifyScope;
use omnidoc_db::DbPool;
use omnidoc_identity::TokenIssuer;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use storage::DocumentStorage;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Slack on top of the upload limit for multipart framing.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across all request handlers.
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Bearer token issuer and verifier.
    pub tokens: TokenIssuer,
    /// Live notification channels.
    pub hub: api_ws::NotificationHub,
    /// Uploaded and generated documents.
    pub storage: DocumentStorage,
    /// Optional PDF the certificate is drawn onto.
    pub certificate_template: Option<PathBuf>,
    /// Audience of subscriber and user events.
    pub notify_scope: NotifyScope,
    /// Browser origin allowed by CORS.
    pub cors_origin: String,
}

/// Health check handler.
///
/// Returns `200 OK` with server status and version.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn route_not_found() -> ApiError {
    ApiError::NotFound("route not found".to_string())
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);
    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            tracing::warn!(origin, "invalid CORS origin, cross-origin requests disabled");
            layer
        }
    }
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let upload_limit = state.storage.max_upload_bytes() + MULTIPART_OVERHEAD;
    let upload_root = state.storage.root().to_path_buf();
    let cors = cors_layer(&state.cors_origin);

    let protected_routes = Router::new()
        .route("/api/auth/validate", get(api_auth::validate_handler))
        .route(
            "/api/abonnes",
            get(api_abonnes::list_abonnes_handler).post(api_abonnes::create_abonne_handler),
        )
        .route(
            "/api/abonnes/{id}",
            get(api_abonnes::get_abonne_handler)
                .put(api_abonnes::update_abonne_handler)
                .delete(api_abonnes::delete_abonne_handler),
        )
        .route("/api/abonnes/{id}/fiche", get(api_abonnes::fiche_handler))
        .route(
            "/api/abonnes/{id}/conjoints",
            get(api_conjoints::list_conjoints_handler).post(api_conjoints::create_conjoint_handler),
        )
        .route(
            "/api/abonnes/{id}/conjoints/{item_id}",
            get(api_conjoints::get_conjoint_handler)
                .put(api_conjoints::update_conjoint_handler)
                .delete(api_conjoints::delete_conjoint_handler),
        )
        .route(
            "/api/abonnes/{id}/enfants",
            get(api_enfants::list_enfants_handler).post(api_enfants::create_enfant_handler),
        )
        .route(
            "/api/abonnes/{id}/enfants/{item_id}",
            get(api_enfants::get_enfant_handler)
                .put(api_enfants::update_enfant_handler)
                .delete(api_enfants::delete_enfant_handler),
        )
        .route(
            "/api/abonnes/{id}/documents/{item_id}",
            get(api_documents::get_document_handler)
                .put(api_documents::update_document_handler)
                .delete(api_documents::delete_document_handler),
        )
        .route(
            "/api/rapports/statistiques",
            get(api_rapports::statistiques_handler),
        )
        .route("/api/rapports/abonnes", get(api_rapports::rapport_abonnes_handler))
        .route(
            "/api/rapports/abonnes/pdf",
            get(api_rapports::rapport_pdf_handler),
        )
        .route("/api/users/me", get(api_users::me_handler))
        .route(
            "/api/users",
            get(api_users::list_users_handler).post(api_users::create_user_handler),
        )
        .route(
            "/api/users/{id}",
            get(api_users::get_user_handler)
                .put(api_users::update_user_handler)
                .delete(api_users::delete_user_handler),
        )
        .route(
            "/api/users/{id}/password",
            put(api_users::change_password_handler),
        )
        .layer(axum::middleware::from_fn(middleware::auth_middleware));

    // Document creation accepts file bodies, so it gets its own size limit.
    let upload_routes = Router::new()
        .route(
            "/api/abonnes/{id}/documents",
            get(api_documents::list_documents_handler)
                .post(api_documents::create_document_handler),
        )
        .layer(axum::middleware::from_fn(middleware::auth_middleware))
        .layer(DefaultBodyLimit::max(upload_limit));

    Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(api_auth::login_handler))
        .route("/ws", get(api_ws::ws_handler))
        .merge(protected_routes)
        .merge(upload_routes)
        .nest_service("/uploads", ServeDir::new(upload_root))
        .fallback(route_not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            // The WebSocket handshake carries its token in the query string.
            tracing::debug_span!(
                "request",
                method = %request.method(),
                uri = %middleware::loggable_uri(request.uri()),
                version = ?request.version(),
            )
        }))
        .layer(Extension(Arc::new(state)))
}
