//! Bearer-token authentication for protected routes.

use crate::{api::ApiError, AppState};
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use omnidoc_types::Principal;
use std::sync::Arc;

/// The verified principal of the current request.
#[derive(Debug, Clone)]
pub struct PrincipalContext(pub Principal);

/// Returns the token carried by an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Query parameters that carry credentials.
const SECRET_PARAMS: &[&str] = &["token", "access_token"];

/// Path and query of `uri` with credential parameters masked, for logs.
pub fn loggable_uri(uri: &Uri) -> String {
    let Some(query) = uri.query() else {
        return uri.path().to_string();
    };
    let masked: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if SECRET_PARAMS.contains(&name) => format!("{}=[redacted]", name),
            _ => pair.to_string(),
        })
        .collect();
    format!("{}?{}", uri.path(), masked.join("&"))
}

/// Middleware that verifies the bearer token and stores the principal in
/// request extensions.
///
/// Tokens are stateless: the principal is rebuilt from the signed claims
/// without a database lookup.
pub async fn auth_middleware(mut req: Request<Body>, next: Next) -> Response {
    let Some(token) = bearer_token(req.headers()).map(str::to_string) else {
        return ApiError::Unauthorized("missing bearer token".to_string()).into_response();
    };

    let Some(state) = req.extensions().get::<Arc<AppState>>().cloned() else {
        return ApiError::Internal("application state missing from request".to_string())
            .into_response();
    };

    match state.tokens.verify(&token) {
        Ok(principal) => {
            req.extensions_mut().insert(PrincipalContext(principal));
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!("rejected bearer token: {}", e);
            ApiError::from(e).into_response()
        }
    }
}
