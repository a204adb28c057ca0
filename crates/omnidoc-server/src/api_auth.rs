//! Login and token validation handlers.

use crate::api::{with_conn, ApiError};
use crate::middleware::PrincipalContext;
use crate::AppState;
use axum::extract::{rejection::JsonRejection, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Request body for `POST /api/auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Handler for `POST /api/auth/login`.
///
/// Answers `{token, user}`; unknown email and wrong password both give 401.
pub async fn login_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "email and password are required".to_string(),
        ));
    }

    let state_clone = state.clone();
    let outcome = with_conn(&state, move |conn| {
        Ok(omnidoc_identity::login(
            conn,
            &state_clone.tokens,
            &payload.email,
            &payload.password,
        )?)
    })
    .await?;

    tracing::info!(user_id = outcome.principal.id, "user logged in");

    Ok(Json(json!({
        "token": outcome.token,
        "user": {
            "id": outcome.principal.id,
            "nom": outcome.nom,
            "prenom": outcome.prenom,
            "email": outcome.principal.email,
            "role": outcome.principal.role,
            "agence": outcome.principal.agence,
        }
    })))
}

/// Handler for `GET /api/auth/validate`.
pub async fn validate_handler(
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
) -> Json<Value> {
    Json(json!({
        "valid": true,
        "user": principal,
    }))
}
