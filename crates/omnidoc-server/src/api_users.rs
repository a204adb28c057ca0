//! Staff user handlers.
//!
//! Admins and controleurs list, create and update users; only admins delete
//! them, and only admins hand out the admin role. Anyone may read their own
//! profile and change their own password.

use crate::api::{with_conn, with_tx, ApiError};
use crate::events::notify;
use crate::middleware::PrincipalContext;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use omnidoc_identity::{hash_password, verify_password};
use omnidoc_records::{users, User, UserInput};
use omnidoc_types::{EntityKind, Mutation, Principal, Role};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Request body for `PUT /api/users/{id}/password`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

fn require_user_manager(principal: &Principal) -> Result<(), ApiError> {
    if principal.role.can_manage_users() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "user management requires the admin or controleur role".to_string(),
        ))
    }
}

fn check_role_grant(principal: &Principal, requested: Option<Role>) -> Result<(), ApiError> {
    if requested == Some(Role::Admin) && !principal.is_admin() {
        return Err(ApiError::Forbidden(
            "only an admin can grant the admin role".to_string(),
        ));
    }
    Ok(())
}

/// Handler for `GET /api/users/me`.
pub async fn me_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
) -> Result<Json<User>, ApiError> {
    let id = principal.id;
    let user = with_conn(&state, move |conn| Ok(users::get_user(conn, id)?)).await?;
    Ok(Json(user))
}

/// Handler for `GET /api/users`.
pub async fn list_users_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
) -> Result<Json<Vec<User>>, ApiError> {
    require_user_manager(&principal)?;
    let rows = with_conn(&state, |conn| Ok(users::list_users(conn)?)).await?;
    Ok(Json(rows))
}

/// Handler for `GET /api/users/{id}`.
pub async fn get_user_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    require_user_manager(&principal)?;
    let user = with_conn(&state, move |conn| Ok(users::get_user(conn, id)?)).await?;
    Ok(Json(user))
}

/// Handler for `POST /api/users`.
pub async fn create_user_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    payload: Result<Json<UserInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_user_manager(&principal)?;
    let Json(input) = payload?;
    check_role_grant(&principal, input.role)?;

    let user = with_tx(&state, move |tx| {
        users::validate_new_user(&input)?;
        let password = input.password.as_deref().unwrap_or_default();
        let hash = hash_password(password)?;
        Ok(users::create_user(tx, &input, &hash)?)
    })
    .await?;

    tracing::info!(user_id = user.id, created_by = principal.id, role = %user.role, "user created");
    notify(
        &state.hub,
        state.notify_scope,
        EntityKind::User,
        Mutation::Created,
        user.id,
        None,
        &user,
    )
    .await;
    state
        .hub
        .emit_system_message(&format!("new user created: {} {}", user.nom, user.prenom))
        .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "user created",
            "id": user.id,
            "user": user,
        })),
    )
        .into_response())
}

/// Handler for `PUT /api/users/{id}`.
///
/// A non-empty `password` replaces the stored hash.
pub async fn update_user_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path(id): Path<i64>,
    payload: Result<Json<UserInput>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    require_user_manager(&principal)?;
    let Json(input) = payload?;
    check_role_grant(&principal, input.role)?;
    let acting_admin = principal.is_admin();

    let user = with_tx(&state, move |tx| {
        let current = users::get_user(tx, id)?;
        if current.role == Role::Admin && !acting_admin {
            return Err(ApiError::Forbidden(
                "only an admin can modify an admin account".to_string(),
            ));
        }
        let hash = match input.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => Some(hash_password(password)?),
            None => None,
        };
        Ok(users::update_user(tx, id, &input, hash.as_deref())?)
    })
    .await?;

    notify(
        &state.hub,
        state.notify_scope,
        EntityKind::User,
        Mutation::Updated,
        user.id,
        None,
        &user,
    )
    .await;
    state
        .hub
        .emit_system_message(&format!("user updated: {} {}", user.nom, user.prenom))
        .await;

    Ok(Json(json!({
        "message": "user updated",
        "user": user,
    })))
}

/// Handler for `DELETE /api/users/{id}`. Admin only.
///
/// Any live notification channel of the deleted user is closed.
pub async fn delete_user_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if !principal.role.can_delete_users() {
        return Err(ApiError::Forbidden(
            "deleting users requires the admin role".to_string(),
        ));
    }

    let user = with_tx(&state, move |tx| Ok(users::delete_user(tx, id)?)).await?;

    if state.hub.disconnect_principal(user.id).await {
        tracing::info!(user_id = user.id, "closed notification channel of deleted user");
    }
    tracing::info!(user_id = user.id, deleted_by = principal.id, "user deleted");
    notify(
        &state.hub,
        state.notify_scope,
        EntityKind::User,
        Mutation::Deleted,
        user.id,
        None,
        &user,
    )
    .await;
    state
        .hub
        .emit_system_message(&format!("user deleted: {} {}", user.nom, user.prenom))
        .await;

    Ok(Json(json!({ "message": "user deleted" })))
}

/// Handler for `PUT /api/users/{id}/password`.
///
/// Only the user themself may change their password, and only with the
/// current one.
pub async fn change_password_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path(id): Path<i64>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    if principal.id != id {
        return Err(ApiError::Forbidden(
            "you can only change your own password".to_string(),
        ));
    }
    let Json(body) = payload?;
    if body.new_password.is_empty() {
        return Err(ApiError::BadRequest("newPassword is required".to_string()));
    }

    let user = with_tx(&state, move |tx| {
        let stored = users::get_password_hash(tx, id)?;
        if !verify_password(&body.current_password, &stored) {
            return Err(ApiError::Unauthorized(
                "current password is incorrect".to_string(),
            ));
        }
        let hash = hash_password(&body.new_password)?;
        users::set_password_hash(tx, id, &hash)?;
        Ok(users::get_user(tx, id)?)
    })
    .await?;

    tracing::info!(user_id = id, "password changed");
    state
        .hub
        .emit_system_message(&format!("password changed for: {} {}", user.nom, user.prenom))
        .await;

    Ok(Json(json!({ "message": "password changed" })))
}
