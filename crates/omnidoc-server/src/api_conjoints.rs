//! Spouse (conjoint) handlers, nested under a subscriber.

use crate::api::{with_conn, with_tx, ApiError};
use crate::events::notify;
use crate::middleware::PrincipalContext;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use omnidoc_records::{abonnes, conjoints, AccessScope, Conjoint, ConjointInput};
use omnidoc_types::{EntityKind, Mutation};
use serde_json::{json, Value};
use std::sync::Arc;

/// Handler for `GET /api/abonnes/{id}/conjoints`.
pub async fn list_conjoints_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path(abonne_id): Path<i64>,
) -> Result<Json<Vec<Conjoint>>, ApiError> {
    let scope = AccessScope::for_principal(&principal);
    let rows = with_conn(&state, move |conn| {
        let owner = abonnes::get_abonne(conn, &scope, abonne_id)?;
        Ok(conjoints::list_conjoints(conn, &owner)?)
    })
    .await?;
    Ok(Json(rows))
}

/// Handler for `GET /api/abonnes/{id}/conjoints/{item_id}`.
pub async fn get_conjoint_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path((abonne_id, id)): Path<(i64, i64)>,
) -> Result<Json<Conjoint>, ApiError> {
    let scope = AccessScope::for_principal(&principal);
    let conjoint = with_conn(&state, move |conn| {
        let owner = abonnes::get_abonne(conn, &scope, abonne_id)?;
        Ok(conjoints::get_conjoint(conn, &owner, id)?)
    })
    .await?;
    Ok(Json(conjoint))
}

/// Handler for `POST /api/abonnes/{id}/conjoints`.
pub async fn create_conjoint_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path(abonne_id): Path<i64>,
    payload: Result<Json<ConjointInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(input) = payload?;
    let scope = AccessScope::for_principal(&principal);
    let (conjoint, agence) = with_tx(&state, move |tx| {
        let owner = abonnes::get_abonne(tx, &scope, abonne_id)?;
        let conjoint = conjoints::create_conjoint(tx, &owner, &input)?;
        Ok((conjoint, owner.agence))
    })
    .await?;

    notify(
        &state.hub,
        state.notify_scope,
        EntityKind::Conjoint,
        Mutation::Created,
        conjoint.id,
        agence.as_deref(),
        &conjoint,
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "spouse added",
            "id": conjoint.id,
        })),
    )
        .into_response())
}

/// Handler for `PUT /api/abonnes/{id}/conjoints/{item_id}`.
pub async fn update_conjoint_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path((abonne_id, id)): Path<(i64, i64)>,
    payload: Result<Json<ConjointInput>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(input) = payload?;
    let scope = AccessScope::for_principal(&principal);
    let (conjoint, agence) = with_tx(&state, move |tx| {
        let owner = abonnes::get_abonne(tx, &scope, abonne_id)?;
        let conjoint = conjoints::update_conjoint(tx, &owner, id, &input)?;
        Ok((conjoint, owner.agence))
    })
    .await?;

    notify(
        &state.hub,
        state.notify_scope,
        EntityKind::Conjoint,
        Mutation::Updated,
        conjoint.id,
        agence.as_deref(),
        &conjoint,
    )
    .await;

    Ok(Json(json!({ "message": "spouse updated" })))
}

/// Handler for `DELETE /api/abonnes/{id}/conjoints/{item_id}`.
pub async fn delete_conjoint_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path((abonne_id, id)): Path<(i64, i64)>,
) -> Result<Json<Value>, ApiError> {
    let scope = AccessScope::for_principal(&principal);
    let (conjoint, agence) = with_tx(&state, move |tx| {
        let owner = abonnes::get_abonne(tx, &scope, abonne_id)?;
        let conjoint = conjoints::delete_conjoint(tx, &owner, id)?;
        Ok((conjoint, owner.agence))
    })
    .await?;

    notify(
        &state.hub,
        state.notify_scope,
        EntityKind::Conjoint,
        Mutation::Deleted,
        conjoint.id,
        agence.as_deref(),
        &conjoint,
    )
    .await;

    Ok(Json(json!({ "message": "spouse deleted" })))
}
