//! Child (enfant) handlers, nested under a subscriber.

use crate::api::{with_conn, with_tx, ApiError};
use crate::events::notify;
use crate::middleware::PrincipalContext;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use omnidoc_records::{abonnes, enfants, AccessScope, Enfant, EnfantInput};
use omnidoc_types::{EntityKind, Mutation};
use serde_json::{json, Value};
use std::sync::Arc;

/// Handler for `GET /api/abonnes/{id}/enfants`.
pub async fn list_enfants_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path(abonne_id): Path<i64>,
) -> Result<Json<Vec<Enfant>>, ApiError> {
    let scope = AccessScope::for_principal(&principal);
    let rows = with_conn(&state, move |conn| {
        let owner = abonnes::get_abonne(conn, &scope, abonne_id)?;
        Ok(enfants::list_enfants(conn, &owner)?)
    })
    .await?;
    Ok(Json(rows))
}

/// Handler for `GET /api/abonnes/{id}/enfants/{item_id}`.
pub async fn get_enfant_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path((abonne_id, id)): Path<(i64, i64)>,
) -> Result<Json<Enfant>, ApiError> {
    let scope = AccessScope::for_principal(&principal);
    let enfant = with_conn(&state, move |conn| {
        let owner = abonnes::get_abonne(conn, &scope, abonne_id)?;
        Ok(enfants::get_enfant(conn, &owner, id)?)
    })
    .await?;
    Ok(Json(enfant))
}

/// Handler for `POST /api/abonnes/{id}/enfants`.
pub async fn create_enfant_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path(abonne_id): Path<i64>,
    payload: Result<Json<EnfantInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(input) = payload?;
    let scope = AccessScope::for_principal(&principal);
    let (enfant, agence) = with_tx(&state, move |tx| {
        let owner = abonnes::get_abonne(tx, &scope, abonne_id)?;
        let enfant = enfants::create_enfant(tx, &owner, &input)?;
        Ok((enfant, owner.agence))
    })
    .await?;

    notify(
        &state.hub,
        state.notify_scope,
        EntityKind::Enfant,
        Mutation::Created,
        enfant.id,
        agence.as_deref(),
        &enfant,
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "child added",
            "id": enfant.id,
        })),
    )
        .into_response())
}

/// Handler for `PUT /api/abonnes/{id}/enfants/{item_id}`.
pub async fn update_enfant_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path((abonne_id, id)): Path<(i64, i64)>,
    payload: Result<Json<EnfantInput>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(input) = payload?;
    let scope = AccessScope::for_principal(&principal);
    let (enfant, agence) = with_tx(&state, move |tx| {
        let owner = abonnes::get_abonne(tx, &scope, abonne_id)?;
        let enfant = enfants::update_enfant(tx, &owner, id, &input)?;
        Ok((enfant, owner.agence))
    })
    .await?;

    notify(
        &state.hub,
        state.notify_scope,
        EntityKind::Enfant,
        Mutation::Updated,
        enfant.id,
        agence.as_deref(),
        &enfant,
    )
    .await;

    Ok(Json(json!({ "message": "child updated" })))
}

/// Handler for `DELETE /api/abonnes/{id}/enfants/{item_id}`.
pub async fn delete_enfant_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path((abonne_id, id)): Path<(i64, i64)>,
) -> Result<Json<Value>, ApiError> {
    let scope = AccessScope::for_principal(&principal);
    let (enfant, agence) = with_tx(&state, move |tx| {
        let owner = abonnes::get_abonne(tx, &scope, abonne_id)?;
        let enfant = enfants::delete_enfant(tx, &owner, id)?;
        Ok((enfant, owner.agence))
    })
    .await?;

    notify(
        &state.hub,
        state.notify_scope,
        EntityKind::Enfant,
        Mutation::Deleted,
        enfant.id,
        agence.as_deref(),
        &enfant,
    )
    .await;

    Ok(Json(json!({ "message": "child deleted" })))
}
