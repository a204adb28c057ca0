//! Subscriber (abonné) handlers.

use crate::api::{with_conn, with_tx, ApiError};
use crate::events::{notify, notify_agencies};
use crate::middleware::PrincipalContext;
use crate::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Json, Path, Query,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use omnidoc_records::{abonnes, Abonne, AbonneDetail, AbonneFilter, AbonneInput, AccessScope};
use omnidoc_types::{EntityKind, Mutation};
use serde_json::{json, Value};
use std::sync::Arc;

/// Handler for `GET /api/abonnes`.
pub async fn list_abonnes_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    filter: Result<Query<AbonneFilter>, QueryRejection>,
) -> Result<Json<Vec<Abonne>>, ApiError> {
    let Query(filter) = filter?;
    let scope = AccessScope::for_principal(&principal);
    let rows = with_conn(&state, move |conn| {
        Ok(abonnes::list_abonnes(conn, &scope, &filter)?)
    })
    .await?;
    Ok(Json(rows))
}

/// Handler for `POST /api/abonnes`.
pub async fn create_abonne_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    payload: Result<Json<AbonneInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(input) = payload?;
    let scope = AccessScope::for_principal(&principal);
    let creator = principal.clone();
    let abonne = with_tx(&state, move |tx| {
        Ok(abonnes::create_abonne(tx, &scope, &input, &creator)?)
    })
    .await?;

    tracing::info!(
        abonne_id = abonne.id,
        user_id = principal.id,
        "subscriber created"
    );
    notify(
        &state.hub,
        state.notify_scope,
        EntityKind::Abonne,
        Mutation::Created,
        abonne.id,
        abonne.agence.as_deref(),
        &abonne,
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "subscriber created",
            "id": abonne.id,
        })),
    )
        .into_response())
}

/// Handler for `GET /api/abonnes/{id}`.
///
/// Returns the subscriber with its spouses, children and documents.
pub async fn get_abonne_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path(id): Path<i64>,
) -> Result<Json<AbonneDetail>, ApiError> {
    let scope = AccessScope::for_principal(&principal);
    let detail = with_conn(&state, move |conn| {
        Ok(abonnes::get_abonne_detail(conn, &scope, id)?)
    })
    .await?;
    Ok(Json(detail))
}

/// Handler for `PUT /api/abonnes/{id}`.
pub async fn update_abonne_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path(id): Path<i64>,
    payload: Result<Json<AbonneInput>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(input) = payload?;
    let scope = AccessScope::for_principal(&principal);
    let (previous_agence, abonne) = with_tx(&state, move |tx| {
        let previous = abonnes::get_abonne(tx, &scope, id)?;
        let abonne = abonnes::update_abonne(tx, &scope, id, &input)?;
        Ok((previous.agence, abonne))
    })
    .await?;

    // A subscriber moved to another agency is announced to both.
    notify_agencies(
        &state.hub,
        state.notify_scope,
        EntityKind::Abonne,
        Mutation::Updated,
        abonne.id,
        &[abonne.agence.as_deref(), previous_agence.as_deref()],
        &abonne,
    )
    .await;

    Ok(Json(json!({ "message": "subscriber updated" })))
}

/// Handler for `DELETE /api/abonnes/{id}`.
///
/// Spouses, children and document rows go with the subscriber; document
/// files are then removed on a best-effort basis.
pub async fn delete_abonne_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let scope = AccessScope::for_principal(&principal);
    let deleted = with_tx(&state, move |tx| {
        Ok(abonnes::delete_abonne(tx, &scope, id)?)
    })
    .await?;

    for document in &deleted.documents {
        state.storage.remove_quietly(&document.chemin_fichier).await;
    }

    tracing::info!(abonne_id = id, user_id = principal.id, "subscriber deleted");
    notify(
        &state.hub,
        state.notify_scope,
        EntityKind::Abonne,
        Mutation::Deleted,
        id,
        deleted.abonne.agence.as_deref(),
        &deleted.abonne,
    )
    .await;

    Ok(Json(json!({ "message": "subscriber deleted" })))
}

/// Handler for `GET /api/abonnes/{id}/fiche`: the subscriber fact sheet.
pub async fn fiche_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let scope = AccessScope::for_principal(&principal);
    let generated_at = chrono::Local::now().format("%d/%m/%Y %H:%M").to_string();
    let (numero, bytes) = with_conn(&state, move |conn| {
        let detail = abonnes::get_abonne_detail(conn, &scope, id)?;
        let bytes = omnidoc_reports::generate_fiche(&detail, &generated_at)?;
        Ok((detail.abonne.numero_identification, bytes))
    })
    .await?;

    Ok(pdf_response(&format!("fiche_abonne_{}.pdf", numero), bytes))
}

/// Wraps PDF bytes in an inline `application/pdf` response.
pub(crate) fn pdf_response(file_name: &str, bytes: Vec<u8>) -> Response {
    let safe_name: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    let disposition = format!("inline; filename=\"{}\"", safe_name);
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}
