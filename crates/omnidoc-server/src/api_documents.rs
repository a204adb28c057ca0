//! Document handlers: uploads, generated certificates, relabelling and
//! deletion.

use crate::api::{with_conn, with_tx, ApiError};
use crate::events::notify;
use crate::middleware::PrincipalContext;
use crate::storage::{unique_file_name, StoredFile};
use crate::AppState;
use axum::{
    extract::{
        rejection::JsonRejection, Extension, FromRequest, Json, Multipart, Path, Request,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use omnidoc_records::{
    abonnes, documents, Abonne, AccessScope, Document, NewDocument, CERTIFICATE_TYPE,
};
use omnidoc_types::{EntityKind, Mutation, Principal};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Multipart field carrying the uploaded file.
const FILE_FIELD: &str = "document";

/// Label given to uploads that arrive without a `type`.
const DEFAULT_UPLOAD_TYPE: &str = "document";

/// JSON body of a document creation or relabel request.
#[derive(Debug, Default, Deserialize)]
pub struct DocumentTypeRequest {
    #[serde(rename = "type", default)]
    pub doc_type: Option<String>,
}

/// What a creation request asks for, once the body has been read and
/// checked.
#[derive(Debug)]
enum Submission {
    Upload {
        original_name: String,
        extension: String,
        doc_type: String,
        bytes: Vec<u8>,
    },
    Certificate,
}

/// Returns `true` for the reserved certificate type and its alias.
pub fn is_certificate_type(doc_type: &str) -> bool {
    let doc_type = doc_type.trim();
    doc_type.eq_ignore_ascii_case(CERTIFICATE_TYPE) || doc_type.eq_ignore_ascii_case("certificat")
}

/// Handler for `GET /api/abonnes/{id}/documents`.
pub async fn list_documents_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path(abonne_id): Path<i64>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let scope = AccessScope::for_principal(&principal);
    let rows = with_conn(&state, move |conn| {
        let owner = abonnes::get_abonne(conn, &scope, abonne_id)?;
        Ok(documents::list_documents(conn, &owner)?)
    })
    .await?;
    Ok(Json(rows))
}

/// Handler for `GET /api/abonnes/{id}/documents/{item_id}`.
pub async fn get_document_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path((abonne_id, id)): Path<(i64, i64)>,
) -> Result<Json<Document>, ApiError> {
    let scope = AccessScope::for_principal(&principal);
    let document = with_conn(&state, move |conn| {
        let owner = abonnes::get_abonne(conn, &scope, abonne_id)?;
        Ok(documents::get_document(conn, &owner, id)?)
    })
    .await?;
    Ok(Json(document))
}

/// Handler for `POST /api/abonnes/{id}/documents`.
///
/// Accepts either a multipart upload (file in the `document` field, optional
/// `type` field) or a JSON `{type: "certificate"}` body that generates the
/// subscription certificate. Rejected uploads never reach the disk or the
/// database.
pub async fn create_document_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path(abonne_id): Path<i64>,
    request: Request,
) -> Result<Response, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let submission = if is_multipart {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        read_multipart(&state, multipart).await?
    } else {
        let body: Result<Json<DocumentTypeRequest>, JsonRejection> =
            Json::from_request(request, &()).await;
        let Json(body) = body?;
        match body.doc_type.as_deref() {
            Some(t) if is_certificate_type(t) => Submission::Certificate,
            _ => {
                return Err(ApiError::BadRequest(
                    "no file uploaded; send multipart field \"document\" or {\"type\":\"certificate\"}"
                        .to_string(),
                ))
            }
        }
    };

    let scope = AccessScope::for_principal(&principal);
    let owner = with_conn(&state, move |conn| {
        Ok(abonnes::get_abonne(conn, &scope, abonne_id)?)
    })
    .await?;

    let (stored, doc_type, replace) = match submission {
        Submission::Upload {
            original_name,
            extension,
            doc_type,
            bytes,
        } => {
            let file_name = unique_file_name(&original_name, &extension);
            let stored = state
                .storage
                .write(&owner.numero_identification, &file_name, &bytes)
                .await?;
            (stored, doc_type, false)
        }
        Submission::Certificate => {
            // Regeneration overwrites the same file, so it replaces its row.
            let stored = write_certificate(&state, &owner).await?;
            (stored, CERTIFICATE_TYPE.to_string(), true)
        }
    };

    let (document, replaced) =
        register_document(&state, &principal, abonne_id, &stored, doc_type, replace).await?;

    for previous in &replaced {
        tracing::info!(document_id = previous.id, abonne_id, "certificate row replaced");
        notify(
            &state.hub,
            state.notify_scope,
            EntityKind::Document,
            Mutation::Deleted,
            previous.id,
            owner.agence.as_deref(),
            previous,
        )
        .await;
    }

    tracing::info!(
        document_id = document.id,
        abonne_id,
        doc_type = %document.doc_type,
        "document added"
    );
    notify(
        &state.hub,
        state.notify_scope,
        EntityKind::Document,
        Mutation::Created,
        document.id,
        owner.agence.as_deref(),
        &document,
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "document added",
            "document": document,
        })),
    )
        .into_response())
}

async fn read_multipart(state: &AppState, mut multipart: Multipart) -> Result<Submission, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut doc_type: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FILE_FIELD) => {
                let original_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("uploaded file has no name".to_string()))?;
                // Refuse by extension before buffering the body.
                state.storage.check_upload(&original_name, 1)?;
                let bytes = field.bytes().await?;
                file = Some((original_name, bytes.to_vec()));
            }
            Some("type") => {
                doc_type = Some(field.text().await?);
            }
            _ => {}
        }
    }

    let doc_type = doc_type
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if doc_type.as_deref().is_some_and(is_certificate_type) {
        return Ok(Submission::Certificate);
    }

    let (original_name, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("no file uploaded".to_string()))?;
    let extension = state.storage.check_upload(&original_name, bytes.len())?;

    Ok(Submission::Upload {
        original_name,
        extension,
        doc_type: doc_type.unwrap_or_else(|| DEFAULT_UPLOAD_TYPE.to_string()),
        bytes,
    })
}

async fn write_certificate(state: &AppState, owner: &Abonne) -> Result<StoredFile, ApiError> {
    let abonne = owner.clone();
    let template = state.certificate_template.clone();
    let bytes = tokio::task::spawn_blocking(move || {
        omnidoc_reports::generate_certificate(&abonne, template.as_deref())
    })
    .await??;

    let file_name = omnidoc_reports::certificate_file_name(&owner.numero_identification);
    Ok(state
        .storage
        .write(&owner.numero_identification, &file_name, &bytes)
        .await?)
}

/// Inserts the document row.
///
/// With `replace`, earlier rows of the same subscriber pointing at the same
/// path are deleted in the same transaction and returned. If the insert
/// fails, the written file is removed unless another row still uses it.
async fn register_document(
    state: &Arc<AppState>,
    principal: &Principal,
    abonne_id: i64,
    stored: &StoredFile,
    doc_type: String,
    replace: bool,
) -> Result<(Document, Vec<Document>), ApiError> {
    let scope = AccessScope::for_principal(principal);
    let new_document = NewDocument {
        doc_type,
        nom_fichier: stored.file_name.clone(),
        chemin_fichier: stored.chemin.clone(),
        taille_fichier: i64::try_from(stored.size).unwrap_or(i64::MAX),
        created_by: Some(principal.id),
    };

    let result = with_tx(state, move |tx| {
        let owner = abonnes::get_abonne(tx, &scope, abonne_id)?;
        let replaced = if replace {
            documents::delete_documents_at(tx, &owner, &new_document.chemin_fichier)?
        } else {
            Vec::new()
        };
        let document = documents::create_document(tx, &owner, &new_document)?;
        Ok((document, replaced))
    })
    .await;

    if result.is_err() {
        let chemin = stored.chemin.clone();
        let referenced = with_conn(state, move |conn| {
            Ok(documents::is_path_referenced(conn, &chemin, None)?)
        })
        .await;
        match referenced {
            Ok(false) => state.storage.remove_quietly(&stored.chemin).await,
            Ok(true) => {}
            Err(e) => {
                tracing::warn!(chemin = %stored.chemin, "keeping stored file, reference check failed: {}", e);
            }
        }
    }
    result
}

/// Handler for `PUT /api/abonnes/{id}/documents/{item_id}`: relabels a
/// document.
pub async fn update_document_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path((abonne_id, id)): Path<(i64, i64)>,
    payload: Result<Json<DocumentTypeRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;
    let scope = AccessScope::for_principal(&principal);
    let (document, agence) = with_tx(&state, move |tx| {
        let owner = abonnes::get_abonne(tx, &scope, abonne_id)?;
        let document = documents::update_document_type(tx, &owner, id, body.doc_type.as_deref())?;
        Ok((document, owner.agence))
    })
    .await?;

    notify(
        &state.hub,
        state.notify_scope,
        EntityKind::Document,
        Mutation::Updated,
        document.id,
        agence.as_deref(),
        &document,
    )
    .await;

    Ok(Json(json!({ "message": "document updated" })))
}

/// Handler for `DELETE /api/abonnes/{id}/documents/{item_id}`.
///
/// The backing file is removed first on a best-effort basis, unless another
/// row still points at it. A removal failure is logged and the row is still
/// deleted.
pub async fn delete_document_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    Path((abonne_id, id)): Path<(i64, i64)>,
) -> Result<Json<Value>, ApiError> {
    let scope = AccessScope::for_principal(&principal);
    let lookup_scope = scope.clone();
    let (existing, shared) = with_conn(&state, move |conn| {
        let owner = abonnes::get_abonne(conn, &lookup_scope, abonne_id)?;
        let document = documents::get_document(conn, &owner, id)?;
        let shared = documents::is_path_referenced(conn, &document.chemin_fichier, Some(id))?;
        Ok((document, shared))
    })
    .await?;

    if shared {
        tracing::debug!(document_id = id, "stored file still referenced, keeping it");
    } else {
        state.storage.remove_quietly(&existing.chemin_fichier).await;
    }

    let (document, agence) = with_tx(&state, move |tx| {
        let owner = abonnes::get_abonne(tx, &scope, abonne_id)?;
        let document = documents::delete_document(tx, &owner, id)?;
        Ok((document, owner.agence))
    })
    .await?;

    tracing::info!(document_id = id, abonne_id, "document deleted");
    notify(
        &state.hub,
        state.notify_scope,
        EntityKind::Document,
        Mutation::Deleted,
        document.id,
        agence.as_deref(),
        &document,
    )
    .await;

    Ok(Json(json!({ "message": "document deleted" })))
}
