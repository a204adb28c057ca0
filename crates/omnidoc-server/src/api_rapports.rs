//! Reporting handlers. Every read is limited to the caller's agency scope.

use crate::api::{with_conn, ApiError};
use crate::api_abonnes::pdf_response;
use crate::middleware::PrincipalContext;
use crate::AppState;
use axum::{
    extract::{rejection::QueryRejection, Extension, Json, Query},
    response::Response,
};
use omnidoc_records::{
    abonnes, stats, AbonneFilter, AccessScope, RapportFilter, RapportRow, Statistiques,
};
use omnidoc_reports::ReportFilters;
use std::sync::Arc;

/// Handler for `GET /api/rapports/statistiques`.
pub async fn statistiques_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
) -> Result<Json<Statistiques>, ApiError> {
    let scope = AccessScope::for_principal(&principal);
    let statistiques = with_conn(&state, move |conn| {
        Ok(stats::statistiques(conn, &scope)?)
    })
    .await?;
    Ok(Json(statistiques))
}

/// Handler for `GET /api/rapports/abonnes?ville&dateDebut&dateFin&search`.
pub async fn rapport_abonnes_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    filter: Result<Query<RapportFilter>, QueryRejection>,
) -> Result<Json<Vec<RapportRow>>, ApiError> {
    let Query(filter) = filter?;
    let scope = AccessScope::for_principal(&principal);
    let rows = with_conn(&state, move |conn| {
        Ok(stats::rapport_abonnes(conn, &scope, &filter)?)
    })
    .await?;
    Ok(Json(rows))
}

/// Handler for `GET /api/rapports/abonnes/pdf`: the filtered listing with
/// its statistics page.
pub async fn rapport_pdf_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(PrincipalContext(principal)): Extension<PrincipalContext>,
    filter: Result<Query<AbonneFilter>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(filter) = filter?;
    let scope = AccessScope::for_principal(&principal);
    let now = chrono::Local::now();
    let generated_at = now.format("%d/%m/%Y %H:%M").to_string();
    let file_name = format!("rapport_abonnes_{}.pdf", now.format("%Y%m%d_%H%M%S"));

    let bytes = with_conn(&state, move |conn| {
        let rows = abonnes::list_abonnes(conn, &scope, &filter)?;
        let described = ReportFilters {
            agence: scope
                .forced_agency()
                .map(str::to_string)
                .or(filter.agence),
            statut: filter.statut,
            date_debut: filter.date_debut,
            date_fin: filter.date_fin,
            search: filter.search,
        };
        Ok(omnidoc_reports::generate_listing(&rows, &described, &generated_at)?)
    })
    .await?;

    tracing::info!(user_id = principal.id, "subscriber report generated");
    Ok(pdf_response(&file_name, bytes))
}
