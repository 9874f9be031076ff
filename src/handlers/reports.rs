// src/handlers/reports.rs

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{
        auth::AuthenticatedPrincipal,
        scope::{NationwideOperator, RequireJurisdiction},
    },
    models::report::{
        BarangaySummaryRow, BulkDeactivatePayload, BulkDeactivateResponse, ResidentReportQuery, ResidentReportRow,
    },
};

#[utoipa::path(
    get,
    path = "/api/reports/residents",
    tag = "Reports",
    params(ResidentReportQuery),
    responses((status = 200, description = "Residentes ativos no escopo do principal", body = Vec<ResidentReportRow>)),
    security(("api_jwt" = []))
)]
pub async fn resident_report(
    State(app_state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Query(query): Query<ResidentReportQuery>,
) -> Result<Json<Vec<ResidentReportRow>>, AppError> {
    let rows = app_state
        .report_service
        .resident_report(&principal, query.barangay_code.as_ref())
        .await?;
    Ok(Json(rows))
}

#[utoipa::path(
    get,
    path = "/api/reports/barangays",
    tag = "Reports",
    responses((status = 200, description = "Contagens por barangay no escopo do principal", body = Vec<BarangaySummaryRow>)),
    security(("api_jwt" = []))
)]
pub async fn barangay_summary(
    State(app_state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
) -> Result<Json<Vec<BarangaySummaryRow>>, AppError> {
    let rows = app_state.report_service.barangay_summary(&principal).await?;
    Ok(Json(rows))
}

#[utoipa::path(
    post,
    path = "/api/admin/residents/deactivate",
    tag = "Reports",
    request_body = BulkDeactivatePayload,
    responses(
        (status = 200, description = "Residentes desativados dentro do escopo de escrita", body = BulkDeactivateResponse),
        (status = 403, description = "Exige jurisdição nacional")
    ),
    security(("api_jwt" = []))
)]
pub async fn bulk_deactivate(
    State(app_state): State<AppState>,
    operator: RequireJurisdiction<NationwideOperator>,
    Json(payload): Json<BulkDeactivatePayload>,
) -> Result<Json<BulkDeactivateResponse>, AppError> {
    let response = app_state
        .report_service
        .bulk_deactivate(operator.principal(), &payload.resident_ids)
        .await?;
    Ok(Json(response))
}
