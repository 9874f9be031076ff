// src/handlers/diagnostics.rs
//
// Diagnósticos: só leitura, exigem jurisdição nacional. O reparo é a única
// rota que escreve, e só quando chamada explicitamente.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::scope::{NationwideOperator, RequireJurisdiction},
    models::{
        diagnostics::{AttributionRepair, CodeIntegrityReport, DriftReport, DriftScanReport, ParityCheckRequest, ParityReport},
        geography::GeographicCode,
        household::HouseholdCode,
    },
};

type Operator = RequireJurisdiction<NationwideOperator>;

#[utoipa::path(
    post,
    path = "/api/diagnostics/parity",
    tag = "Diagnostics",
    request_body = ParityCheckRequest,
    responses(
        (status = 200, description = "Comparação entre RLS, filtro privilegiado e modelo", body = ParityReport),
        (status = 503, description = "Cancelado")
    ),
    security(("api_jwt" = []))
)]
pub async fn check_parity(
    State(app_state): State<AppState>,
    operator: Operator,
    Json(payload): Json<ParityCheckRequest>,
) -> Result<Json<ParityReport>, AppError> {
    let cancel = app_state.shutdown.child_token();
    let report = app_state
        .diagnostic_service
        .check_decision_parity(operator.principal(), payload, &cancel)
        .await?;
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/api/diagnostics/drift/{code}",
    tag = "Diagnostics",
    params(("code" = String, Path, description = "Código do domicílio")),
    responses((status = 200, description = "Residentes com deriva de atribuição", body = DriftReport)),
    security(("api_jwt" = []))
)]
pub async fn check_drift(
    State(app_state): State<AppState>,
    operator: Operator,
    Path(code): Path<String>,
) -> Result<Json<DriftReport>, AppError> {
    let code = HouseholdCode::parse(&code)?;
    let cancel = app_state.shutdown.child_token();
    let report = app_state
        .diagnostic_service
        .check_attribution_drift(operator.principal(), &code, &cancel)
        .await?;
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/api/diagnostics/drift-scan",
    tag = "Diagnostics",
    responses((status = 200, description = "Domicílios com deriva", body = DriftScanReport)),
    security(("api_jwt" = []))
)]
pub async fn scan_drift(State(app_state): State<AppState>, operator: Operator) -> Result<Json<DriftScanReport>, AppError> {
    let cancel = app_state.shutdown.child_token();
    let report = app_state
        .diagnostic_service
        .scan_attribution_drift(operator.principal(), &cancel)
        .await?;
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/api/diagnostics/codes/{code}",
    tag = "Diagnostics",
    params(("code" = String, Path, description = "Código geográfico")),
    responses((status = 200, description = "Existência e cadeia de pais", body = CodeIntegrityReport)),
    security(("api_jwt" = []))
)]
pub async fn check_code(
    State(app_state): State<AppState>,
    _operator: Operator,
    Path(code): Path<String>,
) -> Result<Json<CodeIntegrityReport>, AppError> {
    let code = GeographicCode::parse(&code)?;
    Ok(Json(app_state.diagnostic_service.check_code_integrity(&code)))
}

#[utoipa::path(
    post,
    path = "/api/diagnostics/repair/{code}",
    tag = "Diagnostics",
    params(("code" = String, Path, description = "Código do domicílio")),
    responses(
        (status = 200, description = "Correções aplicadas e auditadas", body = Vec<AttributionRepair>),
        (status = 403, description = "Sem escrita no domicílio")
    ),
    security(("api_jwt" = []))
)]
pub async fn repair(
    State(app_state): State<AppState>,
    operator: Operator,
    Path(code): Path<String>,
) -> Result<Json<Vec<AttributionRepair>>, AppError> {
    let code = HouseholdCode::parse(&code)?;
    let repairs = app_state
        .propagation_service
        .repair_attribution(operator.principal(), &code)
        .await?;
    Ok(Json(repairs))
}
