// src/handlers/households.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedPrincipal,
    models::household::{
        CreateHouseholdPayload, Household, HouseholdCode, HouseholdDetails, RelocateHouseholdPayload, Relocation,
    },
};

#[utoipa::path(
    post,
    path = "/api/households",
    tag = "Households",
    request_body = CreateHouseholdPayload,
    responses(
        (status = 201, description = "Domicílio criado", body = Household),
        (status = 403, description = "Fora da jurisdição ou sem escrita"),
        (status = 409, description = "Código já existe")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_household(
    State(app_state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Json(payload): Json<CreateHouseholdPayload>,
) -> Result<impl IntoResponse, AppError> {
    let household = app_state
        .propagation_service
        .create_household(&principal, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(household)))
}

#[utoipa::path(
    get,
    path = "/api/households/{code}",
    tag = "Households",
    params(("code" = String, Path, description = "Código do domicílio")),
    responses(
        (status = 200, description = "Domicílio", body = Household),
        (status = 404, description = "Não encontrado (ou fora da jurisdição)")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_household(
    State(app_state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(code): Path<String>,
) -> Result<Json<Household>, AppError> {
    let code = HouseholdCode::parse(&code)?;
    let household = app_state.access_service.get_household(&principal, &code).await?;
    Ok(Json(household))
}

#[utoipa::path(
    patch,
    path = "/api/households/{code}",
    tag = "Households",
    params(("code" = String, Path, description = "Código do domicílio")),
    request_body = HouseholdDetails,
    responses(
        (status = 200, description = "Detalhes atualizados", body = Household),
        (status = 403, description = "Sem escrita no domicílio")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_household(
    State(app_state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(code): Path<String>,
    Json(payload): Json<HouseholdDetails>,
) -> Result<Json<Household>, AppError> {
    let code = HouseholdCode::parse(&code)?;
    let household = app_state
        .propagation_service
        .update_household_details(&principal, &code, payload)
        .await?;
    Ok(Json(household))
}

#[utoipa::path(
    post,
    path = "/api/households/{code}/relocate",
    tag = "Households",
    params(("code" = String, Path, description = "Código do domicílio")),
    request_body = RelocateHouseholdPayload,
    responses(
        (status = 200, description = "Domicílio e membros realocados", body = Relocation),
        (status = 403, description = "Sem escrita na origem ou no destino"),
        (status = 422, description = "Barangay de destino com cadeia inconsistente")
    ),
    security(("api_jwt" = []))
)]
pub async fn relocate_household(
    State(app_state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(code): Path<String>,
    Json(payload): Json<RelocateHouseholdPayload>,
) -> Result<Json<Relocation>, AppError> {
    let code = HouseholdCode::parse(&code)?;
    let relocation = app_state
        .propagation_service
        .relocate_household(&principal, &code, &payload.barangay_code)
        .await?;
    Ok(Json(relocation))
}
