// src/handlers/residents.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedPrincipal,
    models::resident::{CreateResidentPayload, MoveResidentPayload, Resident, ResidentListQuery},
    services::propagation_service::CreatedResident,
};

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::InvalidInput(format!("Id de residente inválido: '{}'.", raw)))
}

#[utoipa::path(
    post,
    path = "/api/residents",
    tag = "Residents",
    request_body = CreateResidentPayload,
    responses(
        (status = 201, description = "Residente criado", body = CreatedResident),
        (status = 404, description = "Domicílio inexistente ou inativo"),
        (status = 403, description = "Fora da jurisdição ou sem escrita")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_resident(
    State(app_state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Json(payload): Json<CreateResidentPayload>,
) -> Result<impl IntoResponse, AppError> {
    let created = app_state
        .propagation_service
        .create_resident(&principal, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/residents",
    tag = "Residents",
    params(ResidentListQuery),
    responses((status = 200, description = "Residentes ativos visíveis", body = Vec<Resident>)),
    security(("api_jwt" = []))
)]
pub async fn list_residents(
    State(app_state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Query(query): Query<ResidentListQuery>,
) -> Result<Json<Vec<Resident>>, AppError> {
    let residents = app_state.access_service.list_residents(&principal, &query).await?;
    Ok(Json(residents))
}

#[utoipa::path(
    get,
    path = "/api/residents/{id}",
    tag = "Residents",
    params(("id" = Uuid, Path, description = "Id do residente")),
    responses(
        (status = 200, description = "Residente", body = Resident),
        (status = 404, description = "Não encontrado (ou fora da jurisdição)")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_resident(
    State(app_state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<String>,
) -> Result<Json<Resident>, AppError> {
    let resident = app_state
        .access_service
        .get_resident(&principal, parse_id(&id)?)
        .await?;
    Ok(Json(resident))
}

#[utoipa::path(
    post,
    path = "/api/residents/{id}/household",
    tag = "Residents",
    params(("id" = Uuid, Path, description = "Id do residente")),
    request_body = MoveResidentPayload,
    responses(
        (status = 200, description = "Residente movido; códigos copiados do novo domicílio", body = Resident),
        (status = 403, description = "Sem escrita na origem ou no destino")
    ),
    security(("api_jwt" = []))
)]
pub async fn move_resident(
    State(app_state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<String>,
    Json(payload): Json<MoveResidentPayload>,
) -> Result<Json<Resident>, AppError> {
    let resident = app_state
        .propagation_service
        .reassign_resident(&principal, parse_id(&id)?, &payload.household_code)
        .await?;
    Ok(Json(resident))
}

#[utoipa::path(
    delete,
    path = "/api/residents/{id}",
    tag = "Residents",
    params(("id" = Uuid, Path, description = "Id do residente")),
    responses(
        (status = 200, description = "Residente desativado", body = Resident),
        (status = 403, description = "Sem escrita no residente")
    ),
    security(("api_jwt" = []))
)]
pub async fn deactivate_resident(
    State(app_state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<String>,
) -> Result<Json<Resident>, AppError> {
    let resident = app_state
        .propagation_service
        .deactivate_resident(&principal, parse_id(&id)?)
        .await?;
    Ok(Json(resident))
}
