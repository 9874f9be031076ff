// src/handlers/access.rs

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::VerifiedClaims,
    models::principal::Principal,
    policy::{Decision, ResourceKind},
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub kind: ResourceKind,
    #[schema(example = "HH-000123")]
    pub resource_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    pub kind: ResourceKind,
    pub resource_id: String,
    pub decision: Decision,
    pub principal_resolved: bool,
}

// ---
// Handler: decide
// ---
/// Um principal que não resolve recebe `DENY`, não um erro.
#[utoipa::path(
    post,
    path = "/api/access/decide",
    tag = "Access",
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Decisão de acesso do principal autenticado", body = DecisionResponse),
        (status = 401, description = "Token ausente ou inválido")
    ),
    security(("api_jwt" = []))
)]
pub async fn decide(
    State(app_state): State<AppState>,
    VerifiedClaims(claims): VerifiedClaims,
    Json(payload): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, AppError> {
    let (decision, principal_resolved) = match Principal::resolve(&claims, &app_state.geography) {
        Ok(principal) => (
            app_state
                .access_service
                .decide_on(&principal, payload.kind, &payload.resource_id)
                .await?,
            true,
        ),
        Err(_) => (Decision::Deny, false),
    };

    Ok(Json(DecisionResponse {
        kind: payload.kind,
        resource_id: payload.resource_id,
        decision,
        principal_resolved,
    }))
}
