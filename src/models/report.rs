// src/models/report.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{
    geography::{Attribution, GeographicCode},
    household::HouseholdCode,
};

/// Linha achatada (residente + domicílio) do relatório privilegiado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResidentReportRow {
    pub resident_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[schema(value_type = Option<String>)]
    pub household_code: Option<HouseholdCode>,
    pub household_address: Option<String>,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub attribution: Attribution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BarangaySummaryRow {
    #[schema(value_type = String)]
    pub barangay_code: GeographicCode,
    pub households: i64,
    pub residents: i64,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ResidentReportQuery {
    /// Restringe a um barangay (dentro do escopo do principal).
    #[param(value_type = Option<String>)]
    pub barangay_code: Option<GeographicCode>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeactivatePayload {
    pub resident_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeactivateResponse {
    pub requested: usize,
    pub deactivated: u64,
}
