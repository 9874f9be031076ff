// src/models/resident.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    geography::{Attribution, GeographicCode},
    household::HouseholdCode,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Resident {
    pub id: Uuid,

    // Quando presente, a atribuição abaixo é SEMPRE a do domicílio.
    #[schema(value_type = Option<String>, example = "HH-000123")]
    pub household_code: Option<HouseholdCode>,

    #[serde(flatten)]
    #[sqlx(flatten)]
    pub attribution: Attribution,

    #[schema(example = "Juan")]
    pub first_name: String,
    pub middle_name: Option<String>,
    #[schema(example = "Dela Cruz")]
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    #[schema(example = "M")]
    pub sex: Option<String>,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Dados pessoais de um residente a ser inserido (sem geografia: ela vem do
/// domicílio ou do escopo do principal).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersonalDetails {
    #[validate(length(min = 1, max = 100, message = "O nome é obrigatório."))]
    pub first_name: String,
    #[validate(length(max = 100))]
    pub middle_name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "O sobrenome é obrigatório."))]
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    #[validate(length(max = 10))]
    pub sex: Option<String>,
}

/// Onde o residente será colocado na inserção.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Copia os quatro códigos do domicílio, atomicamente com o INSERT.
    Household(HouseholdCode),
    /// Sem domicílio: a atribuição própria do residente é a autoridade.
    Standalone(Attribution),
}

// ---
// Payloads
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewHouseholdForResident {
    #[schema(value_type = String, example = "HH-000124")]
    pub code: HouseholdCode,
    #[validate(length(min = 1, max = 255))]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateResidentPayload {
    #[serde(flatten)]
    #[validate(nested)]
    pub person: PersonalDetails,

    /// Domicílio existente.
    #[schema(value_type = Option<String>, example = "HH-000123")]
    pub household_code: Option<HouseholdCode>,

    /// Cria o domicílio junto, com este residente como chefe.
    #[validate(nested)]
    pub new_household: Option<NewHouseholdForResident>,

    /// Barangay explícito para residentes sem domicílio (ou para o domicílio novo).
    #[schema(value_type = Option<String>, example = "042114014")]
    pub barangay_code: Option<GeographicCode>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MoveResidentPayload {
    #[schema(value_type = String, example = "HH-000124")]
    pub household_code: HouseholdCode,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ResidentListQuery {
    #[param(example = 50)]
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ResidentListQuery {
    pub const MAX_LIMIT: i64 = 500;

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
