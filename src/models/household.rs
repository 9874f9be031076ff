// src/models/household.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    models::geography::{Attribution, GeographicCode},
};

// ---
// 1. HouseholdCode (Chave legível, não é surrogate)
// ---
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[sqlx(transparent)]
pub struct HouseholdCode(String);

impl HouseholdCode {
    pub const MAX_LEN: usize = 32;

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= Self::MAX_LEN
            && trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(AppError::InvalidInput(format!("Código de domicílio inválido: '{}'.", trimmed)));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for HouseholdCode {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<HouseholdCode> for String {
    fn from(code: HouseholdCode) -> Self {
        code.0
    }
}

impl fmt::Display for HouseholdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---
// 2. Household (A fonte de verdade geográfica da família)
// ---
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Household {
    #[schema(value_type = String, example = "HH-000123")]
    pub code: HouseholdCode,

    #[serde(flatten)]
    #[sqlx(flatten)]
    pub attribution: Attribution,

    #[schema(example = "Purok 3, Rizal St.")]
    pub address: Option<String>,
    pub head_resident_id: Option<Uuid>,
    pub member_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Dados de um domicílio a ser inserido, com a atribuição já resolvida.
#[derive(Debug, Clone)]
pub struct NewHousehold {
    pub code: HouseholdCode,
    pub attribution: Attribution,
    pub address: Option<String>,
}

/// Alterações permitidas fora da realocação. Os códigos geográficos NÃO
/// entram aqui.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdDetails {
    #[validate(length(min = 1, max = 255, message = "O endereço deve ter entre 1 e 255 caracteres."))]
    pub address: Option<String>,
    pub head_resident_id: Option<Uuid>,
    #[validate(range(min = 0, max = 999, message = "Número de membros inválido."))]
    pub member_count: Option<i32>,
}

// ---
// 3. Payloads
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateHouseholdPayload {
    #[schema(value_type = String, example = "HH-000123")]
    pub code: HouseholdCode,

    /// Opcional para principais de nível barangay (usa o barangay deles).
    #[schema(value_type = Option<String>, example = "042114014")]
    pub barangay_code: Option<GeographicCode>,

    #[validate(length(min = 1, max = 255, message = "O endereço deve ter entre 1 e 255 caracteres."))]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelocateHouseholdPayload {
    #[schema(value_type = String, example = "042114099")]
    pub barangay_code: GeographicCode,
}

/// Resultado de uma realocação confirmada.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Relocation {
    pub household: Household,
    pub previous: Attribution,
    pub residents_updated: u64,
}
