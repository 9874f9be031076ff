// src/models/geography.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;

use crate::common::error::AppError;

// ---
// 1. GeographicCode (O identificador canônico)
// ---
/// Código geográfico opaco (região, província, cidade ou barangay).
///
/// A canonicalização acontece UMA vez, na ingestão (`parse`). Depois disso
/// toda comparação é igualdade exata de string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[sqlx(transparent)]
pub struct GeographicCode(String);

impl GeographicCode {
    pub const MAX_LEN: usize = 16;

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidInput("Código geográfico vazio.".into()));
        }
        if trimmed.len() > Self::MAX_LEN || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::InvalidInput(format!(
                "Código geográfico inválido: '{}'.",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GeographicCode {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GeographicCode> for String {
    fn from(code: GeographicCode) -> Self {
        code.0
    }
}

impl fmt::Display for GeographicCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---
// 2. GeoLevel (Os quatro níveis da tabela de referência)
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "geo_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GeoLevel {
    Barangay,
    City,
    Province,
    Region,
}

impl GeoLevel {
    pub const ALL: [GeoLevel; 4] = [
        GeoLevel::Barangay,
        GeoLevel::City,
        GeoLevel::Province,
        GeoLevel::Region,
    ];

    /// Nível imediatamente acima (o pai obrigatório na cadeia).
    pub fn parent_level(self) -> Option<GeoLevel> {
        match self {
            GeoLevel::Barangay => Some(GeoLevel::City),
            GeoLevel::City => Some(GeoLevel::Province),
            GeoLevel::Province => Some(GeoLevel::Region),
            GeoLevel::Region => None,
        }
    }

    /// Coluna desnormalizada que guarda o código deste nível em
    /// `households` e `residents`.
    pub fn column(self) -> &'static str {
        match self {
            GeoLevel::Barangay => "barangay_code",
            GeoLevel::City => "city_code",
            GeoLevel::Province => "province_code",
            GeoLevel::Region => "region_code",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GeoLevel::Barangay => "barangay",
            GeoLevel::City => "city",
            GeoLevel::Province => "province",
            GeoLevel::Region => "region",
        }
    }
}

impl fmt::Display for GeoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---
// 3. GeoUnit (Linha da tabela de referência)
// ---
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeoUnit {
    #[schema(value_type = String, example = "042114014")]
    pub code: GeographicCode,
    pub level: GeoLevel,
    #[schema(value_type = Option<String>, example = "0421140")]
    pub parent_code: Option<GeographicCode>,
    #[schema(example = "Poblacion")]
    pub name: String,
}

// ---
// 4. Attribution (Os quatro códigos carimbados no registro)
// ---
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    #[schema(value_type = String, example = "042114014")]
    pub barangay_code: GeographicCode,
    #[schema(value_type = String, example = "0421140")]
    pub city_code: GeographicCode,
    #[schema(value_type = String, example = "0421")]
    pub province_code: GeographicCode,
    #[schema(value_type = String, example = "04")]
    pub region_code: GeographicCode,
}

impl Attribution {
    pub fn code_at(&self, level: GeoLevel) -> &GeographicCode {
        match level {
            GeoLevel::Barangay => &self.barangay_code,
            GeoLevel::City => &self.city_code,
            GeoLevel::Province => &self.province_code,
            GeoLevel::Region => &self.region_code,
        }
    }

    /// Níveis em que as duas atribuições divergem (vazio = consistentes).
    pub fn mismatched_levels(&self, other: &Attribution) -> Vec<GeoLevel> {
        GeoLevel::ALL
            .into_iter()
            .filter(|level| self.code_at(*level) != other.code_at(*level))
            .collect()
    }
}
