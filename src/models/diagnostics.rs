// src/models/diagnostics.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    models::{
        geography::{Attribution, GeoLevel, GeoUnit, GeographicCode},
        household::HouseholdCode,
        principal::PrincipalClaims,
    },
    policy::model::{Decision, ResourceKind},
};

/// Códigos estáveis dos achados de diagnóstico (nunca corrigidos automaticamente).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingCode {
    DecisionParityViolation,
    AttributionDrift,
}

// ---
// Integridade de códigos
// ---
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ChainGap {
    UnknownCode {
        #[schema(value_type = String)]
        code: GeographicCode,
    },
    UnknownParent {
        #[schema(value_type = String)]
        code: GeographicCode,
        #[schema(value_type = String)]
        parent: GeographicCode,
    },
    ParentMissing {
        #[schema(value_type = String)]
        code: GeographicCode,
    },
    RegionWithParent {
        #[schema(value_type = String)]
        code: GeographicCode,
    },
    LevelMismatch {
        #[schema(value_type = String)]
        code: GeographicCode,
        #[schema(value_type = String)]
        parent: GeographicCode,
        expected: GeoLevel,
        found: GeoLevel,
    },
}

impl fmt::Display for ChainGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainGap::UnknownCode { code } => write!(f, "código '{}' não existe na referência", code),
            ChainGap::UnknownParent { code, parent } => {
                write!(f, "pai '{}' de '{}' não existe na referência", parent, code)
            }
            ChainGap::ParentMissing { code } => write!(f, "'{}' não tem pai", code),
            ChainGap::RegionWithParent { code } => write!(f, "região '{}' não deveria ter pai", code),
            ChainGap::LevelMismatch { code, parent, expected, found } => write!(
                f,
                "pai '{}' de '{}' é '{}', esperado '{}'",
                parent, code, found, expected
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CodeIntegrityReport {
    #[schema(value_type = String)]
    pub code: GeographicCode,
    pub exists: bool,
    pub level: Option<GeoLevel>,
    pub is_consistent: bool,
    pub chain: Vec<GeoUnit>,
    pub gaps: Vec<ChainGap>,
}

// ---
// Paridade de decisões
// ---
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParityCheckRequest {
    pub principal: PrincipalClaims,
    pub kind: ResourceKind,
    pub resource_ids: Vec<String>,
}

/// Visibilidade de um recurso medida pelos dois caminhos no mesmo snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilitySample {
    pub resource_id: String,
    /// Atribuição lida pelo operador (`None` = não existe no escopo dele).
    pub attribution: Option<Attribution>,
    pub mutable: bool,
    pub declarative: bool,
    pub privileged: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParityMismatch {
    pub resource_id: String,
    pub declarative_allows: bool,
    pub privileged_allows: bool,
    pub model_decision: Decision,
    pub finding: FindingCode,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParityReport {
    pub identity: Uuid,
    pub role: String,
    pub principal_resolved: bool,
    pub kind: ResourceKind,
    pub sampled: usize,
    pub mismatches: Vec<ParityMismatch>,
    /// Qualquer divergência é um defeito crítico, nunca transitório.
    pub critical: bool,
}

// ---
// Deriva de atribuição
// ---
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DriftFinding {
    pub resident_id: Uuid,
    pub resident_attribution: Attribution,
    pub mismatched_levels: Vec<GeoLevel>,
    pub finding: FindingCode,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    #[schema(value_type = String)]
    pub household_code: HouseholdCode,
    pub household_attribution: Attribution,
    pub residents_checked: usize,
    pub findings: Vec<DriftFinding>,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        !self.findings.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DriftScanReport {
    pub households_checked: usize,
    pub residents_checked: usize,
    pub drifted: Vec<DriftReport>,
}

// ---
// Reparo auditado
// ---
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttributionRepair {
    pub id: Uuid,
    #[schema(value_type = String)]
    pub household_code: HouseholdCode,
    pub resident_id: Uuid,
    #[sqlx(json)]
    pub previous: Attribution,
    #[sqlx(json)]
    pub restored: Attribution,
    pub repaired_by: Uuid,
    pub repaired_at: chrono::DateTime<chrono::Utc>,
}
