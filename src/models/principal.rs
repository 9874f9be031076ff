// src/models/principal.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::geography::{GeoLevel, GeographicCode},
    services::geography_service::GeographyService,
};

// ---
// 1. AccessLevel (Ordenado: barangay < city < province < region < national)
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Barangay,
    City,
    Province,
    Region,
    National,
}

impl AccessLevel {
    pub const ALL: [AccessLevel; 5] = [
        AccessLevel::Barangay,
        AccessLevel::City,
        AccessLevel::Province,
        AccessLevel::Region,
        AccessLevel::National,
    ];

    /// Nome canônico. É exatamente este texto que vai para `app.access_level`
    /// na sessão do banco.
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Barangay => "barangay",
            AccessLevel::City => "city",
            AccessLevel::Province => "province",
            AccessLevel::Region => "region",
            AccessLevel::National => "national",
        }
    }

    pub fn from_name(name: &str) -> Option<AccessLevel> {
        Self::ALL.into_iter().find(|level| level.as_str() == name)
    }

    /// Nível geográfico comparado por este nível de acesso. `National` não
    /// compara nada.
    pub fn geo_level(self) -> Option<GeoLevel> {
        match self {
            AccessLevel::Barangay => Some(GeoLevel::Barangay),
            AccessLevel::City => Some(GeoLevel::City),
            AccessLevel::Province => Some(GeoLevel::Province),
            AccessLevel::Region => Some(GeoLevel::Region),
            AccessLevel::National => None,
        }
    }
}

impl From<GeoLevel> for AccessLevel {
    fn from(level: GeoLevel) -> Self {
        match level {
            GeoLevel::Barangay => AccessLevel::Barangay,
            GeoLevel::City => AccessLevel::City,
            GeoLevel::Province => AccessLevel::Province,
            GeoLevel::Region => AccessLevel::Region,
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---
// 2. RoleGrant (O que um cargo concede)
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleScope {
    Super,
    Level(AccessLevel),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleGrant {
    pub scope: RoleScope,
    pub may_write: bool,
}

impl RoleGrant {
    /// Mapeamento determinístico cargo -> nível de acesso.
    ///
    /// `super_admin`, `<nivel>_admin`, `<nivel>_staff` (escrita) e
    /// `<nivel>_viewer` (somente leitura). Qualquer outro texto não tem
    /// mapeamento e o principal não é resolvido.
    pub fn for_role(role: &str) -> Option<RoleGrant> {
        if role == "super_admin" {
            return Some(RoleGrant { scope: RoleScope::Super, may_write: true });
        }

        let (level, duty) = role.rsplit_once('_')?;
        let level = AccessLevel::from_name(level)?;
        let may_write = match duty {
            "admin" | "staff" => true,
            "viewer" => false,
            _ => return None,
        };

        Some(RoleGrant { scope: RoleScope::Level(level), may_write })
    }
}

// ---
// 3. Jurisdiction (A autoridade resolvida)
// ---
/// `Super` e `National` são valores explícitos: não existe "sem filtro".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Jurisdiction {
    Super,
    National,
    Scoped { level: GeoLevel, code: GeographicCode },
}

impl Jurisdiction {
    pub fn is_nationwide(&self) -> bool {
        matches!(self, Jurisdiction::Super | Jurisdiction::National)
    }
}

// ---
// 4. PrincipalClaims (O que chega do colaborador de autenticação)
// ---
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalClaims {
    pub identity: Uuid,
    #[schema(example = "barangay_admin")]
    pub role: String,
    #[schema(example = "042114014")]
    pub assigned_code: Option<String>,
}

// ---
// 5. Principal (Só existe depois de resolvido)
// ---
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    identity: Uuid,
    role: String,
    jurisdiction: Jurisdiction,
    may_write: bool,
}

impl Principal {
    /// Resolve as claims contra a tabela de papéis e a geografia de referência.
    /// Qualquer inconsistência falha fechado com `PRINCIPAL_UNRESOLVED`.
    pub fn resolve(claims: &PrincipalClaims, geography: &GeographyService) -> Result<Principal, AppError> {
        let grant = RoleGrant::for_role(&claims.role).ok_or_else(|| {
            AppError::PrincipalUnresolved(format!("cargo '{}' sem nível de acesso", claims.role))
        })?;

        let jurisdiction = match (grant.scope, claims.assigned_code.as_deref()) {
            (RoleScope::Super, None) => Jurisdiction::Super,
            (RoleScope::Level(AccessLevel::National), None) => Jurisdiction::National,
            (RoleScope::Super, Some(_)) | (RoleScope::Level(AccessLevel::National), Some(_)) => {
                return Err(AppError::PrincipalUnresolved(format!(
                    "cargo '{}' não aceita código atribuído",
                    claims.role
                )));
            }
            (RoleScope::Level(level), None) => {
                return Err(AppError::PrincipalUnresolved(format!(
                    "nível '{}' exige código atribuído",
                    level
                )));
            }
            (RoleScope::Level(level), Some(raw)) => {
                let code = GeographicCode::parse(raw)
                    .map_err(|_| AppError::PrincipalUnresolved(format!("código atribuído inválido: '{}'", raw)))?;
                let unit = geography.unit(&code).ok_or_else(|| {
                    AppError::PrincipalUnresolved(format!("código atribuído desconhecido: '{}'", code))
                })?;
                if level.geo_level() != Some(unit.level) {
                    return Err(AppError::PrincipalUnresolved(format!(
                        "código '{}' é de nível '{}', mas o cargo exige '{}'",
                        code, unit.level, level
                    )));
                }
                Jurisdiction::Scoped { level: unit.level, code }
            }
        };

        Ok(Principal {
            identity: claims.identity,
            role: claims.role.clone(),
            jurisdiction,
            may_write: grant.may_write,
        })
    }

    pub fn identity(&self) -> Uuid {
        self.identity
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn jurisdiction(&self) -> &Jurisdiction {
        &self.jurisdiction
    }

    pub fn may_write(&self) -> bool {
        self.may_write
    }
}
