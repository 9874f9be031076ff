// src/policy/model.rs

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    common::error::AppError,
    models::{
        geography::Attribution,
        principal::{Jurisdiction, Principal, PrincipalClaims},
    },
    services::geography_service::GeographyService,
};

/// Resultado da política. `AllowWrite` implica leitura.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Deny,
    AllowRead,
    AllowWrite,
}

impl Decision {
    pub fn allows_read(self) -> bool {
        self >= Decision::AllowRead
    }

    pub fn allows_write(self) -> bool {
        self == Decision::AllowWrite
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Household,
    Resident,
}

/// O que a política julga: a atribuição do registro e se ele aceita escrita.
#[derive(Debug, Clone, Copy)]
pub struct Resource<'a> {
    pub attribution: &'a Attribution,
    pub mutable: bool,
}

impl<'a> Resource<'a> {
    pub fn record(attribution: &'a Attribution) -> Self {
        Self { attribution, mutable: true }
    }
}

/// A função de política compartilhada pelos dois caminhos de aplicação.
pub fn in_scope(jurisdiction: &Jurisdiction, attribution: &Attribution) -> bool {
    match jurisdiction {
        Jurisdiction::Super | Jurisdiction::National => true,
        Jurisdiction::Scoped { level, code } => attribution.code_at(*level) == code,
    }
}

pub fn decide(principal: &Principal, resource: Resource<'_>) -> Decision {
    if !in_scope(principal.jurisdiction(), resource.attribution) {
        return Decision::Deny;
    }

    let may_write = match principal.jurisdiction() {
        Jurisdiction::Super => true,
        _ => principal.may_write(),
    };

    if may_write && resource.mutable {
        Decision::AllowWrite
    } else {
        Decision::AllowRead
    }
}

/// Resolve as claims e decide. Um principal não resolvido é `Deny` para
/// qualquer recurso; a avaliação nunca levanta erro.
pub fn decide_claims(claims: &PrincipalClaims, geography: &GeographyService, resource: Resource<'_>) -> Decision {
    match Principal::resolve(claims, geography) {
        Ok(principal) => decide(&principal, resource),
        Err(e) => {
            tracing::debug!("Principal {} negado: {}", claims.identity, e);
            Decision::Deny
        }
    }
}

pub fn require_write(principal: &Principal, resource: Resource<'_>) -> Result<(), AppError> {
    if decide(principal, resource).allows_write() {
        Ok(())
    } else {
        Err(AppError::Forbidden("escrita não permitida para este registro".into()))
    }
}

/// Realocação exige escrita no escopo antigo E no novo.
pub fn authorize_relocation(principal: &Principal, from: &Attribution, to: &Attribution) -> Result<(), AppError> {
    require_write(principal, Resource::record(from))?;
    require_write(principal, Resource::record(to))
        .map_err(|_| AppError::Forbidden("destino da realocação fora da jurisdição".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            geography::{GeoLevel, GeographicCode},
            principal::AccessLevel,
        },
        services::geography_service::tests::{sample_geography, sample_units},
    };
    use uuid::Uuid;

    fn claims(role: &str, code: Option<&str>) -> PrincipalClaims {
        PrincipalClaims {
            identity: Uuid::new_v4(),
            role: role.to_string(),
            assigned_code: code.map(str::to_string),
        }
    }

    fn principal(role: &str, code: Option<&str>) -> Principal {
        Principal::resolve(&claims(role, code), &sample_geography()).unwrap()
    }

    fn attribution(barangay: &str) -> Attribution {
        sample_geography()
            .attribution_for_barangay(&GeographicCode::parse(barangay).unwrap())
            .unwrap()
    }

    #[test]
    fn barangay_official_reads_and_writes_own_barangay() {
        let p = principal("barangay_admin", Some("042114014"));
        let home = attribution("042114014");
        assert_eq!(decide(&p, Resource::record(&home)), Decision::AllowWrite);
        assert!(decide(&p, Resource::record(&home)).allows_read());
    }

    #[test]
    fn barangay_official_is_denied_next_barangay() {
        let p = principal("barangay_admin", Some("042114014"));
        let other = attribution("042114099");
        assert_eq!(decide(&p, Resource::record(&other)), Decision::Deny);
    }

    #[test]
    fn city_official_reads_both_barangays() {
        let p = principal("city_viewer", Some("0421140"));
        for barangay in ["042114014", "042114099"] {
            let a = attribution(barangay);
            assert_eq!(decide(&p, Resource::record(&a)), Decision::AllowRead);
        }
        assert_eq!(decide(&p, Resource::record(&attribution("042115001"))), Decision::Deny);
    }

    #[test]
    fn unknown_role_is_denied_everything() {
        let geo = sample_geography();
        let c = claims("unknown_role", Some("042114014"));
        for unit in sample_units().iter().filter(|u| u.level == GeoLevel::Barangay) {
            let a = geo.attribution_for_barangay(&unit.code).unwrap();
            assert_eq!(decide_claims(&c, &geo, Resource::record(&a)), Decision::Deny);
        }
    }

    #[test]
    fn malformed_principals_are_denied_even_where_national_would_allow() {
        let geo = sample_geography();
        let a = attribution("042114014");
        let national = claims("national_admin", None);
        assert_eq!(decide_claims(&national, &geo, Resource::record(&a)), Decision::AllowWrite);

        for bad in [
            claims("national_admin", Some("04")),
            claims("region_admin", None),
            claims("city_admin", Some("042114014")),
            claims("", None),
        ] {
            assert_eq!(decide_claims(&bad, &geo, Resource::record(&a)), Decision::Deny);
        }
    }

    #[test]
    fn reference_rows_are_never_writable() {
        let root = principal("super_admin", None);
        let a = attribution("042114014");
        assert_eq!(decide(&root, Resource { attribution: &a, mutable: false }), Decision::AllowRead);
        assert_eq!(decide(&root, Resource::record(&a)), Decision::AllowWrite);
    }

    #[test]
    fn viewers_never_write() {
        let p = principal("barangay_viewer", Some("042114014"));
        let a = attribution("042114014");
        assert_eq!(decide(&p, Resource::record(&a)), Decision::AllowRead);
        assert!(require_write(&p, Resource::record(&a)).is_err());
    }

    #[test]
    fn relocation_needs_write_on_both_scopes() {
        let barangay = principal("barangay_admin", Some("042114014"));
        let city = principal("city_admin", Some("0421140"));
        let from = attribution("042114014");
        let to = attribution("042114099");

        assert!(authorize_relocation(&barangay, &from, &to).is_err());
        assert!(authorize_relocation(&city, &from, &to).is_ok());
        assert!(authorize_relocation(&city, &from, &attribution("042115001")).is_err());
    }

    /// Níveis mais largos, com o código pai correspondente, nunca veem menos.
    #[test]
    fn scope_containment_is_monotonic() {
        let geo = sample_geography();
        let barangays: Vec<_> = sample_units()
            .into_iter()
            .filter(|u| u.level == GeoLevel::Barangay)
            .collect();
        let resources: Vec<Attribution> = barangays
            .iter()
            .map(|u| geo.attribution_for_barangay(&u.code).unwrap())
            .collect();

        for home in &resources {
            // Cadeia do principal: barangay -> city -> province -> region -> national.
            let mut ladder: Vec<Principal> = GeoLevel::ALL
                .into_iter()
                .map(|level| {
                    let role = format!("{}_viewer", AccessLevel::from(level));
                    principal(&role, Some(home.code_at(level).as_str()))
                })
                .collect();
            ladder.push(principal("national_viewer", None));

            for resource in &resources {
                let decisions: Vec<bool> = ladder
                    .iter()
                    .map(|p| decide(p, Resource::record(resource)).allows_read())
                    .collect();
                for pair in decisions.windows(2) {
                    assert!(!pair[0] || pair[1], "nível mais largo viu menos: {:?}", decisions);
                }
            }
        }
    }
}
