// src/services/geography_service.rs

use std::collections::HashMap;

use crate::{
    common::error::AppError,
    models::{
        diagnostics::{ChainGap, CodeIntegrityReport},
        geography::{Attribution, GeoLevel, GeoUnit, GeographicCode},
        principal::{Jurisdiction, Principal},
    },
};

/// Geografia de referência (região > província > cidade > barangay).
///
/// Carregada uma vez na inicialização e imutável depois disso; é
/// compartilhada via `Arc` entre todos os serviços.
#[derive(Debug, Default)]
pub struct GeographyService {
    units: HashMap<GeographicCode, GeoUnit>,
}

impl GeographyService {
    pub fn from_units(units: Vec<GeoUnit>) -> Self {
        let units: HashMap<_, _> = units.into_iter().map(|u| (u.code.clone(), u)).collect();
        let service = Self { units };

        let broken = service
            .units
            .keys()
            .filter(|code| service.walk(code).1.is_some())
            .count();
        if broken > 0 {
            tracing::warn!("⚠️ {} códigos geográficos com cadeia de pais incompleta", broken);
        }
        tracing::info!("🗺️ Geografia de referência carregada: {} unidades", service.units.len());

        service
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn unit(&self, code: &GeographicCode) -> Option<&GeoUnit> {
        self.units.get(code)
    }

    /// Percorre a cadeia de pais a partir de `code`. Devolve as unidades
    /// encontradas (do código até a região) e a primeira lacuna, se houver.
    fn walk(&self, code: &GeographicCode) -> (Vec<GeoUnit>, Option<ChainGap>) {
        let mut chain: Vec<GeoUnit> = Vec::with_capacity(4);

        let Some(mut current) = self.units.get(code) else {
            return (chain, Some(ChainGap::UnknownCode { code: code.clone() }));
        };

        loop {
            chain.push(current.clone());

            let expected = current.level.parent_level();
            match (expected, &current.parent_code) {
                (None, None) => return (chain, None),
                (None, Some(_)) => {
                    return (chain, Some(ChainGap::RegionWithParent { code: current.code.clone() }));
                }
                (Some(_), None) => {
                    return (chain, Some(ChainGap::ParentMissing { code: current.code.clone() }));
                }
                (Some(expected_level), Some(parent_code)) => {
                    let Some(parent) = self.units.get(parent_code) else {
                        return (
                            chain,
                            Some(ChainGap::UnknownParent {
                                code: current.code.clone(),
                                parent: parent_code.clone(),
                            }),
                        );
                    };
                    if parent.level != expected_level {
                        return (
                            chain,
                            Some(ChainGap::LevelMismatch {
                                code: current.code.clone(),
                                parent: parent.code.clone(),
                                expected: expected_level,
                                found: parent.level,
                            }),
                        );
                    }
                    current = parent;
                }
            }
        }
    }

    /// Cadeia completa `code -> ... -> região`, ou `CODE_INTEGRITY_VIOLATION`.
    pub fn resolve_chain(&self, code: &GeographicCode) -> Result<Vec<GeoUnit>, AppError> {
        match self.walk(code) {
            (chain, None) => Ok(chain),
            (_, Some(gap)) => Err(AppError::CodeIntegrityViolation(gap.to_string())),
        }
    }

    /// Os quatro códigos de um barangay, resolvidos pela cadeia de pais.
    pub fn attribution_for_barangay(&self, barangay: &GeographicCode) -> Result<Attribution, AppError> {
        let chain = self.resolve_chain(barangay)?;
        let code_at = |level: GeoLevel| {
            chain
                .iter()
                .find(|unit| unit.level == level)
                .map(|unit| unit.code.clone())
        };

        match (
            code_at(GeoLevel::Barangay),
            code_at(GeoLevel::City),
            code_at(GeoLevel::Province),
            code_at(GeoLevel::Region),
        ) {
            (Some(barangay_code), Some(city_code), Some(province_code), Some(region_code))
                if chain[0].level == GeoLevel::Barangay =>
            {
                Ok(Attribution { barangay_code, city_code, province_code, region_code })
            }
            _ => Err(AppError::CodeIntegrityViolation(format!(
                "'{}' não é um barangay",
                barangay
            ))),
        }
    }

    /// Atribuição de um registro criado sem domicílio: o barangay explícito
    /// (que precisa estar dentro da jurisdição) ou o próprio barangay do
    /// principal.
    pub fn attribution_for_principal(
        &self,
        principal: &Principal,
        explicit_barangay: Option<&GeographicCode>,
    ) -> Result<Attribution, AppError> {
        match (principal.jurisdiction(), explicit_barangay) {
            (_, Some(barangay)) => self.attribution_for_barangay(barangay),
            (Jurisdiction::Scoped { level: GeoLevel::Barangay, code }, None) => {
                self.attribution_for_barangay(code)
            }
            _ => Err(AppError::InvalidInput(
                "Informe o barangay: só principais de nível barangay têm um barangay implícito.".into(),
            )),
        }
    }

    pub fn check_integrity(&self, code: &GeographicCode) -> CodeIntegrityReport {
        let (chain, gap) = self.walk(code);
        CodeIntegrityReport {
            code: code.clone(),
            exists: self.units.contains_key(code),
            level: self.units.get(code).map(|unit| unit.level),
            is_consistent: gap.is_none(),
            chain,
            gaps: gap.into_iter().collect(),
        }
    }
}
