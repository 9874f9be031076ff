// src/services/propagation_service.rs

use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    db::RegistryStore,
    models::{
        diagnostics::AttributionRepair,
        geography::GeographicCode,
        household::{CreateHouseholdPayload, Household, HouseholdCode, HouseholdDetails, NewHousehold, Relocation},
        principal::Principal,
        resident::{CreateResidentPayload, Placement, Resident},
    },
    policy::{model, Resource},
    services::geography_service::GeographyService,
};

/// Residente criado e, na criação implícita, o domicílio criado junto.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResident {
    pub resident: Resident,
    pub household: Option<Household>,
}

/// Motor de propagação de atribuição.
///
/// O domicílio é a fonte de verdade dos quatro códigos. Toda escrita que
/// muda a atribuição de um residente com domicílio passa por aqui e é
/// gravada numa única transação do armazenamento.
#[derive(Clone)]
pub struct PropagationService {
    store: Arc<dyn RegistryStore>,
    geography: Arc<GeographyService>,
    chunk_size: usize,
}

impl PropagationService {
    pub fn new(store: Arc<dyn RegistryStore>, geography: Arc<GeographyService>, chunk_size: usize) -> Self {
        Self { store, geography, chunk_size: chunk_size.max(1) }
    }

    async fn active_household(&self, principal: &Principal, code: &HouseholdCode) -> Result<Household, AppError> {
        self.store
            .find_household(principal, code)
            .await?
            .filter(|h| h.is_active)
            .ok_or_else(|| AppError::HouseholdNotFound(code.to_string()))
    }

    async fn active_resident(&self, principal: &Principal, id: Uuid) -> Result<Resident, AppError> {
        self.store
            .find_resident(principal, id)
            .await?
            .filter(|r| r.is_active)
            .ok_or(AppError::ResidentNotFound(id))
    }

    pub async fn create_household(
        &self,
        principal: &Principal,
        payload: CreateHouseholdPayload,
    ) -> Result<Household, AppError> {
        payload.validate()?;

        let attribution = self
            .geography
            .attribution_for_principal(principal, payload.barangay_code.as_ref())?;
        model::require_write(principal, Resource::record(&attribution))?;

        let household = self
            .store
            .insert_household(
                principal,
                NewHousehold { code: payload.code, attribution, address: payload.address },
            )
            .await?;

        tracing::info!(
            "🏠 Domicílio {} criado em {} por {}",
            household.code,
            household.attribution.barangay_code,
            principal.identity()
        );
        Ok(household)
    }

    /// Três formas de colocar o residente: num domicílio existente (copia os
    /// códigos dele), num domicílio novo criado junto (como chefe) ou sem
    /// domicílio (códigos do escopo do principal ou do barangay informado).
    pub async fn create_resident(
        &self,
        principal: &Principal,
        payload: CreateResidentPayload,
    ) -> Result<CreatedResident, AppError> {
        payload.validate()?;

        match (payload.household_code, payload.new_household) {
            (Some(_), Some(_)) => Err(AppError::InvalidInput(
                "Informe householdCode OU newHousehold, não os dois.".into(),
            )),

            (Some(code), None) => {
                if payload.barangay_code.is_some() {
                    return Err(AppError::InvalidInput(
                        "barangayCode não se aplica: o residente herda os códigos do domicílio.".into(),
                    ));
                }
                let household = self.active_household(principal, &code).await?;
                model::require_write(principal, Resource::record(&household.attribution))?;

                let resident = self
                    .store
                    .insert_resident(principal, payload.person, Placement::Household(code))
                    .await?;
                tracing::info!("👤 Residente {} adicionado ao domicílio {}", resident.id, household.code);
                Ok(CreatedResident { resident, household: None })
            }

            (None, Some(new_household)) => {
                let attribution = self
                    .geography
                    .attribution_for_principal(principal, payload.barangay_code.as_ref())?;
                model::require_write(principal, Resource::record(&attribution))?;

                let (household, resident) = self
                    .store
                    .insert_household_with_head(
                        principal,
                        NewHousehold { code: new_household.code, attribution, address: new_household.address },
                        payload.person,
                    )
                    .await?;
                tracing::info!(
                    "🏠 Domicílio {} criado junto com o chefe {}",
                    household.code,
                    resident.id
                );
                Ok(CreatedResident { resident, household: Some(household) })
            }

            (None, None) => {
                let attribution = self
                    .geography
                    .attribution_for_principal(principal, payload.barangay_code.as_ref())?;
                model::require_write(principal, Resource::record(&attribution))?;

                let resident = self
                    .store
                    .insert_resident(principal, payload.person, Placement::Standalone(attribution))
                    .await?;
                tracing::info!("👤 Residente {} criado sem domicílio", resident.id);
                Ok(CreatedResident { resident, household: None })
            }
        }
    }

    /// Realocação: domicílio e todos os membros ativos numa única transação.
    pub async fn relocate_household(
        &self,
        principal: &Principal,
        code: &HouseholdCode,
        barangay: &GeographicCode,
    ) -> Result<Relocation, AppError> {
        let target = self.geography.attribution_for_barangay(barangay)?;
        let current = self.active_household(principal, code).await?;
        model::authorize_relocation(principal, &current.attribution, &target)?;

        let relocation = self
            .store
            .relocate_household(principal, code, &target, self.chunk_size)
            .await
            .inspect_err(|e| tracing::warn!("Realocação do domicílio {} abortada: {}", code, e))?;

        tracing::info!(
            "🚚 Domicílio {} realocado de {} para {} ({} residentes) por {} ({})",
            code,
            relocation.previous.barangay_code,
            relocation.household.attribution.barangay_code,
            relocation.residents_updated,
            principal.identity(),
            principal.role()
        );
        Ok(relocation)
    }

    pub async fn reassign_resident(
        &self,
        principal: &Principal,
        resident_id: Uuid,
        household_code: &HouseholdCode,
    ) -> Result<Resident, AppError> {
        let resident = self.active_resident(principal, resident_id).await?;
        model::require_write(principal, Resource::record(&resident.attribution))?;

        let household = self.active_household(principal, household_code).await?;
        model::require_write(principal, Resource::record(&household.attribution))
            .map_err(|_| AppError::Forbidden("domicílio de destino fora da jurisdição".into()))?;

        if resident.household_code.as_ref() == Some(household_code) && resident.attribution == household.attribution {
            return Ok(resident);
        }

        let moved = self
            .store
            .reassign_resident(principal, resident_id, household_code)
            .await?;
        tracing::info!("👤 Residente {} movido para o domicílio {}", moved.id, household_code);
        Ok(moved)
    }

    pub async fn update_household_details(
        &self,
        principal: &Principal,
        code: &HouseholdCode,
        details: HouseholdDetails,
    ) -> Result<Household, AppError> {
        details.validate()?;

        let household = self.active_household(principal, code).await?;
        model::require_write(principal, Resource::record(&household.attribution))?;

        // A pertença do chefe é conferida pelo armazenamento, com as linhas
        // travadas.
        self.store.update_household_details(principal, code, details).await
    }

    /// Desativação lógica (`is_active = false`).
    pub async fn deactivate_resident(&self, principal: &Principal, resident_id: Uuid) -> Result<Resident, AppError> {
        let resident = self
            .store
            .find_resident(principal, resident_id)
            .await?
            .ok_or(AppError::ResidentNotFound(resident_id))?;
        model::require_write(principal, Resource { attribution: &resident.attribution, mutable: resident.is_active })?;

        let resident = self.store.deactivate_resident(principal, resident_id).await?;
        tracing::info!("Residente {} desativado por {}", resident_id, principal.identity());
        Ok(resident)
    }

    /// Reparo explícito da deriva de um domicílio. Nunca é disparado pelos
    /// diagnósticos: só por este chamado, e cada correção fica registrada.
    pub async fn repair_attribution(
        &self,
        principal: &Principal,
        code: &HouseholdCode,
    ) -> Result<Vec<AttributionRepair>, AppError> {
        let household = self.active_household(principal, code).await?;
        model::require_write(principal, Resource::record(&household.attribution))?;

        let repairs = self.store.repair_household(principal, code).await?;
        if repairs.is_empty() {
            tracing::info!("Domicílio {} sem deriva; nada a reparar", code);
        } else {
            tracing::warn!(
                "🔧 {} residentes do domicílio {} reparados por {}",
                repairs.len(),
                code,
                principal.identity()
            );
        }
        Ok(repairs)
    }
}
