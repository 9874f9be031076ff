// src/services/access_service.rs

use std::sync::Arc;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::RegistryStore,
    models::{
        household::{Household, HouseholdCode},
        principal::Principal,
        resident::{Resident, ResidentListQuery},
    },
    policy::{model, Decision, Resource, ResourceKind},
};

/// Leituras pelo caminho declarativo e decisões de acesso sobre registros.
#[derive(Clone)]
pub struct AccessService {
    store: Arc<dyn RegistryStore>,
}

impl AccessService {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// Decisão do principal sobre um registro existente.
    ///
    /// O registro é lido pelo caminho declarativo: se a política de linha o
    /// esconde, a resposta é `Deny` (sem revelar se ele existe). Registros
    /// desativados são somente leitura.
    pub async fn decide_on(&self, principal: &Principal, kind: ResourceKind, resource_id: &str) -> Result<Decision, AppError> {
        let found = match kind {
            ResourceKind::Household => {
                let code = HouseholdCode::parse(resource_id)?;
                self.store
                    .find_household(principal, &code)
                    .await?
                    .map(|h| (h.attribution, h.is_active))
            }
            ResourceKind::Resident => {
                let id = Uuid::parse_str(resource_id.trim())
                    .map_err(|_| AppError::InvalidInput(format!("Id de residente inválido: '{}'.", resource_id)))?;
                self.store
                    .find_resident(principal, id)
                    .await?
                    .map(|r| (r.attribution, r.is_active))
            }
        };

        let decision = match &found {
            Some((attribution, mutable)) => model::decide(principal, Resource { attribution, mutable: *mutable }),
            None => Decision::Deny,
        };
        tracing::debug!(
            "Decisão {:?} para {} sobre {:?} '{}'",
            decision,
            principal.identity(),
            kind,
            resource_id
        );
        Ok(decision)
    }

    pub async fn get_household(&self, principal: &Principal, code: &HouseholdCode) -> Result<Household, AppError> {
        self.store
            .find_household(principal, code)
            .await?
            .ok_or_else(|| AppError::HouseholdNotFound(code.to_string()))
    }

    pub async fn get_resident(&self, principal: &Principal, id: Uuid) -> Result<Resident, AppError> {
        self.store
            .find_resident(principal, id)
            .await?
            .ok_or(AppError::ResidentNotFound(id))
    }

    pub async fn list_residents(&self, principal: &Principal, query: &ResidentListQuery) -> Result<Vec<Resident>, AppError> {
        self.store
            .list_residents(principal, query.limit(), query.offset())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::MemoryStore,
        models::{geography::GeographicCode, principal::PrincipalClaims},
        services::geography_service::tests::sample_geography,
    };

    fn principal(role: &str, code: Option<&str>) -> Principal {
        Principal::resolve(
            &PrincipalClaims {
                identity: Uuid::new_v4(),
                role: role.into(),
                assigned_code: code.map(str::to_string),
            },
            &sample_geography(),
        )
        .unwrap()
    }

    async fn seeded() -> (Arc<MemoryStore>, Uuid) {
        let geo = sample_geography();
        let store = Arc::new(MemoryStore::new());
        let attribution = geo
            .attribution_for_barangay(&GeographicCode::parse("042114014").unwrap())
            .unwrap();
        store.seed_household("HH-000123", attribution.clone()).await;
        let resident = store.seed_resident(Some("HH-000123"), attribution, "Maria").await;
        (store, resident.id)
    }

    #[tokio::test]
    async fn hidden_records_are_denied_without_leaking_existence() {
        let (store, resident_id) = seeded().await;
        let service = AccessService::new(store);

        let outsider = principal("barangay_admin", Some("042114099"));
        let decision = service
            .decide_on(&outsider, ResourceKind::Resident, &resident_id.to_string())
            .await
            .unwrap();
        assert_eq!(decision, Decision::Deny);

        let missing = service
            .decide_on(&outsider, ResourceKind::Household, "HH-404")
            .await
            .unwrap();
        assert_eq!(missing, Decision::Deny);
    }

    #[tokio::test]
    async fn city_staff_writes_and_viewers_read() {
        let (store, _) = seeded().await;
        let service = AccessService::new(store);

        let staff = principal("city_staff", Some("0421140"));
        assert_eq!(
            service.decide_on(&staff, ResourceKind::Household, "HH-000123").await.unwrap(),
            Decision::AllowWrite
        );

        let viewer = principal("province_viewer", Some("0421"));
        assert_eq!(
            service.decide_on(&viewer, ResourceKind::Household, "HH-000123").await.unwrap(),
            Decision::AllowRead
        );
    }

    #[tokio::test]
    async fn deactivated_residents_are_read_only() {
        let (store, resident_id) = seeded().await;
        let admin = principal("barangay_admin", Some("042114014"));
        store.deactivate_resident(&admin, resident_id).await.unwrap();

        let service = AccessService::new(store);
        assert_eq!(
            service
                .decide_on(&admin, ResourceKind::Resident, &resident_id.to_string())
                .await
                .unwrap(),
            Decision::AllowRead
        );
    }

    #[tokio::test]
    async fn list_only_returns_visible_residents() {
        let (store, resident_id) = seeded().await;
        let geo = sample_geography();
        let other = geo
            .attribution_for_barangay(&GeographicCode::parse("031401001").unwrap())
            .unwrap();
        store.seed_resident(None, other, "Jose").await;

        let service = AccessService::new(store);
        let barangay = principal("barangay_viewer", Some("042114014"));
        let listed = service
            .list_residents(&barangay, &ResidentListQuery::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, resident_id);

        let national = principal("national_viewer", None);
        let listed = service
            .list_residents(&national, &ResidentListQuery::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);

        assert!(matches!(
            service.get_resident(&barangay, Uuid::new_v4()).await,
            Err(AppError::ResidentNotFound(_))
        ));
    }
}
