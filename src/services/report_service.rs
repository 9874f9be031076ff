// src/services/report_service.rs

use std::sync::Arc;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::RegistryStore,
    models::{
        geography::GeographicCode,
        principal::Principal,
        report::{BarangaySummaryRow, BulkDeactivateResponse, ResidentReportRow},
    },
    policy::{AccessMode, ScopeFilter},
};

/// Operações do caminho privilegiado. O filtro de escopo é sempre derivado
/// do principal aqui dentro; o chamador não tem como passar outro.
#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn RegistryStore>,
}

impl ReportService {
    pub const MAX_BULK_IDS: usize = 1000;

    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    pub async fn resident_report(
        &self,
        principal: &Principal,
        barangay: Option<&GeographicCode>,
    ) -> Result<Vec<ResidentReportRow>, AppError> {
        let filter = ScopeFilter::for_principal(principal, AccessMode::Read);
        self.store.resident_report(&filter, barangay).await
    }

    pub async fn barangay_summary(&self, principal: &Principal) -> Result<Vec<BarangaySummaryRow>, AppError> {
        let filter = ScopeFilter::for_principal(principal, AccessMode::Read);
        self.store.barangay_summary(&filter).await
    }

    /// Ids fora do escopo de escrita são simplesmente ignorados.
    pub async fn bulk_deactivate(
        &self,
        principal: &Principal,
        resident_ids: &[Uuid],
    ) -> Result<BulkDeactivateResponse, AppError> {
        if resident_ids.is_empty() || resident_ids.len() > Self::MAX_BULK_IDS {
            return Err(AppError::InvalidInput(format!(
                "Informe entre 1 e {} ids de residentes.",
                Self::MAX_BULK_IDS
            )));
        }

        let filter = ScopeFilter::for_principal(principal, AccessMode::Write);
        let deactivated = self.store.bulk_deactivate(&filter, resident_ids).await?;

        tracing::info!(
            "Desativação em lote por {}: {} de {} residentes",
            principal.identity(),
            deactivated,
            resident_ids.len()
        );
        Ok(BulkDeactivateResponse { requested: resident_ids.len(), deactivated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::MemoryStore,
        models::principal::PrincipalClaims,
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

    async fn seeded() -> (Arc<MemoryStore>, Vec<Uuid>) {
        let geo = sample_geography();
        let store = Arc::new(MemoryStore::new());
        let mut ids = Vec::new();
        for (household, barangay) in [
            (Some("HH-1"), "042114014"),
            (Some("HH-1"), "042114014"),
            (None, "042114099"),
            (Some("HH-2"), "031401001"),
        ] {
            let attribution = geo
                .attribution_for_barangay(&GeographicCode::parse(barangay).unwrap())
                .unwrap();
            if let Some(code) = household {
                if store.raw_household(code).await.is_none() {
                    store.seed_household(code, attribution.clone()).await;
                }
            }
            ids.push(store.seed_resident(household, attribution, barangay).await.id);
        }
        (store, ids)
    }

    #[tokio::test]
    async fn report_is_always_scoped() {
        let (store, _) = seeded().await;
        let service = ReportService::new(store);

        let city = principal("city_viewer", Some("0421140"));
        let rows = service.resident_report(&city, None).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.attribution.city_code.as_str() == "0421140"));

        // Filtro adicional por barangay de fora não amplia nada.
        let outside = GeographicCode::parse("031401001").unwrap();
        assert!(service.resident_report(&city, Some(&outside)).await.unwrap().is_empty());

        let national = principal("national_viewer", None);
        assert_eq!(service.resident_report(&national, None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn summary_counts_per_barangay() {
        let (store, _) = seeded().await;
        let service = ReportService::new(store);

        let region = principal("region_viewer", Some("04"));
        let summary = service.barangay_summary(&region).await.unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].barangay_code.as_str(), "042114014");
        assert_eq!(summary[0].households, 1);
        assert_eq!(summary[0].residents, 2);
        assert_eq!(summary[1].households, 0);
    }

    #[tokio::test]
    async fn bulk_deactivation_skips_out_of_scope_ids() {
        let (store, ids) = seeded().await;
        let service = ReportService::new(store.clone());

        let barangay = principal("barangay_admin", Some("042114014"));
        let response = service.bulk_deactivate(&barangay, &ids).await.unwrap();
        assert_eq!(response.requested, 4);
        assert_eq!(response.deactivated, 2);
        assert!(store.raw_resident(ids[3]).await.unwrap().is_active);

        let viewer = principal("national_viewer", None);
        let response = service.bulk_deactivate(&viewer, &ids).await.unwrap();
        assert_eq!(response.deactivated, 0);

        assert!(matches!(
            service.bulk_deactivate(&barangay, &[]).await,
            Err(AppError::InvalidInput(_))
        ));
    }
}
