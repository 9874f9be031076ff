// src/db/pg_store.rs

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{begin_scoped, begin_scoped_snapshot, begin_snapshot, export_snapshot},
        error::AppError,
    },
    db::{
        household_repo::{HouseholdRepository, RowLock},
        privileged_repo::{PrivilegedRepository, SampleIds},
        resident_repo::ResidentRepository,
        store::{hidden_members, not_a_member, HouseholdSnapshot, RegistryStore, VisibilityRequest},
    },
    models::{
        diagnostics::{AttributionRepair, VisibilitySample},
        geography::{Attribution, GeographicCode},
        household::{Household, HouseholdCode, HouseholdDetails, NewHousehold, Relocation},
        principal::Principal,
        report::{BarangaySummaryRow, ResidentReportRow},
        resident::{PersonalDetails, Placement, Resident},
    },
    policy::{declarative::SessionSettings, ScopeFilter},
};

/// Trava os membros ativos visíveis e confere com a contagem sem filtro.
/// Um membro com atribuição fora do escopo da sessão não aparece no
/// `FOR UPDATE`; nesse caso nada pode ser gravado.
async fn lock_all_members(
    conn: &mut sqlx::PgConnection,
    code: &HouseholdCode,
) -> Result<Vec<Resident>, AppError> {
    let members = ResidentRepository::lock_active_members(&mut *conn, code).await?;
    let total = ResidentRepository::count_all_active_members(&mut *conn, code).await?;
    let hidden = total - members.len() as i64;
    if hidden > 0 {
        tracing::warn!("Domicílio {} tem {} membro(s) fora do escopo da sessão", code, hidden);
        return Err(hidden_members(code, hidden));
    }
    Ok(members)
}

/// Armazenamento Postgres com dois pools: `pool` conecta com o papel sujeito
/// à política de linha; `privileged_pool` com o papel que a ignora.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    privileged_pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool, privileged_pool: PgPool) -> Self {
        Self { pool, privileged_pool }
    }
}

#[async_trait]
impl RegistryStore for PgStore {
    async fn find_household(&self, principal: &Principal, code: &HouseholdCode) -> Result<Option<Household>, AppError> {
        let mut tx = begin_scoped(&self.pool, &SessionSettings::for_principal(principal)).await?;
        let household = HouseholdRepository::find(&mut *tx, code).await?;
        tx.commit().await?;
        Ok(household)
    }

    async fn find_resident(&self, principal: &Principal, id: Uuid) -> Result<Option<Resident>, AppError> {
        let mut tx = begin_scoped(&self.pool, &SessionSettings::for_principal(principal)).await?;
        let resident = ResidentRepository::find(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(resident)
    }

    async fn list_residents(&self, principal: &Principal, limit: i64, offset: i64) -> Result<Vec<Resident>, AppError> {
        let mut tx = begin_scoped(&self.pool, &SessionSettings::for_principal(principal)).await?;
        let residents = ResidentRepository::list(&mut *tx, limit, offset).await?;
        tx.commit().await?;
        Ok(residents)
    }

    async fn insert_household(&self, principal: &Principal, household: NewHousehold) -> Result<Household, AppError> {
        let mut tx = begin_scoped(&self.pool, &SessionSettings::for_principal(principal)).await?;
        let created = HouseholdRepository::insert(&mut *tx, &household, 0).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn insert_household_with_head(
        &self,
        principal: &Principal,
        household: NewHousehold,
        head: PersonalDetails,
    ) -> Result<(Household, Resident), AppError> {
        let mut tx = begin_scoped(&self.pool, &SessionSettings::for_principal(principal)).await?;

        let created = HouseholdRepository::insert(&mut *tx, &household, 1).await?;
        let resident =
            ResidentRepository::insert(&mut *tx, &head, Some(&created.code), &created.attribution).await?;
        let created = HouseholdRepository::set_head(&mut *tx, &created.code, resident.id).await?;

        tx.commit().await?;
        Ok((created, resident))
    }

    async fn insert_resident(
        &self,
        principal: &Principal,
        person: PersonalDetails,
        placement: Placement,
    ) -> Result<Resident, AppError> {
        let mut tx = begin_scoped(&self.pool, &SessionSettings::for_principal(principal)).await?;

        let resident = match placement {
            Placement::Household(code) => {
                // FOR SHARE: uma realocação concorrente espera este INSERT
                // terminar e então enxerga o novo membro.
                let household = HouseholdRepository::find_active_locked(&mut *tx, &code, RowLock::Share)
                    .await?
                    .ok_or_else(|| AppError::HouseholdNotFound(code.to_string()))?;
                ResidentRepository::insert(&mut *tx, &person, Some(&household.code), &household.attribution).await?
            }
            Placement::Standalone(attribution) => {
                ResidentRepository::insert(&mut *tx, &person, None, &attribution).await?
            }
        };

        tx.commit().await?;
        Ok(resident)
    }

    async fn update_household_details(
        &self,
        principal: &Principal,
        code: &HouseholdCode,
        details: HouseholdDetails,
    ) -> Result<Household, AppError> {
        let mut tx = begin_scoped(&self.pool, &SessionSettings::for_principal(principal)).await?;

        HouseholdRepository::find_active_locked(&mut *tx, code, RowLock::Update)
            .await?
            .ok_or_else(|| AppError::HouseholdNotFound(code.to_string()))?;
        // Chefe e domicílio travados na mesma transação do UPDATE: uma troca
        // de domicílio concorrente não passa entre a checagem e a escrita.
        if let Some(head) = details.head_resident_id {
            let resident = ResidentRepository::find_active_for_update(&mut *tx, head)
                .await?
                .ok_or(AppError::ResidentNotFound(head))?;
            if resident.household_code.as_ref() != Some(code) {
                return Err(not_a_member(head, code));
            }
        }
        let household = HouseholdRepository::update_details(&mut *tx, code, &details)
            .await?
            .ok_or_else(|| AppError::HouseholdNotFound(code.to_string()))?;
        tx.commit().await?;
        Ok(household)
    }

    async fn relocate_household(
        &self,
        principal: &Principal,
        code: &HouseholdCode,
        target: &Attribution,
        chunk_size: usize,
    ) -> Result<Relocation, AppError> {
        let mut tx = begin_scoped(&self.pool, &SessionSettings::for_principal(principal)).await?;

        let current = HouseholdRepository::find_active_locked(&mut *tx, code, RowLock::Update)
            .await?
            .ok_or_else(|| AppError::HouseholdNotFound(code.to_string()))?;
        let members = lock_all_members(&mut tx, code).await?;

        // USING barra a escrita no escopo antigo; WITH CHECK no novo.
        let household = HouseholdRepository::update_attribution(&mut *tx, code, target).await?;

        let ids: Vec<Uuid> = members.iter().map(|r| r.id).collect();
        let mut residents_updated = 0;
        for chunk in ids.chunks(chunk_size.max(1)) {
            residents_updated += ResidentRepository::update_attribution(&mut *tx, chunk, target).await?;
        }

        if residents_updated != ids.len() as u64 {
            // Algum membro ficou invisível para a sessão: não confirmar
            // um conjunto parcial.
            return Err(AppError::Forbidden(format!(
                "{} de {} residentes do domicílio {} não puderam ser atualizados",
                ids.len() as u64 - residents_updated,
                ids.len(),
                code
            )));
        }

        tx.commit().await?;
        Ok(Relocation { household, previous: current.attribution, residents_updated })
    }

    async fn reassign_resident(
        &self,
        principal: &Principal,
        resident_id: Uuid,
        household: &HouseholdCode,
    ) -> Result<Resident, AppError> {
        let mut tx = begin_scoped(&self.pool, &SessionSettings::for_principal(principal)).await?;

        ResidentRepository::find_active_for_update(&mut *tx, resident_id)
            .await?
            .ok_or(AppError::ResidentNotFound(resident_id))?;
        let target = HouseholdRepository::find_active_locked(&mut *tx, household, RowLock::Share)
            .await?
            .ok_or_else(|| AppError::HouseholdNotFound(household.to_string()))?;
        let moved =
            ResidentRepository::move_to_household(&mut *tx, resident_id, &target.code, &target.attribution).await?;

        tx.commit().await?;
        Ok(moved)
    }

    async fn deactivate_resident(&self, principal: &Principal, resident_id: Uuid) -> Result<Resident, AppError> {
        let mut tx = begin_scoped(&self.pool, &SessionSettings::for_principal(principal)).await?;
        let resident = ResidentRepository::deactivate(&mut *tx, resident_id)
            .await?
            .ok_or(AppError::ResidentNotFound(resident_id))?;
        tx.commit().await?;
        Ok(resident)
    }

    async fn repair_household(
        &self,
        principal: &Principal,
        code: &HouseholdCode,
    ) -> Result<Vec<AttributionRepair>, AppError> {
        let mut tx = begin_scoped(&self.pool, &SessionSettings::for_principal(principal)).await?;

        let household = HouseholdRepository::find_active_locked(&mut *tx, code, RowLock::Update)
            .await?
            .ok_or_else(|| AppError::HouseholdNotFound(code.to_string()))?;
        let members = lock_all_members(&mut tx, code).await?;

        let mut repairs = Vec::new();
        for resident in members.iter().filter(|r| r.attribution != household.attribution) {
            ResidentRepository::update_attribution(&mut *tx, &[resident.id], &household.attribution).await?;
            let repair = ResidentRepository::record_repair(
                &mut *tx,
                code,
                resident.id,
                &resident.attribution,
                &household.attribution,
                principal.identity(),
            )
            .await?;
            repairs.push(repair);
        }

        tx.commit().await?;
        Ok(repairs)
    }

    async fn resident_report(
        &self,
        filter: &ScopeFilter,
        barangay: Option<&GeographicCode>,
    ) -> Result<Vec<ResidentReportRow>, AppError> {
        PrivilegedRepository::resident_report(&self.privileged_pool, filter, barangay).await
    }

    async fn barangay_summary(&self, filter: &ScopeFilter) -> Result<Vec<BarangaySummaryRow>, AppError> {
        PrivilegedRepository::barangay_summary(&self.privileged_pool, filter).await
    }

    async fn bulk_deactivate(&self, filter: &ScopeFilter, resident_ids: &[Uuid]) -> Result<u64, AppError> {
        let mut tx = self.privileged_pool.begin().await?;
        let deactivated = PrivilegedRepository::bulk_deactivate(&mut *tx, filter, resident_ids).await?;
        tx.commit().await?;
        Ok(deactivated)
    }

    async fn list_household_codes(&self, filter: &ScopeFilter) -> Result<Vec<HouseholdCode>, AppError> {
        PrivilegedRepository::list_household_codes(&self.privileged_pool, filter).await
    }

    async fn sample_visibility(&self, request: VisibilityRequest<'_>) -> Result<Vec<VisibilitySample>, AppError> {
        let ids = SampleIds::parse(request.kind, request.resource_ids);

        let (reference, privileged, declarative) = if ids.is_empty() {
            (Vec::new(), HashSet::new(), HashSet::new())
        } else {
            // Um snapshot exportado pelo lado privilegiado; o lado declarativo
            // lê o mesmo estado.
            let mut snapshot_tx = begin_snapshot(&self.privileged_pool).await?;
            let snapshot = export_snapshot(&mut snapshot_tx).await?;

            let reference = PrivilegedRepository::sample_rows(&mut *snapshot_tx, request.reference, &ids).await?;
            let privileged: HashSet<String> =
                PrivilegedRepository::sample_rows(&mut *snapshot_tx, request.filter, &ids)
                    .await?
                    .into_iter()
                    .map(|row| row.resource_id)
                    .collect();

            let mut scoped_tx = begin_scoped_snapshot(&self.pool, request.session, &snapshot).await?;
            let query = sqlx::query_scalar::<_, String>(ids.declarative_sql());
            let query = match &ids {
                SampleIds::Households(codes) => query.bind(codes.clone()),
                SampleIds::Residents(uuids) => query.bind(uuids.clone()),
            };
            let declarative: HashSet<String> = query
                .fetch_all(&mut *scoped_tx)
                .await
                .map_err(AppError::from_db)?
                .into_iter()
                .collect();

            scoped_tx.rollback().await?;
            snapshot_tx.rollback().await?;
            (reference, privileged, declarative)
        };

        let mut seen = HashSet::new();
        let samples = request
            .resource_ids
            .iter()
            .map(|raw| SampleIds::canonical(request.kind, raw))
            .filter(|id| seen.insert(id.clone()))
            .map(|id| {
                let row = reference.iter().find(|row| row.resource_id == id);
                VisibilitySample {
                    declarative: declarative.contains(&id),
                    privileged: privileged.contains(&id),
                    attribution: row.map(|r| r.attribution.clone()),
                    mutable: row.is_some_and(|r| r.is_active),
                    resource_id: id,
                }
            })
            .collect();

        Ok(samples)
    }

    async fn snapshot_household(
        &self,
        filter: &ScopeFilter,
        code: &HouseholdCode,
    ) -> Result<Option<HouseholdSnapshot>, AppError> {
        let mut tx = begin_snapshot(&self.privileged_pool).await?;

        let Some(household) = PrivilegedRepository::find_household(&mut *tx, filter, code).await? else {
            tx.rollback().await?;
            return Ok(None);
        };
        let residents = PrivilegedRepository::household_members(&mut *tx, filter, code).await?;

        tx.rollback().await?;
        Ok(Some(HouseholdSnapshot { household, residents }))
    }
}
