// src/db/memory_store.rs
//
// Armazenamento em memória para os testes. Reproduz as duas formas de
// aplicação: a política de linha (avaliando as configurações de sessão como
// strings, do jeito que o Postgres faz) e o filtro do caminho privilegiado.
// Cada operação trabalha numa cópia das tabelas e só a publica no fim, o que
// dá a mesma atomicidade de uma transação.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{
        privileged_repo::SampleIds,
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
    policy::{
        declarative::{self, SessionSettings},
        ResourceKind, ScopeFilter,
    },
};

#[derive(Debug, Clone, Default)]
struct Tables {
    households: BTreeMap<HouseholdCode, Household>,
    residents: BTreeMap<Uuid, Resident>,
    repairs: Vec<AttributionRepair>,
}

/// Erro que o Postgres devolve quando o WITH CHECK recusa a linha.
fn policy_violation() -> AppError {
    AppError::Forbidden("política de linha recusou a escrita".into())
}

impl Tables {
    fn visible_household(&self, session: &SessionSettings, code: &HouseholdCode) -> Option<&Household> {
        self.households
            .get(code)
            .filter(|h| declarative::admits(session, &h.attribution))
    }

    /// SELECT ... FOR SHARE/UPDATE: também passa pelo USING de UPDATE.
    fn locked_household(&self, session: &SessionSettings, code: &HouseholdCode) -> Option<Household> {
        self.households
            .get(code)
            .filter(|h| h.is_active && declarative::admits_write(session, &h.attribution))
            .cloned()
    }

    fn locked_resident(&self, session: &SessionSettings, id: Uuid) -> Option<Resident> {
        self.residents
            .get(&id)
            .filter(|r| r.is_active && declarative::admits_write(session, &r.attribution))
            .cloned()
    }

    /// `FOR UPDATE` nos membros (filtrado pela sessão) mais a contagem
    /// sem filtro da função `SECURITY DEFINER`.
    fn lock_all_members(&self, session: &SessionSettings, code: &HouseholdCode) -> Result<Vec<Resident>, AppError> {
        let active: Vec<&Resident> = self
            .residents
            .values()
            .filter(|r| r.is_active && r.household_code.as_ref() == Some(code))
            .collect();
        let locked: Vec<Resident> = active
            .iter()
            .filter(|r| declarative::admits_write(session, &r.attribution))
            .map(|r| (*r).clone())
            .collect();
        let hidden = (active.len() - locked.len()) as i64;
        if hidden > 0 {
            return Err(hidden_members(code, hidden));
        }
        Ok(locked)
    }

    fn insert_household(
        &mut self,
        session: &SessionSettings,
        household: &NewHousehold,
        member_count: i32,
    ) -> Result<Household, AppError> {
        // A chave primária vale para linhas invisíveis também.
        if self.households.contains_key(&household.code) {
            return Err(AppError::HouseholdAlreadyExists(household.code.to_string()));
        }
        if !declarative::admits_write(session, &household.attribution) {
            return Err(policy_violation());
        }
        let now = Utc::now();
        let row = Household {
            code: household.code.clone(),
            attribution: household.attribution.clone(),
            address: household.address.clone(),
            head_resident_id: None,
            member_count,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.households.insert(row.code.clone(), row.clone());
        Ok(row)
    }

    fn insert_resident(
        &mut self,
        session: &SessionSettings,
        person: &PersonalDetails,
        household: Option<&HouseholdCode>,
        attribution: &Attribution,
    ) -> Result<Resident, AppError> {
        if !declarative::admits_write(session, attribution) {
            return Err(policy_violation());
        }
        let now = Utc::now();
        let row = Resident {
            id: Uuid::new_v4(),
            household_code: household.cloned(),
            attribution: attribution.clone(),
            first_name: person.first_name.clone(),
            middle_name: person.middle_name.clone(),
            last_name: person.last_name.clone(),
            birth_date: person.birth_date,
            sex: person.sex.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.residents.insert(row.id, row.clone());
        Ok(row)
    }

    /// UPDATE de atribuição de um residente. Linhas que não passam no USING
    /// são ignoradas (0 linhas), como no Postgres.
    fn update_resident_attribution(
        &mut self,
        session: &SessionSettings,
        id: Uuid,
        attribution: &Attribution,
    ) -> Result<u64, AppError> {
        let Some(row) = self
            .residents
            .get_mut(&id)
            .filter(|r| declarative::admits_write(session, &r.attribution))
        else {
            return Ok(0);
        };
        if !declarative::admits_write(session, attribution) {
            return Err(policy_violation());
        }
        row.attribution = attribution.clone();
        row.updated_at = Utc::now();
        Ok(1)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    /// Falha simulada: a realocação aborta depois de N lotes gravados.
    fail_relocation_after_chunks: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_relocation_after(&self, chunks: usize) {
        self.fail_relocation_after_chunks.store(chunks, Ordering::SeqCst);
    }

    // --- Acesso direto (sem política), só para montar e inspecionar cenários ---

    pub async fn seed_household(&self, code: &str, attribution: Attribution) -> Household {
        let now = Utc::now();
        let household = Household {
            code: HouseholdCode::parse(code).unwrap(),
            attribution,
            address: None,
            head_resident_id: None,
            member_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .households
            .insert(household.code.clone(), household.clone());
        household
    }

    pub async fn seed_resident(&self, household: Option<&str>, attribution: Attribution, name: &str) -> Resident {
        let now = Utc::now();
        let resident = Resident {
            id: Uuid::new_v4(),
            household_code: household.map(|code| HouseholdCode::parse(code).unwrap()),
            attribution,
            first_name: name.to_string(),
            middle_name: None,
            last_name: "Santos".to_string(),
            birth_date: None,
            sex: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.residents.insert(resident.id, resident.clone());
        resident
    }

    pub async fn raw_household(&self, code: &str) -> Option<Household> {
        let code = HouseholdCode::parse(code).ok()?;
        self.tables.read().await.households.get(&code).cloned()
    }

    pub async fn raw_resident(&self, id: Uuid) -> Option<Resident> {
        self.tables.read().await.residents.get(&id).cloned()
    }

    pub async fn raw_residents(&self) -> Vec<Resident> {
        self.tables.read().await.residents.values().cloned().collect()
    }

    pub async fn raw_repairs(&self) -> Vec<AttributionRepair> {
        self.tables.read().await.repairs.clone()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn find_household(&self, principal: &Principal, code: &HouseholdCode) -> Result<Option<Household>, AppError> {
        let session = SessionSettings::for_principal(principal);
        let tables = self.tables.read().await;
        Ok(tables.visible_household(&session, code).cloned())
    }

    async fn find_resident(&self, principal: &Principal, id: Uuid) -> Result<Option<Resident>, AppError> {
        let session = SessionSettings::for_principal(principal);
        let tables = self.tables.read().await;
        Ok(tables
            .residents
            .get(&id)
            .filter(|r| declarative::admits(&session, &r.attribution))
            .cloned())
    }

    async fn list_residents(&self, principal: &Principal, limit: i64, offset: i64) -> Result<Vec<Resident>, AppError> {
        let session = SessionSettings::for_principal(principal);
        let tables = self.tables.read().await;
        let mut residents: Vec<Resident> = tables
            .residents
            .values()
            .filter(|r| r.is_active && declarative::admits(&session, &r.attribution))
            .cloned()
            .collect();
        residents.sort_by(|a, b| (&a.last_name, &a.first_name, a.id).cmp(&(&b.last_name, &b.first_name, b.id)));
        Ok(residents
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn insert_household(&self, principal: &Principal, household: NewHousehold) -> Result<Household, AppError> {
        let session = SessionSettings::for_principal(principal);
        let mut guard = self.tables.write().await;
        let mut tx = guard.clone();
        let created = tx.insert_household(&session, &household, 0)?;
        *guard = tx;
        Ok(created)
    }

    async fn insert_household_with_head(
        &self,
        principal: &Principal,
        household: NewHousehold,
        head: PersonalDetails,
    ) -> Result<(Household, Resident), AppError> {
        let session = SessionSettings::for_principal(principal);
        let mut guard = self.tables.write().await;
        let mut tx = guard.clone();

        let mut created = tx.insert_household(&session, &household, 1)?;
        let resident = tx.insert_resident(&session, &head, Some(&created.code), &created.attribution)?;
        created.head_resident_id = Some(resident.id);
        tx.households.insert(created.code.clone(), created.clone());

        *guard = tx;
        Ok((created, resident))
    }

    async fn insert_resident(
        &self,
        principal: &Principal,
        person: PersonalDetails,
        placement: Placement,
    ) -> Result<Resident, AppError> {
        let session = SessionSettings::for_principal(principal);
        let mut guard = self.tables.write().await;
        let mut tx = guard.clone();

        let resident = match placement {
            Placement::Household(code) => {
                let household = tx
                    .locked_household(&session, &code)
                    .ok_or_else(|| AppError::HouseholdNotFound(code.to_string()))?;
                tx.insert_resident(&session, &person, Some(&household.code), &household.attribution)?
            }
            Placement::Standalone(attribution) => tx.insert_resident(&session, &person, None, &attribution)?,
        };

        *guard = tx;
        Ok(resident)
    }

    async fn update_household_details(
        &self,
        principal: &Principal,
        code: &HouseholdCode,
        details: HouseholdDetails,
    ) -> Result<Household, AppError> {
        let session = SessionSettings::for_principal(principal);
        let mut guard = self.tables.write().await;
        let mut tx = guard.clone();

        let mut household = tx
            .locked_household(&session, code)
            .ok_or_else(|| AppError::HouseholdNotFound(code.to_string()))?;
        if let Some(head) = details.head_resident_id {
            let resident = tx.locked_resident(&session, head).ok_or(AppError::ResidentNotFound(head))?;
            if resident.household_code.as_ref() != Some(code) {
                return Err(not_a_member(head, code));
            }
        }
        if let Some(address) = details.address {
            household.address = Some(address);
        }
        if let Some(head) = details.head_resident_id {
            household.head_resident_id = Some(head);
        }
        if let Some(count) = details.member_count {
            household.member_count = count;
        }
        household.updated_at = Utc::now();
        tx.households.insert(household.code.clone(), household.clone());

        *guard = tx;
        Ok(household)
    }

    async fn relocate_household(
        &self,
        principal: &Principal,
        code: &HouseholdCode,
        target: &Attribution,
        chunk_size: usize,
    ) -> Result<Relocation, AppError> {
        let session = SessionSettings::for_principal(principal);
        let mut guard = self.tables.write().await;
        let mut tx = guard.clone();

        let current = tx
            .locked_household(&session, code)
            .ok_or_else(|| AppError::HouseholdNotFound(code.to_string()))?;
        let ids: Vec<Uuid> = tx.lock_all_members(&session, code)?.iter().map(|r| r.id).collect();
        if !declarative::admits_write(&session, target) {
            return Err(policy_violation());
        }
        let mut household = current.clone();
        household.attribution = target.clone();
        household.updated_at = Utc::now();
        tx.households.insert(household.code.clone(), household.clone());

        let fail_after = self.fail_relocation_after_chunks.load(Ordering::SeqCst);
        let mut residents_updated = 0;
        for (written, chunk) in ids.chunks(chunk_size.max(1)).enumerate() {
            if fail_after > 0 && written == fail_after {
                return Err(AppError::InternalServerError(anyhow::anyhow!(
                    "falha simulada após {} lotes",
                    written
                )));
            }
            for id in chunk {
                residents_updated += tx.update_resident_attribution(&session, *id, target)?;
            }
        }

        if residents_updated != ids.len() as u64 {
            return Err(AppError::Forbidden(format!(
                "{} de {} residentes do domicílio {} não puderam ser atualizados",
                ids.len() as u64 - residents_updated,
                ids.len(),
                code
            )));
        }

        *guard = tx;
        Ok(Relocation { household, previous: current.attribution, residents_updated })
    }

    async fn reassign_resident(
        &self,
        principal: &Principal,
        resident_id: Uuid,
        household: &HouseholdCode,
    ) -> Result<Resident, AppError> {
        let session = SessionSettings::for_principal(principal);
        let mut guard = self.tables.write().await;
        let mut tx = guard.clone();

        let mut resident = tx
            .locked_resident(&session, resident_id)
            .ok_or(AppError::ResidentNotFound(resident_id))?;
        let target = tx
            .locked_household(&session, household)
            .ok_or_else(|| AppError::HouseholdNotFound(household.to_string()))?;
        if !declarative::admits_write(&session, &target.attribution) {
            return Err(policy_violation());
        }
        resident.household_code = Some(target.code.clone());
        resident.attribution = target.attribution.clone();
        resident.updated_at = Utc::now();
        tx.residents.insert(resident.id, resident.clone());

        *guard = tx;
        Ok(resident)
    }

    async fn deactivate_resident(&self, principal: &Principal, resident_id: Uuid) -> Result<Resident, AppError> {
        let session = SessionSettings::for_principal(principal);
        let mut guard = self.tables.write().await;

        let mut resident = guard
            .locked_resident(&session, resident_id)
            .ok_or(AppError::ResidentNotFound(resident_id))?;
        resident.is_active = false;
        resident.updated_at = Utc::now();
        guard.residents.insert(resident.id, resident.clone());
        Ok(resident)
    }

    async fn repair_household(
        &self,
        principal: &Principal,
        code: &HouseholdCode,
    ) -> Result<Vec<AttributionRepair>, AppError> {
        let session = SessionSettings::for_principal(principal);
        let mut guard = self.tables.write().await;
        let mut tx = guard.clone();

        let household = tx
            .locked_household(&session, code)
            .ok_or_else(|| AppError::HouseholdNotFound(code.to_string()))?;
        let drifted: Vec<Resident> = tx
            .lock_all_members(&session, code)?
            .into_iter()
            .filter(|r| r.attribution != household.attribution)
            .collect();

        let mut repairs = Vec::new();
        for resident in drifted {
            tx.update_resident_attribution(&session, resident.id, &household.attribution)?;
            let repair = AttributionRepair {
                id: Uuid::new_v4(),
                household_code: code.clone(),
                resident_id: resident.id,
                previous: resident.attribution.clone(),
                restored: household.attribution.clone(),
                repaired_by: principal.identity(),
                repaired_at: Utc::now(),
            };
            tx.repairs.push(repair.clone());
            repairs.push(repair);
        }

        *guard = tx;
        Ok(repairs)
    }

    async fn resident_report(
        &self,
        filter: &ScopeFilter,
        barangay: Option<&GeographicCode>,
    ) -> Result<Vec<ResidentReportRow>, AppError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<ResidentReportRow> = tables
            .residents
            .values()
            .filter(|r| filter.matches(&r.attribution) && r.is_active)
            .filter(|r| barangay.is_none_or(|b| &r.attribution.barangay_code == b))
            .map(|r| ResidentReportRow {
                resident_id: r.id,
                first_name: r.first_name.clone(),
                last_name: r.last_name.clone(),
                household_code: r.household_code.clone(),
                household_address: r
                    .household_code
                    .as_ref()
                    .and_then(|code| tables.households.get(code))
                    .and_then(|h| h.address.clone()),
                attribution: r.attribution.clone(),
            })
            .collect();
        rows.sort_by(|a, b| {
            (&a.last_name, &a.first_name, a.resident_id).cmp(&(&b.last_name, &b.first_name, b.resident_id))
        });
        Ok(rows)
    }

    async fn barangay_summary(&self, filter: &ScopeFilter) -> Result<Vec<BarangaySummaryRow>, AppError> {
        let tables = self.tables.read().await;
        let mut groups: BTreeMap<GeographicCode, (HashSet<HouseholdCode>, i64)> = BTreeMap::new();
        for resident in tables
            .residents
            .values()
            .filter(|r| filter.matches(&r.attribution) && r.is_active)
        {
            let entry = groups.entry(resident.attribution.barangay_code.clone()).or_default();
            if let Some(code) = &resident.household_code {
                entry.0.insert(code.clone());
            }
            entry.1 += 1;
        }
        Ok(groups
            .into_iter()
            .map(|(barangay_code, (households, residents))| BarangaySummaryRow {
                barangay_code,
                households: households.len() as i64,
                residents,
            })
            .collect())
    }

    async fn bulk_deactivate(&self, filter: &ScopeFilter, resident_ids: &[Uuid]) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        let mut deactivated = 0;
        for id in resident_ids {
            if let Some(resident) = tables
                .residents
                .get_mut(id)
                .filter(|r| filter.matches(&r.attribution) && r.is_active)
            {
                resident.is_active = false;
                resident.updated_at = Utc::now();
                deactivated += 1;
            }
        }
        Ok(deactivated)
    }

    async fn list_household_codes(&self, filter: &ScopeFilter) -> Result<Vec<HouseholdCode>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .households
            .values()
            .filter(|h| filter.matches(&h.attribution) && h.is_active)
            .map(|h| h.code.clone())
            .collect())
    }

    async fn sample_visibility(&self, request: VisibilityRequest<'_>) -> Result<Vec<VisibilitySample>, AppError> {
        let tables = self.tables.read().await;

        let lookup = |id: &str| -> Option<(Attribution, bool)> {
            match request.kind {
                ResourceKind::Household => {
                    let code = HouseholdCode::parse(id).ok()?;
                    tables.households.get(&code).map(|h| (h.attribution.clone(), h.is_active))
                }
                ResourceKind::Resident => {
                    let uuid = Uuid::parse_str(id).ok()?;
                    tables.residents.get(&uuid).map(|r| (r.attribution.clone(), r.is_active))
                }
            }
        };

        let mut seen = HashSet::new();
        Ok(request
            .resource_ids
            .iter()
            .map(|raw| SampleIds::canonical(request.kind, raw))
            .filter(|id| seen.insert(id.clone()))
            .map(|id| {
                let row = lookup(&id);
                let reference = row.as_ref().filter(|(a, _)| request.reference.matches(a));
                VisibilitySample {
                    declarative: row
                        .as_ref()
                        .is_some_and(|(a, _)| declarative::admits(request.session, a)),
                    privileged: row.as_ref().is_some_and(|(a, _)| request.filter.matches(a)),
                    attribution: reference.map(|(a, _)| a.clone()),
                    mutable: reference.is_some_and(|(_, active)| *active),
                    resource_id: id,
                }
            })
            .collect())
    }

    async fn snapshot_household(
        &self,
        filter: &ScopeFilter,
        code: &HouseholdCode,
    ) -> Result<Option<HouseholdSnapshot>, AppError> {
        let tables = self.tables.read().await;
        let Some(household) = tables
            .households
            .get(code)
            .filter(|h| filter.matches(&h.attribution))
            .cloned()
        else {
            return Ok(None);
        };
        let residents = tables
            .residents
            .values()
            .filter(|r| r.is_active && r.household_code.as_ref() == Some(code))
            .cloned()
            .collect();
        Ok(Some(HouseholdSnapshot { household, residents }))
    }
}
