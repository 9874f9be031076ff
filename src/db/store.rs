// src/db/store.rs

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        diagnostics::{AttributionRepair, VisibilitySample},
        geography::{Attribution, GeographicCode},
        household::{Household, HouseholdCode, HouseholdDetails, NewHousehold, Relocation},
        principal::Principal,
        report::{BarangaySummaryRow, ResidentReportRow},
        resident::{PersonalDetails, Placement, Resident},
    },
    policy::{declarative::SessionSettings, ResourceKind, ScopeFilter},
};

/// Domicílio e seus residentes ativos lidos num único snapshot.
#[derive(Debug, Clone)]
pub struct HouseholdSnapshot {
    pub household: Household,
    pub residents: Vec<Resident>,
}

/// Membros ativos que a sessão não consegue travar. A realocação e o reparo
/// abortam antes de gravar qualquer linha.
pub(crate) fn hidden_members(code: &HouseholdCode, hidden: i64) -> AppError {
    AppError::Forbidden(format!(
        "{} residente(s) do domicílio {} estão fora do escopo de escrita da sessão",
        hidden, code
    ))
}

/// O chefe indicado precisa ser membro ativo do próprio domicílio.
pub(crate) fn not_a_member(resident: Uuid, code: &HouseholdCode) -> AppError {
    AppError::InvalidInput(format!("O residente {} não é membro do domicílio {}.", resident, code))
}

/// Pedido de comparação de visibilidade: o mesmo conjunto de ids passado
/// pelos dois caminhos.
#[derive(Debug, Clone)]
pub struct VisibilityRequest<'a> {
    pub kind: ResourceKind,
    pub resource_ids: &'a [String],
    /// Sessão do principal sob teste (caminho declarativo).
    pub session: &'a SessionSettings,
    /// Filtro do principal sob teste (caminho privilegiado).
    pub filter: &'a ScopeFilter,
    /// Filtro do operador, usado para ler a atribuição de referência.
    pub reference: &'a ScopeFilter,
}

/// Costura de persistência.
///
/// Métodos que recebem `&Principal` rodam no caminho declarativo (sessão
/// RLS do principal). Métodos que recebem `&ScopeFilter` rodam no caminho
/// privilegiado e SEMPRE aplicam o filtro. Cada método é uma unidade
/// atômica: ou tudo é gravado, ou nada.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    // --- Caminho declarativo: leituras ---
    async fn find_household(&self, principal: &Principal, code: &HouseholdCode) -> Result<Option<Household>, AppError>;

    async fn find_resident(&self, principal: &Principal, id: Uuid) -> Result<Option<Resident>, AppError>;

    async fn list_residents(&self, principal: &Principal, limit: i64, offset: i64) -> Result<Vec<Resident>, AppError>;

    // --- Caminho declarativo: escritas (propagação) ---
    async fn insert_household(&self, principal: &Principal, household: NewHousehold) -> Result<Household, AppError>;

    /// Domicílio + chefe numa transação (criação implícita).
    async fn insert_household_with_head(
        &self,
        principal: &Principal,
        household: NewHousehold,
        head: PersonalDetails,
    ) -> Result<(Household, Resident), AppError>;

    /// Com `Placement::Household`, os quatro códigos são copiados do
    /// domicílio dentro da mesma transação do INSERT.
    async fn insert_resident(
        &self,
        principal: &Principal,
        person: PersonalDetails,
        placement: Placement,
    ) -> Result<Resident, AppError>;

    async fn update_household_details(
        &self,
        principal: &Principal,
        code: &HouseholdCode,
        details: HouseholdDetails,
    ) -> Result<Household, AppError>;

    /// Atualiza o domicílio e todos os residentes ativos dele (em lotes de
    /// `chunk_size`) dentro de uma única transação.
    async fn relocate_household(
        &self,
        principal: &Principal,
        code: &HouseholdCode,
        target: &Attribution,
        chunk_size: usize,
    ) -> Result<Relocation, AppError>;

    async fn reassign_resident(
        &self,
        principal: &Principal,
        resident_id: Uuid,
        household: &HouseholdCode,
    ) -> Result<Resident, AppError>;

    async fn deactivate_resident(&self, principal: &Principal, resident_id: Uuid) -> Result<Resident, AppError>;

    /// Reparo explícito e auditado: recopia os códigos do domicílio nos
    /// residentes divergentes e registra cada correção.
    async fn repair_household(
        &self,
        principal: &Principal,
        code: &HouseholdCode,
    ) -> Result<Vec<AttributionRepair>, AppError>;

    // --- Caminho privilegiado (sempre filtrado) ---
    async fn resident_report(
        &self,
        filter: &ScopeFilter,
        barangay: Option<&GeographicCode>,
    ) -> Result<Vec<ResidentReportRow>, AppError>;

    async fn barangay_summary(&self, filter: &ScopeFilter) -> Result<Vec<BarangaySummaryRow>, AppError>;

    async fn bulk_deactivate(&self, filter: &ScopeFilter, resident_ids: &[Uuid]) -> Result<u64, AppError>;

    async fn list_household_codes(&self, filter: &ScopeFilter) -> Result<Vec<HouseholdCode>, AppError>;

    // --- Diagnóstico (somente leitura, snapshot consistente) ---
    async fn sample_visibility(&self, request: VisibilityRequest<'_>) -> Result<Vec<VisibilitySample>, AppError>;

    async fn snapshot_household(
        &self,
        filter: &ScopeFilter,
        code: &HouseholdCode,
    ) -> Result<Option<HouseholdSnapshot>, AppError>;
}
