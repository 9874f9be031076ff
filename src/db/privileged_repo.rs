// src/db/privileged_repo.rs
//
// Consultas do caminho privilegiado (papel que ignora RLS). Toda consulta
// começa em `PrivilegedQuery::new`, então o predicado de escopo é sempre o
// primeiro item do WHERE.

use sqlx::{Executor, FromRow, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        geography::{Attribution, GeographicCode},
        household::{Household, HouseholdCode},
        report::{BarangaySummaryRow, ResidentReportRow},
        resident::Resident,
    },
    policy::{PrivilegedQuery, ResourceKind, ScopeFilter},
};

const HOUSEHOLD_COLUMNS_H: &str = "h.code, h.barangay_code, h.city_code, h.province_code, h.region_code, \
     h.address, h.head_resident_id, h.member_count, h.is_active, h.created_at, h.updated_at";

const RESIDENT_COLUMNS_R: &str = "r.id, r.household_code, r.barangay_code, r.city_code, r.province_code, \
     r.region_code, r.first_name, r.middle_name, r.last_name, r.birth_date, r.sex, r.is_active, \
     r.created_at, r.updated_at";

/// Atribuição de referência de um registro sondado.
#[derive(Debug, Clone, FromRow)]
pub struct SampleRow {
    pub resource_id: String,
    #[sqlx(flatten)]
    pub attribution: Attribution,
    pub is_active: bool,
}

/// Ids de sondagem já separados pelo tipo de chave de cada tabela.
#[derive(Debug, Clone)]
pub enum SampleIds {
    Households(Vec<String>),
    Residents(Vec<Uuid>),
}

impl SampleIds {
    /// Ids que não são chaves válidas não existem em lugar nenhum; ficam de fora.
    pub fn parse(kind: ResourceKind, raw: &[String]) -> Self {
        match kind {
            ResourceKind::Household => SampleIds::Households(
                raw.iter()
                    .filter_map(|id| HouseholdCode::parse(id).ok())
                    .map(String::from)
                    .collect(),
            ),
            ResourceKind::Resident => {
                SampleIds::Residents(raw.iter().filter_map(|id| Uuid::parse_str(id.trim()).ok()).collect())
            }
        }
    }

    /// Forma canônica de um id pedido, a mesma que as consultas devolvem.
    pub fn canonical(kind: ResourceKind, raw: &str) -> String {
        match kind {
            ResourceKind::Household => HouseholdCode::parse(raw)
                .map(String::from)
                .unwrap_or_else(|_| raw.trim().to_string()),
            ResourceKind::Resident => Uuid::parse_str(raw.trim())
                .map(|id| id.to_string())
                .unwrap_or_else(|_| raw.trim().to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SampleIds::Households(ids) => ids.is_empty(),
            SampleIds::Residents(ids) => ids.is_empty(),
        }
    }

    fn push_match<'args>(&self, query: &mut PrivilegedQuery<'args>, alias: &str) {
        match self {
            SampleIds::Households(ids) => {
                query.push(&format!(" AND {}.code = ANY(", alias)).push_bind(ids.clone()).push(")");
            }
            SampleIds::Residents(ids) => {
                query.push(&format!(" AND {}.id = ANY(", alias)).push_bind(ids.clone()).push(")");
            }
        }
    }

    /// Mesma consulta para o caminho declarativo, sem filtro explícito: ali
    /// quem filtra é a política de linha.
    pub fn declarative_sql(&self) -> &'static str {
        match self {
            SampleIds::Households(_) => "SELECT code AS resource_id FROM households WHERE code = ANY($1)",
            SampleIds::Residents(_) => "SELECT id::text AS resource_id FROM residents WHERE id = ANY($1)",
        }
    }
}

pub struct PrivilegedRepository;

impl PrivilegedRepository {
    /// Relatório achatado residente + domicílio.
    pub async fn resident_report<'e, E>(
        executor: E,
        filter: &ScopeFilter,
        barangay: Option<&GeographicCode>,
    ) -> Result<Vec<ResidentReportRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let mut query = PrivilegedQuery::new(
            r#"
            SELECT r.id AS resident_id, r.first_name, r.last_name, r.household_code,
                   h.address AS household_address,
                   r.barangay_code, r.city_code, r.province_code, r.region_code
            FROM residents r
            LEFT JOIN households h ON h.code = r.household_code
            "#,
            filter,
            "r",
        );
        query.push(" AND r.is_active");
        if let Some(barangay) = barangay {
            query.push(" AND r.barangay_code = ").push_bind(barangay.as_str().to_owned());
        }
        query.push(" ORDER BY r.last_name, r.first_name, r.id");

        let rows = query
            .into_builder()
            .build_query_as::<ResidentReportRow>()
            .fetch_all(executor)
            .await?;
        Ok(rows)
    }

    /// Contagem de residentes ativos (e seus domicílios) por barangay.
    pub async fn barangay_summary<'e, E>(executor: E, filter: &ScopeFilter) -> Result<Vec<BarangaySummaryRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let mut query = PrivilegedQuery::new(
            r#"
            SELECT r.barangay_code,
                   COUNT(DISTINCT r.household_code) AS households,
                   COUNT(*) AS residents
            FROM residents r
            "#,
            filter,
            "r",
        );
        query.push(" AND r.is_active GROUP BY r.barangay_code ORDER BY r.barangay_code");

        let rows = query
            .into_builder()
            .build_query_as::<BarangaySummaryRow>()
            .fetch_all(executor)
            .await?;
        Ok(rows)
    }

    pub async fn bulk_deactivate<'e, E>(executor: E, filter: &ScopeFilter, ids: &[Uuid]) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let mut query = PrivilegedQuery::new(
            "UPDATE residents r SET is_active = false, updated_at = NOW()",
            filter,
            "r",
        );
        query
            .push(" AND r.is_active AND r.id = ANY(")
            .push_bind(ids.to_vec())
            .push(")");

        let result = query.into_builder().build().execute(executor).await?;
        Ok(result.rows_affected())
    }

    pub async fn list_household_codes<'e, E>(executor: E, filter: &ScopeFilter) -> Result<Vec<HouseholdCode>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let mut query = PrivilegedQuery::new("SELECT h.code FROM households h", filter, "h");
        query.push(" AND h.is_active ORDER BY h.code");

        let codes = query
            .into_builder()
            .build_query_scalar::<HouseholdCode>()
            .fetch_all(executor)
            .await?;
        Ok(codes)
    }

    /// Atribuição dos registros pedidos que o filtro deixa ver.
    pub async fn sample_rows<'e, E>(executor: E, filter: &ScopeFilter, ids: &SampleIds) -> Result<Vec<SampleRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let (statement, alias) = match ids {
            SampleIds::Households(_) => (
                "SELECT h.code AS resource_id, h.barangay_code, h.city_code, h.province_code, \
                 h.region_code, h.is_active FROM households h",
                "h",
            ),
            SampleIds::Residents(_) => (
                "SELECT r.id::text AS resource_id, r.barangay_code, r.city_code, r.province_code, \
                 r.region_code, r.is_active FROM residents r",
                "r",
            ),
        };
        let mut query = PrivilegedQuery::new(statement, filter, alias);
        ids.push_match(&mut query, alias);

        let rows = query
            .into_builder()
            .build_query_as::<SampleRow>()
            .fetch_all(executor)
            .await?;
        Ok(rows)
    }

    pub async fn find_household<'e, E>(
        executor: E,
        filter: &ScopeFilter,
        code: &HouseholdCode,
    ) -> Result<Option<Household>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let mut query = PrivilegedQuery::new(
            &format!("SELECT {} FROM households h", HOUSEHOLD_COLUMNS_H),
            filter,
            "h",
        );
        query.push(" AND h.code = ").push_bind(code.as_str().to_owned());

        let household = query
            .into_builder()
            .build_query_as::<Household>()
            .fetch_optional(executor)
            .await?;
        Ok(household)
    }

    /// Residentes ativos do domicílio. O filtro vale sobre o domicílio: um
    /// residente com deriva pode estar fora do escopo e ainda assim tem que
    /// aparecer aqui.
    pub async fn household_members<'e, E>(
        executor: E,
        filter: &ScopeFilter,
        code: &HouseholdCode,
    ) -> Result<Vec<Resident>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let mut query = PrivilegedQuery::new(
            &format!(
                "SELECT {} FROM residents r JOIN households h ON h.code = r.household_code",
                RESIDENT_COLUMNS_R
            ),
            filter,
            "h",
        );
        query
            .push(" AND h.code = ")
            .push_bind(code.as_str().to_owned())
            .push(" AND r.is_active ORDER BY r.id");

        let members = query
            .into_builder()
            .build_query_as::<Resident>()
            .fetch_all(executor)
            .await?;
        Ok(members)
    }
}
