// src/db/resident_repo.rs

use sqlx::{types::Json, Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        diagnostics::AttributionRepair,
        geography::Attribution,
        household::HouseholdCode,
        resident::{PersonalDetails, Resident},
    },
    policy::declarative::MEMBER_COUNT_FUNCTION,
};

pub(crate) const RESIDENT_COLUMNS: &str = "id, household_code, barangay_code, city_code, province_code, region_code, \
     first_name, middle_name, last_name, birth_date, sex, is_active, created_at, updated_at";

pub struct ResidentRepository;

impl ResidentRepository {
    pub async fn find<'e, E>(executor: E, id: Uuid) -> Result<Option<Resident>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {} FROM residents WHERE id = $1", RESIDENT_COLUMNS);
        sqlx::query_as::<_, Resident>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(AppError::from_db)
    }

    pub async fn find_active_for_update<'e, E>(executor: E, id: Uuid) -> Result<Option<Resident>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {} FROM residents WHERE id = $1 AND is_active FOR UPDATE",
            RESIDENT_COLUMNS
        );
        sqlx::query_as::<_, Resident>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(AppError::from_db)
    }

    pub async fn list<'e, E>(executor: E, limit: i64, offset: i64) -> Result<Vec<Resident>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {} FROM residents WHERE is_active ORDER BY last_name, first_name, id LIMIT $1 OFFSET $2",
            RESIDENT_COLUMNS
        );
        sqlx::query_as::<_, Resident>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
            .map_err(AppError::from_db)
    }

    /// `attribution` já deve ser a do domicílio quando `household` vier preenchido.
    pub async fn insert<'e, E>(
        executor: E,
        person: &PersonalDetails,
        household: Option<&HouseholdCode>,
        attribution: &Attribution,
    ) -> Result<Resident, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            INSERT INTO residents (
                household_code, barangay_code, city_code, province_code, region_code,
                first_name, middle_name, last_name, birth_date, sex
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            RESIDENT_COLUMNS
        );
        sqlx::query_as::<_, Resident>(&sql)
            .bind(household)
            .bind(&attribution.barangay_code)
            .bind(&attribution.city_code)
            .bind(&attribution.province_code)
            .bind(&attribution.region_code)
            .bind(&person.first_name)
            .bind(&person.middle_name)
            .bind(&person.last_name)
            .bind(person.birth_date)
            .bind(&person.sex)
            .fetch_one(executor)
            .await
            .map_err(AppError::from_db)
    }

    /// Membros ativos do domicílio, travados, em ordem estável.
    pub async fn lock_active_members<'e, E>(executor: E, household: &HouseholdCode) -> Result<Vec<Resident>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {} FROM residents WHERE household_code = $1 AND is_active ORDER BY id FOR UPDATE",
            RESIDENT_COLUMNS
        );
        sqlx::query_as::<_, Resident>(&sql)
            .bind(household)
            .fetch_all(executor)
            .await
            .map_err(AppError::from_db)
    }

    /// Total de membros ativos, inclusive os que a sessão não enxerga.
    pub async fn count_all_active_members<'e, E>(executor: E, household: &HouseholdCode) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {}($1)", MEMBER_COUNT_FUNCTION);
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(household)
            .fetch_one(executor)
            .await
            .map_err(AppError::from_db)
    }

    /// Um lote da propagação. Devolve quantas linhas foram atualizadas.
    pub async fn update_attribution<'e, E>(executor: E, ids: &[Uuid], attribution: &Attribution) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE residents
            SET barangay_code = $2, city_code = $3, province_code = $4, region_code = $5,
                updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(&attribution.barangay_code)
        .bind(&attribution.city_code)
        .bind(&attribution.province_code)
        .bind(&attribution.region_code)
        .execute(executor)
        .await
        .map_err(AppError::from_db)?;

        Ok(result.rows_affected())
    }

    /// Troca de domicílio: código e atribuição no mesmo UPDATE.
    pub async fn move_to_household<'e, E>(
        executor: E,
        id: Uuid,
        household: &HouseholdCode,
        attribution: &Attribution,
    ) -> Result<Resident, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            UPDATE residents
            SET household_code = $2,
                barangay_code = $3, city_code = $4, province_code = $5, region_code = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            RESIDENT_COLUMNS
        );
        sqlx::query_as::<_, Resident>(&sql)
            .bind(id)
            .bind(household)
            .bind(&attribution.barangay_code)
            .bind(&attribution.city_code)
            .bind(&attribution.province_code)
            .bind(&attribution.region_code)
            .fetch_one(executor)
            .await
            .map_err(AppError::from_db)
    }

    pub async fn deactivate<'e, E>(executor: E, id: Uuid) -> Result<Option<Resident>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "UPDATE residents SET is_active = false, updated_at = NOW() WHERE id = $1 AND is_active RETURNING {}",
            RESIDENT_COLUMNS
        );
        sqlx::query_as::<_, Resident>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(AppError::from_db)
    }

    /// Linha de auditoria do reparo de atribuição.
    pub async fn record_repair<'e, E>(
        executor: E,
        household: &HouseholdCode,
        resident_id: Uuid,
        previous: &Attribution,
        restored: &Attribution,
        repaired_by: Uuid,
    ) -> Result<AttributionRepair, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, AttributionRepair>(
            r#"
            INSERT INTO attribution_repairs (household_code, resident_id, previous, restored, repaired_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, household_code, resident_id, previous, restored, repaired_by, repaired_at
            "#,
        )
        .bind(household)
        .bind(resident_id)
        .bind(Json(previous))
        .bind(Json(restored))
        .bind(repaired_by)
        .fetch_one(executor)
        .await
        .map_err(AppError::from_db)
    }
}
