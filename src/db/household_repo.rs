// src/db/household_repo.rs

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        geography::Attribution,
        household::{Household, HouseholdCode, HouseholdDetails, NewHousehold},
    },
};

pub(crate) const HOUSEHOLD_COLUMNS: &str = "code, barangay_code, city_code, province_code, region_code, \
     address, head_resident_id, member_count, is_active, created_at, updated_at";

/// Trava de linha usada nas leituras dentro de transações de propagação.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    /// Inserção de residente: impede a realocação concorrente de "perder" o novo membro.
    Share,
    /// Realocação, reatribuição e reparo.
    Update,
}

impl RowLock {
    fn clause(self) -> &'static str {
        match self {
            RowLock::Share => " FOR SHARE",
            RowLock::Update => " FOR UPDATE",
        }
    }
}

/// Consultas de domicílio. Todas recebem o executor (normalmente a transação
/// com a sessão do principal), então a política de linha vale para cada uma.
pub struct HouseholdRepository;

impl HouseholdRepository {
    pub async fn find<'e, E>(executor: E, code: &HouseholdCode) -> Result<Option<Household>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {} FROM households WHERE code = $1", HOUSEHOLD_COLUMNS);
        sqlx::query_as::<_, Household>(&sql)
            .bind(code)
            .fetch_optional(executor)
            .await
            .map_err(AppError::from_db)
    }

    /// Domicílio ATIVO, travado.
    pub async fn find_active_locked<'e, E>(
        executor: E,
        code: &HouseholdCode,
        lock: RowLock,
    ) -> Result<Option<Household>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {} FROM households WHERE code = $1 AND is_active{}",
            HOUSEHOLD_COLUMNS,
            lock.clause()
        );
        sqlx::query_as::<_, Household>(&sql)
            .bind(code)
            .fetch_optional(executor)
            .await
            .map_err(AppError::from_db)
    }

    pub async fn insert<'e, E>(executor: E, household: &NewHousehold, member_count: i32) -> Result<Household, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            INSERT INTO households (
                code, barangay_code, city_code, province_code, region_code, address, member_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            HOUSEHOLD_COLUMNS
        );
        let a = &household.attribution;
        sqlx::query_as::<_, Household>(&sql)
            .bind(&household.code)
            .bind(&a.barangay_code)
            .bind(&a.city_code)
            .bind(&a.province_code)
            .bind(&a.region_code)
            .bind(&household.address)
            .bind(member_count)
            .fetch_one(executor)
            .await
            .map_err(|e| {
                // Tratamento de erro de chave duplicada
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.is_unique_violation() {
                        return AppError::HouseholdAlreadyExists(household.code.to_string());
                    }
                }
                AppError::from_db(e)
            })
    }

    /// Só os detalhes: os códigos geográficos nunca passam por aqui.
    pub async fn update_details<'e, E>(
        executor: E,
        code: &HouseholdCode,
        details: &HouseholdDetails,
    ) -> Result<Option<Household>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            UPDATE households
            SET address = COALESCE($2, address),
                head_resident_id = COALESCE($3, head_resident_id),
                member_count = COALESCE($4, member_count),
                updated_at = NOW()
            WHERE code = $1 AND is_active
            RETURNING {}
            "#,
            HOUSEHOLD_COLUMNS
        );
        sqlx::query_as::<_, Household>(&sql)
            .bind(code)
            .bind(&details.address)
            .bind(details.head_resident_id)
            .bind(details.member_count)
            .fetch_optional(executor)
            .await
            .map_err(AppError::from_db)
    }

    pub async fn set_head<'e, E>(executor: E, code: &HouseholdCode, resident_id: Uuid) -> Result<Household, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "UPDATE households SET head_resident_id = $2, updated_at = NOW() WHERE code = $1 RETURNING {}",
            HOUSEHOLD_COLUMNS
        );
        sqlx::query_as::<_, Household>(&sql)
            .bind(code)
            .bind(resident_id)
            .fetch_one(executor)
            .await
            .map_err(AppError::from_db)
    }

    /// Troca os quatro códigos (realocação). A linha já deve estar travada.
    pub async fn update_attribution<'e, E>(
        executor: E,
        code: &HouseholdCode,
        attribution: &Attribution,
    ) -> Result<Household, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            UPDATE households
            SET barangay_code = $2, city_code = $3, province_code = $4, region_code = $5,
                updated_at = NOW()
            WHERE code = $1
            RETURNING {}
            "#,
            HOUSEHOLD_COLUMNS
        );
        sqlx::query_as::<_, Household>(&sql)
            .bind(code)
            .bind(&attribution.barangay_code)
            .bind(&attribution.city_code)
            .bind(&attribution.province_code)
            .bind(&attribution.region_code)
            .fetch_one(executor)
            .await
            .map_err(AppError::from_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_clauses() {
        assert_eq!(RowLock::Share.clause(), " FOR SHARE");
        assert_eq!(RowLock::Update.clause(), " FOR UPDATE");
        assert!(HOUSEHOLD_COLUMNS.starts_with("code, barangay_code"));
    }
}
