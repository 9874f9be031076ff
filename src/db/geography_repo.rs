// src/db/geography_repo.rs

use sqlx::{Executor, PgConnection, Postgres};

use crate::{common::error::AppError, models::geography::GeoUnit};

pub struct GeographyRepository;

impl GeographyRepository {
    /// Tabela de referência inteira; é pequena e fica em memória.
    pub async fn load_all<'e, E>(executor: E) -> Result<Vec<GeoUnit>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let units = sqlx::query_as::<_, GeoUnit>(
            "SELECT code, level, parent_code, name FROM geo_units ORDER BY level DESC, code",
        )
        .fetch_all(executor)
        .await?;

        Ok(units)
    }

    /// Grava a carga inicial (região primeiro). Lacunas na cadeia de pais
    /// são aceitas aqui; quem as aponta é o diagnóstico de integridade.
    pub async fn upsert_all(conn: &mut PgConnection, units: &[GeoUnit]) -> Result<u64, AppError> {
        let mut ordered: Vec<&GeoUnit> = units.iter().collect();
        ordered.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.code.cmp(&b.code)));

        let mut written = 0;
        for unit in ordered {
            let result = sqlx::query(
                r#"
                INSERT INTO geo_units (code, level, parent_code, name)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (code) DO UPDATE
                SET level = EXCLUDED.level, parent_code = EXCLUDED.parent_code, name = EXCLUDED.name
                "#,
            )
            .bind(&unit.code)
            .bind(unit.level)
            .bind(&unit.parent_code)
            .bind(&unit.name)
            .execute(&mut *conn)
            .await?;
            written += result.rows_affected();
        }

        Ok(written)
    }
}
