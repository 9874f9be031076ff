use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use crate::{
    common::error::AppError,
    policy::declarative::{
        render_policy_sql, SessionSettings, PROTECTED_TABLES, SETTING_ACCESS_LEVEL, SETTING_ASSIGNED_CODE,
        SETTING_CAN_WRITE, SETTING_PRINCIPAL_ID,
    },
};

/// Atributos do papel com que um pool conecta.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RoleReport {
    pub name: String,
    pub superuser: bool,
    pub bypass_rls: bool,
    /// Dono (ou membro do dono) de alguma tabela protegida.
    pub owns_protected: bool,
}

impl RoleReport {
    fn escapes_policy(&self) -> bool {
        self.superuser || self.bypass_rls
    }
}

pub async fn role_report(pool: &PgPool) -> Result<RoleReport, AppError> {
    let report = sqlx::query_as::<_, RoleReport>(
        r#"
        SELECT r.rolname::text AS name,
               r.rolsuper AS superuser,
               r.rolbypassrls AS bypass_rls,
               EXISTS (
                   SELECT 1 FROM pg_tables t
                   WHERE t.schemaname = current_schema()
                     AND t.tablename = ANY($1)
                     AND pg_has_role(t.tableowner, 'MEMBER')
               ) AS owns_protected
        FROM pg_roles r
        WHERE r.rolname = current_user
        "#,
    )
    .bind(PROTECTED_TABLES.as_slice())
    .fetch_one(pool)
    .await?;
    Ok(report)
}

/// O caminho declarativo só vale se o papel dele estiver de fato sujeito à
/// política, e o caminho privilegiado precisa de fato ignorá-la.
pub fn check_role_separation(subject: &RoleReport, privileged: &RoleReport) -> anyhow::Result<()> {
    if subject.escapes_policy() {
        anyhow::bail!(
            "o papel '{}' de DATABASE_URL ignora a política de linha (superuser ou BYPASSRLS)",
            subject.name
        );
    }
    if subject.owns_protected {
        anyhow::bail!(
            "o papel '{}' de DATABASE_URL é dono das tabelas protegidas e poderia desligar a política",
            subject.name
        );
    }
    if !privileged.escapes_policy() {
        anyhow::bail!(
            "o papel '{}' de PRIVILEGED_DATABASE_URL precisa de BYPASSRLS para o caminho privilegiado",
            privileged.name
        );
    }
    Ok(())
}

/// Confere os dois papéis antes de servir qualquer requisição.
pub async fn verify_role_separation(pool: &PgPool, privileged_pool: &PgPool) -> anyhow::Result<()> {
    let subject = role_report(pool).await?;
    let privileged = role_report(privileged_pool).await?;
    check_role_separation(&subject, &privileged)?;
    tracing::info!(
        "🔐 Papéis conferidos: '{}' sujeito à política, '{}' privilegiado",
        subject.name,
        privileged.name
    );
    Ok(())
}

/// Instala (ou reinstala) a política de linha gerada em `render_policy_sql`.
/// Precisa rodar com o dono das tabelas, numa única transação.
pub async fn install_declarative_policy(pool: &PgPool) -> Result<(), AppError> {
    let statements = render_policy_sql();
    let mut tx = pool.begin().await?;
    for statement in &statements {
        sqlx::raw_sql(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    tracing::info!("🔐 Política de linha instalada ({} instruções)", statements.len());
    Ok(())
}

// ---
// Helper RLS: A "Chave" para o Banco de Dados
// ---
/// Grava as variáveis da política de linha na transação corrente.
/// `set_config(..., true)` vale só até o fim da transação, por isso isto
/// nunca é feito fora de uma.
async fn apply_session_settings(conn: &mut PgConnection, settings: &SessionSettings) -> Result<(), AppError> {
    sqlx::query(
        "SELECT set_config($1, $2, true), set_config($3, $4, true), \
         set_config($5, $6, true), set_config($7, $8, true)",
    )
    .bind(SETTING_ACCESS_LEVEL)
    .bind(&settings.access_level)
    .bind(SETTING_ASSIGNED_CODE)
    .bind(&settings.assigned_code)
    .bind(SETTING_CAN_WRITE)
    .bind(settings.can_write_setting())
    .bind(SETTING_PRINCIPAL_ID)
    .bind(&settings.principal_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Abre uma transação no pool sujeito a RLS com a sessão do principal.
pub(crate) async fn begin_scoped(
    pool: &PgPool,
    settings: &SessionSettings,
) -> Result<Transaction<'static, Postgres>, AppError> {
    let mut tx = pool.begin().await?;
    apply_session_settings(&mut tx, settings).await?;
    Ok(tx)
}

/// Transação de leitura consistente para diagnósticos: não enxerga
/// realocações pela metade e não bloqueia escritores.
pub(crate) async fn begin_snapshot(pool: &PgPool) -> Result<Transaction<'static, Postgres>, AppError> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// Exporta o snapshot de uma transação aberta por `begin_snapshot`.
pub(crate) async fn export_snapshot(tx: &mut Transaction<'static, Postgres>) -> Result<String, AppError> {
    let snapshot: String = sqlx::query_scalar("SELECT pg_export_snapshot()")
        .fetch_one(&mut **tx)
        .await?;
    Ok(snapshot)
}

/// Transação com sessão do principal lendo exatamente o mesmo snapshot de
/// outra transação (paridade entre os dois caminhos).
pub(crate) async fn begin_scoped_snapshot(
    pool: &PgPool,
    settings: &SessionSettings,
    snapshot: &str,
) -> Result<Transaction<'static, Postgres>, AppError> {
    // SET TRANSACTION SNAPSHOT não aceita parâmetro; o id vem de
    // pg_export_snapshot() e só tem hexadecimais e hífens.
    if snapshot.is_empty() || !snapshot.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        return Err(AppError::InternalServerError(anyhow::anyhow!(
            "identificador de snapshot inesperado: {}",
            snapshot
        )));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!("SET TRANSACTION SNAPSHOT '{}'", snapshot))
        .execute(&mut *tx)
        .await?;
    apply_session_settings(&mut tx, settings).await?;
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str, superuser: bool, bypass_rls: bool, owns_protected: bool) -> RoleReport {
        RoleReport { name: name.into(), superuser, bypass_rls, owns_protected }
    }

    #[test]
    fn separated_roles_pass() {
        let app = role("geo_app", false, false, false);
        assert!(check_role_separation(&app, &role("geo_admin", false, true, true)).is_ok());
        assert!(check_role_separation(&app, &role("postgres", true, false, true)).is_ok());
    }

    #[test]
    fn subject_role_that_escapes_policy_is_refused() {
        let admin = role("geo_admin", false, true, true);
        for subject in [
            role("postgres", true, false, false),
            role("geo_admin", false, true, false),
            role("geo_owner", false, false, true),
        ] {
            assert!(check_role_separation(&subject, &admin).is_err(), "{:?}", subject);
        }
    }

    #[test]
    fn same_role_on_both_pools_is_refused() {
        let owner = role("geo_owner", false, false, true);
        assert!(check_role_separation(&owner, &owner).is_err());

        let app = role("geo_app", false, false, false);
        let err = check_role_separation(&app, &app).unwrap_err();
        assert!(err.to_string().contains("BYPASSRLS"));
    }

    // DATABASE_URL dos testes aponta para um superuser.
    #[sqlx::test]
    async fn superuser_pool_is_refused_as_subject(pool: PgPool) -> anyhow::Result<()> {
        let report = role_report(&pool).await?;
        assert!(report.superuser);
        assert!(verify_role_separation(&pool, &pool).await.is_err());
        Ok(())
    }
}
