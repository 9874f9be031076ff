// src/policy/declarative.rs

use crate::models::{
    geography::GeoLevel,
    principal::{AccessLevel, Jurisdiction, Principal},
};
#[cfg(test)]
use crate::models::geography::Attribution;

pub const SETTING_ACCESS_LEVEL: &str = "app.access_level";
pub const SETTING_ASSIGNED_CODE: &str = "app.assigned_code";
pub const SETTING_CAN_WRITE: &str = "app.can_write";
pub const SETTING_PRINCIPAL_ID: &str = "app.principal_id";

/// Valor de `app.access_level` para a capacidade `super`.
pub const SUPER_LEVEL: &str = "super";

/// Tabelas protegidas pela política declarativa.
pub const PROTECTED_TABLES: [&str; 2] = ["households", "residents"];

/// Conta os membros ativos de um domicílio sem passar pela política de linha.
/// Roda com os direitos do papel privilegiado que a instala.
pub const MEMBER_COUNT_FUNCTION: &str = "app_active_member_count";

/// A "chave" da sessão: o que é gravado com `set_config` antes de qualquer
/// consulta no caminho declarativo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub access_level: String,
    pub assigned_code: String,
    pub can_write: bool,
    pub principal_id: String,
}

impl SessionSettings {
    pub fn for_principal(principal: &Principal) -> Self {
        let (access_level, assigned_code, can_write) = match principal.jurisdiction() {
            Jurisdiction::Super => (SUPER_LEVEL.to_string(), String::new(), true),
            Jurisdiction::National => (
                AccessLevel::National.as_str().to_string(),
                String::new(),
                principal.may_write(),
            ),
            Jurisdiction::Scoped { level, code } => (
                AccessLevel::from(*level).as_str().to_string(),
                code.as_str().to_string(),
                principal.may_write(),
            ),
        };

        Self {
            access_level,
            assigned_code,
            can_write,
            principal_id: principal.identity().to_string(),
        }
    }

    /// Sessão de um principal que não foi resolvido: nível vazio, que cai no
    /// ramo `ELSE false` da política.
    pub fn unresolved(identity: &str) -> Self {
        Self {
            access_level: String::new(),
            assigned_code: String::new(),
            can_write: false,
            principal_id: identity.to_string(),
        }
    }

    pub fn can_write_setting(&self) -> &'static str {
        if self.can_write { "true" } else { "false" }
    }
}

fn param(level: GeoLevel) -> String {
    format!("p_{}", level.column())
}

/// Gera o SQL da política de linha a partir da mesma tabela nível -> coluna
/// usada pelo `ScopeFilter`. Cada item é uma instrução.
pub fn render_policy_sql() -> Vec<String> {
    let params = GeoLevel::ALL
        .into_iter()
        .map(|level| format!("{} text", param(level)))
        .collect::<Vec<_>>()
        .join(", ");
    let args = GeoLevel::ALL
        .into_iter()
        .map(|level| level.column())
        .collect::<Vec<_>>()
        .join(", ");

    let mut branches = format!("        WHEN '{}' THEN true\n", SUPER_LEVEL);
    for level in AccessLevel::ALL {
        let condition = match level.geo_level() {
            None => "true".to_string(),
            Some(geo) => format!(
                "{} = current_setting('{}', true)",
                param(geo),
                SETTING_ASSIGNED_CODE
            ),
        };
        branches.push_str(&format!("        WHEN '{}' THEN {}\n", level.as_str(), condition));
    }

    let mut statements = vec![
        format!(
            "CREATE OR REPLACE FUNCTION app_scope_admits({params})\n\
             RETURNS boolean LANGUAGE sql STABLE AS $$\n\
             SELECT COALESCE(\n    CASE current_setting('{level}', true)\n{branches}        ELSE false\n    END,\n    false)\n$$",
            params = params,
            level = SETTING_ACCESS_LEVEL,
            branches = branches,
        ),
        format!(
            "CREATE OR REPLACE FUNCTION app_scope_admits_write({params})\n\
             RETURNS boolean LANGUAGE sql STABLE AS $$\n\
             SELECT COALESCE(current_setting('{can_write}', true) = 'true', false)\n    AND app_scope_admits({call})\n$$",
            params = params,
            can_write = SETTING_CAN_WRITE,
            call = GeoLevel::ALL.into_iter().map(param).collect::<Vec<_>>().join(", "),
        ),
        // Só devolve uma contagem: nenhuma linha escondida sai daqui.
        format!(
            "CREATE OR REPLACE FUNCTION {MEMBER_COUNT_FUNCTION}(p_household text)\n\
             RETURNS bigint LANGUAGE sql STABLE SECURITY DEFINER SET search_path FROM CURRENT AS $$\n\
             SELECT count(*) FROM residents WHERE household_code = p_household AND is_active\n$$"
        ),
    ];

    for table in PROTECTED_TABLES {
        statements.push(format!("ALTER TABLE {table} ENABLE ROW LEVEL SECURITY"));
        // Sem FORCE o dono da tabela ignora as políticas.
        statements.push(format!("ALTER TABLE {table} FORCE ROW LEVEL SECURITY"));
        for (suffix, clause) in [
            ("read", format!("FOR SELECT USING (app_scope_admits({args}))")),
            ("insert", format!("FOR INSERT WITH CHECK (app_scope_admits_write({args}))")),
            (
                "update",
                format!("FOR UPDATE USING (app_scope_admits_write({args})) WITH CHECK (app_scope_admits_write({args}))"),
            ),
        ] {
            let name = format!("{table}_scope_{suffix}");
            statements.push(format!("DROP POLICY IF EXISTS {name} ON {table}"));
            statements.push(format!("CREATE POLICY {name} ON {table} {clause}"));
        }
    }

    statements
}

/// O que o Postgres faz ao avaliar `app_scope_admits` com estas
/// configurações. Usado pelo armazenamento em memória dos testes.
#[cfg(test)]
pub fn admits(settings: &SessionSettings, attribution: &Attribution) -> bool {
    if settings.access_level == SUPER_LEVEL {
        return true;
    }
    match AccessLevel::from_name(&settings.access_level) {
        Some(level) => match level.geo_level() {
            None => true,
            Some(geo) => attribution.code_at(geo).as_str() == settings.assigned_code,
        },
        None => false,
    }
}

#[cfg(test)]
pub fn admits_write(settings: &SessionSettings, attribution: &Attribution) -> bool {
    settings.can_write && admits(settings, attribution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{geography::GeographicCode, principal::PrincipalClaims},
        policy::model::{self, Resource},
        services::geography_service::tests::{sample_geography, sample_units},
    };
    use uuid::Uuid;

    #[test]
    fn rendered_policy_has_one_branch_per_level_and_default_deny() {
        let sql = render_policy_sql();
        let function = &sql[0];
        for level in AccessLevel::ALL {
            assert!(function.contains(&format!("WHEN '{}' THEN", level.as_str())));
        }
        assert!(function.contains("WHEN 'super' THEN true"));
        assert!(function.contains("WHEN 'city' THEN p_city_code = current_setting('app.assigned_code', true)"));
        assert!(function.contains("ELSE false"));
        assert!(sql.iter().any(|s| s.starts_with("CREATE POLICY residents_scope_update ON residents FOR UPDATE")));
        assert!(!sql.iter().any(|s| s.contains("FOR DELETE")));
    }

    #[test]
    fn policy_binds_table_owners_too() {
        let sql = render_policy_sql();
        for table in PROTECTED_TABLES {
            let enable = sql.iter().position(|s| s == &format!("ALTER TABLE {table} ENABLE ROW LEVEL SECURITY"));
            let force = sql.iter().position(|s| s == &format!("ALTER TABLE {table} FORCE ROW LEVEL SECURITY"));
            assert!(enable.is_some(), "{table} sem ENABLE");
            assert!(force > enable, "{table} sem FORCE depois do ENABLE");
        }
    }

    #[test]
    fn member_count_runs_as_definer_and_returns_only_a_count() {
        let sql = render_policy_sql();
        let function = sql
            .iter()
            .find(|s| s.contains(MEMBER_COUNT_FUNCTION))
            .expect("função de contagem");
        assert!(function.contains("SECURITY DEFINER"));
        assert!(function.contains("RETURNS bigint"));
        assert!(function.contains("household_code = p_household AND is_active"));
    }

    #[test]
    fn unresolved_session_admits_nothing() {
        let geo = sample_geography();
        let settings = SessionSettings::unresolved("anon");
        for unit in sample_units().into_iter().filter(|u| u.level == GeoLevel::Barangay) {
            let a = geo.attribution_for_barangay(&unit.code).unwrap();
            assert!(!admits(&settings, &a));
        }
    }

    #[test]
    fn session_emulation_agrees_with_policy_model() {
        let geo = sample_geography();
        let roles = [
            ("super_admin", None),
            ("national_viewer", None),
            ("region_admin", Some("04")),
            ("province_staff", Some("0434")),
            ("city_viewer", Some("0421140")),
            ("barangay_admin", Some("042114014")),
        ];
        for (role, code) in roles {
            let principal = crate::models::principal::Principal::resolve(
                &PrincipalClaims {
                    identity: Uuid::new_v4(),
                    role: role.into(),
                    assigned_code: code.map(str::to_string),
                },
                &geo,
            )
            .unwrap();
            let settings = SessionSettings::for_principal(&principal);

            for unit in sample_units().into_iter().filter(|u| u.level == GeoLevel::Barangay) {
                let a = geo.attribution_for_barangay(&unit.code).unwrap();
                let decision = model::decide(&principal, Resource::record(&a));
                assert_eq!(admits(&settings, &a), decision.allows_read(), "{role} em {}", unit.code);
                assert_eq!(admits_write(&settings, &a), decision.allows_write(), "{role} em {}", unit.code);
            }
        }
    }

    #[test]
    fn level_setting_is_compared_exactly() {
        let geo = sample_geography();
        let a = geo
            .attribution_for_barangay(&GeographicCode::parse("042114014").unwrap())
            .unwrap();
        let mut settings = SessionSettings::unresolved("x");
        settings.assigned_code = "042114014".into();
        settings.access_level = "Barangay".into();
        assert!(!admits(&settings, &a));
        settings.access_level = "\"barangay\"".into();
        assert!(!admits(&settings, &a));
        settings.access_level = "barangay".into();
        assert!(admits(&settings, &a));
    }
}
