// src/policy/filter.rs

use sqlx::{Encode, Postgres, QueryBuilder, Type};

use crate::{
    models::{
        geography::{GeoLevel, GeographicCode},
        principal::{Jurisdiction, Principal},
    },
};
#[cfg(test)]
use crate::{models::geography::Attribution, policy::model};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Constraint {
    /// Só produzido para `Super` e `National`.
    Nationwide,
    Column { level: GeoLevel, code: GeographicCode },
    DenyAll,
}

/// Predicado de filtro do caminho privilegiado.
///
/// Não há `Default` nem construtor "sem filtro": a única forma de obter um
/// filtro que deixa passar linhas é `for_principal`, que delega para a mesma
/// função de política do caminho declarativo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeFilter {
    constraint: Constraint,
}

impl ScopeFilter {
    pub fn for_principal(principal: &Principal, mode: AccessMode) -> Self {
        let may_write = matches!(principal.jurisdiction(), Jurisdiction::Super) || principal.may_write();
        if mode == AccessMode::Write && !may_write {
            return Self::deny_all();
        }

        let constraint = match principal.jurisdiction() {
            Jurisdiction::Super | Jurisdiction::National => Constraint::Nationwide,
            Jurisdiction::Scoped { level, code } => Constraint::Column { level: *level, code: code.clone() },
        };
        Self { constraint }
    }

    pub fn deny_all() -> Self {
        Self { constraint: Constraint::DenyAll }
    }

    #[cfg(test)]
    pub fn is_deny_all(&self) -> bool {
        self.constraint == Constraint::DenyAll
    }

    /// Avaliação em memória, equivalente ao SQL de `push_predicate`.
    #[cfg(test)]
    pub fn matches(&self, attribution: &Attribution) -> bool {
        match &self.constraint {
            Constraint::Nationwide => true,
            Constraint::Column { level, code } => {
                model::in_scope(&Jurisdiction::Scoped { level: *level, code: code.clone() }, attribution)
            }
            Constraint::DenyAll => false,
        }
    }

    /// Escreve o predicado (`alias.coluna = $n`, `TRUE` ou `FALSE`).
    pub(crate) fn push_predicate(&self, builder: &mut QueryBuilder<'_, Postgres>, alias: &str) {
        match &self.constraint {
            Constraint::Nationwide => {
                builder.push("TRUE");
            }
            Constraint::Column { level, code } => {
                builder
                    .push(format!("{}.{} = ", alias, level.column()))
                    .push_bind(code.as_str().to_owned());
            }
            Constraint::DenyAll => {
                builder.push("FALSE");
            }
        }
    }
}

/// Construtor de consultas do caminho privilegiado (credenciais que ignoram
/// RLS). O único construtor exige um `ScopeFilter`, e o predicado é escrito
/// logo após a instrução base, antes de qualquer outra condição.
pub struct PrivilegedQuery<'args> {
    builder: QueryBuilder<'args, Postgres>,
}

impl<'args> PrivilegedQuery<'args> {
    /// `statement` é a parte anterior ao `WHERE` (ex.: `SELECT ... FROM residents r`).
    pub fn new(statement: &str, filter: &ScopeFilter, alias: &str) -> Self {
        let mut builder = QueryBuilder::new(statement);
        builder.push(" WHERE (");
        filter.push_predicate(&mut builder, alias);
        builder.push(")");
        Self { builder }
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.builder.push(sql);
        self
    }

    pub fn push_bind<T>(&mut self, value: T) -> &mut Self
    where
        T: 'args + Encode<'args, Postgres> + Type<Postgres> + Send,
    {
        self.builder.push_bind(value);
        self
    }

    #[cfg(test)]
    pub fn sql(&self) -> &str {
        self.builder.sql()
    }

    pub fn into_builder(self) -> QueryBuilder<'args, Postgres> {
        self.builder
    }
}
