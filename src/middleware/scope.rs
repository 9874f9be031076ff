// src/middleware/scope.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use std::marker::PhantomData;

use crate::{
    common::error::AppError,
    middleware::auth::AuthenticatedPrincipal,
    models::principal::{Jurisdiction, Principal},
};

/// 1. O Trait que define uma exigência de jurisdição
pub trait JurisdictionDef: Send + Sync + 'static {
    fn describe() -> &'static str;
    fn admits(jurisdiction: &Jurisdiction) -> bool;
}

/// 2. O Extractor (Guardião). Devolve o principal já verificado.
pub struct RequireJurisdiction<T>(pub Principal, pub PhantomData<T>);

impl<T> RequireJurisdiction<T> {
    pub fn principal(&self) -> &Principal {
        &self.0
    }
}

// 3. Implementação do FromRequestParts
impl<T, S> FromRequestParts<S> for RequireJurisdiction<T>
where
    T: JurisdictionDef,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedPrincipal(principal) = AuthenticatedPrincipal::from_request_parts(parts, state).await?;

        if !T::admits(principal.jurisdiction()) {
            return Err(AppError::Forbidden(format!(
                "esta operação exige jurisdição {}",
                T::describe()
            )));
        }

        Ok(RequireJurisdiction(principal, PhantomData))
    }
}

// ---
// DEFINIÇÃO DAS EXIGÊNCIAS (TIPOS)
// ---

/// Diagnósticos e operações em lote: `Super` ou `National`.
pub struct NationwideOperator;
impl JurisdictionDef for NationwideOperator {
    fn describe() -> &'static str { "nacional" }
    fn admits(jurisdiction: &Jurisdiction) -> bool {
        jurisdiction.is_nationwide()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::geography::{GeoLevel, GeographicCode};

    #[test]
    fn nationwide_admits_super_and_national_only() {
        assert!(NationwideOperator::admits(&Jurisdiction::Super));
        assert!(NationwideOperator::admits(&Jurisdiction::National));
        assert!(!NationwideOperator::admits(&Jurisdiction::Scoped {
            level: GeoLevel::Region,
            code: GeographicCode::parse("04").unwrap(),
        }));
    }
}
