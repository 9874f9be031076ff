// src/middleware/auth.rs

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    models::principal::{Principal, PrincipalClaims},
};

// Estrutura de dados ("claims") dentro do JWT emitido pelo serviço de
// autenticação. Aqui só decodificamos; emitir tokens não é papel deste serviço.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub sub: Uuid,
    pub role: String,
    #[serde(default)]
    pub assigned_code: Option<String>,
    pub exp: usize,
    pub iat: usize,
}

impl From<TokenClaims> for PrincipalClaims {
    fn from(token: TokenClaims) -> Self {
        PrincipalClaims { identity: token.sub, role: token.role, assigned_code: token.assigned_code }
    }
}

/// Claims verificadas (assinatura e expiração), resolvidas ou não.
#[derive(Debug, Clone)]
pub struct VerifiedClaims(pub PrincipalClaims);

/// Principal resolvido. Só existe nas extensões se `Principal::resolve` passou.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

pub fn decode_claims(token: &str, secret: &str) -> Result<PrincipalClaims, AppError> {
    let token_data = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims.into())
}

// O middleware em si
pub async fn auth_guard(
    State(app_state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(AppError::InvalidToken)?;
    let claims = decode_claims(bearer.token(), &app_state.jwt_secret)?;

    match Principal::resolve(&claims, &app_state.geography) {
        Ok(principal) => {
            request.extensions_mut().insert(AuthenticatedPrincipal(principal));
        }
        // Sem principal nas extensões: toda rota que exige um responde 403.
        Err(e) => tracing::debug!("Principal {} não resolvido: {}", claims.identity, e),
    }
    request.extensions_mut().insert(VerifiedClaims(claims));

    Ok(next.run(request).await)
}

// Extrator para obter o principal resolvido diretamente nos handlers
impl<S> FromRequestParts<S> for AuthenticatedPrincipal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<AuthenticatedPrincipal>() {
            return Ok(principal.clone());
        }
        match parts.extensions.get::<VerifiedClaims>() {
            Some(VerifiedClaims(claims)) => Err(AppError::PrincipalUnresolved(format!(
                "cargo '{}' com código {:?}",
                claims.role, claims.assigned_code
            ))),
            None => Err(AppError::InvalidToken),
        }
    }
}

impl<S> FromRequestParts<S> for VerifiedClaims
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedClaims>()
            .cloned()
            .ok_or(AppError::InvalidToken)
    }
}

/// Emite um token HS256 como o serviço de autenticação faria.
#[cfg(test)]
pub(crate) fn issue_test_token(role: &str, assigned_code: Option<&str>, secret: &str) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now();
    let claims = TokenClaims {
        sub: Uuid::new_v4(),
        role: role.to_string(),
        assigned_code: assigned_code.map(str::to_string),
        exp: (now + chrono::Duration::hours(1)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}
