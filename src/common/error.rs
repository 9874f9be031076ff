use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
// DENY não é erro: é um valor (`Decision::Deny`). Estes são os casos em que a
// operação inteira é rejeitada.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Principal não resolvido: {0}")]
    PrincipalUnresolved(String),

    #[error("Domicílio não encontrado: {0}")]
    HouseholdNotFound(String),

    #[error("Residente não encontrado: {0}")]
    ResidentNotFound(Uuid),

    #[error("Violação de integridade de código geográfico: {0}")]
    CodeIntegrityViolation(String),

    #[error("Domicílio já existe: {0}")]
    HouseholdAlreadyExists(String),

    #[error("Acesso negado: {0}")]
    Forbidden(String),

    #[error("Entrada inválida: {0}")]
    InvalidInput(String),

    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Token inválido")]
    InvalidToken,

    // Assinatura, expiração ou formato do JWT
    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Operação cancelada")]
    Cancelled,

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor: {0}")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    /// Código estável, legível por máquina, devolvido junto com a mensagem.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::PrincipalUnresolved(_) => "PRINCIPAL_UNRESOLVED",
            AppError::HouseholdNotFound(_) => "HOUSEHOLD_NOT_FOUND",
            AppError::ResidentNotFound(_) => "RESIDENT_NOT_FOUND",
            AppError::CodeIntegrityViolation(_) => "CODE_INTEGRITY_VIOLATION",
            AppError::HouseholdAlreadyExists(_) => "HOUSEHOLD_ALREADY_EXISTS",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::InvalidToken | AppError::JwtError(_) => "INVALID_TOKEN",
            AppError::Cancelled => "OPERATION_CANCELLED",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_ERROR",
        }
    }

    /// Converte erros do Postgres que têm significado de negócio.
    /// 42501 = violação de política de RLS (WITH CHECK).
    pub fn from_db(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.code().as_deref() == Some("42501") {
                return AppError::Forbidden("política de linha recusou a escrita".into());
            }
        }
        AppError::DatabaseError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, error_message) = match &self {
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "code": code,
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::PrincipalUnresolved(_) => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::HouseholdNotFound(_) | AppError::ResidentNotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            AppError::CodeIntegrityViolation(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::HouseholdAlreadyExists(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "Token de autenticação inválido ou ausente.".to_string(),
            ),
            AppError::JwtError(e) => {
                tracing::debug!("Token rejeitado: {}", e);
                (StatusCode::UNAUTHORIZED, "Token de autenticação inválido ou ausente.".to_string())
            }
            AppError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),

            // DatabaseError e InternalServerError viram 500. O detalhe vai
            // para o log, nunca para o cliente.
            e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Ocorreu um erro inesperado.".to_string())
            }
        };

        let body = Json(json!({ "error": error_message, "code": code }));
        (status, body).into_response()
    }
}
