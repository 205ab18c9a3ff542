// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// Nosso tipo de erro central. Toda rota devolve `Result<_, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Requisição inválida: {0}")]
    BadRequest(String),

    #[error("Autenticação obrigatória")]
    Unauthenticated,

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Token inválido")]
    InvalidToken,

    // A mensagem nunca revela se o recurso existe.
    #[error("Acesso negado: {0}")]
    Forbidden(String),

    #[error("Não encontrado: {0}")]
    NotFound(String),

    #[error("Conflito no campo '{field}': {message}")]
    Conflict { field: &'static str, message: String },

    // Falha de integridade referencial no controle de tokens.
    #[error("Falha de integridade: {0}")]
    IntegrityFault(String),

    #[error("Serviço externo indisponível: {0}")]
    UpstreamUnavailable(String),

    #[error("Tempo esgotado ao chamar o serviço externo")]
    UpstreamTimeout,

    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de Bcrypt: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    pub fn conflict(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Conflict { field, message: message.into() }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated | AppError::InvalidCredentials | AppError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::IntegrityFault(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_)
            | AppError::BcryptError(_)
            | AppError::JwtError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            // Retorna todos os detalhes da validação, campo a campo.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                })
            }
            AppError::BadRequest(msg) => json!({ "error": msg }),
            AppError::Unauthenticated => json!({ "error": "Autenticação obrigatória." }),
            AppError::InvalidCredentials => json!({ "error": "Credenciais inválidas." }),
            AppError::InvalidToken => json!({ "error": "Token inválido ou expirado." }),
            AppError::Forbidden(msg) => json!({ "error": msg }),
            AppError::NotFound(msg) => json!({ "error": msg }),
            AppError::Conflict { field, message } => json!({ "error": message, "field": field }),
            AppError::UpstreamUnavailable(_) => {
                json!({ "error": "Erro ao chamar serviço externo." })
            }
            AppError::UpstreamTimeout => json!({ "error": "Timeout ao chamar serviço externo." }),

            // Todos os outros erros viram 500. O texto interno só vai para o log.
            ref e => {
                tracing::error!(error = %e, detail = ?e, "Erro Interno do Servidor");
                json!({ "error": "Ocorreu um erro inesperado." })
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn internal_errors_never_leak_their_text() {
        let (status, body) =
            body_json(AppError::IntegrityFault("users_pkey violated for 42".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.to_string().contains("users_pkey"));

        let (_, body) =
            body_json(AppError::InternalServerError(anyhow::anyhow!("segredo"))).await;
        assert!(!body.to_string().contains("segredo"));
    }

    #[tokio::test]
    async fn conflict_reports_the_field() {
        let (status, body) = body_json(AppError::conflict("email", "E-mail já existe.")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["field"], "email");
    }

    #[tokio::test]
    async fn upstream_errors_map_to_gateway_statuses() {
        let (status, body) = body_json(AppError::UpstreamUnavailable("dns".into())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(!body.to_string().contains("dns"));

        let (status, _) = body_json(AppError::UpstreamTimeout).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }
}
