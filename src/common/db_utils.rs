use sqlx::error::ErrorKind;

use crate::common::error::AppError;

// ---
// Helpers de classificação de erros do Postgres
// ---

/// Converte violação de unicidade em `AppError::Conflict`; o resto vira erro de banco.
pub(crate) fn conflict_on_unique(
    e: sqlx::Error,
    field: &'static str,
    message: impl Into<String>,
) -> AppError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return AppError::conflict(field, message);
        }
    }
    e.into()
}

/// Verdadeiro quando o erro é uma violação de chave estrangeira
/// (ex.: o usuário referenciado ainda não existe de forma durável).
pub(crate) fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db_err| matches!(db_err.kind(), ErrorKind::ForeignKeyViolation | ErrorKind::NotNullViolation))
        .unwrap_or(false)
}

/// Escapa os curingas do LIKE para buscas por prefixo literal.
pub(crate) fn like_prefix(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("a_b%c@x.com+EXPIRED"), "a\\_b\\%c@x.com+EXPIRED%");
    }

    #[test]
    fn non_database_errors_are_not_integrity_faults() {
        assert!(!is_foreign_key_violation(&sqlx::Error::RowNotFound));
    }
}
