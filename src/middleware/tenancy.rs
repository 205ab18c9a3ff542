// src/middleware/tenancy.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::common::error::AppError;

// Escopo de projeto informado na query string (`?project_id=`).
#[derive(Debug, Clone, Copy)]
pub struct ProjectScope(pub Uuid);

fn parse_scope(query: Option<&str>) -> Result<Uuid, AppError> {
    let raw = query
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "project_id")
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::BadRequest("project_id é obrigatório.".into()))?;

    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("project_id inválido.".into()))
}

impl<S> FromRequestParts<S> for ProjectScope
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parse_scope(parts.uri.query()).map(ProjectScope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_is_read_from_the_query() {
        let id = Uuid::new_v4();
        assert_eq!(parse_scope(Some(&format!("x=1&project_id={id}"))).unwrap(), id);
    }

    #[test]
    fn absent_or_malformed_scope_is_a_bad_request() {
        for query in [None, Some(""), Some("project_id="), Some("project_id=abc")] {
            assert!(matches!(parse_scope(query), Err(AppError::BadRequest(_))));
        }
    }
}
