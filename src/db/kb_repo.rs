// src/db/kb_repo.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{db_utils::is_foreign_key_violation, error::AppError},
    models::kb::KbLink,
};

#[derive(Clone)]
pub struct KbLinkRepository {
    pool: PgPool,
}

impl KbLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Projetos aos quais a KB externa está vinculada.
    pub async fn projects_for(&self, external_id: &str) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT project_id FROM kb_links WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    pub async fn external_ids_for_project(&self, project_id: Uuid) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT external_id FROM kb_links WHERE project_id = $1 ORDER BY created_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Cria o vínculo se ainda não existir; devolve o vínculo e se ele foi criado agora.
    pub async fn link_or_get(&self, project_id: Uuid, external_id: &str, name: &str) -> Result<(KbLink, bool), AppError> {
        let inserted = sqlx::query_as::<_, KbLink>(
            r#"
            INSERT INTO kb_links (project_id, external_id, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (project_id, external_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(external_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                return AppError::NotFound("Projeto não encontrado.".into());
            }
            AppError::from(e)
        })?;

        if let Some(link) = inserted {
            return Ok((link, true));
        }
        let existing = sqlx::query_as::<_, KbLink>(
            "SELECT * FROM kb_links WHERE project_id = $1 AND external_id = $2",
        )
        .bind(project_id)
        .bind(external_id)
        .fetch_one(&self.pool)
        .await?;
        Ok((existing, false))
    }

    pub async fn unlink_everywhere(&self, external_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM kb_links WHERE external_id = $1")
            .bind(external_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
