// src/db/agent_repo.rs

use std::collections::HashSet;

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{conflict_on_unique, is_foreign_key_violation},
        error::AppError,
    },
    models::agents::{Agent, ExpertiseArea},
};

const MSG_AGENT_NAME_TAKEN: &str = "Já existe um bot com esse nome.";
const MSG_AREA_NAME_TAKEN: &str = "Já existe uma área de especialidade com esse nome.";

fn map_expertise_fk(e: sqlx::Error) -> AppError {
    if is_foreign_key_violation(&e) {
        return AppError::NotFound("Área de especialidade não encontrada.".into());
    }
    conflict_on_unique(e, "name", MSG_AGENT_NAME_TAKEN)
}

#[derive(Clone)]
pub struct AgentRepository {
    pool: PgPool,
}

impl AgentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `member` = None lista todos; senão, só os bots dos projetos do membro.
    pub async fn list(&self, member: Option<Uuid>) -> Result<Vec<Agent>, AppError> {
        let agents = sqlx::query_as::<_, Agent>(
            r#"
            SELECT a.*
            FROM agents a
            WHERE $1::uuid IS NULL
               OR EXISTS (
                   SELECT 1
                   FROM project_agents pa
                   JOIN project_users pu ON pu.project_id = pa.project_id
                   WHERE pa.agent_id = a.id AND pu.user_id = $1
               )
            ORDER BY a.name
            "#,
        )
        .bind(member)
        .fetch_all(&self.pool)
        .await?;
        Ok(agents)
    }

    pub async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Agent>, AppError> {
        let agents = sqlx::query_as::<_, Agent>(
            r#"
            SELECT a.*
            FROM agents a
            JOIN project_agents pa ON pa.agent_id = a.id
            WHERE pa.project_id = $1
            ORDER BY a.name
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(agents)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Agent>, AppError> {
        let agent = sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(agent)
    }

    pub async fn project_ids_of(&self, agent_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT project_id FROM project_agents WHERE agent_id = $1")
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        url_n8n: &str,
        expertise_area_id: Option<Uuid>,
    ) -> Result<Agent, AppError> {
        sqlx::query_as::<_, Agent>(
            r#"
            INSERT INTO agents (name, description, url_n8n, expertise_area_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(name.trim())
        .bind(description)
        .bind(url_n8n)
        .bind(expertise_area_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_expertise_fk)
    }

    pub async fn update(
        &self,
        id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
        url_n8n: Option<&str>,
    ) -> Result<Option<Agent>, AppError> {
        sqlx::query_as::<_, Agent>(
            r#"
            UPDATE agents SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                url_n8n = COALESCE($4, url_n8n),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name.map(str::trim))
        .bind(description)
        .bind(url_n8n)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "name", MSG_AGENT_NAME_TAKEN))
    }

    pub async fn set_expertise(&self, id: Uuid, expertise_area_id: Option<Uuid>) -> Result<Option<Agent>, AppError> {
        sqlx::query_as::<_, Agent>(
            "UPDATE agents SET expertise_area_id = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(expertise_area_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_expertise_fk)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM agents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---
    // Vínculo bot <-> projeto
    // ---

    pub async fn existing_ids(&self, ids: &[Uuid]) -> Result<HashSet<Uuid>, AppError> {
        let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM agents WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(found.into_iter().collect())
    }

    pub async fn attached_ids(&self, project_id: Uuid) -> Result<HashSet<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT agent_id FROM project_agents WHERE project_id = $1")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    pub async fn attach(&self, project_id: Uuid, agent_ids: &[Uuid]) -> Result<(), AppError> {
        if agent_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            INSERT INTO project_agents (project_id, agent_id)
            SELECT $1, unnest($2::uuid[])
            ON CONFLICT (project_id, agent_id) DO NOTHING
            "#,
        )
        .bind(project_id)
        .bind(agent_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn detach(&self, project_id: Uuid, agent_ids: &[Uuid]) -> Result<Vec<Uuid>, AppError> {
        let removed = sqlx::query_scalar::<_, Uuid>(
            r#"
            DELETE FROM project_agents
            WHERE project_id = $1 AND agent_id = ANY($2)
            RETURNING agent_id
            "#,
        )
        .bind(project_id)
        .bind(agent_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(removed)
    }
}

#[derive(Clone)]
pub struct ExpertiseAreaRepository {
    pool: PgPool,
}

impl ExpertiseAreaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<ExpertiseArea>, AppError> {
        let areas = sqlx::query_as::<_, ExpertiseArea>("SELECT * FROM expertise_areas ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(areas)
    }

    pub async fn create(&self, name: &str, description: Option<&str>) -> Result<ExpertiseArea, AppError> {
        sqlx::query_as::<_, ExpertiseArea>(
            "INSERT INTO expertise_areas (name, description) VALUES ($1, $2) RETURNING *",
        )
        .bind(name.trim())
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "name", MSG_AREA_NAME_TAKEN))
    }
}
