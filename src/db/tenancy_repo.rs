// src/db/tenancy_repo.rs

use std::collections::HashSet;

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{conflict_on_unique, is_foreign_key_violation},
        error::AppError,
    },
    models::tenancy::{Client, ClientSummary, Project},
};

const MSG_CLIENT_NAME_TAKEN: &str = "Já existe um cliente com esse nome.";

#[derive(Clone)]
pub struct ClientRepository {
    pool: PgPool,
}

impl ClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Clientes com o número de projetos. `only` restringe a um único cliente.
    pub async fn list_summaries(&self, only: Option<Uuid>) -> Result<Vec<ClientSummary>, AppError> {
        let rows = sqlx::query_as::<_, ClientSummary>(
            r#"
            SELECT c.id, c.name, c.created_at, COUNT(p.id) AS num_projects
            FROM clients c
            LEFT JOIN projects p ON p.client_id = c.id
            WHERE $1::uuid IS NULL OR c.id = $1
            GROUP BY c.id
            ORDER BY c.name
            "#,
        )
        .bind(only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Client>, AppError> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(client)
    }

    pub async fn create(&self, name: &str) -> Result<Client, AppError> {
        sqlx::query_as::<_, Client>("INSERT INTO clients (name) VALUES ($1) RETURNING *")
            .bind(name.trim())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "name", MSG_CLIENT_NAME_TAKEN))
    }

    pub async fn update(&self, id: Uuid, name: &str) -> Result<Option<Client>, AppError> {
        sqlx::query_as::<_, Client>(
            "UPDATE clients SET name = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "name", MSG_CLIENT_NAME_TAKEN))
    }

    // Projetos e usuários do cliente caem junto (CASCADE).
    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct ProjectRepository {
    pool: PgPool,
}

fn map_project_fk(e: sqlx::Error) -> AppError {
    if is_foreign_key_violation(&e) {
        return AppError::NotFound("Cliente não encontrado.".into());
    }
    e.into()
}

impl ProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `member` = None lista todos; senão, só os projetos do membro.
    pub async fn list(&self, member: Option<Uuid>) -> Result<Vec<Project>, AppError> {
        let projects = sqlx::query_as::<_, Project>(
            r#"
            SELECT p.*
            FROM projects p
            WHERE $1::uuid IS NULL
               OR EXISTS (
                   SELECT 1 FROM project_users pu
                   WHERE pu.project_id = p.id AND pu.user_id = $1
               )
            ORDER BY p.name
            "#,
        )
        .bind(member)
        .fetch_all(&self.pool)
        .await?;
        Ok(projects)
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Project>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(project)
    }

    /// Trava a linha do projeto até o fim da transação: mudanças de membros
    /// e de cliente do mesmo projeto ficam serializadas.
    pub async fn lock<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Project>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(project)
    }

    pub async fn create(&self, name: &str, client_id: Uuid) -> Result<Project, AppError> {
        sqlx::query_as::<_, Project>(
            "INSERT INTO projects (name, client_id) VALUES ($1, $2) RETURNING *",
        )
        .bind(name.trim())
        .bind(client_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_project_fk)
    }

    pub async fn update<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        name: Option<&str>,
        client_id: Option<Uuid>,
    ) -> Result<Option<Project>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Project>(
            r#"
            UPDATE projects SET
                name = COALESCE($2, name),
                client_id = COALESCE($3, client_id),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name.map(str::trim))
        .bind(client_id)
        .fetch_optional(executor)
        .await
        .map_err(map_project_fk)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---
    // Membros
    // ---

    pub async fn member_ids<'e, E>(&self, executor: E, project_id: Uuid) -> Result<HashSet<Uuid>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM project_users WHERE project_id = $1")
            .bind(project_id)
            .fetch_all(executor)
            .await?;
        Ok(ids.into_iter().collect())
    }

    /// Membros com cliente definido e diferente de `client_id`.
    pub async fn members_outside_client<'e, E>(
        &self,
        executor: E,
        project_id: Uuid,
        client_id: Uuid,
    ) -> Result<Vec<Uuid>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT pu.user_id
            FROM project_users pu
            JOIN users u ON u.id = pu.user_id
            WHERE pu.project_id = $1
              AND u.client_id IS NOT NULL
              AND u.client_id <> $2
            ORDER BY pu.user_id
            "#,
        )
        .bind(project_id)
        .bind(client_id)
        .fetch_all(executor)
        .await?;
        Ok(ids)
    }

    /// Adiciona membros; pares já existentes são ignorados.
    pub async fn add_members<'e, E>(&self, executor: E, project_id: Uuid, user_ids: &[Uuid]) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        if user_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            r#"
            INSERT INTO project_users (project_id, user_id)
            SELECT $1, unnest($2::uuid[])
            ON CONFLICT (project_id, user_id) DO NOTHING
            "#,
        )
        .bind(project_id)
        .bind(user_ids)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Remove membros e devolve os IDs efetivamente desvinculados.
    pub async fn remove_members<'e, E>(&self, executor: E, project_id: Uuid, user_ids: &[Uuid]) -> Result<Vec<Uuid>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let removed = sqlx::query_scalar::<_, Uuid>(
            r#"
            DELETE FROM project_users
            WHERE project_id = $1 AND user_id = ANY($2)
            RETURNING user_id
            "#,
        )
        .bind(project_id)
        .bind(user_ids)
        .fetch_all(executor)
        .await?;
        Ok(removed)
    }

    pub async fn count_members<'e, E>(&self, executor: E, project_id: Uuid) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM project_users WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(executor)
            .await?;
        Ok(count)
    }
}
