// src/db/user_repo.rs

use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{conflict_on_unique, like_prefix},
        error::AppError,
    },
    models::{
        auth::{Role, User},
        tenancy::MemberCandidate,
    },
};

// Dados para inserir um usuário (cadastro ou placeholder de convite).
pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub password_hash: Option<&'a str>,
    pub role: Role,
    pub client_id: Option<Uuid>,
    pub is_active: bool,
}

// O repositório de usuários, responsável por todas as interações com a tabela 'users'
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

fn map_user_conflict(e: sqlx::Error) -> AppError {
    let constraint = e
        .as_database_error()
        .and_then(|db_err| db_err.constraint())
        .unwrap_or_default()
        .to_string();
    match constraint.as_str() {
        "uq_users_username_ci" => conflict_on_unique(e, "username", "Este username já está em uso."),
        _ => conflict_on_unique(e, "email", "Este e-mail já está cadastrado."),
    }
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    // Login e resolução de principal: comparação sem diferenciar maiúsculas.
    pub async fn find_by_email_ci(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn find_by_username_ci(&self, username: &str) -> Result<Option<User>, AppError> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(username) = lower($1)")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    /// Busca por e-mail (sem diferenciar maiúsculas) com trava de linha,
    /// dentro de uma transação.
    pub async fn find_by_email<'e, E>(&self, executor: E, email: &str) -> Result<Option<User>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = lower($1) FOR UPDATE")
            .bind(email)
            .fetch_optional(executor)
            .await?;
        Ok(user)
    }

    pub async fn create_user<'e, E>(&self, executor: E, new_user: NewUser<'_>) -> Result<User, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let full_name = crate::models::auth::compose_full_name(new_user.first_name, new_user.last_name);
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                email, username, first_name, last_name, full_name,
                password_hash, role, client_id, is_active, active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *
            "#,
        )
        .bind(new_user.email)
        .bind(new_user.username)
        .bind(new_user.first_name)
        .bind(new_user.last_name)
        .bind(full_name)
        .bind(new_user.password_hash)
        .bind(new_user.role)
        .bind(new_user.client_id)
        .bind(new_user.is_active)
        .fetch_one(executor)
        .await
        .map_err(map_user_conflict)
    }

    /// IDs dos projetos dos quais o usuário é membro.
    pub async fn project_ids_of(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT project_id FROM project_users WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    // Diretório: `None` lista todos (administradores); senão, só o cliente dado.
    pub async fn list(&self, client_id: Option<Uuid>) -> Result<Vec<User>, AppError> {
        let users = match client_id {
            None => {
                sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY full_name, email")
                    .fetch_all(&self.pool)
                    .await?
            }
            Some(client_id) => {
                sqlx::query_as::<_, User>(
                    "SELECT * FROM users WHERE client_id = $1 ORDER BY full_name, email",
                )
                .bind(client_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(users)
    }

    pub async fn update_profile(
        &self,
        id: Uuid,
        first_name: Option<&str>,
        last_name: Option<&str>,
        job_title: Option<&str>,
        department: Option<&str>,
    ) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                job_title = COALESCE($4, job_title),
                department = COALESCE($5, department),
                full_name = btrim(COALESCE($2, first_name) || ' ' || COALESCE($3, last_name)),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(first_name)
        .bind(last_name)
        .bind(job_title)
        .bind(department)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Usuário não encontrado.".into()))?;
        Ok(user)
    }

    pub async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_reset_token = $2, password_reset_expires_at = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Troca a senha e invalida o token de recuperação.
    pub async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2,
                password_reset_token = NULL,
                password_reset_expires_at = NULL,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---
    // Fluxo de convite (sempre dentro de uma transação)
    // ---

    /// E-mails (minúsculos) que começam com o prefixo dado.
    pub async fn emails_with_prefix<'e, E>(&self, executor: E, prefix: &str) -> Result<Vec<String>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let emails = sqlx::query_scalar::<_, String>(
            "SELECT lower(email) FROM users WHERE lower(email) LIKE lower($1) ESCAPE '\\'",
        )
        .bind(like_prefix(prefix))
        .fetch_all(executor)
        .await?;
        Ok(emails)
    }

    pub async fn usernames_with_prefix<'e, E>(&self, executor: E, prefix: &str) -> Result<Vec<String>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let usernames = sqlx::query_scalar::<_, String>(
            "SELECT lower(username) FROM users WHERE lower(username) LIKE lower($1) ESCAPE '\\'",
        )
        .bind(like_prefix(prefix))
        .fetch_all(executor)
        .await?;
        Ok(usernames)
    }

    pub async fn rename_email<'e, E>(&self, executor: E, id: Uuid, new_email: &str) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE users SET email = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(new_email)
            .execute(executor)
            .await
            .map_err(map_user_conflict)?;
        Ok(())
    }

    /// Ativa o usuário convidado. Staff/superuser só para ADMINISTRATOR.
    pub async fn activate_invited<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        password_hash: &str,
        role: Role,
        client_id: Uuid,
    ) -> Result<User, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let elevated = role == Role::Administrator;
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                password_hash = $2,
                is_active = TRUE,
                active = TRUE,
                role = $3,
                client_id = $4,
                is_staff = is_staff OR $5,
                is_superuser = is_superuser OR $5,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .bind(role)
        .bind(client_id)
        .bind(elevated)
        .fetch_one(executor)
        .await?;
        Ok(user)
    }

    /// Candidatos a membro de projeto: só os IDs que existem, com o cliente de cada um.
    pub async fn find_candidates<'e, E>(&self, executor: E, ids: &[Uuid]) -> Result<Vec<MemberCandidate>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let found = sqlx::query_as::<_, MemberCandidate>(
            "SELECT id, client_id FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(executor)
        .await?;
        Ok(found)
    }
}
