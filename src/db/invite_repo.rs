// src/db/invite_repo.rs

use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{conflict_on_unique, like_prefix},
        error::AppError,
    },
    models::{auth::Role, invite::Invite},
};

pub struct NewInvite<'a> {
    pub sender_id: Uuid,
    pub email: &'a str,
    pub token: Uuid,
    pub role: Role,
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct InviteRepository {
    pool: PgPool,
}

impl InviteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_email<'e, E>(&self, executor: E, email: &str) -> Result<Option<Invite>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let invite = sqlx::query_as::<_, Invite>(
            "SELECT * FROM invites WHERE lower(email) = lower($1) FOR UPDATE",
        )
        .bind(email)
        .fetch_optional(executor)
        .await?;
        Ok(invite)
    }

    /// Convite pelo par (e-mail, token), opcionalmente restrito ao projeto.
    pub async fn find_by_email_and_token<'e, E>(
        &self,
        executor: E,
        email: &str,
        token: Uuid,
        project_id: Option<Uuid>,
    ) -> Result<Option<Invite>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let invite = sqlx::query_as::<_, Invite>(
            r#"
            SELECT * FROM invites
            WHERE lower(email) = lower($1) AND token = $2
              AND ($3::uuid IS NULL OR project_id = $3)
            FOR UPDATE
            "#,
        )
        .bind(email)
        .bind(token)
        .bind(project_id)
        .fetch_optional(executor)
        .await?;
        Ok(invite)
    }

    pub async fn emails_with_prefix<'e, E>(&self, executor: E, prefix: &str) -> Result<Vec<String>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let emails = sqlx::query_scalar::<_, String>(
            "SELECT lower(email) FROM invites WHERE lower(email) LIKE lower($1) ESCAPE '\\'",
        )
        .bind(like_prefix(prefix))
        .fetch_all(executor)
        .await?;
        Ok(emails)
    }

    pub async fn rename_email<'e, E>(&self, executor: E, id: Uuid, new_email: &str) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE invites SET email = $2 WHERE id = $1")
            .bind(id)
            .bind(new_email)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn create<'e, E>(&self, executor: E, invite: NewInvite<'_>) -> Result<Invite, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Invite>(
            r#"
            INSERT INTO invites (sender_id, email, token, role, client_id, project_id, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(invite.sender_id)
        .bind(invite.email)
        .bind(invite.token)
        .bind(invite.role)
        .bind(invite.client_id)
        .bind(invite.project_id)
        .bind(invite.expires_at)
        .fetch_one(executor)
        .await
        .map_err(|e| conflict_on_unique(e, "email", "Já existe um convite pendente para este e-mail."))
    }

    pub async fn delete<'e, E>(&self, executor: E, id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("DELETE FROM invites WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }
}
