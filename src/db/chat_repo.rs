// src/db/chat_repo.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{db_utils::conflict_on_unique, error::AppError},
    models::chat::{ChatFavorite, ChatSession, FavoriteView},
};

pub struct NewFavorite<'a> {
    pub user_id: Uuid,
    pub agent_id: Uuid,
    pub session_id: Uuid,
    pub message_id: &'a str,
    pub text: &'a str,
}

#[derive(Clone)]
pub struct ChatRepository {
    pool: PgPool,
}

impl ChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---
    // Sessões
    // ---

    /// As `limit` sessões mais recentes do usuário, da mais nova para a mais antiga.
    pub async fn recent_sessions(&self, user_id: Uuid, limit: i64) -> Result<Vec<ChatSession>, AppError> {
        let sessions = sqlx::query_as::<_, ChatSession>(
            r#"
            SELECT * FROM chat_sessions
            WHERE user_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    pub async fn sessions_of(&self, user_id: Uuid) -> Result<Vec<ChatSession>, AppError> {
        let sessions = sqlx::query_as::<_, ChatSession>(
            "SELECT * FROM chat_sessions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    pub async fn find_session(
        &self,
        user_id: Uuid,
        agent_id: Uuid,
        session_key: &str,
    ) -> Result<Option<ChatSession>, AppError> {
        let session = sqlx::query_as::<_, ChatSession>(
            "SELECT * FROM chat_sessions WHERE user_id = $1 AND agent_id = $2 AND session_key = $3",
        )
        .bind(user_id)
        .bind(agent_id)
        .bind(session_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    pub async fn create_session(
        &self,
        user_id: Uuid,
        agent_id: Uuid,
        session_key: &str,
        data: Option<&str>,
    ) -> Result<ChatSession, AppError> {
        sqlx::query_as::<_, ChatSession>(
            r#"
            INSERT INTO chat_sessions (user_id, agent_id, session_key, data)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(agent_id)
        .bind(session_key)
        .bind(data)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "session_key", "Esta sessão já existe."))
    }

    // Favoritos da sessão caem junto (CASCADE).
    pub async fn delete_session(&self, user_id: Uuid, agent_id: Uuid, session_key: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM chat_sessions WHERE user_id = $1 AND agent_id = $2 AND session_key = $3",
        )
        .bind(user_id)
        .bind(agent_id)
        .bind(session_key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---
    // Favoritos
    // ---

    pub async fn favorites(
        &self,
        user_id: Uuid,
        agent_id: Option<Uuid>,
        session_key: Option<&str>,
    ) -> Result<Vec<FavoriteView>, AppError> {
        let favorites = sqlx::query_as::<_, FavoriteView>(
            r#"
            SELECT f.agent_id AS agent, s.session_key AS session, f.message_id, f.text,
                   a.name AS agent_name
            FROM chat_favorites f
            JOIN chat_sessions s ON s.id = f.session_id
            JOIN agents a ON a.id = f.agent_id
            WHERE f.user_id = $1
              AND ($2::uuid IS NULL OR f.agent_id = $2)
              AND ($3::text IS NULL OR s.session_key = $3)
            ORDER BY f.created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(agent_id)
        .bind(session_key)
        .fetch_all(&self.pool)
        .await?;
        Ok(favorites)
    }

    /// Marca a mensagem como favorita se ainda não estiver; devolve o favorito
    /// e se ele foi criado agora. O texto de um favorito existente não muda.
    pub async fn add_favorite(&self, favorite: NewFavorite<'_>) -> Result<(ChatFavorite, bool), AppError> {
        let inserted = sqlx::query_as::<_, ChatFavorite>(
            r#"
            INSERT INTO chat_favorites (user_id, agent_id, session_id, message_id, text)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, agent_id, session_id, message_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(favorite.user_id)
        .bind(favorite.agent_id)
        .bind(favorite.session_id)
        .bind(favorite.message_id)
        .bind(favorite.text)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((row, true));
        }
        let existing = sqlx::query_as::<_, ChatFavorite>(
            r#"
            SELECT * FROM chat_favorites
            WHERE user_id = $1 AND agent_id = $2 AND session_id = $3 AND message_id = $4
            "#,
        )
        .bind(favorite.user_id)
        .bind(favorite.agent_id)
        .bind(favorite.session_id)
        .bind(favorite.message_id)
        .fetch_one(&self.pool)
        .await?;
        Ok((existing, false))
    }

    pub async fn remove_favorites(&self, user_id: Uuid, message_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM chat_favorites WHERE user_id = $1 AND message_id = $2")
            .bind(user_id)
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
