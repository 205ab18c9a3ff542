// src/models/chat.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

// Conversa de um usuário com um bot. `session_key` vem do frontend.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ChatSession {
    #[serde(skip_serializing)]
    pub id: Uuid,
    pub session_key: String,
    #[serde(rename = "agent")]
    pub agent_id: Uuid,
    #[serde(rename = "user")]
    pub user_id: Uuid,
    pub data: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateChatSessionPayload {
    #[serde(default)]
    pub session_key: String,
    pub agent_id: Option<Uuid>,
    // Primeira mensagem, guardada como `data`.
    pub first_message: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatSessionKeyPayload {
    #[serde(default)]
    pub session_key: String,
    pub agent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChatFavorite {
    pub id: Uuid,
    pub user_id: Uuid,
    pub agent_id: Uuid,
    pub session_id: Uuid,
    pub message_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Favorito como o frontend o consome: sessão pela chave, bot pelo id e nome.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct FavoriteView {
    pub agent: Uuid,
    pub session: String,
    pub message_id: String,
    pub text: String,
    pub agent_name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFavoritePayload {
    #[serde(default)]
    pub session_key: String,
    pub agent_id: Option<Uuid>,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct FavoriteFilter {
    pub agent_id: Option<Uuid>,
    pub session_key: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SearchPayload {
    #[validate(length(min = 1, max = 500, message = "O termo de busca é obrigatório."))]
    pub query: String,
}

/// Mensagem encontrada no histórico.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SearchHit {
    pub session_id: String,
    pub message: String,
    pub author: String,
    pub agent_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    pub status: &'static str,
    pub results: Vec<SearchHit>,
}
