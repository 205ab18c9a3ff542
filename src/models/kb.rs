// src/models/kb.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

// Vínculo local entre uma KB externa (hash_id no n8n) e um projeto.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct KbLink {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub project_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct HashIdQuery {
    pub hash_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct KbCreatePayload {
    pub project_id: Uuid,
    #[validate(length(min = 1, max = 255, message = "O nome da KB é obrigatório."))]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct KbEditPayload {
    pub hash_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct KbAttachPayload {
    #[validate(length(min = 1, max = 128, message = "hash_id é obrigatório."))]
    pub hash_id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KbAttachResponse {
    pub status: &'static str,
    pub project_id: Uuid,
    pub hash_id: String,
    pub name: String,
}

// Arquivo recebido via multipart para repasse ao n8n.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}
