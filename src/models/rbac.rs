// src/models/rbac.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// Grupo de papéis (ex.: "Suporte", "Financeiro"), criado sob demanda.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Group {
    pub id: Uuid,
    #[schema(example = "Suporte")]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GroupNamePayload {
    #[validate(length(min = 1, max = 150, message = "O nome do grupo é obrigatório."))]
    #[schema(example = "Suporte")]
    pub role: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserGroupsResponse {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleOption {
    pub value: &'static str,
    pub label: &'static str,
}
