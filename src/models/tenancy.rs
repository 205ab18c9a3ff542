// src/models/tenancy.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// ---
// 1. Client (o "Tenant")
// ---
// A fronteira de isolamento de mais alto nível.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Linha da listagem: cliente + número de projetos.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ClientSummary {
    pub id: Uuid,
    pub name: String,
    pub num_projects: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ClientPayload {
    #[validate(length(min = 1, max = 255, message = "O nome do cliente é obrigatório."))]
    pub name: String,
}

// ---
// 2. Project
// ---
// Sempre pertence a um cliente (CASCADE).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub client_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProjectPayload {
    #[validate(length(min = 1, message = "O nome do projeto é obrigatório."))]
    pub name: String,
    pub client_id: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProjectPayload {
    #[validate(length(min = 1, message = "O nome do projeto não pode ser vazio."))]
    pub name: Option<String>,
    pub client_id: Option<Uuid>,
}

// Corpo de attach/detach: uma lista de IDs (1 ou N).
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct IdsPayload {
    #[validate(length(min = 1, message = "Informe ao menos um ID."))]
    pub ids: Vec<Uuid>,
}

// Membro candidato: o ID e o cliente ao qual pertence (se houver).
#[derive(Debug, Clone, Copy, FromRow)]
pub struct MemberCandidate {
    pub id: Uuid,
    pub client_id: Option<Uuid>,
}

// ---
// 3. Relatórios de attach/detach
// ---
// Os quatro baldes são sempre reportados para fins de auditoria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct AttachmentReport {
    pub attached_now: Vec<Uuid>,
    pub already_attached: Vec<Uuid>,
    pub missing: Vec<Uuid>,
    pub rejected_cross_client: Vec<Uuid>,
    pub count_total: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DetachmentReport {
    pub detached_now: Vec<Uuid>,
    pub not_attached: Vec<Uuid>,
    pub missing: Vec<Uuid>,
    pub count_total: i64,
}

// Attach de bots não tem a regra de cliente cruzado.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct BotAttachmentReport {
    pub attached_now: Vec<Uuid>,
    pub already_attached: Vec<Uuid>,
    pub missing: Vec<Uuid>,
    pub count_total: i64,
}
