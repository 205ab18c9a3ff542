// src/models/invite.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::auth::Role;

// Convite pendente. É consumido (apagado) na confirmação.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Invite {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub token: Uuid,
    pub role: Role,
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Invite {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateInvitePayload {
    #[validate(email(message = "O e-mail fornecido é inválido."))]
    pub email: String,
    pub project_id: Uuid,
    // Ausente = USER.
    pub role: Option<Role>,
    // Só é considerado para administradores.
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConfirmInvitePayload {
    #[validate(length(min = 8, message = "A senha deve ter no mínimo 8 caracteres."))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InviteCreatedResponse {
    pub detail: String,
    pub invite: Invite,
}
