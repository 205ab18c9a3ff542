// src/models/agents.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// O "bot": um agente apoiado por um workflow no n8n.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub url_n8n: String,
    pub expertise_area_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Iniciais exibidas no avatar padrão ("Suporte Técnico" -> "ST").
    pub fn initials(&self) -> String {
        let parts: Vec<&str> = self.name.split_whitespace().collect();
        let first_char = |s: &str| s.chars().next().map(|c| c.to_uppercase().collect::<String>());
        match parts.as_slice() {
            [] => String::new(),
            [only] => first_char(only).unwrap_or_default(),
            [first, .., last] => format!(
                "{}{}",
                first_char(first).unwrap_or_default(),
                first_char(last).unwrap_or_default()
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AgentView {
    #[serde(flatten)]
    pub agent: Agent,
    pub initials: String,
}

impl From<Agent> for AgentView {
    fn from(agent: Agent) -> Self {
        let initials = agent.initials();
        Self { agent, initials }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateAgentPayload {
    #[validate(length(min = 1, max = 255, message = "O nome do bot é obrigatório."))]
    pub name: String,
    pub description: Option<String>,
    #[validate(url(message = "A URL do workflow é inválida."))]
    pub url_n8n: String,
    pub expertise_area_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateAgentPayload {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(url(message = "A URL do workflow é inválida."))]
    pub url_n8n: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignExpertisePayload {
    // `null` remove a área de especialidade.
    pub expertise_area_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ExpertiseArea {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateExpertiseAreaPayload {
    #[validate(length(min = 1, max = 255, message = "O nome da área é obrigatório."))]
    pub name: String,
    pub description: Option<String>,
}
