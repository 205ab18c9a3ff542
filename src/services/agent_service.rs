// src/services/agent_service.rs

use uuid::Uuid;

use crate::{
    common::error::{AppError, AppResult},
    db::{AgentRepository, ExpertiseAreaRepository},
    models::agents::{AgentView, CreateAgentPayload, CreateExpertiseAreaPayload, ExpertiseArea, UpdateAgentPayload},
    services::policy::{self, Action, Principal, Resource},
};

fn agent_not_found() -> AppError {
    AppError::NotFound("Bot não encontrado.".into())
}

#[derive(Clone)]
pub struct AgentService {
    agent_repo: AgentRepository,
    area_repo: ExpertiseAreaRepository,
}

impl AgentService {
    pub fn new(agent_repo: AgentRepository, area_repo: ExpertiseAreaRepository) -> Self {
        Self { agent_repo, area_repo }
    }

    /// Administradores veem todos os bots; os demais, os bots dos seus projetos.
    pub async fn list(&self, principal: &Principal) -> AppResult<Vec<AgentView>> {
        let member = (!principal.is_admin()).then_some(principal.user_id);
        let agents = self.agent_repo.list(member).await?;
        Ok(agents.into_iter().map(AgentView::from).collect())
    }

    pub async fn get(&self, principal: &Principal, agent_id: Uuid) -> AppResult<AgentView> {
        let project_ids = self.agent_repo.project_ids_of(agent_id).await?;
        policy::decide(Some(principal), Action::View, &Resource::Agent { project_ids: &project_ids })
            .into_result()?;

        let agent = self.agent_repo.find_by_id(agent_id).await?.ok_or_else(agent_not_found)?;
        Ok(agent.into())
    }

    pub async fn create(&self, principal: &Principal, payload: &CreateAgentPayload) -> AppResult<AgentView> {
        policy::require_admin(principal)?;
        let agent = self
            .agent_repo
            .create(
                &payload.name,
                payload.description.as_deref(),
                payload.url_n8n.trim(),
                payload.expertise_area_id,
            )
            .await?;
        tracing::info!(agent_id = %agent.id, name = %agent.name, "Bot criado");
        Ok(agent.into())
    }

    pub async fn update(&self, principal: &Principal, agent_id: Uuid, payload: &UpdateAgentPayload) -> AppResult<AgentView> {
        policy::require_admin(principal)?;
        let agent = self
            .agent_repo
            .update(
                agent_id,
                payload.name.as_deref(),
                payload.description.as_deref(),
                payload.url_n8n.as_deref().map(str::trim),
            )
            .await?
            .ok_or_else(agent_not_found)?;
        Ok(agent.into())
    }

    pub async fn set_expertise(
        &self,
        principal: &Principal,
        agent_id: Uuid,
        expertise_area_id: Option<Uuid>,
    ) -> AppResult<AgentView> {
        policy::require_admin(principal)?;
        let agent = self
            .agent_repo
            .set_expertise(agent_id, expertise_area_id)
            .await?
            .ok_or_else(agent_not_found)?;
        Ok(agent.into())
    }

    pub async fn delete(&self, principal: &Principal, agent_id: Uuid) -> AppResult<()> {
        policy::require_admin(principal)?;
        if !self.agent_repo.delete(agent_id).await? {
            return Err(agent_not_found());
        }
        tracing::info!(%agent_id, actor = %principal.user_id, "Bot removido");
        Ok(())
    }

    // ---
    // Áreas de especialidade
    // ---

    pub async fn list_areas(&self) -> AppResult<Vec<ExpertiseArea>> {
        self.area_repo.list().await
    }

    pub async fn create_area(&self, principal: &Principal, payload: &CreateExpertiseAreaPayload) -> AppResult<ExpertiseArea> {
        policy::require_admin(principal)?;
        self.area_repo
            .create(&payload.name, payload.description.as_deref())
            .await
    }
}
