// src/services/tenancy_service.rs

use std::collections::{BTreeSet, HashSet};

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::{AppError, AppResult},
    db::{AgentRepository, ClientRepository, ProjectRepository, UserRepository},
    models::{
        agents::{Agent, AgentView},
        auth::User,
        tenancy::{
            AttachmentReport, BotAttachmentReport, Client, ClientSummary, CreateProjectPayload,
            DetachmentReport, Project, UpdateProjectPayload,
        },
    },
    services::policy::{self, Action, Principal, Resource},
};

/// Separa os IDs de bots pedidos em anexáveis, já anexados e inexistentes.
fn partition_bots(requested: &[Uuid], found: &HashSet<Uuid>, attached: &HashSet<Uuid>) -> BotAttachmentReport {
    let mut report = BotAttachmentReport::default();
    let mut seen = BTreeSet::new();
    for id in requested.iter().copied().filter(|id| seen.insert(*id)) {
        if !found.contains(&id) {
            report.missing.push(id);
        } else if attached.contains(&id) {
            report.already_attached.push(id);
        } else {
            report.attached_now.push(id);
        }
    }
    report
}

/// Mesma ideia para a remoção: o que sai, o que nem estava, o que não existe.
fn partition_detachment(requested: &[Uuid], found: &HashSet<Uuid>, attached: &HashSet<Uuid>) -> DetachmentReport {
    let mut report = DetachmentReport::default();
    let mut seen = BTreeSet::new();
    for id in requested.iter().copied().filter(|id| seen.insert(*id)) {
        if !found.contains(&id) {
            report.missing.push(id);
        } else if attached.contains(&id) {
            report.detached_now.push(id);
        } else {
            report.not_attached.push(id);
        }
    }
    report
}

#[derive(Clone)]
pub struct TenancyService {
    client_repo: ClientRepository,
    project_repo: ProjectRepository,
    user_repo: UserRepository,
    agent_repo: AgentRepository,
    pool: PgPool,
}

impl TenancyService {
    pub fn new(
        client_repo: ClientRepository,
        project_repo: ProjectRepository,
        user_repo: UserRepository,
        agent_repo: AgentRepository,
        pool: PgPool,
    ) -> Self {
        Self { client_repo, project_repo, user_repo, agent_repo, pool }
    }

    // ---
    // Clientes
    // ---

    pub async fn list_clients(&self, principal: &Principal) -> AppResult<Vec<ClientSummary>> {
        if principal.is_admin() {
            return self.client_repo.list_summaries(None).await;
        }
        match principal.client_id {
            Some(client_id) => self.client_repo.list_summaries(Some(client_id)).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn get_client(&self, principal: &Principal, client_id: Uuid) -> AppResult<Client> {
        policy::decide(Some(principal), Action::View, &Resource::Client(client_id)).into_result()?;
        self.client_repo
            .find_by_id(client_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Cliente não encontrado.".into()))
    }

    pub async fn create_client(&self, principal: &Principal, name: &str) -> AppResult<Client> {
        policy::require_admin(principal)?;
        let client = self.client_repo.create(name).await?;
        tracing::info!(client_id = %client.id, actor = %principal.user_id, "Cliente criado");
        Ok(client)
    }

    pub async fn update_client(&self, principal: &Principal, client_id: Uuid, name: &str) -> AppResult<Client> {
        policy::require_admin(principal)?;
        self.client_repo
            .update(client_id, name)
            .await?
            .ok_or_else(|| AppError::NotFound("Cliente não encontrado.".into()))
    }

    pub async fn delete_client(&self, principal: &Principal, client_id: Uuid) -> AppResult<()> {
        policy::require_admin(principal)?;
        if !self.client_repo.delete(client_id).await? {
            return Err(AppError::NotFound("Cliente não encontrado.".into()));
        }
        tracing::warn!(%client_id, actor = %principal.user_id, "Cliente removido (projetos em cascata)");
        Ok(())
    }

    // ---
    // Projetos
    // ---

    pub async fn list_projects(&self, principal: &Principal) -> AppResult<Vec<Project>> {
        let member = (!principal.is_admin()).then_some(principal.user_id);
        self.project_repo.list(member).await
    }

    /// Política primeiro: um não-membro recebe 403 mesmo se o projeto não existe.
    pub async fn get_project(&self, principal: &Principal, project_id: Uuid) -> AppResult<Project> {
        policy::decide(Some(principal), Action::View, &Resource::Project(project_id)).into_result()?;
        self.project_repo
            .find_by_id(&self.pool, project_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Projeto não encontrado.".into()))
    }

    pub async fn create_project(&self, principal: &Principal, payload: &CreateProjectPayload) -> AppResult<Project> {
        policy::require_admin(principal)?;
        let project = self.project_repo.create(&payload.name, payload.client_id).await?;
        tracing::info!(project_id = %project.id, client_id = %project.client_id, "Projeto criado");
        Ok(project)
    }

    /// Trocar o cliente exige que nenhum membro pertença a outro cliente;
    /// os membros devem ser desvinculados antes.
    pub async fn update_project(
        &self,
        principal: &Principal,
        project_id: Uuid,
        payload: &UpdateProjectPayload,
    ) -> AppResult<Project> {
        policy::require_admin(principal)?;

        // --- INÍCIO DA TRANSAÇÃO ---
        let mut tx = self.pool.begin().await?;

        let current = self
            .project_repo
            .lock(&mut *tx, project_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Projeto não encontrado.".into()))?;

        if let Some(new_client) = payload.client_id.filter(|c| *c != current.client_id) {
            let foreign = self
                .project_repo
                .members_outside_client(&mut *tx, current.id, new_client)
                .await?;
            if !foreign.is_empty() {
                tracing::warn!(%project_id, %new_client, members = ?foreign, "Troca de cliente bloqueada");
                return Err(AppError::conflict(
                    "client_id",
                    format!(
                        "O projeto tem {} membro(s) de outro cliente. Desvincule-os antes de trocar o cliente.",
                        foreign.len()
                    ),
                ));
            }
        }

        let project = self
            .project_repo
            .update(&mut *tx, current.id, payload.name.as_deref(), payload.client_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Projeto não encontrado.".into()))?;

        tx.commit().await?;
        // --- FIM DA TRANSAÇÃO ---

        Ok(project)
    }

    pub async fn delete_project(&self, principal: &Principal, project_id: Uuid) -> AppResult<()> {
        policy::require_admin(principal)?;
        if !self.project_repo.delete(project_id).await? {
            return Err(AppError::NotFound("Projeto não encontrado.".into()));
        }
        Ok(())
    }

    // ---
    // Membros do projeto (somente administradores)
    // ---

    /// Classificação e inserção na mesma transação, com o projeto travado:
    /// o relatório e o `count_total` refletem exatamente o que foi gravado.
    pub async fn attach_users(&self, principal: &Principal, project_id: Uuid, ids: &[Uuid]) -> AppResult<AttachmentReport> {
        policy::require_admin(principal)?;

        // --- INÍCIO DA TRANSAÇÃO ---
        let mut tx = self.pool.begin().await?;

        let project = self
            .project_repo
            .lock(&mut *tx, project_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Projeto não encontrado.".into()))?;

        let found = self.user_repo.find_candidates(&mut *tx, ids).await?;
        let existing = self.project_repo.member_ids(&mut *tx, project.id).await?;
        let mut report = policy::partition_attachment(Some(project.client_id), ids, &found, &existing);

        self.project_repo
            .add_members(&mut *tx, project.id, &report.attached_now)
            .await?;
        report.count_total = self.project_repo.count_members(&mut *tx, project.id).await?;

        tx.commit().await?;
        // --- FIM DA TRANSAÇÃO ---

        if !report.rejected_cross_client.is_empty() {
            tracing::warn!(
                %project_id,
                rejected = ?report.rejected_cross_client,
                "Usuários de outro cliente não foram anexados"
            );
        }
        Ok(report)
    }

    pub async fn detach_users(&self, principal: &Principal, project_id: Uuid, ids: &[Uuid]) -> AppResult<DetachmentReport> {
        policy::require_admin(principal)?;

        // --- INÍCIO DA TRANSAÇÃO ---
        let mut tx = self.pool.begin().await?;

        let project = self
            .project_repo
            .lock(&mut *tx, project_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Projeto não encontrado.".into()))?;

        let found: HashSet<Uuid> = self
            .user_repo
            .find_candidates(&mut *tx, ids)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        let members = self.project_repo.member_ids(&mut *tx, project.id).await?;
        let mut report = partition_detachment(ids, &found, &members);

        report.detached_now = self
            .project_repo
            .remove_members(&mut *tx, project.id, &report.detached_now)
            .await?;
        report.count_total = self.project_repo.count_members(&mut *tx, project.id).await?;

        tx.commit().await?;
        // --- FIM DA TRANSAÇÃO ---

        Ok(report)
    }

    // ---
    // Bots do projeto (qualquer um com acesso ao projeto)
    // ---

    pub async fn project_bots(&self, principal: &Principal, project_id: Uuid) -> AppResult<Vec<AgentView>> {
        let project = self.get_project(principal, project_id).await?;
        let agents: Vec<Agent> = self.agent_repo.list_for_project(project.id).await?;
        Ok(agents.into_iter().map(AgentView::from).collect())
    }

    pub async fn attach_bots(&self, principal: &Principal, project_id: Uuid, ids: &[Uuid]) -> AppResult<BotAttachmentReport> {
        let project = self.get_project(principal, project_id).await?;

        let found = self.agent_repo.existing_ids(ids).await?;
        let attached = self.agent_repo.attached_ids(project.id).await?;
        let mut report = partition_bots(ids, &found, &attached);

        self.agent_repo.attach(project.id, &report.attached_now).await?;
        report.count_total = self.agent_repo.attached_ids(project.id).await?.len() as i64;
        Ok(report)
    }

    pub async fn detach_bots(&self, principal: &Principal, project_id: Uuid, ids: &[Uuid]) -> AppResult<DetachmentReport> {
        let project = self.get_project(principal, project_id).await?;

        let found = self.agent_repo.existing_ids(ids).await?;
        let attached = self.agent_repo.attached_ids(project.id).await?;
        let mut report = partition_detachment(ids, &found, &attached);

        report.detached_now = self.agent_repo.detach(project.id, &report.detached_now).await?;
        report.count_total = self.agent_repo.attached_ids(project.id).await?.len() as i64;
        Ok(report)
    }

    // ---
    // Diretório de usuários
    // ---

    /// Administradores veem todos; os demais, só os usuários do próprio cliente.
    pub async fn list_users(&self, principal: &Principal) -> AppResult<Vec<User>> {
        policy::decide(Some(principal), Action::View, &Resource::UserDirectory).into_result()?;
        if principal.is_admin() {
            return self.user_repo.list(None).await;
        }
        match principal.client_id {
            Some(client_id) => self.user_repo.list(Some(client_id)).await,
            None => Ok(Vec::new()),
        }
    }
}
