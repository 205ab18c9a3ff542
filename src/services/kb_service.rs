// src/services/kb_service.rs

use std::collections::HashSet;

use axum::http::StatusCode;
use reqwest::Method;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::{
    common::error::{AppError, AppResult},
    db::{KbLinkRepository, ProjectRepository},
    models::{
        kb::{KbAttachResponse, KbCreatePayload, KbEditPayload, UploadedFile},
        tenancy::Project,
    },
    services::{
        gateway::{UpstreamResponse, WorkflowGateway},
        policy::{self, Action, Principal, Resource},
    },
};

// Caminhos do n8n. Os duplicados "/webhook/webhook" são os nomes reais dos webhooks.
const PATH_GET: &str = "/webhook/kb/get/";
const PATH_FILE_LIST: &str = "/webhook/webhook/kb/file/list";
const PATH_CREATE: &str = "/webhook/kb/create/";
const PATH_EDIT: &str = "/webhook/kb/edit/";
const PATH_DELETE: &str = "/webhook/kb/delete/";
const PATH_FILE_ADD: &str = "/webhook/kb/file/add";
const PATH_FILE_DELETE: &str = "/webhook/webhook/kb/file/delete";
const PATH_LIST_ALL: &str = "/webhook/kb/list-all";

fn as_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Identificador da KB criada: `hash_id`, `id`, `data.hash_id` ou `kb.id`.
pub fn extract_external_id(body: &Value) -> Option<String> {
    as_id(body.get("hash_id"))
        .or_else(|| as_id(body.get("id")))
        .or_else(|| as_id(body.pointer("/data/hash_id")))
        .or_else(|| as_id(body.pointer("/kb/id")))
}

/// Normaliza as linhas de `kbs`/`data`, garantindo `external_id` e `name`.
/// Linhas sem identificador são descartadas.
pub fn normalize_kb_rows(body: &Value) -> Vec<Value> {
    let rows = body
        .get("kbs")
        .and_then(Value::as_array)
        .filter(|rows| !rows.is_empty())
        .or_else(|| body.get("data").and_then(Value::as_array))
        .cloned()
        .unwrap_or_default();

    rows.into_iter()
        .filter_map(|row| {
            let fields = row.as_object()?;
            let external_id = as_id(fields.get("hash_id"))
                .or_else(|| as_id(fields.get("id")))
                .or_else(|| as_id(fields.get("external_id")))?;
            let name = fields
                .get("name")
                .or_else(|| fields.get("kb_name"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            let mut normalized = Map::new();
            normalized.insert("external_id".into(), Value::from(external_id));
            normalized.insert("name".into(), Value::from(name));
            normalized.extend(fields.clone());
            Some(Value::Object(normalized))
        })
        .collect()
}

pub fn filter_to_links(rows: Vec<Value>, allowed: &HashSet<String>) -> Vec<Value> {
    rows.into_iter()
        .filter(|row| as_id(row.get("external_id")).is_some_and(|id| allowed.contains(&id)))
        .collect()
}

fn file_name_of(entry: &Value) -> Option<String> {
    match entry {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(fields) => fields.get("file").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Arquivo atual da KB, a partir da resposta da listagem de arquivos.
pub fn discover_old_file(listing: &Value) -> Option<String> {
    match listing {
        Value::Object(fields) => {
            if let Some(file) = fields.get("file").and_then(file_name_of) {
                return Some(file);
            }
            fields.get("files").and_then(Value::as_array)?.first().and_then(file_name_of)
        }
        Value::Array(entries) => entries.first().and_then(file_name_of),
        _ => None,
    }
}

#[derive(Clone)]
pub struct KbService {
    gateway: WorkflowGateway,
    kb_repo: KbLinkRepository,
    project_repo: ProjectRepository,
    pool: sqlx::PgPool,
}

impl KbService {
    pub fn new(
        gateway: WorkflowGateway,
        kb_repo: KbLinkRepository,
        project_repo: ProjectRepository,
        pool: sqlx::PgPool,
    ) -> Self {
        Self { gateway, kb_repo, project_repo, pool }
    }

    // ---
    // Verificações de acesso
    // ---

    async fn authorize_kb(&self, principal: &Principal, action: Action, hash_id: &str) -> AppResult<()> {
        let linked = self.kb_repo.projects_for(hash_id).await?;
        policy::decide(Some(principal), action, &Resource::KnowledgeBase { linked_projects: &linked })
            .into_result()
    }

    // Acesso antes de existência: um não-membro nunca descobre se o projeto existe.
    async fn authorize_project(&self, principal: &Principal, project_id: Uuid) -> AppResult<Project> {
        policy::decide(Some(principal), Action::View, &Resource::Project(project_id)).into_result()?;
        self.project_repo
            .find_by_id(&self.pool, project_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Projeto não encontrado.".into()))
    }

    // ---
    // Operações
    // ---

    pub async fn get(&self, principal: &Principal, hash_id: &str) -> AppResult<UpstreamResponse> {
        self.authorize_kb(principal, Action::View, hash_id).await?;
        self.gateway
            .send_json(Method::GET, PATH_GET, Some(&json!({ "hash_id": hash_id })))
            .await
    }

    pub async fn list_files(&self, principal: &Principal, hash_id: &str) -> AppResult<UpstreamResponse> {
        self.authorize_kb(principal, Action::View, hash_id).await?;
        self.gateway
            .send_json(Method::GET, PATH_FILE_LIST, Some(&json!({ "hash_id": hash_id })))
            .await
    }

    /// Cria a KB no n8n e registra o vínculo com o projeto.
    pub async fn create(&self, principal: &Principal, payload: &KbCreatePayload) -> AppResult<UpstreamResponse> {
        let project = self.authorize_project(principal, payload.project_id).await?;

        let upstream = self
            .gateway
            .send_json(
                Method::POST,
                PATH_CREATE,
                Some(&json!({ "name": payload.name, "description": payload.description })),
            )
            .await?;
        if !upstream.is_success() {
            return Ok(upstream);
        }

        let external_id = extract_external_id(&upstream.body).ok_or_else(|| {
            tracing::error!(body = %upstream.body, "Resposta do n8n sem identificador da KB");
            AppError::UpstreamUnavailable("resposta sem identificador".into())
        })?;

        self.kb_repo.link_or_get(project.id, &external_id, &payload.name).await?;
        tracing::info!(project_id = %project.id, %external_id, "KB criada e vinculada");

        let mut body = Map::new();
        body.insert("project_id".into(), Value::from(project.id.to_string()));
        if let Value::Object(fields) = upstream.body {
            body.extend(fields);
        }
        Ok(UpstreamResponse::new(upstream.status, Value::Object(body)))
    }

    pub async fn edit(&self, principal: &Principal, payload: &KbEditPayload) -> AppResult<UpstreamResponse> {
        self.authorize_kb(principal, Action::Mutate, &payload.hash_id).await?;

        let mut body = Map::new();
        body.insert("hash_id".into(), Value::from(payload.hash_id.clone()));
        if let Some(name) = &payload.name {
            body.insert("name".into(), Value::from(name.clone()));
        }
        if let Some(description) = &payload.description {
            body.insert("description".into(), Value::from(description.clone()));
        }
        self.gateway
            .send_json(Method::PATCH, PATH_EDIT, Some(&Value::Object(body)))
            .await
    }

    /// Remove a KB no n8n; os vínculos locais só caem se o upstream confirmar.
    pub async fn delete(&self, principal: &Principal, hash_id: &str) -> AppResult<UpstreamResponse> {
        self.authorize_kb(principal, Action::Mutate, hash_id).await?;
        let upstream = self
            .gateway
            .send_json(Method::DELETE, PATH_DELETE, Some(&json!({ "hash_id": hash_id })))
            .await?;
        if upstream.is_success() {
            let removed = self.kb_repo.unlink_everywhere(hash_id).await?;
            tracing::info!(%hash_id, removed, "KB removida");
        }
        Ok(upstream)
    }

    pub async fn add_file(&self, principal: &Principal, hash_id: &str, file: &UploadedFile) -> AppResult<UpstreamResponse> {
        self.authorize_kb(principal, Action::Mutate, hash_id).await?;
        self.gateway.send_file(PATH_FILE_ADD, hash_id, file).await
    }

    pub async fn delete_file(&self, principal: &Principal, hash_id: &str, file: &str) -> AppResult<UpstreamResponse> {
        self.authorize_kb(principal, Action::Mutate, hash_id).await?;
        self.gateway
            .send_json(Method::DELETE, PATH_FILE_DELETE, Some(&json!({ "hash_id": hash_id, "file": file })))
            .await
    }

    /// Lista as KBs do n8n filtradas pelos vínculos do projeto. O filtro vale
    /// para todos, inclusive administradores.
    pub async fn list_all(&self, principal: &Principal, project_id: Uuid) -> AppResult<UpstreamResponse> {
        let project = self.authorize_project(principal, project_id).await?;

        let upstream = self.gateway.send_json(Method::GET, PATH_LIST_ALL, None).await?;
        if !upstream.is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "list-all respondeu {}",
                upstream.status
            )));
        }
        if upstream.body.get("raw").is_some() {
            return Ok(upstream);
        }

        let allowed: HashSet<String> = self
            .kb_repo
            .external_ids_for_project(project.id)
            .await?
            .into_iter()
            .collect();
        let kbs = filter_to_links(normalize_kb_rows(&upstream.body), &allowed);

        Ok(UpstreamResponse::new(
            StatusCode::OK,
            json!({
                "status": "success",
                "project_id": project.id.to_string(),
                "count": kbs.len(),
                "kbs": kbs,
            }),
        ))
    }

    /// Troca o arquivo da KB: adiciona o novo e depois remove o antigo.
    /// Se a remoção falhar, responde 207 (o novo arquivo já foi adicionado).
    pub async fn update_file(
        &self,
        principal: &Principal,
        project_id: Uuid,
        hash_id: &str,
        old_file: Option<String>,
        file: &UploadedFile,
    ) -> AppResult<UpstreamResponse> {
        self.authorize_project(principal, project_id).await?;
        let linked = self.kb_repo.projects_for(hash_id).await?;
        if !linked.contains(&project_id) {
            return Err(AppError::Forbidden(policy::MSG_KB_DENIED.into()));
        }

        let old_file = match old_file.filter(|f| !f.is_empty()) {
            Some(file) => Some(file),
            None => self.discover_current_file(hash_id).await,
        };

        let added = self.gateway.send_file(PATH_FILE_ADD, hash_id, file).await?;
        if !added.is_success() {
            return Ok(UpstreamResponse::new(
                added.status,
                json!({ "step": "add", "status": added.status.as_u16(), "payload": added.body }),
            ));
        }

        let Some(old_file) = old_file else {
            return Ok(UpstreamResponse::new(
                StatusCode::OK,
                json!({ "status": "ok", "added": added.body, "deleted": Value::Null }),
            ));
        };

        let deleted = self
            .gateway
            .send_json(
                Method::DELETE,
                PATH_FILE_DELETE,
                Some(&json!({ "hash_id": hash_id, "file": old_file })),
            )
            .await;

        match deleted {
            Ok(deleted) if deleted.is_success() => Ok(UpstreamResponse::new(
                StatusCode::OK,
                json!({ "status": "ok", "added": added.body, "deleted": deleted.body }),
            )),
            Ok(deleted) => Ok(UpstreamResponse::new(
                StatusCode::MULTI_STATUS,
                json!({
                    "detail": "Novo arquivo adicionado, mas o antigo não foi removido.",
                    "add": added.body,
                    "delete": deleted.body,
                }),
            )),
            Err(e) => {
                tracing::error!(%hash_id, %old_file, error = %e, "Falha ao remover arquivo antigo");
                Ok(UpstreamResponse::new(
                    StatusCode::MULTI_STATUS,
                    json!({
                        "detail": "Novo arquivo adicionado, mas falhou ao remover o antigo.",
                        "add": added.body,
                    }),
                ))
            }
        }
    }

    // Falhas aqui não interrompem a troca: seguimos sem remover nada.
    async fn discover_current_file(&self, hash_id: &str) -> Option<String> {
        match self
            .gateway
            .send_json(Method::GET, PATH_FILE_LIST, Some(&json!({ "hash_id": hash_id })))
            .await
        {
            Ok(listing) if listing.is_success() => discover_old_file(&listing.body),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(%hash_id, error = %e, "Não foi possível listar os arquivos da KB");
                None
            }
        }
    }

    /// Vincula uma KB existente ao projeto (idempotente).
    ///
    /// Uma KB já vinculada em outro lugar só pode ser anexada por quem já
    /// tem acesso a ela: o vínculo não serve de porta para a KB de outro cliente.
    pub async fn attach(
        &self,
        principal: &Principal,
        project_id: Uuid,
        hash_id: &str,
        name: &str,
    ) -> AppResult<KbAttachResponse> {
        let project = self.authorize_project(principal, project_id).await?;
        let linked = self.kb_repo.projects_for(hash_id).await?;
        if !linked.is_empty() {
            policy::decide(Some(principal), Action::Mutate, &Resource::KnowledgeBase { linked_projects: &linked })
                .into_result()?;
        }
        let (link, created) = self.kb_repo.link_or_get(project.id, hash_id, name).await?;
        Ok(KbAttachResponse {
            status: if created { "created" } else { "exists" },
            project_id: project.id,
            hash_id: link.external_id,
            name: link.name,
        })
    }
}
