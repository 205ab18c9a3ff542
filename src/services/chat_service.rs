// src/services/chat_service.rs

//! Histórico de conversas: sessões por bot, mensagens favoritas e busca
//! textual no histórico guardado pelo n8n.

use std::collections::HashMap;

use reqwest::Method;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    common::error::{AppError, AppResult},
    db::{AgentRepository, ChatRepository, chat_repo::NewFavorite},
    models::{
        agents::Agent,
        chat::{
            ChatSession, ChatSessionKeyPayload, CreateChatSessionPayload, CreateFavoritePayload,
            FavoriteFilter, FavoriteView, SearchHit, SearchResponse,
        },
    },
    services::{
        gateway::WorkflowGateway,
        policy::{self, Action, Principal, Resource},
    },
};

const RECENT_SESSIONS: i64 = 6;
const PATH_SEARCH: &str = "/webhook/get-message/";

fn session_not_found() -> AppError {
    AppError::NotFound("Sessão não encontrada.".into())
}

fn session_identity(session_key: &str, agent_id: Option<Uuid>) -> AppResult<(&str, Uuid)> {
    let session_key = session_key.trim();
    match agent_id {
        Some(agent_id) if !session_key.is_empty() => Ok((session_key, agent_id)),
        _ => Err(AppError::BadRequest("session_key e agent_id são obrigatórios.".into())),
    }
}

/// Termos no formato que o workflow usa num `LIKE`: vírgulas viram espaço.
pub fn search_terms(query: &str) -> Vec<String> {
    vec!["%".into(), query.replace(',', " ").trim().to_string(), "%".into()]
}

/// Converte as linhas `data[]` do n8n. `message` pode vir como objeto ou
/// como JSON em texto; linhas sem `session_id` são descartadas.
pub fn parse_search_hits(body: &Value, agents_by_session: &HashMap<String, Uuid>) -> Vec<SearchHit> {
    let Some(rows) = body.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let session_id = row.get("session_id").and_then(Value::as_str)?.to_string();
            let message = match row.get("message") {
                Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or(Value::Null),
                Some(other) => other.clone(),
                None => Value::Null,
            };
            let text = |key: &str| message.get(key).and_then(Value::as_str).map(str::to_string);
            Some(SearchHit {
                agent_id: agents_by_session.get(&session_id).copied(),
                message: text("content").unwrap_or_default(),
                author: text("type").unwrap_or_else(|| "human".to_string()),
                session_id,
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct ChatService {
    chat_repo: ChatRepository,
    agent_repo: AgentRepository,
    gateway: WorkflowGateway,
}

impl ChatService {
    pub fn new(chat_repo: ChatRepository, agent_repo: AgentRepository, gateway: WorkflowGateway) -> Self {
        Self { chat_repo, agent_repo, gateway }
    }

    // Mesma regra de visibilidade de bots: acesso antes de existência.
    async fn visible_agent(&self, principal: &Principal, agent_id: Uuid) -> AppResult<Agent> {
        let project_ids = self.agent_repo.project_ids_of(agent_id).await?;
        policy::decide(Some(principal), Action::View, &Resource::Agent { project_ids: &project_ids })
            .into_result()?;
        self.agent_repo
            .find_by_id(agent_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Bot não encontrado.".into()))
    }

    // ---
    // Sessões
    // ---

    pub async fn recent_sessions(&self, principal: &Principal) -> AppResult<Vec<ChatSession>> {
        self.chat_repo.recent_sessions(principal.user_id, RECENT_SESSIONS).await
    }

    pub async fn create_session(&self, principal: &Principal, payload: &CreateChatSessionPayload) -> AppResult<ChatSession> {
        let (session_key, agent_id) = session_identity(&payload.session_key, payload.agent_id)?;
        let agent = self.visible_agent(principal, agent_id).await?;

        let session = self
            .chat_repo
            .create_session(principal.user_id, agent.id, session_key, payload.first_message.as_deref())
            .await?;
        tracing::info!(user_id = %principal.user_id, agent_id = %agent.id, %session_key, "Sessão de chat criada");
        Ok(session)
    }

    pub async fn delete_session(&self, principal: &Principal, payload: &ChatSessionKeyPayload) -> AppResult<()> {
        let (session_key, agent_id) = session_identity(&payload.session_key, payload.agent_id)?;
        if !self.chat_repo.delete_session(principal.user_id, agent_id, session_key).await? {
            return Err(session_not_found());
        }
        Ok(())
    }

    // ---
    // Favoritos
    // ---

    pub async fn favorites(&self, principal: &Principal, filter: &FavoriteFilter) -> AppResult<Vec<FavoriteView>> {
        let session_key = filter.session_key.as_deref().map(str::trim).filter(|k| !k.is_empty());
        self.chat_repo.favorites(principal.user_id, filter.agent_id, session_key).await
    }

    /// Marca uma mensagem da própria sessão como favorita. Devolve o favorito
    /// e se ele foi criado agora (`false` = já existia).
    pub async fn add_favorite(
        &self,
        principal: &Principal,
        payload: &CreateFavoritePayload,
    ) -> AppResult<(FavoriteView, bool)> {
        let message_id = payload.message_id.trim();
        let (session_key, agent_id) = match session_identity(&payload.session_key, payload.agent_id) {
            Ok(identity) if !message_id.is_empty() => identity,
            _ => {
                return Err(AppError::BadRequest(
                    "session_key, agent_id e message_id são obrigatórios.".into(),
                ));
            }
        };

        let session = self
            .chat_repo
            .find_session(principal.user_id, agent_id, session_key)
            .await?
            .ok_or_else(session_not_found)?;
        let agent = self
            .agent_repo
            .find_by_id(session.agent_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Bot não encontrado.".into()))?;

        let (favorite, created) = self
            .chat_repo
            .add_favorite(NewFavorite {
                user_id: principal.user_id,
                agent_id: agent.id,
                session_id: session.id,
                message_id,
                text: &payload.text,
            })
            .await?;

        Ok((
            FavoriteView {
                agent: agent.id,
                session: session.session_key,
                message_id: favorite.message_id,
                text: favorite.text,
                agent_name: agent.name,
            },
            created,
        ))
    }

    /// Idempotente: remover um favorito inexistente não é erro.
    pub async fn remove_favorite(&self, principal: &Principal, message_id: &str) -> AppResult<u64> {
        let removed = self.chat_repo.remove_favorites(principal.user_id, message_id.trim()).await?;
        tracing::debug!(user_id = %principal.user_id, %message_id, removed, "Favorito removido");
        Ok(removed)
    }

    // ---
    // Busca
    // ---

    /// Busca nas mensagens das sessões do próprio usuário.
    pub async fn search(&self, principal: &Principal, query: &str) -> AppResult<SearchResponse> {
        let sessions = self.chat_repo.sessions_of(principal.user_id).await?;
        if sessions.is_empty() {
            return Ok(SearchResponse { status: "success", results: Vec::new() });
        }

        let agents_by_session: HashMap<String, Uuid> =
            sessions.iter().map(|s| (s.session_key.clone(), s.agent_id)).collect();
        let session_ids: Vec<&str> = sessions.iter().map(|s| s.session_key.as_str()).collect();

        let upstream = self
            .gateway
            .send_json(
                Method::POST,
                PATH_SEARCH,
                Some(&json!({ "session_ids": session_ids, "search_query": search_terms(query) })),
            )
            .await?;
        if !upstream.is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "get-message respondeu {}",
                upstream.status
            )));
        }

        Ok(SearchResponse {
            status: "success",
            results: parse_search_hits(&upstream.body, &agents_by_session),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    use axum::{Json, Router, routing::post};
    use sqlx::PgPool;
    use tokio::net::TcpListener;

    use crate::{config::testing, models::auth::Role};

    struct ChatScene {
        pool: PgPool,
        member: Principal,
        agent: Agent,
    }

    // Usuário membro de um projeto que tem um bot.
    async fn chat_scene() -> Option<ChatScene> {
        let pool = testing::database().await?;
        let client = testing::client(&pool).await;
        let project = testing::project(&pool, client.id).await;
        let agents = AgentRepository::new(pool.clone());
        let agent = agents
            .create(&format!("Bot {}", testing::tag()), None, "https://n8n.local/webhook/bot", None)
            .await
            .unwrap();
        agents.attach(project.id, &[agent.id]).await.unwrap();
        let user = testing::user(&pool, &format!("chat-{}@x.com", testing::tag()), Role::User, Some(client.id)).await;
        testing::join(&pool, project.id, user.id).await;
        let member = testing::principal(&pool, &user).await;
        Some(ChatScene { pool, member, agent })
    }

    fn service(pool: &PgPool, gateway: WorkflowGateway) -> ChatService {
        ChatService::new(ChatRepository::new(pool.clone()), AgentRepository::new(pool.clone()), gateway)
    }

    fn offline() -> WorkflowGateway {
        WorkflowGateway::new(None, None, Duration::from_secs(1)).unwrap()
    }

    fn new_session(key: &str, agent_id: Uuid) -> CreateChatSessionPayload {
        CreateChatSessionPayload { session_key: key.to_string(), agent_id: Some(agent_id), first_message: Some("Oi".into()) }
    }

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn sessions_are_unique_per_user_and_listed_newest_first() {
        let Some(scene) = chat_scene().await else { return };
        let chat = service(&scene.pool, offline());
        let prefix = testing::tag();

        for n in 0..7 {
            chat.create_session(&scene.member, &new_session(&format!("{prefix}-{n}"), scene.agent.id))
                .await
                .unwrap();
        }
        let duplicate = chat.create_session(&scene.member, &new_session(&format!("{prefix}-0"), scene.agent.id)).await;
        assert!(matches!(duplicate, Err(AppError::Conflict { field: "session_key", .. })));

        let recent = chat.recent_sessions(&scene.member).await.unwrap();
        let keys: Vec<_> = recent.iter().map(|s| s.session_key.as_str()).collect();
        let expected: Vec<String> = (1..7).rev().map(|n| format!("{prefix}-{n}")).collect();
        assert_eq!(keys, expected);
        assert_eq!(recent[0].data.as_deref(), Some("Oi"));

        let target = ChatSessionKeyPayload { session_key: format!("{prefix}-6"), agent_id: Some(scene.agent.id) };
        chat.delete_session(&scene.member, &target).await.unwrap();
        let gone = chat.delete_session(&scene.member, &target).await;
        assert!(matches!(gone, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn sessions_need_a_visible_bot() {
        let Some(scene) = chat_scene().await else { return };
        let chat = service(&scene.pool, offline());
        let hidden = AgentRepository::new(scene.pool.clone())
            .create(&format!("Oculto {}", testing::tag()), None, "https://n8n.local/webhook/x", None)
            .await
            .unwrap();

        let result = chat.create_session(&scene.member, &new_session("s-oculto", hidden.id)).await;
        assert!(matches!(result, Err(AppError::Forbidden(msg)) if msg == policy::MSG_AGENT_DENIED));
    }

    #[tokio::test]
    async fn favorites_are_idempotent_and_filterable() {
        let Some(scene) = chat_scene().await else { return };
        let chat = service(&scene.pool, offline());
        let key = format!("fav-{}", testing::tag());
        chat.create_session(&scene.member, &new_session(&key, scene.agent.id)).await.unwrap();

        let favorite = CreateFavoritePayload {
            session_key: key.clone(),
            agent_id: Some(scene.agent.id),
            message_id: "m-1".into(),
            text: "Resposta útil".into(),
        };
        let (view, created) = chat.add_favorite(&scene.member, &favorite).await.unwrap();
        assert!(created);
        assert_eq!(view.session, key);
        assert_eq!(view.agent_name, scene.agent.name);
        let (_, created_again) = chat.add_favorite(&scene.member, &favorite).await.unwrap();
        assert!(!created_again);

        let other_session = CreateFavoritePayload { session_key: "nao-existe".into(), ..favorite };
        let missing = chat.add_favorite(&scene.member, &other_session).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        let by_session = FavoriteFilter { agent_id: Some(scene.agent.id), session_key: Some(key.clone()) };
        assert_eq!(chat.favorites(&scene.member, &by_session).await.unwrap().len(), 1);
        let elsewhere = FavoriteFilter { agent_id: Some(Uuid::new_v4()), session_key: None };
        assert!(chat.favorites(&scene.member, &elsewhere).await.unwrap().is_empty());

        assert_eq!(chat.remove_favorite(&scene.member, "m-1").await.unwrap(), 1);
        assert_eq!(chat.remove_favorite(&scene.member, "m-1").await.unwrap(), 0);
        assert!(chat.favorites(&scene.member, &FavoriteFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_covers_only_the_users_sessions() {
        let Some(scene) = chat_scene().await else { return };

        // Sem sessões, nenhuma chamada externa: o gateway nem está configurado.
        let quiet = service(&scene.pool, offline()).search(&scene.member, "nota").await.unwrap();
        assert!(quiet.results.is_empty());

        let seen = Arc::new(std::sync::Mutex::new(Value::Null));
        let recorder = seen.clone();
        let router = Router::new().route(
            PATH_SEARCH,
            post(move |Json(body): Json<Value>| {
                let recorder = recorder.clone();
                async move {
                    let session = body["session_ids"][0].clone();
                    *recorder.lock().unwrap() = body;
                    Json(json!({ "data": [{ "session_id": session, "message": { "content": "nota fiscal", "type": "ai" } }] }))
                }
            }),
        );
        let base = serve(router).await;
        let gateway = WorkflowGateway::new(Some(base), Some("segredo".into()), Duration::from_secs(5)).unwrap();
        let chat = service(&scene.pool, gateway);
        let key = format!("busca-{}", testing::tag());
        chat.create_session(&scene.member, &new_session(&key, scene.agent.id)).await.unwrap();

        let found = chat.search(&scene.member, "nota,fiscal").await.unwrap();
        assert_eq!(found.status, "success");
        assert_eq!(
            found.results,
            vec![SearchHit { session_id: key.clone(), message: "nota fiscal".into(), author: "ai".into(), agent_id: Some(scene.agent.id) }]
        );
        let sent = seen.lock().unwrap().clone();
        assert_eq!(sent["session_ids"], json!([key]));
        assert_eq!(sent["search_query"], json!(["%", "nota fiscal", "%"]));
    }

    #[test]
    fn commas_become_spaces_in_search_terms() {
        assert_eq!(search_terms(" nota,fiscal "), vec!["%", "nota fiscal", "%"]);
    }

    #[test]
    fn session_identity_requires_both_parts() {
        let agent = Uuid::new_v4();
        assert_eq!(session_identity(" s1 ", Some(agent)).unwrap(), ("s1", agent));
        assert!(matches!(session_identity("", Some(agent)), Err(AppError::BadRequest(_))));
        assert!(matches!(session_identity("s1", None), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn search_hits_accept_object_or_text_messages() {
        let agent = Uuid::new_v4();
        let agents: HashMap<String, Uuid> = [("s1".to_string(), agent)].into_iter().collect();
        let body = json!({
            "data": [
                { "session_id": "s1", "message": { "content": "Olá", "type": "ai" } },
                { "session_id": "s2", "message": "{\"content\":\"Oi\"}" },
                { "message": { "content": "sem sessão" } }
            ]
        });

        let hits = parse_search_hits(&body, &agents);
        assert_eq!(hits.len(), 2);
        assert_eq!(
            hits[0],
            SearchHit { session_id: "s1".into(), message: "Olá".into(), author: "ai".into(), agent_id: Some(agent) }
        );
        assert_eq!(hits[1].message, "Oi");
        assert_eq!(hits[1].author, "human");
        assert_eq!(hits[1].agent_id, None);
        assert!(parse_search_hits(&json!({ "ok": true }), &agents).is_empty());
    }
}
