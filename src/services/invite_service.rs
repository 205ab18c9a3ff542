// src/services/invite_service.rs

use std::{collections::HashSet, sync::Arc};

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::{AppError, AppResult},
    db::{
        InviteRepository, ProjectRepository, UserRepository, invite_repo::NewInvite,
        user_repo::NewUser,
    },
    models::{
        auth::Role,
        invite::{CreateInvitePayload, Invite},
    },
    services::{
        auth::{frontend_link, hash_password},
        mailer::Mailer,
        policy::{self, Principal},
        tokens::{IssuedTokens, TokenManager},
    },
};

#[derive(Clone)]
pub struct InviteService {
    pool: PgPool,
    user_repo: UserRepository,
    project_repo: ProjectRepository,
    invite_repo: InviteRepository,
    tokens: Arc<TokenManager>,
    mailer: Arc<dyn Mailer>,
    frontend_base_url: String,
    invite_ttl: Duration,
}

impl InviteService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        user_repo: UserRepository,
        project_repo: ProjectRepository,
        invite_repo: InviteRepository,
        tokens: Arc<TokenManager>,
        mailer: Arc<dyn Mailer>,
        frontend_base_url: String,
        invite_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            user_repo,
            project_repo,
            invite_repo,
            tokens,
            mailer,
            frontend_base_url,
            invite_ttl,
        }
    }

    /// Cria um convite. Toda a sequência roda numa única transação: se a
    /// criação do convite falhar, as renomeações de e-mail são desfeitas.
    pub async fn create(&self, inviter: &Principal, payload: &CreateInvitePayload) -> AppResult<Invite> {
        let email = payload.email.trim();
        let granted = payload.role.unwrap_or(Role::User);

        // Antes de tocar o projeto: não revela se ele existe.
        policy::authorize_invite(inviter, payload.project_id, granted)?;

        // --- INÍCIO DA TRANSAÇÃO ---
        let mut tx = self.pool.begin().await?;

        let project = self
            .project_repo
            .find_by_id(&mut *tx, payload.project_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Projeto não encontrado.".into()))?;
        let client_id = policy::resolve_invite_client(inviter, project.client_id, payload.client_id)?;

        // 1. Um convite vivo por e-mail; os expirados são renomeados.
        // A busca ignora maiúsculas; o alias parte do e-mail gravado.
        if let Some(previous) = self.invite_repo.find_by_email(&mut *tx, email).await? {
            if !previous.is_expired_at(Utc::now()) {
                return Err(AppError::conflict("email", "Já existe um convite pendente para este e-mail."));
            }
            let taken: HashSet<String> = self
                .invite_repo
                .emails_with_prefix(&mut *tx, &format!("{}+EXPIRED", previous.email))
                .await?
                .into_iter()
                .collect();
            let alias = policy::pick_expired_alias(&previous.email, &taken);
            self.invite_repo.rename_email(&mut *tx, previous.id, &alias).await?;
            tracing::info!(invite_id = %previous.id, %alias, "Convite expirado renomeado");
        }

        // 2. Usuário ativo bloqueia; inativo é renomeado e recriado.
        if let Some(existing) = self.user_repo.find_by_email(&mut *tx, email).await? {
            if existing.is_active {
                return Err(AppError::conflict("email", "Já existe um usuário ativo com este e-mail."));
            }
            let taken: HashSet<String> = self
                .user_repo
                .emails_with_prefix(&mut *tx, &format!("{}+EXPIRED", existing.email))
                .await?
                .into_iter()
                .collect();
            let alias = policy::pick_expired_alias(&existing.email, &taken);
            self.user_repo.rename_email(&mut *tx, existing.id, &alias).await?;
            tracing::info!(user_id = %existing.id, %alias, "Usuário inativo renomeado");
        }

        let local_part = email.split('@').next().unwrap_or(email);
        let taken: HashSet<String> = self
            .user_repo
            .usernames_with_prefix(&mut *tx, local_part)
            .await?
            .into_iter()
            .collect();
        let username = policy::pick_username(email, &taken);
        let placeholder = self
            .user_repo
            .create_user(
                &mut *tx,
                NewUser {
                    email,
                    username: &username,
                    first_name: "",
                    last_name: "",
                    password_hash: None,
                    role: Role::User,
                    client_id: None,
                    is_active: false,
                },
            )
            .await?;

        // 3. O convite em si.
        let token = Uuid::new_v4();
        let invite = self
            .invite_repo
            .create(
                &mut *tx,
                NewInvite {
                    sender_id: inviter.user_id,
                    email,
                    token,
                    role: granted,
                    client_id,
                    project_id: Some(project.id),
                    expires_at: Utc::now() + self.invite_ttl,
                },
            )
            .await?;

        tx.commit().await?;
        // --- FIM DA TRANSAÇÃO ---

        tracing::info!(
            invite_id = %invite.id,
            sender = %inviter.user_id,
            placeholder = %placeholder.id,
            project_id = %project.id,
            "Convite criado"
        );

        let token_str = token.to_string();
        let link = frontend_link(
            &self.frontend_base_url,
            "confirm-invite",
            &[("token", token_str.as_str()), ("email", email)],
        )?;
        if let Err(e) = self.mailer.send_invite(email, &link).await {
            tracing::error!(invite_id = %invite.id, error = %e, "Falha ao enviar e-mail de convite");
        }

        Ok(invite)
    }

    /// Consome o convite: ativa o usuário, vincula ao projeto e apaga o convite.
    pub async fn confirm(
        &self,
        email: &str,
        raw_token: &str,
        project_id: Option<Uuid>,
        password: &str,
    ) -> AppResult<IssuedTokens> {
        let token = Uuid::parse_str(raw_token.trim())
            .map_err(|_| AppError::BadRequest("Token malformado.".into()))?;
        let email = email.trim();

        // Hash fora da transação: não toca o banco.
        let hashed_password = hash_password(password).await?;

        // --- INÍCIO DA TRANSAÇÃO ---
        let mut tx = self.pool.begin().await?;

        let invite = self
            .invite_repo
            .find_by_email_and_token(&mut *tx, email, token, project_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Convite não encontrado.".into()))?;

        if invite.is_expired_at(Utc::now()) {
            return Err(AppError::Forbidden("Convite expirado.".into()));
        }

        let user = self
            .user_repo
            .find_by_email(&mut *tx, email)
            .await?
            .ok_or_else(|| AppError::NotFound("Usuário não encontrado.".into()))?;

        let user = self
            .user_repo
            .activate_invited(&mut *tx, user.id, &hashed_password, invite.role, invite.client_id)
            .await?;

        if let Some(project_id) = invite.project_id {
            self.project_repo.add_members(&mut *tx, project_id, &[user.id]).await?;
        }

        self.invite_repo.delete(&mut *tx, invite.id).await?;

        tx.commit().await?;
        // --- FIM DA TRANSAÇÃO ---

        tracing::info!(user_id = %user.id, invite_id = %invite.id, "Convite confirmado");
        self.tokens.issue(&user).await
    }

    /// Destino do GET em /invite/confirm: a tela de confirmação do frontend.
    pub fn confirmation_page(&self, query_string: Option<&str>) -> String {
        let base = format!("{}/confirm-invite", self.frontend_base_url.trim_end_matches('/'));
        match query_string {
            Some(qs) if !qs.is_empty() => format!("{base}?{qs}"),
            _ => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AppState, testing},
        models::tenancy::Project,
        services::tokens::memory::MemoryTokenStore,
    };

    struct Scene {
        state: AppState,
        admin: Principal,
        project: Project,
    }

    impl Scene {
        fn pool(&self) -> &PgPool {
            &self.state.db_pool
        }
    }

    async fn scene() -> Option<Scene> {
        let pool = testing::database().await?;
        let client = testing::client(&pool).await;
        let project = testing::project(&pool, client.id).await;
        let admin_user =
            testing::user(&pool, &format!("admin-{}@x.com", testing::tag()), Role::Administrator, None).await;
        let admin = testing::principal(&pool, &admin_user).await;
        let state = testing::state_with(pool, Arc::new(MemoryTokenStore::default()));
        Some(Scene { state, admin, project })
    }

    fn payload(email: &str, project_id: Uuid) -> CreateInvitePayload {
        CreateInvitePayload { email: email.to_string(), project_id, role: None, client_id: None }
    }

    async fn expire(pool: &PgPool, invite_id: Uuid) {
        sqlx::query("UPDATE invites SET expires_at = now() - interval '1 day' WHERE id = $1")
            .bind(invite_id)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn email_of_invite(pool: &PgPool, invite_id: Uuid) -> String {
        sqlx::query_scalar("SELECT email FROM invites WHERE id = $1")
            .bind(invite_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn manager_cannot_invite_an_administrator() {
        let state = testing::state(Arc::new(MemoryTokenStore::default()));
        let project_id = Uuid::new_v4();
        let manager = Principal {
            user_id: Uuid::new_v4(),
            role: Role::Manager,
            is_superuser: false,
            client_id: Some(Uuid::new_v4()),
            project_ids: [project_id].into_iter().collect(),
        };

        // A política roda antes do banco: o pool de teste nem é acessado.
        let mut request = payload("chefe@x.com", project_id);
        request.role = Some(Role::Administrator);
        let result = state.invite_service.create(&manager, &request).await;
        assert!(matches!(result, Err(AppError::Forbidden(msg)) if msg.contains("ADMINISTRATOR")));

        let elsewhere = state.invite_service.create(&manager, &payload("a@x.com", Uuid::new_v4())).await;
        assert!(matches!(elsewhere, Err(AppError::Forbidden(msg)) if msg == policy::MSG_PROJECT_DENIED));
    }

    #[tokio::test]
    async fn a_second_live_invite_for_the_same_email_conflicts() {
        let Some(s) = scene().await else { return };
        let email = format!("novo-{}@x.com", testing::tag());

        s.state.invite_service.create(&s.admin, &payload(&email, s.project.id)).await.unwrap();
        let again = s
            .state
            .invite_service
            .create(&s.admin, &payload(&email.to_uppercase(), s.project.id))
            .await;
        assert!(matches!(again, Err(AppError::Conflict { field: "email", .. })));
    }

    #[tokio::test]
    async fn confirmed_invite_activates_the_user_and_cannot_be_reused() {
        let Some(s) = scene().await else { return };
        let email = format!("conf-{}@x.com", testing::tag());
        let invite = s.state.invite_service.create(&s.admin, &payload(&email, s.project.id)).await.unwrap();
        let token = invite.token.to_string();

        // O e-mail do link pode chegar com outra caixa.
        let issued = s
            .state
            .invite_service
            .confirm(&email.to_uppercase(), &token, None, "senha-nova-123")
            .await
            .unwrap();
        assert!(!issued.access.is_empty());

        let users = UserRepository::new(s.pool().clone());
        let user = users.find_by_email_ci(&email).await.unwrap().unwrap();
        assert!(user.is_enabled());
        assert_eq!(user.client_id, Some(s.project.client_id));
        assert!(users.project_ids_of(user.id).await.unwrap().contains(&s.project.id));

        let reused = s.state.invite_service.confirm(&email, &token, None, "outra-senha-123").await;
        assert!(matches!(reused, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn expired_invites_and_placeholders_move_to_numbered_aliases() {
        let Some(s) = scene().await else { return };
        let email = format!("velho-{}@x.com", testing::tag());

        let first = s.state.invite_service.create(&s.admin, &payload(&email, s.project.id)).await.unwrap();
        expire(s.pool(), first.id).await;
        let second = s.state.invite_service.create(&s.admin, &payload(&email, s.project.id)).await.unwrap();
        assert_eq!(email_of_invite(s.pool(), first.id).await, format!("{email}+EXPIRED"));
        assert_eq!(second.email, email);

        expire(s.pool(), second.id).await;
        s.state.invite_service.create(&s.admin, &payload(&email, s.project.id)).await.unwrap();
        assert_eq!(email_of_invite(s.pool(), second.id).await, format!("{email}+EXPIRED1"));

        let placeholders: Vec<String> =
            sqlx::query_scalar("SELECT email FROM users WHERE lower(email) LIKE lower($1) ORDER BY email")
                .bind(format!("{email}%"))
                .fetch_all(s.pool())
                .await
                .unwrap();
        assert_eq!(placeholders, vec![email.clone(), format!("{email}+EXPIRED"), format!("{email}+EXPIRED1")]);
    }

    #[tokio::test]
    async fn case_variant_of_an_active_user_cannot_be_invited() {
        let Some(s) = scene().await else { return };
        let tag = testing::tag();
        testing::user(s.pool(), &format!("Ana{tag}@x.com"), Role::User, Some(s.project.client_id)).await;

        let result = s
            .state
            .invite_service
            .create(&s.admin, &payload(&format!("ana{tag}@x.com"), s.project.id))
            .await;
        assert!(matches!(result, Err(AppError::Conflict { field: "email", .. })));

        let sharing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE lower(email) = lower($1)")
            .bind(format!("ana{tag}@x.com"))
            .fetch_one(s.pool())
            .await
            .unwrap();
        assert_eq!(sharing, 1);
    }
}
