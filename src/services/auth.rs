// src/services/auth.rs

use std::sync::Arc;

use bcrypt::{hash, verify};
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distr::Alphanumeric, rng};
use reqwest::Url;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::{AppError, AppResult},
    db::{UserRepository, user_repo::NewUser},
    models::auth::{LoginUserPayload, RegisterUserPayload, Role, UpdateProfilePayload, User},
    services::{
        mailer::Mailer,
        policy::Principal,
        tokens::{Claims, IssuedTokens, TokenManager},
    },
};

const RESET_TOKEN_LEN: usize = 64;

/// Gera a senha com bcrypt fora do runtime assíncrono.
pub async fn hash_password(password: &str) -> AppResult<String> {
    let password = password.to_owned();
    let hashed = tokio::task::spawn_blocking(move || hash(&password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| anyhow::anyhow!("Falha na task de hashing: {}", e))??;
    Ok(hashed)
}

async fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
    let password = password.to_owned();
    let password_hash = password_hash.to_owned();
    let valid = tokio::task::spawn_blocking(move || verify(&password, &password_hash))
        .await
        .map_err(|e| anyhow::anyhow!("Falha na task de verificação de senha: {}", e))??;
    Ok(valid)
}

pub fn generate_reset_token() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(RESET_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Monta `{base}/{path}?k=v...` com os parâmetros codificados.
pub fn frontend_link(base: &str, path: &str, params: &[(&str, &str)]) -> AppResult<String> {
    let raw = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    let url = Url::parse_with_params(&raw, params)
        .map_err(|e| anyhow::anyhow!("FRONTEND_BASE_URL inválida: {e}"))?;
    Ok(url.to_string())
}

fn reset_token_matches(user: &User, token: &str, now: DateTime<Utc>) -> bool {
    match (&user.password_reset_token, user.password_reset_expires_at) {
        (Some(stored), Some(expires_at)) => stored == token && expires_at >= now,
        _ => false,
    }
}

#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    tokens: Arc<TokenManager>,
    mailer: Arc<dyn Mailer>,
    frontend_base_url: String,
    reset_ttl: Duration,
    pool: PgPool,
}

impl AuthService {
    pub fn new(
        user_repo: UserRepository,
        tokens: Arc<TokenManager>,
        mailer: Arc<dyn Mailer>,
        frontend_base_url: String,
        reset_ttl: Duration,
        pool: PgPool,
    ) -> Self {
        Self { user_repo, tokens, mailer, frontend_base_url, reset_ttl, pool }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Login por e-mail ou username (sem diferenciar maiúsculas).
    pub async fn login(&self, payload: &LoginUserPayload) -> AppResult<IssuedTokens> {
        let user = match (payload.email.as_deref(), payload.username.as_deref()) {
            (Some(email), _) if !email.trim().is_empty() => {
                self.user_repo.find_by_email_ci(email.trim()).await?
            }
            (_, Some(username)) if !username.trim().is_empty() => {
                self.user_repo.find_by_username_ci(username.trim()).await?
            }
            _ => {
                return Err(AppError::BadRequest("Informe o e-mail ou o username.".into()));
            }
        }
        .ok_or(AppError::InvalidCredentials)?;

        if !user.is_enabled() {
            return Err(AppError::InvalidCredentials);
        }
        let Some(password_hash) = user.password_hash.as_deref() else {
            return Err(AppError::InvalidCredentials);
        };
        if !verify_password(&payload.password, password_hash).await? {
            return Err(AppError::InvalidCredentials);
        }

        tracing::info!(user_id = %user.id, "Login realizado");
        self.tokens.issue(&user).await
    }

    /// Cadastro self-service: cria um USER ativo e já emite credenciais.
    pub async fn signup(&self, payload: &RegisterUserPayload) -> AppResult<(User, IssuedTokens)> {
        let hashed_password = hash_password(&payload.password).await?;

        let user = self
            .user_repo
            .create_user(
                &self.pool,
                NewUser {
                    email: payload.email.trim(),
                    username: payload.username.trim(),
                    first_name: payload.first_name.trim(),
                    last_name: payload.last_name.trim(),
                    password_hash: Some(&hashed_password),
                    role: Role::User,
                    client_id: None,
                    is_active: true,
                },
            )
            .await?;

        let tokens = self.tokens.issue(&user).await?;
        Ok((user, tokens))
    }

    /// Resolve o principal de um access token já verificado: por id, depois
    /// e-mail, depois username. Usuário ausente ou inativo = não autenticado.
    pub async fn resolve_principal(&self, claims: &Claims) -> AppResult<(User, Principal)> {
        let mut user = None;
        if let Some(id) = claims.user_uuid() {
            user = self.user_repo.find_by_id(id).await?;
        }
        if user.is_none() {
            if let Some(email) = claims.profile_str("email") {
                user = self.user_repo.find_by_email_ci(email).await?;
            }
        }
        if user.is_none() {
            if let Some(username) = claims.profile_str("username") {
                user = self.user_repo.find_by_username_ci(username).await?;
            }
        }

        let user = user.filter(User::is_enabled).ok_or(AppError::Unauthenticated)?;
        let principal = self.principal_for(&user).await?;
        Ok((user, principal))
    }

    pub async fn principal_for(&self, user: &User) -> AppResult<Principal> {
        let project_ids = self.user_repo.project_ids_of(user.id).await?;
        Ok(Principal {
            user_id: user.id,
            role: user.role,
            is_superuser: user.is_superuser,
            client_id: user.client_id,
            project_ids: project_ids.into_iter().collect(),
        })
    }

    pub async fn update_profile(&self, user_id: Uuid, payload: &UpdateProfilePayload) -> AppResult<User> {
        self.user_repo
            .update_profile(
                user_id,
                payload.first_name.as_deref().map(str::trim),
                payload.last_name.as_deref().map(str::trim),
                payload.job_title.as_deref(),
                payload.department.as_deref(),
            )
            .await
    }

    pub async fn forgot_password(&self, email: &str) -> AppResult<()> {
        let user = self
            .user_repo
            .find_by_email_ci(email.trim())
            .await?
            .ok_or_else(|| AppError::NotFound("Usuário não encontrado.".into()))?;

        let token = generate_reset_token();
        let expires_at = Utc::now() + self.reset_ttl;
        self.user_repo.set_reset_token(user.id, &token, expires_at).await?;

        let link = frontend_link(
            &self.frontend_base_url,
            "reset-password/",
            &[("email", user.email.as_str()), ("token", token.as_str())],
        )?;
        if let Err(e) = self.mailer.send_password_reset(&user.email, &link).await {
            tracing::error!(user_id = %user.id, error = %e, "Falha ao enviar e-mail de recuperação");
        }
        Ok(())
    }

    pub async fn reset_password(&self, email: &str, token: &str, new_password: &str) -> AppResult<()> {
        let user = self
            .user_repo
            .find_by_email_ci(email.trim())
            .await?
            .ok_or_else(|| AppError::NotFound("Usuário não encontrado.".into()))?;

        if !reset_token_matches(&user, token, Utc::now()) {
            return Err(AppError::BadRequest("Token inválido ou expirado.".into()));
        }

        let hashed_password = hash_password(new_password).await?;
        self.user_repo.set_password(user.id, &hashed_password).await?;
        tracing::info!(user_id = %user.id, "Senha redefinida");
        Ok(())
    }

    /// Impersonação: emite credenciais em nome de outro usuário.
    pub async fn login_as(&self, actor: &Principal, target_id: Uuid) -> AppResult<IssuedTokens> {
        if actor.role == Role::User && !actor.is_admin() {
            return Err(AppError::Forbidden("Permissão negada.".into()));
        }
        let target = self
            .user_repo
            .find_by_id(target_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Usuário não encontrado.".into()))?;

        tracing::warn!(actor = %actor.user_id, target = %target.id, "Login-as executado");
        self.tokens.issue(&target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AppState, testing},
        services::tokens::memory::MemoryTokenStore,
    };

    fn login_with(email: &str, password: &str) -> LoginUserPayload {
        LoginUserPayload { email: Some(email.to_string()), username: None, password: password.to_string() }
    }

    async fn set_flags(state: &AppState, user_id: Uuid, is_active: bool, active: bool) {
        sqlx::query("UPDATE users SET is_active = $2, active = $3 WHERE id = $1")
            .bind(user_id)
            .bind(is_active)
            .bind(active)
            .execute(&state.db_pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn login_needs_both_activity_flags() {
        let Some(pool) = testing::database().await else { return };
        let email = format!("flags-{}@x.com", testing::tag());
        let user = testing::user(&pool, &email, Role::User, None).await;
        let state = testing::state_with(pool, Arc::new(MemoryTokenStore::default()));
        let login = login_with(&email, testing::PASSWORD);

        for (is_active, active) in [(true, false), (false, true)] {
            set_flags(&state, user.id, is_active, active).await;
            let refused = state.auth_service.login(&login).await;
            assert!(matches!(refused, Err(AppError::InvalidCredentials)), "is_active={is_active} active={active}");
        }

        set_flags(&state, user.id, true, true).await;
        let issued = state.auth_service.login(&login_with(&email.to_uppercase(), testing::PASSWORD)).await.unwrap();
        assert!(!issued.access.is_empty());
    }

    #[tokio::test]
    async fn signup_rejects_case_variants_of_taken_identities() {
        let Some(pool) = testing::database().await else { return };
        let tag = testing::tag();
        let state = testing::state_with(pool, Arc::new(MemoryTokenStore::default()));
        let register = |email: String, username: String| RegisterUserPayload {
            email,
            username,
            first_name: "Bia".into(),
            last_name: String::new(),
            password: "senha-forte-1".into(),
        };

        state
            .auth_service
            .signup(&register(format!("bia{tag}@x.com"), format!("bia{tag}")))
            .await
            .unwrap();

        let same_email = state
            .auth_service
            .signup(&register(format!("BIA{tag}@X.com"), format!("outra{tag}")))
            .await;
        assert!(matches!(same_email, Err(AppError::Conflict { field: "email", .. })));

        let same_username = state
            .auth_service
            .signup(&register(format!("outra{tag}@x.com"), format!("Bia{tag}")))
            .await;
        assert!(matches!(same_username, Err(AppError::Conflict { field: "username", .. })));
    }

    #[test]
    fn reset_token_is_long_and_alphanumeric() {
        let token = generate_reset_token();
        assert_eq!(token.len(), RESET_TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_reset_token());
    }

    #[test]
    fn reset_token_must_match_and_be_unexpired() {
        let now = Utc::now();
        let mut user = User::sample("a@x.com", Role::User);
        assert!(!reset_token_matches(&user, "abc", now));

        user.password_reset_token = Some("abc".into());
        user.password_reset_expires_at = Some(now + Duration::minutes(5));
        assert!(reset_token_matches(&user, "abc", now));
        assert!(!reset_token_matches(&user, "abd", now));

        user.password_reset_expires_at = Some(now - Duration::seconds(1));
        assert!(!reset_token_matches(&user, "abc", now));
    }

    #[test]
    fn frontend_links_encode_their_parameters() {
        let link = frontend_link(
            "https://app.x.com/",
            "reset-password/",
            &[("email", "a+b@x.com"), ("token", "t0k")],
        )
        .unwrap();
        assert_eq!(link, "https://app.x.com/reset-password/?email=a%2Bb%40x.com&token=t0k");
        assert!(frontend_link("não é url", "x", &[]).is_err());
    }

    #[tokio::test]
    async fn password_hash_round_trips() {
        let hashed = hash_password("segredo-123").await.unwrap();
        assert!(verify_password("segredo-123", &hashed).await.unwrap());
        assert!(!verify_password("outra", &hashed).await.unwrap());
    }
}
