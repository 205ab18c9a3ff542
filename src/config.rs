// src/config.rs

use std::{str::FromStr, sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use jsonwebtoken::Algorithm;
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{
    db::{
        AgentRepository, ChatRepository, ClientRepository, ExpertiseAreaRepository, GroupRepository,
        InviteRepository, KbLinkRepository, PgTokenStore, ProjectRepository, UserRepository,
    },
    services::{
        agent_service::AgentService,
        auth::AuthService,
        chat_service::ChatService,
        gateway::WorkflowGateway,
        invite_service::InviteService,
        kb_service::KbService,
        mailer::{LogMailer, Mailer},
        rbac_service::RbacService,
        tenancy_service::TenancyService,
        tokens::{TokenManager, TokenSettings, TokenStore},
    },
};

// ---
// Settings
// ---
// Lidas uma única vez na inicialização. Nenhum outro módulo lê o ambiente.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub tokens: TokenSettings,
    pub n8n_base_url: Option<String>,
    pub n8n_kb_key: Option<String>,
    pub n8n_timeout: Duration,
    pub frontend_base_url: String,
    pub media_base_url: Option<String>,
    pub invite_ttl: chrono::Duration,
    pub password_reset_ttl: chrono::Duration,
    pub cookie_secure: bool,
}

fn parse_bool(name: &str, raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(anyhow!("{name} inválida: '{other}' não é um booleano")),
    }
}

fn parse_algorithm(raw: &str) -> anyhow::Result<Algorithm> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(anyhow!("JWT_ALGORITHM inválida: '{other}' (use HS256, HS384 ou HS512)")),
    }
}

impl Settings {
    /// Monta as configurações a partir de uma função de busca. Em produção a
    /// busca é `std::env::var`; nos testes, um mapa.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let number = |name: &str, default: i64| -> anyhow::Result<i64> {
            match get(name) {
                Some(raw) => i64::from_str(raw.trim())
                    .with_context(|| format!("{name} inválida: '{raw}' não é um número")),
                None => Ok(default),
            }
        };
        let flag = |name: &str, default: bool| -> anyhow::Result<bool> {
            get(name).map_or(Ok(default), |raw| parse_bool(name, &raw))
        };

        let database_url = get("DATABASE_URL").context("DATABASE_URL deve ser definida")?;
        let signing_key = get("JWT_SIGNING_KEY")
            .or_else(|| get("JWT_SECRET"))
            .context("JWT_SIGNING_KEY (ou JWT_SECRET) deve ser definida")?;
        let algorithm = get("JWT_ALGORITHM").map_or(Ok(Algorithm::HS256), |raw| parse_algorithm(&raw))?;

        let tokens = TokenSettings {
            algorithm,
            signing_key,
            access_ttl: chrono::Duration::minutes(number("ACCESS_TOKEN_TTL_MINUTES", 120)?),
            refresh_ttl: chrono::Duration::minutes(number("REFRESH_TOKEN_TTL_MINUTES", 1440)?),
            rotate_refresh_tokens: flag("ROTATE_REFRESH_TOKENS", true)?,
            blacklist_after_rotation: flag("BLACKLIST_AFTER_ROTATION", true)?,
            allow_unverified: flag("ALLOW_UNVERIFIED_JWT", false)?,
        };

        let db_max_connections = u32::try_from(number("DB_MAX_CONNECTIONS", 5)?)
            .context("DB_MAX_CONNECTIONS inválida")?;
        let n8n_timeout = u64::try_from(number("N8N_TIMEOUT", 15)?).context("N8N_TIMEOUT inválida")?;

        Ok(Self {
            database_url,
            db_max_connections,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            tokens,
            n8n_base_url: get("N8N_BASE_URL"),
            n8n_kb_key: get("N8N_KB_KEY"),
            n8n_timeout: Duration::from_secs(n8n_timeout),
            frontend_base_url: get("FRONTEND_BASE_URL").unwrap_or_else(|| "http://localhost:5173".to_string()),
            media_base_url: get("MEDIA_BASE_URL"),
            invite_ttl: chrono::Duration::days(number("INVITE_TTL_DAYS", 15)?),
            password_reset_ttl: chrono::Duration::minutes(number("PASSWORD_RESET_TTL_MINUTES", 60)?),
            cookie_secure: flag("COOKIE_SECURE", false)?,
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

// ---
// AppState
// ---
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub settings: Arc<Settings>,
    pub auth_service: AuthService,
    pub invite_service: InviteService,
    pub tenancy_service: TenancyService,
    pub agent_service: AgentService,
    pub rbac_service: RbacService,
    pub kb_service: KbService,
    pub chat_service: ChatService,
}

impl AppState {
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(settings.db_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&settings.database_url)
            .await
            .context("Falha ao conectar ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        let store: Arc<dyn TokenStore> = Arc::new(PgTokenStore::new(db_pool.clone()));
        Self::assemble(settings, db_pool, store, Arc::new(LogMailer))
    }

    /// Monta o grafo de dependências sobre um pool e um store já prontos.
    pub fn assemble(
        settings: Settings,
        db_pool: PgPool,
        store: Arc<dyn TokenStore>,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        let user_repo = UserRepository::new(db_pool.clone());
        let client_repo = ClientRepository::new(db_pool.clone());
        let project_repo = ProjectRepository::new(db_pool.clone());
        let agent_repo = AgentRepository::new(db_pool.clone());
        let area_repo = ExpertiseAreaRepository::new(db_pool.clone());
        let invite_repo = InviteRepository::new(db_pool.clone());
        let kb_repo = KbLinkRepository::new(db_pool.clone());
        let group_repo = GroupRepository::new(db_pool.clone());
        let chat_repo = ChatRepository::new(db_pool.clone());

        let tokens = Arc::new(TokenManager::new(
            settings.tokens.clone(),
            settings.media_base_url.clone(),
            store,
        ));
        tracing::info!(verifiers = ?tokens.verifier_names(), "Verificadores de token ativos");

        let gateway = WorkflowGateway::new(
            settings.n8n_base_url.clone(),
            settings.n8n_kb_key.clone(),
            settings.n8n_timeout,
        )?;
        if settings.n8n_base_url.is_none() || settings.n8n_kb_key.is_none() {
            tracing::warn!("N8N_BASE_URL/N8N_KB_KEY ausentes: rotas de KB e a busca responderão 500");
        }

        let auth_service = AuthService::new(
            user_repo.clone(),
            tokens.clone(),
            mailer.clone(),
            settings.frontend_base_url.clone(),
            settings.password_reset_ttl,
            db_pool.clone(),
        );
        let invite_service = InviteService::new(
            db_pool.clone(),
            user_repo.clone(),
            project_repo.clone(),
            invite_repo,
            tokens,
            mailer,
            settings.frontend_base_url.clone(),
            settings.invite_ttl,
        );
        let tenancy_service = TenancyService::new(
            client_repo,
            project_repo.clone(),
            user_repo.clone(),
            agent_repo.clone(),
            db_pool.clone(),
        );
        let chat_service = ChatService::new(chat_repo, agent_repo.clone(), gateway.clone());
        let agent_service = AgentService::new(agent_repo, area_repo);
        let rbac_service = RbacService::new(group_repo, user_repo, db_pool.clone());
        let kb_service = KbService::new(gateway, kb_repo, project_repo, db_pool.clone());

        Ok(Self {
            db_pool,
            settings: Arc::new(settings),
            auth_service,
            invite_service,
            tenancy_service,
            agent_service,
            rbac_service,
            kb_service,
            chat_service,
        })
    }
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(pairs: &[(&str, &str)]) -> anyhow::Result<Settings> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [("DATABASE_URL", "postgres://x"), ("JWT_SIGNING_KEY", "k")];

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let settings = from_map(&REQUIRED).unwrap();
        assert_eq!(settings.tokens.algorithm, Algorithm::HS256);
        assert_eq!(settings.tokens.access_ttl, chrono::Duration::minutes(120));
        assert_eq!(settings.tokens.refresh_ttl, chrono::Duration::minutes(1440));
        assert!(settings.tokens.rotate_refresh_tokens);
        assert!(settings.tokens.blacklist_after_rotation);
        assert!(!settings.tokens.allow_unverified);
        assert_eq!(settings.n8n_timeout, Duration::from_secs(15));
        assert_eq!(settings.invite_ttl, chrono::Duration::days(15));
        assert_eq!(settings.bind_addr, "0.0.0.0:3000");
        assert!(settings.n8n_base_url.is_none());
    }

    #[test]
    fn jwt_secret_is_accepted_as_fallback() {
        let settings = from_map(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "antigo")]).unwrap();
        assert_eq!(settings.tokens.signing_key, "antigo");
    }

    #[test]
    fn missing_required_vars_abort() {
        let err = from_map(&[("JWT_SIGNING_KEY", "k")]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
        assert!(from_map(&[("DATABASE_URL", "postgres://x")]).is_err());
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ACCESS_TOKEN_TTL_MINUTES", "duas horas"));
        let err = from_map(&pairs).unwrap_err();
        assert!(err.to_string().contains("ACCESS_TOKEN_TTL_MINUTES"));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("JWT_ALGORITHM", "RS256"));
        assert!(from_map(&pairs).unwrap_err().to_string().contains("JWT_ALGORITHM"));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ROTATE_REFRESH_TOKENS", "talvez"));
        assert!(from_map(&pairs).unwrap_err().to_string().contains("ROTATE_REFRESH_TOKENS"));
    }

    #[test]
    fn flags_and_algorithms_parse() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([("JWT_ALGORITHM", "hs512"), ("ROTATE_REFRESH_TOKENS", "0"), ("ALLOW_UNVERIFIED_JWT", "1")]);
        let settings = from_map(&pairs).unwrap();
        assert_eq!(settings.tokens.algorithm, Algorithm::HS512);
        assert!(!settings.tokens.rotate_refresh_tokens);
        assert!(settings.tokens.allow_unverified);
    }
}
