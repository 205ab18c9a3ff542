// src/services/tokens.rs

//! Ciclo de vida das credenciais: emissão, refresh com rotação, blacklist e
//! emissão degradada quando o controle de refresh tokens falha.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    common::error::{AppError, AppResult},
    models::auth::{AuthResponse, User},
};

/// Claims de perfil copiados do usuário no momento da emissão.
pub const PROFILE_CLAIMS: [&str; 14] = [
    "id",
    "full_name",
    "email",
    "username",
    "job_title",
    "department",
    "first_name",
    "role",
    "is_active",
    "avatar",
    "status",
    "joined_at",
    "is_superuser",
    "is_staff",
];

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub algorithm: Algorithm,
    pub signing_key: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub rotate_refresh_tokens: bool,
    pub blacklist_after_rotation: bool,
    pub allow_unverified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub token_type: TokenType,
    #[serde(default, alias = "sub", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(flatten)]
    pub profile: BTreeMap<String, Value>,
}

impl Claims {
    pub fn user_uuid(&self) -> Option<Uuid> {
        self.user_id.as_deref().and_then(|id| Uuid::parse_str(id).ok())
    }

    pub fn profile_str(&self, key: &str) -> Option<&str> {
        self.profile.get(key).and_then(Value::as_str)
    }

    fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }
}

/// Fotografia dos atributos do usuário. Valores, não referências: alterações
/// posteriores no usuário não afetam tokens já emitidos.
pub fn snapshot_claims(user: &User, media_base_url: Option<&str>) -> BTreeMap<String, Value> {
    let avatar = match (user.avatar.as_deref(), media_base_url) {
        (None, _) | (Some(""), _) => Value::Null,
        (Some(key), _) if key.starts_with("http://") || key.starts_with("https://") => {
            Value::from(key)
        }
        (Some(key), Some(base)) => Value::from(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            key.trim_start_matches('/')
        )),
        (Some(key), None) => Value::from(key),
    };
    let status = if user.is_enabled() { "active" } else { "inactive" };

    let mut claims = BTreeMap::new();
    claims.insert("id".into(), Value::from(user.id.to_string()));
    claims.insert("full_name".into(), Value::from(user.full_name.clone()));
    claims.insert("email".into(), Value::from(user.email.clone()));
    claims.insert("username".into(), Value::from(user.username.clone()));
    claims.insert("job_title".into(), Value::from(user.job_title.clone()));
    claims.insert("department".into(), Value::from(user.department.clone()));
    claims.insert("first_name".into(), Value::from(user.first_name.clone()));
    claims.insert("role".into(), Value::from(user.role.as_str()));
    claims.insert("is_active".into(), Value::from(user.is_active));
    claims.insert("avatar".into(), avatar);
    claims.insert("status".into(), Value::from(status));
    claims.insert("joined_at".into(), Value::from(user.joined_at.format("%Y-%m-%d").to_string()));
    claims.insert("is_superuser".into(), Value::from(user.is_superuser));
    claims.insert("is_staff".into(), Value::from(user.is_staff));
    claims
}

/// Só os claims de perfil presentes no payload, sem `iat`/`exp`/`jti`.
fn carried_profile(claims: &Claims) -> BTreeMap<String, Value> {
    claims
        .profile
        .iter()
        .filter(|(key, _)| PROFILE_CLAIMS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

// ---
// Persistência do controle de refresh tokens
// ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub jti: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    // O usuário referenciado ainda não está gravado de forma durável.
    #[error("violação de integridade: {0}")]
    Integrity(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Integrity(reason) => AppError::IntegrityFault(reason),
            StoreError::Database(e) => AppError::DatabaseError(e),
        }
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn record_outstanding(&self, record: &TokenRecord) -> Result<(), StoreError>;
    async fn blacklist(&self, record: &TokenRecord) -> Result<(), StoreError>;
    async fn is_blacklisted(&self, jti: &str) -> Result<bool, StoreError>;
}

// ---
// Codificação
// ---

#[derive(Clone)]
struct JwtKeys {
    header: Header,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtKeys {
    fn new(settings: &TokenSettings) -> Self {
        let mut validation = Validation::new(settings.algorithm);
        validation.leeway = 0;
        Self {
            header: Header::new(settings.algorithm),
            encoding: EncodingKey::from_secret(settings.signing_key.as_bytes()),
            decoding: DecodingKey::from_secret(settings.signing_key.as_bytes()),
            validation,
        }
    }

    fn encode(&self, claims: &Claims) -> AppResult<String> {
        Ok(encode(&self.header, claims, &self.encoding)?)
    }

    fn decode(&self, raw: &str, expected: TokenType) -> AppResult<Claims> {
        let data = decode::<Claims>(raw, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Token rejeitado");
            AppError::InvalidToken
        })?;
        if data.claims.token_type != expected {
            return Err(AppError::InvalidToken);
        }
        Ok(data.claims)
    }
}

// ---
// Verificadores de access token
// ---

pub trait CredentialVerifier: Send + Sync {
    fn name(&self) -> &'static str;
    fn verify(&self, raw: &str) -> AppResult<Claims>;
}

pub struct SignedJwtVerifier {
    keys: JwtKeys,
}

impl CredentialVerifier for SignedJwtVerifier {
    fn name(&self) -> &'static str {
        "signed-jwt"
    }

    fn verify(&self, raw: &str) -> AppResult<Claims> {
        self.keys.decode(raw, TokenType::Access)
    }
}

/// Decodifica sem checar a assinatura. Existe apenas em builds de debug com a
/// feature `unverified-jwt`; nunca entra num binário de produção.
#[cfg(all(debug_assertions, feature = "unverified-jwt"))]
pub struct UnverifiedJwtVerifier {
    validation: Validation,
}

#[cfg(all(debug_assertions, feature = "unverified-jwt"))]
impl UnverifiedJwtVerifier {
    pub fn new(algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.insecure_disable_signature_validation();
        Self { validation }
    }
}

#[cfg(all(debug_assertions, feature = "unverified-jwt"))]
impl CredentialVerifier for UnverifiedJwtVerifier {
    fn name(&self) -> &'static str {
        "unverified-jwt"
    }

    fn verify(&self, raw: &str) -> AppResult<Claims> {
        let data = decode::<Claims>(raw, &DecodingKey::from_secret(&[]), &self.validation)
            .map_err(|_| AppError::InvalidToken)?;
        if data.claims.token_type != TokenType::Access {
            return Err(AppError::InvalidToken);
        }
        tracing::warn!(jti = %data.claims.jti, "Token aceito SEM verificação de assinatura");
        Ok(data.claims)
    }
}

/// Estratégias tentadas em ordem; a primeira que aceitar vence.
pub struct VerifierChain {
    verifiers: Vec<Box<dyn CredentialVerifier>>,
}

impl VerifierChain {
    pub fn new(verifiers: Vec<Box<dyn CredentialVerifier>>) -> Self {
        Self { verifiers }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.verifiers.iter().map(|v| v.name()).collect()
    }

    pub fn verify(&self, raw: &str) -> AppResult<Claims> {
        for verifier in &self.verifiers {
            match verifier.verify(raw) {
                Ok(claims) => return Ok(claims),
                Err(e) => tracing::debug!(verifier = verifier.name(), error = %e, "Verificador recusou o token"),
            }
        }
        Err(AppError::InvalidToken)
    }
}

fn build_chain(settings: &TokenSettings, keys: &JwtKeys) -> VerifierChain {
    #[allow(unused_mut)]
    let mut verifiers: Vec<Box<dyn CredentialVerifier>> =
        vec![Box::new(SignedJwtVerifier { keys: keys.clone() })];

    #[cfg(all(debug_assertions, feature = "unverified-jwt"))]
    if settings.allow_unverified {
        tracing::warn!("ALLOW_UNVERIFIED_JWT ativo: tokens sem assinatura válida serão aceitos");
        verifiers.push(Box::new(UnverifiedJwtVerifier::new(settings.algorithm)));
    }

    #[cfg(not(all(debug_assertions, feature = "unverified-jwt")))]
    if settings.allow_unverified {
        tracing::warn!("ALLOW_UNVERIFIED_JWT ignorado: este binário não inclui o verificador sem assinatura");
    }

    VerifierChain::new(verifiers)
}

// ---
// Emissão
// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueMode {
    // Refresh registrado em `outstanding_tokens`.
    Tracked,
    // Refresh válido, mas sem registro.
    Stateless,
    AccessOnly,
}

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access: String,
    pub refresh: Option<String>,
    pub mode: IssueMode,
}

impl From<IssuedTokens> for AuthResponse {
    fn from(tokens: IssuedTokens) -> Self {
        AuthResponse { access: tokens.access, refresh: tokens.refresh }
    }
}

/// Cadeia de emissão degradada: sem registro, depois só access token.
/// Cada passo é um caminho diferente, sem repetição nem espera.
fn run_fallbacks<S, A>(user_id: Uuid, stateless: S, access_only: A) -> AppResult<IssuedTokens>
where
    S: FnOnce() -> AppResult<IssuedTokens>,
    A: FnOnce() -> AppResult<IssuedTokens>,
{
    match stateless() {
        Ok(tokens) => {
            tracing::warn!(%user_id, step = "stateless", "Emitido par de tokens sem registro");
            return Ok(tokens);
        }
        Err(e) => tracing::error!(%user_id, step = "stateless", error = %e, "Falha ao emitir par sem registro"),
    }

    match access_only() {
        Ok(tokens) => {
            tracing::warn!(%user_id, step = "access_only", "Emitido apenas o access token");
            Ok(tokens)
        }
        Err(e) => {
            tracing::error!(%user_id, step = "access_only", error = %e, "Falha ao emitir access token");
            Err(AppError::InternalServerError(anyhow::anyhow!(
                "Não foi possível emitir credenciais"
            )))
        }
    }
}

pub struct TokenManager {
    settings: TokenSettings,
    keys: JwtKeys,
    chain: VerifierChain,
    media_base_url: Option<String>,
    store: Arc<dyn TokenStore>,
}

impl TokenManager {
    pub fn new(
        settings: TokenSettings,
        media_base_url: Option<String>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        let keys = JwtKeys::new(&settings);
        let chain = build_chain(&settings, &keys);
        Self { settings, keys, chain, media_base_url, store }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    pub fn verifier_names(&self) -> Vec<&'static str> {
        self.chain.names()
    }

    fn claims(
        &self,
        token_type: TokenType,
        user_id: Option<String>,
        profile: BTreeMap<String, Value>,
    ) -> Claims {
        let now = Utc::now();
        let ttl = match token_type {
            TokenType::Access => self.settings.access_ttl,
            TokenType::Refresh => self.settings.refresh_ttl,
        };
        Claims {
            token_type,
            user_id,
            jti: Uuid::new_v4().simple().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            profile,
        }
    }

    fn encode_access(&self, user_id: Option<String>, profile: BTreeMap<String, Value>) -> AppResult<String> {
        self.keys.encode(&self.claims(TokenType::Access, user_id, profile))
    }

    /// Emite o par de tokens para um usuário já verificado.
    pub async fn issue(&self, user: &User) -> AppResult<IssuedTokens> {
        let profile = snapshot_claims(user, self.media_base_url.as_deref());
        let user_id = user.id;

        match self.issue_tracked(user_id, &profile).await {
            Err(AppError::IntegrityFault(reason)) => {
                tracing::warn!(%user_id, step = "tracked", error = %reason, "Falha no registro do refresh token; usando fallback");
                run_fallbacks(
                    user_id,
                    || self.issue_stateless(user_id, &profile),
                    || self.issue_access_only(user_id, &profile),
                )
            }
            other => other,
        }
    }

    async fn issue_tracked(&self, user_id: Uuid, profile: &BTreeMap<String, Value>) -> AppResult<IssuedTokens> {
        let refresh_claims = self.claims(TokenType::Refresh, Some(user_id.to_string()), profile.clone());
        let refresh = self.keys.encode(&refresh_claims)?;

        self.store
            .record_outstanding(&TokenRecord {
                jti: refresh_claims.jti.clone(),
                user_id,
                expires_at: refresh_claims.expires_at(),
            })
            .await?;

        let access = self.encode_access(Some(user_id.to_string()), profile.clone())?;
        Ok(IssuedTokens { access, refresh: Some(refresh), mode: IssueMode::Tracked })
    }

    fn issue_stateless(&self, user_id: Uuid, profile: &BTreeMap<String, Value>) -> AppResult<IssuedTokens> {
        let refresh = self
            .keys
            .encode(&self.claims(TokenType::Refresh, Some(user_id.to_string()), profile.clone()))?;
        let access = self.encode_access(Some(user_id.to_string()), profile.clone())?;
        Ok(IssuedTokens { access, refresh: Some(refresh), mode: IssueMode::Stateless })
    }

    fn issue_access_only(&self, user_id: Uuid, profile: &BTreeMap<String, Value>) -> AppResult<IssuedTokens> {
        let access = self.encode_access(Some(user_id.to_string()), profile.clone())?;
        Ok(IssuedTokens { access, refresh: None, mode: IssueMode::AccessOnly })
    }

    /// Troca um refresh token válido por um novo access token. Os claims vêm
    /// do payload do refresh, não do banco.
    pub async fn refresh(&self, raw: &str) -> AppResult<IssuedTokens> {
        let previous = self.keys.decode(raw, TokenType::Refresh)?;
        if self.store.is_blacklisted(&previous.jti).await? {
            return Err(AppError::InvalidToken);
        }

        let profile = carried_profile(&previous);
        let access = self.encode_access(previous.user_id.clone(), profile.clone())?;

        if !self.settings.rotate_refresh_tokens {
            return Ok(IssuedTokens { access, refresh: None, mode: IssueMode::AccessOnly });
        }

        if self.settings.blacklist_after_rotation {
            self.blacklist_rotated(&previous).await;
        }

        let next = self.claims(TokenType::Refresh, previous.user_id.clone(), profile);
        let refresh = self.keys.encode(&next)?;

        let mode = match next.user_uuid() {
            Some(user_id) => {
                let record = TokenRecord { jti: next.jti.clone(), user_id, expires_at: next.expires_at() };
                match self.store.record_outstanding(&record).await {
                    Ok(()) => IssueMode::Tracked,
                    Err(e) => {
                        tracing::warn!(%user_id, jti = %next.jti, error = %e, "Refresh rotacionado sem registro");
                        IssueMode::Stateless
                    }
                }
            }
            None => IssueMode::Stateless,
        };

        Ok(IssuedTokens { access, refresh: Some(refresh), mode })
    }

    // A rotação segue mesmo se a blacklist falhar.
    async fn blacklist_rotated(&self, previous: &Claims) {
        let Some(user_id) = previous.user_uuid() else {
            tracing::warn!(jti = %previous.jti, "Refresh sem user_id; blacklist ignorada na rotação");
            return;
        };
        let record = TokenRecord { jti: previous.jti.clone(), user_id, expires_at: previous.expires_at() };
        if let Err(e) = self.store.blacklist(&record).await {
            tracing::error!(%user_id, jti = %previous.jti, error = %e, "Falha ao colocar refresh na blacklist");
        }
    }

    /// Logout: o refresh token fica inutilizável.
    pub async fn logout(&self, raw: &str) -> AppResult<()> {
        let claims = self.keys.decode(raw, TokenType::Refresh)?;
        let user_id = claims.user_uuid().ok_or(AppError::InvalidToken)?;
        if self.store.is_blacklisted(&claims.jti).await? {
            return Err(AppError::InvalidToken);
        }
        self.store
            .blacklist(&TokenRecord { jti: claims.jti.clone(), user_id, expires_at: claims.expires_at() })
            .await?;
        Ok(())
    }

    /// Valida um access token pela cadeia de verificadores.
    pub fn verify_access(&self, raw: &str) -> AppResult<Claims> {
        self.chain.verify(raw)
    }

    /// Aceita qualquer token emitido aqui: access pela cadeia; refresh pela
    /// assinatura, validade e blacklist. Devolve o tipo reconhecido.
    pub async fn verify_any(&self, raw: &str) -> AppResult<TokenType> {
        if self.chain.verify(raw).is_ok() {
            return Ok(TokenType::Access);
        }
        let claims = self.keys.decode(raw, TokenType::Refresh)?;
        if self.store.is_blacklisted(&claims.jti).await? {
            return Err(AppError::InvalidToken);
        }
        Ok(TokenType::Refresh)
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! Store em memória com injeção de falhas, para testes sem banco.

    use std::{
        collections::HashSet,
        sync::{
            Mutex,
            atomic::{AtomicBool, Ordering},
        },
    };

    use super::*;

    #[derive(Default)]
    pub struct MemoryTokenStore {
        pub outstanding: Mutex<Vec<TokenRecord>>,
        pub blacklisted: Mutex<HashSet<String>>,
        pub fail_record: AtomicBool,
        pub fail_blacklist: AtomicBool,
    }

    impl MemoryTokenStore {
        pub fn failing_records() -> Self {
            let store = Self::default();
            store.fail_record.store(true, Ordering::SeqCst);
            store
        }

        pub fn is_listed(&self, jti: &str) -> bool {
            self.blacklisted.lock().unwrap().contains(jti)
        }
    }

    #[async_trait]
    impl TokenStore for MemoryTokenStore {
        async fn record_outstanding(&self, record: &TokenRecord) -> Result<(), StoreError> {
            if self.fail_record.load(Ordering::SeqCst) {
                return Err(StoreError::Integrity("outstanding_tokens_user_id_fkey".into()));
            }
            self.outstanding.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn blacklist(&self, record: &TokenRecord) -> Result<(), StoreError> {
            if self.fail_blacklist.load(Ordering::SeqCst) {
                return Err(StoreError::Integrity("blacklisted_tokens_user_id_fkey".into()));
            }
            self.blacklisted.lock().unwrap().insert(record.jti.clone());
            Ok(())
        }

        async fn is_blacklisted(&self, jti: &str) -> Result<bool, StoreError> {
            Ok(self.is_listed(jti))
        }
    }

    pub fn settings() -> TokenSettings {
        TokenSettings {
            algorithm: Algorithm::HS256,
            signing_key: "chave-de-teste-com-tamanho-suficiente".into(),
            access_ttl: Duration::minutes(120),
            refresh_ttl: Duration::minutes(1440),
            rotate_refresh_tokens: true,
            blacklist_after_rotation: true,
            allow_unverified: false,
        }
    }

    pub fn manager(store: Arc<MemoryTokenStore>) -> TokenManager {
        TokenManager::new(settings(), None, store)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::memory::{MemoryTokenStore, manager, settings};
    use super::*;
    use crate::models::auth::Role;

    fn peek(manager: &TokenManager, raw: &str, kind: TokenType) -> Claims {
        manager.keys.decode(raw, kind).unwrap()
    }

    #[tokio::test]
    async fn issued_access_token_carries_profile_snapshot() {
        let store = Arc::new(MemoryTokenStore::default());
        let tokens = manager(store.clone());
        let user = User::sample("a@x.com", Role::User);

        let issued = tokens.issue(&user).await.unwrap();
        assert_eq!(issued.mode, IssueMode::Tracked);
        assert_eq!(store.outstanding.lock().unwrap().len(), 1);

        let claims = tokens.verify_access(&issued.access).unwrap();
        assert_eq!(claims.profile_str("role"), Some("USER"));
        assert_eq!(claims.profile_str("email"), Some("a@x.com"));
        assert_eq!(claims.profile_str("id"), Some(user.id.to_string().as_str()));
        assert_eq!(claims.user_uuid(), Some(user.id));
        assert_eq!(claims.profile["avatar"], Value::Null);
    }

    #[tokio::test]
    async fn claims_are_not_affected_by_later_changes() {
        let tokens = manager(Arc::new(MemoryTokenStore::default()));
        let mut user = User::sample("a@x.com", Role::User);
        let issued = tokens.issue(&user).await.unwrap();

        user.email = "outro@x.com".into();
        let claims = tokens.verify_access(&issued.access).unwrap();
        assert_eq!(claims.profile_str("email"), Some("a@x.com"));
    }

    #[test]
    fn avatar_resolves_to_url_then_key_then_null() {
        let mut user = User::sample("a@x.com", Role::User);
        user.avatar = Some("avatars/a.png".into());

        let with_media = snapshot_claims(&user, Some("https://cdn.x.com/media/"));
        assert_eq!(with_media["avatar"], "https://cdn.x.com/media/avatars/a.png");

        let without_media = snapshot_claims(&user, None);
        assert_eq!(without_media["avatar"], "avatars/a.png");

        user.avatar = None;
        assert_eq!(snapshot_claims(&user, None)["avatar"], Value::Null);
    }

    #[test]
    fn snapshot_normalizes_dates_and_enums_to_strings() {
        let mut user = User::sample("a@x.com", Role::Manager);
        user.joined_at = chrono::NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let claims = snapshot_claims(&user, None);
        assert_eq!(claims["joined_at"], "2024-03-09");
        assert_eq!(claims["role"], "MANAGER");
        assert_eq!(claims["status"], "active");
        assert_eq!(claims.len(), PROFILE_CLAIMS.len());
    }

    #[tokio::test]
    async fn integrity_fault_degrades_to_stateless_pair() {
        let store = Arc::new(MemoryTokenStore::failing_records());
        let tokens = manager(store.clone());
        let user = User::sample("a@x.com", Role::User);

        let issued = tokens.issue(&user).await.unwrap();
        assert_eq!(issued.mode, IssueMode::Stateless);
        assert!(issued.refresh.is_some());
        assert!(store.outstanding.lock().unwrap().is_empty());
        assert!(tokens.verify_access(&issued.access).is_ok());
    }

    #[test]
    fn fallback_chain_ends_with_access_only_then_generic_error() {
        let user_id = Uuid::new_v4();
        let access_only = || {
            Ok(IssuedTokens { access: "a".into(), refresh: None, mode: IssueMode::AccessOnly })
        };

        let issued = run_fallbacks(user_id, || Err(AppError::InvalidToken), access_only).unwrap();
        assert_eq!(issued.mode, IssueMode::AccessOnly);
        assert!(issued.refresh.is_none());

        let failed = run_fallbacks(
            user_id,
            || Err(AppError::IntegrityFault("users_pkey".into())),
            || Err(AppError::IntegrityFault("users_pkey".into())),
        );
        match failed {
            Err(AppError::InternalServerError(e)) => assert!(!e.to_string().contains("users_pkey")),
            other => panic!("esperava erro interno, veio {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_preserves_claims_and_rotates() {
        let store = Arc::new(MemoryTokenStore::default());
        let tokens = manager(store.clone());
        let user = User::sample("a@x.com", Role::User);
        let issued = tokens.issue(&user).await.unwrap();
        let old_refresh = issued.refresh.unwrap();
        let old_claims = peek(&tokens, &old_refresh, TokenType::Refresh);

        let refreshed = tokens.refresh(&old_refresh).await.unwrap();
        let access = tokens.verify_access(&refreshed.access).unwrap();
        assert_eq!(access.profile, old_claims.profile);
        assert_eq!(access.user_id, old_claims.user_id);
        assert_ne!(access.jti, old_claims.jti);

        let new_refresh = refreshed.refresh.expect("rotação ativa");
        let new_claims = peek(&tokens, &new_refresh, TokenType::Refresh);
        assert_eq!(new_claims.profile, old_claims.profile);
        assert_ne!(new_claims.jti, old_claims.jti);

        assert!(store.is_listed(&old_claims.jti));
        assert!(matches!(tokens.refresh(&old_refresh).await, Err(AppError::InvalidToken)));
    }

    #[tokio::test]
    async fn refresh_without_rotation_returns_only_access() {
        let store = Arc::new(MemoryTokenStore::default());
        let mut config = settings();
        config.rotate_refresh_tokens = false;
        let tokens = TokenManager::new(config, None, store.clone());
        let issued = tokens.issue(&User::sample("a@x.com", Role::User)).await.unwrap();

        let refreshed = tokens.refresh(issued.refresh.as_deref().unwrap()).await.unwrap();
        assert!(refreshed.refresh.is_none());
        assert!(store.blacklisted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rotation_skips_blacklist_when_user_id_is_missing() {
        let store = Arc::new(MemoryTokenStore::default());
        let tokens = manager(store.clone());
        let legacy = tokens.claims(TokenType::Refresh, None, BTreeMap::new());
        let raw = tokens.keys.encode(&legacy).unwrap();

        let refreshed = tokens.refresh(&raw).await.unwrap();
        assert!(refreshed.refresh.is_some());
        assert!(!store.is_listed(&legacy.jti));
    }

    #[tokio::test]
    async fn rotation_survives_blacklist_failure() {
        let store = Arc::new(MemoryTokenStore::default());
        store.fail_blacklist.store(true, Ordering::SeqCst);
        let tokens = manager(store.clone());
        let issued = tokens.issue(&User::sample("a@x.com", Role::User)).await.unwrap();

        let refreshed = tokens.refresh(issued.refresh.as_deref().unwrap()).await;
        assert!(refreshed.is_ok());
    }

    #[tokio::test]
    async fn logout_blacklists_and_rejects_second_use() {
        let store = Arc::new(MemoryTokenStore::default());
        let tokens = manager(store.clone());
        let issued = tokens.issue(&User::sample("a@x.com", Role::User)).await.unwrap();
        let refresh = issued.refresh.unwrap();

        tokens.logout(&refresh).await.unwrap();
        assert!(matches!(tokens.logout(&refresh).await, Err(AppError::InvalidToken)));
        assert!(matches!(tokens.refresh(&refresh).await, Err(AppError::InvalidToken)));
    }

    #[tokio::test]
    async fn access_and_refresh_tokens_are_not_interchangeable() {
        let tokens = manager(Arc::new(MemoryTokenStore::default()));
        let issued = tokens.issue(&User::sample("a@x.com", Role::User)).await.unwrap();

        assert!(tokens.verify_access(issued.refresh.as_deref().unwrap()).is_err());
        assert!(matches!(tokens.refresh(&issued.access).await, Err(AppError::InvalidToken)));
    }

    #[tokio::test]
    async fn verify_any_names_the_token_type_and_honours_the_blacklist() {
        let tokens = manager(Arc::new(MemoryTokenStore::default()));
        let issued = tokens.issue(&User::sample("a@x.com", Role::User)).await.unwrap();
        let refresh = issued.refresh.unwrap();

        assert_eq!(tokens.verify_any(&issued.access).await.unwrap(), TokenType::Access);
        assert_eq!(tokens.verify_any(&refresh).await.unwrap(), TokenType::Refresh);

        tokens.logout(&refresh).await.unwrap();
        assert!(matches!(tokens.verify_any(&refresh).await, Err(AppError::InvalidToken)));
        assert!(tokens.verify_any("nao.e.um.jwt").await.is_err());
    }

    #[test]
    fn expired_or_foreign_tokens_are_rejected() {
        let tokens = manager(Arc::new(MemoryTokenStore::default()));
        let mut claims = tokens.claims(TokenType::Access, Some(Uuid::new_v4().to_string()), BTreeMap::new());
        claims.exp = Utc::now().timestamp() - 10;
        let expired = tokens.keys.encode(&claims).unwrap();
        assert!(matches!(tokens.verify_access(&expired), Err(AppError::InvalidToken)));

        let mut other_settings = settings();
        other_settings.signing_key = "outra-chave".into();
        let other = TokenManager::new(other_settings, None, Arc::new(MemoryTokenStore::default()));
        let claims = other.claims(TokenType::Access, None, BTreeMap::new());
        let forged = other.keys.encode(&claims).unwrap();
        assert!(tokens.verify_access(&forged).is_err());
    }

    #[test]
    fn unverified_flag_alone_never_adds_the_unsafe_verifier() {
        let mut config = settings();
        config.allow_unverified = true;
        let tokens = TokenManager::new(config, None, Arc::new(MemoryTokenStore::default()));

        let names = tokens.verifier_names();
        assert_eq!(names[0], "signed-jwt");
        if cfg!(all(debug_assertions, feature = "unverified-jwt")) {
            assert_eq!(names, vec!["signed-jwt", "unverified-jwt"]);
        } else {
            assert_eq!(names, vec!["signed-jwt"]);
        }
    }
}
