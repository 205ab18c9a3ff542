// src/models/auth.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

// ---
// 1. Role (o papel global do usuário)
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Administrator,
    Manager,
    User,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Administrator, Role::Manager, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "ADMINISTRATOR",
            Role::Manager => "MANAGER",
            Role::User => "USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    // Aceita "ADMIN" como apelido legado de ADMINISTRATOR.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMINISTRATOR" | "ADMIN" => Ok(Role::Administrator),
            "MANAGER" => Ok(Role::Manager),
            "USER" => Ok(Role::User),
            other => Err(format!("Papel desconhecido: {other}")),
        }
    }
}

// ---
// 2. User (linha da tabela `users`)
// ---
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,

    #[serde(skip_serializing)] // IMPORTANTE para segurança
    pub password_hash: Option<String>,

    pub role: Role,
    pub job_title: String,
    pub department: String,
    pub joined_at: NaiveDate,

    // Administradores podem não ter cliente; os demais devem ter.
    pub client_id: Option<Uuid>,
    pub avatar: Option<String>,

    pub is_active: bool,
    pub active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,

    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Dados para login: e-mail OU username, mais a senha.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginUserPayload {
    #[validate(email(message = "O e-mail fornecido é inválido."))]
    pub email: Option<String>,
    pub username: Option<String>,
    #[validate(length(min = 1, message = "A senha é obrigatória."))]
    pub password: String,
}

// Dados para o cadastro self-service
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterUserPayload {
    #[validate(email(message = "O e-mail fornecido é inválido."))]
    pub email: String,
    #[validate(length(min = 3, max = 150, message = "O username deve ter entre 3 e 150 caracteres."))]
    pub username: String,
    #[validate(length(min = 1, max = 30, message = "O nome é obrigatório."))]
    pub first_name: String,
    #[validate(length(max = 150, message = "O sobrenome é muito longo."))]
    #[serde(default)]
    pub last_name: String,
    #[validate(length(min = 8, message = "A senha deve ter no mínimo 8 caracteres."))]
    pub password: String,
}

// Atualização parcial do próprio perfil
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfilePayload {
    #[validate(length(min = 1, max = 30))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    #[validate(length(max = 80))]
    pub job_title: Option<String>,
    #[validate(length(max = 80))]
    pub department: Option<String>,
}

// Par de tokens devolvido por login/cadastro/refresh.
// `refresh` fica ausente quando só foi possível emitir o access token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub access: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignupResponse {
    pub user: User,
    #[serde(flatten)]
    pub tokens: AuthResponse,
}

// Refresh / logout: o token pode vir no corpo ou no cookie `refresh`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RefreshPayload {
    pub refresh: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct VerifyTokenPayload {
    pub token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyTokenResponse {
    pub valid: bool,
    // "access" | "refresh"
    pub token_type: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ForgotPasswordPayload {
    #[validate(email(message = "O e-mail fornecido é inválido."))]
    pub email: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmailTokenQuery {
    pub email: String,
    pub token: String,
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordPayload {
    #[validate(length(min = 8, message = "A senha deve ter no mínimo 8 caracteres."))]
    pub new_password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DetailResponse {
    pub detail: String,
}

impl DetailResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

impl User {
    /// Conta habilitada: as duas flags de atividade precisam estar ligadas.
    pub fn is_enabled(&self) -> bool {
        self.is_active && self.active
    }
}

pub fn compose_full_name(first_name: &str, last_name: &str) -> String {
    format!("{} {}", first_name.trim(), last_name.trim()).trim().to_string()
}

#[cfg(test)]
impl User {
    /// Usuário ativo, sem cliente, para testes que não tocam o banco.
    pub fn sample(email: &str, role: Role) -> Self {
        let now = Utc::now();
        let username = email.split('@').next().unwrap_or(email).to_string();
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            username,
            first_name: "Ana".into(),
            last_name: "Souza".into(),
            full_name: "Ana Souza".into(),
            password_hash: None,
            role,
            job_title: "Analista".into(),
            department: "Suporte".into(),
            joined_at: now.date_naive(),
            client_id: None,
            avatar: None,
            is_active: true,
            active: true,
            is_staff: false,
            is_superuser: false,
            password_reset_token: None,
            password_reset_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_accepts_legacy_admin_alias() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Administrator);
        assert_eq!("MANAGER".parse::<Role>().unwrap(), Role::Manager);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn role_serializes_as_uppercase_string() {
        assert_eq!(serde_json::to_value(Role::User).unwrap(), "USER");
        assert_eq!(Role::Administrator.to_string(), "ADMINISTRATOR");
    }

    #[test]
    fn either_activity_flag_disables_the_account() {
        let mut user = User::sample("a@x.com", Role::User);
        assert!(user.is_enabled());
        user.active = false;
        assert!(!user.is_enabled());
        user.active = true;
        user.is_active = false;
        assert!(!user.is_enabled());
    }

    #[test]
    fn full_name_is_trimmed() {
        assert_eq!(compose_full_name("Ana", ""), "Ana");
        assert_eq!(compose_full_name("Ana", "Souza"), "Ana Souza");
    }
}
