// src/middleware/rbac.rs

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    common::error::AppError,
    middleware::auth::AuthenticatedUser,
    models::auth::Role,
    services::policy::{MSG_ADMIN_ONLY, Principal},
};

/// Um requisito de papel checado antes do handler.
pub trait RoleRequirement: Send + Sync + 'static {
    fn allows(principal: &Principal) -> bool;
    fn denial() -> &'static str;
}

/// Guardião: rejeita com 401 sem usuário e 403 quando o papel não basta.
pub struct RequireRole<T>(pub PhantomData<T>);

impl<T, S> FromRequestParts<S> for RequireRole<T>
where
    T: RoleRequirement,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<AuthenticatedUser>()
            .ok_or(AppError::Unauthenticated)?;

        if !T::allows(&user.principal) {
            return Err(AppError::Forbidden(T::denial().to_string()));
        }
        Ok(RequireRole(PhantomData))
    }
}

// ---
// Requisitos
// ---

pub struct AdminOnly;
impl RoleRequirement for AdminOnly {
    fn allows(principal: &Principal) -> bool {
        principal.is_admin()
    }
    fn denial() -> &'static str {
        MSG_ADMIN_ONLY
    }
}

// Administradores e gerentes enviam convites.
pub struct Inviter;
impl RoleRequirement for Inviter {
    fn allows(principal: &Principal) -> bool {
        principal.is_admin() || principal.role == Role::Manager
    }
    fn denial() -> &'static str {
        "Apenas administradores e gerentes podem enviar convites."
    }
}

pub struct Impersonator;
impl RoleRequirement for Impersonator {
    fn allows(principal: &Principal) -> bool {
        principal.is_admin() || principal.role != Role::User
    }
    fn denial() -> &'static str {
        "Permissão negada."
    }
}
