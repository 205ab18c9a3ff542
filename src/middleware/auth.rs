// src/middleware/auth.rs

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    extract::CookieJar,
    headers::{Authorization, authorization::Bearer},
};

use crate::{
    common::{cookies, error::AppError},
    config::AppState,
    models::auth::User,
    services::policy::Principal,
};

/// Usuário autenticado e seu principal, resolvidos uma vez por requisição.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub principal: Principal,
}

/// Exige um access token válido (header `Authorization: Bearer` ou cookie
/// `access`) e injeta o `AuthenticatedUser` nas extensions.
pub async fn auth_guard(
    State(app_state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let raw = bearer
        .map(|TypedHeader(Authorization(b))| b.token().to_string())
        .or_else(|| cookies::read(&jar, cookies::ACCESS_COOKIE))
        .ok_or(AppError::Unauthenticated)?;

    let claims = app_state.auth_service.tokens().verify_access(&raw)?;
    let (user, principal) = app_state.auth_service.resolve_principal(&claims).await?;

    request.extensions_mut().insert(AuthenticatedUser { user, principal });
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AppError::Unauthenticated)
    }
}
