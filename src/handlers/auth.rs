// src/handlers/auth.rs

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::CookieJar;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{cookies, error::AppError},
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        rbac::{Impersonator, RequireRole},
    },
    models::auth::{
        AuthResponse, DetailResponse, EmailTokenQuery, ForgotPasswordPayload, LoginUserPayload,
        RefreshPayload, RegisterUserPayload, ResetPasswordPayload, SignupResponse, UpdateProfilePayload,
        User, VerifyTokenPayload, VerifyTokenResponse,
    },
    services::tokens::{IssuedTokens, TokenType},
};

/// Grava os cookies httpOnly. `refresh` é o valor que o cookie deve guardar.
fn set_cookies(app_state: &AppState, jar: CookieJar, access: &str, refresh: Option<&str>) -> CookieJar {
    let token_settings = app_state.auth_service.tokens().settings();
    cookies::store_credentials(
        jar,
        access,
        refresh,
        token_settings.access_ttl,
        token_settings.refresh_ttl,
        app_state.settings.cookie_secure,
    )
}

fn with_cookies(app_state: &AppState, jar: CookieJar, tokens: IssuedTokens) -> (CookieJar, AuthResponse) {
    let jar = set_cookies(app_state, jar, &tokens.access, tokens.refresh.as_deref());
    (jar, tokens.into())
}

// Refresh/logout: corpo `{"refresh": ...}` (opcional) ou cookie `refresh`.
fn refresh_token_from(body: &Bytes, jar: &CookieJar) -> Result<String, AppError> {
    let from_body = if body.is_empty() {
        RefreshPayload::default()
    } else {
        serde_json::from_slice::<RefreshPayload>(body)
            .map_err(|_| AppError::BadRequest("Corpo da requisição inválido.".into()))?
    };
    from_body
        .refresh
        .filter(|t| !t.trim().is_empty())
        .or_else(|| cookies::read(jar, cookies::REFRESH_COOKIE))
        .ok_or_else(|| AppError::BadRequest("Campo 'refresh' obrigatório ou cookie ausente.".into()))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    request_body = LoginUserPayload,
    responses(
        (status = 200, description = "Credenciais emitidas", body = AuthResponse),
        (status = 400, description = "Dados inválidos"),
        (status = 401, description = "Credenciais inválidas")
    )
)]
pub async fn login(
    State(app_state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginUserPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let tokens = app_state.auth_service.login(&payload).await?;
    let (jar, body) = with_cookies(&app_state, jar, tokens);
    Ok((jar, Json(body)))
}

#[utoipa::path(
    post,
    path = "/create",
    tag = "Auth",
    request_body = RegisterUserPayload,
    responses(
        (status = 201, description = "Usuário criado", body = SignupResponse),
        (status = 409, description = "E-mail ou username já em uso")
    )
)]
pub async fn signup(
    State(app_state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<RegisterUserPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let (user, tokens) = app_state.auth_service.signup(&payload).await?;
    let (jar, tokens) = with_cookies(&app_state, jar, tokens);
    Ok((StatusCode::CREATED, jar, Json(SignupResponse { user, tokens })))
}

#[utoipa::path(
    post,
    path = "/refresh",
    tag = "Auth",
    request_body = RefreshPayload,
    responses(
        (status = 200, description = "Novo access token (e refresh, se houver rotação)", body = AuthResponse),
        (status = 400, description = "Refresh ausente"),
        (status = 401, description = "Refresh inválido, expirado ou na blacklist")
    )
)]
pub async fn refresh(
    State(app_state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let raw = refresh_token_from(&body, &jar)?;
    let tokens = app_state.auth_service.tokens().refresh(&raw).await?;

    // Sem rotação o refresh atual continua valendo e permanece no cookie.
    let cookie_refresh = tokens.refresh.clone().unwrap_or_else(|| raw.clone());
    let jar = set_cookies(&app_state, jar, &tokens.access, Some(&cookie_refresh));
    let body: AuthResponse = tokens.into();
    Ok((jar, Json(body)))
}

#[utoipa::path(
    post,
    path = "/logout",
    tag = "Auth",
    request_body = RefreshPayload,
    responses(
        (status = 200, description = "Logout realizado", body = DetailResponse),
        (status = 400, description = "Refresh ausente"),
        (status = 401, description = "Token inválido ou já invalidado")
    )
)]
pub async fn logout(
    State(app_state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let raw = refresh_token_from(&body, &jar)?;
    app_state.auth_service.tokens().logout(&raw).await?;
    let jar = cookies::clear_credentials(jar, app_state.settings.cookie_secure);
    Ok((jar, Json(DetailResponse::new("Logout realizado."))))
}

#[utoipa::path(
    post,
    path = "/verify-token",
    tag = "Auth",
    request_body = VerifyTokenPayload,
    responses(
        (status = 200, description = "Token válido", body = VerifyTokenResponse),
        (status = 400, description = "Campo 'token' ausente"),
        (status = 401, description = "Token inválido, expirado ou na blacklist")
    )
)]
pub async fn verify_token(
    State(app_state): State<AppState>,
    Json(payload): Json<VerifyTokenPayload>,
) -> Result<Json<VerifyTokenResponse>, AppError> {
    let raw = payload
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Campo 'token' obrigatório.".into()))?;
    let token_type = match app_state.auth_service.tokens().verify_any(raw.trim()).await? {
        TokenType::Access => "access",
        TokenType::Refresh => "refresh",
    };
    Ok(Json(VerifyTokenResponse { valid: true, token_type: token_type.to_string() }))
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Users",
    responses(
        (status = 200, description = "Perfil do usuário autenticado", body = User),
        (status = 401, description = "Não autenticado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_me(AuthenticatedUser { user, .. }: AuthenticatedUser) -> Json<User> {
    Json(user)
}

#[utoipa::path(
    patch,
    path = "/me",
    tag = "Users",
    request_body = UpdateProfilePayload,
    responses(
        (status = 200, description = "Perfil atualizado", body = User)
    ),
    security(("api_jwt" = []))
)]
pub async fn update_me(
    State(app_state): State<AppState>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    Json(payload): Json<UpdateProfilePayload>,
) -> Result<Json<User>, AppError> {
    payload.validate()?;
    let updated = app_state.auth_service.update_profile(user.id, &payload).await?;
    Ok(Json(updated))
}

#[utoipa::path(
    post,
    path = "/password/forgot",
    tag = "Auth",
    request_body = ForgotPasswordPayload,
    responses(
        (status = 200, description = "Link de recuperação enviado", body = DetailResponse),
        (status = 404, description = "Usuário não encontrado")
    )
)]
pub async fn forgot_password(
    State(app_state): State<AppState>,
    Json(payload): Json<ForgotPasswordPayload>,
) -> Result<Json<DetailResponse>, AppError> {
    payload.validate()?;
    app_state.auth_service.forgot_password(&payload.email).await?;
    Ok(Json(DetailResponse::new("E-mail de recuperação enviado.")))
}

#[utoipa::path(
    post,
    path = "/password/reset",
    tag = "Auth",
    params(EmailTokenQuery),
    request_body = ResetPasswordPayload,
    responses(
        (status = 200, description = "Senha redefinida", body = DetailResponse),
        (status = 400, description = "Token inválido ou expirado")
    )
)]
pub async fn reset_password(
    State(app_state): State<AppState>,
    Query(query): Query<EmailTokenQuery>,
    Json(payload): Json<ResetPasswordPayload>,
) -> Result<Json<DetailResponse>, AppError> {
    payload.validate()?;
    app_state
        .auth_service
        .reset_password(&query.email, &query.token, &payload.new_password)
        .await?;
    Ok(Json(DetailResponse::new("Senha redefinida com sucesso.")))
}

#[utoipa::path(
    get,
    path = "/login-as/{user_id}",
    tag = "Auth",
    params(("user_id" = Uuid, Path, description = "Usuário a personificar")),
    responses(
        (status = 200, description = "Credenciais do usuário alvo", body = AuthResponse),
        (status = 403, description = "Permissão negada"),
        (status = 404, description = "Usuário não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn login_as(
    State(app_state): State<AppState>,
    _guard: RequireRole<Impersonator>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<AuthResponse>, AppError> {
    let tokens = app_state.auth_service.login_as(&principal, user_id).await?;
    Ok(Json(tokens.into()))
}
