// src/handlers/invite.rs

use axum::{
    Json,
    extract::{Query, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use axum_extra::extract::CookieJar;
use validator::Validate;

use crate::{
    common::{cookies, error::AppError},
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        rbac::{Inviter, RequireRole},
    },
    models::{
        auth::{AuthResponse, EmailTokenQuery},
        invite::{ConfirmInvitePayload, CreateInvitePayload, InviteCreatedResponse},
    },
};

#[utoipa::path(
    post,
    path = "/invite",
    tag = "Invites",
    request_body = CreateInvitePayload,
    responses(
        (status = 201, description = "Convite criado e e-mail enviado", body = InviteCreatedResponse),
        (status = 403, description = "Sem permissão para convidar para este projeto"),
        (status = 409, description = "Convite pendente ou usuário ativo com este e-mail")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_invite(
    State(app_state): State<AppState>,
    _guard: RequireRole<Inviter>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Json(payload): Json<CreateInvitePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let invite = app_state.invite_service.create(&principal, &payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(InviteCreatedResponse { detail: "Convite enviado.".into(), invite }),
    ))
}

#[utoipa::path(
    post,
    path = "/invite/confirm",
    tag = "Invites",
    params(EmailTokenQuery),
    request_body = ConfirmInvitePayload,
    responses(
        (status = 200, description = "Conta ativada; credenciais emitidas", body = AuthResponse),
        (status = 400, description = "Token malformado ou senha inválida"),
        (status = 403, description = "Convite expirado"),
        (status = 404, description = "Convite não encontrado")
    )
)]
pub async fn confirm_invite(
    State(app_state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<EmailTokenQuery>,
    Json(payload): Json<ConfirmInvitePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let tokens = app_state
        .invite_service
        .confirm(&query.email, &query.token, query.project_id, &payload.password)
        .await?;

    let token_settings = app_state.auth_service.tokens().settings();
    let jar = cookies::store_credentials(
        jar,
        &tokens.access,
        tokens.refresh.as_deref(),
        token_settings.access_ttl,
        token_settings.refresh_ttl,
        app_state.settings.cookie_secure,
    );
    Ok((jar, Json(AuthResponse::from(tokens))))
}

// O link do e-mail abre direto na API; redireciona para a tela do frontend.
pub async fn confirm_invite_page(State(app_state): State<AppState>, RawQuery(query): RawQuery) -> Redirect {
    Redirect::temporary(&app_state.invite_service.confirmation_page(query.as_deref()))
}
