// src/handlers/agents.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::agents::{
        AgentView, AssignExpertisePayload, CreateAgentPayload, CreateExpertiseAreaPayload, ExpertiseArea,
        UpdateAgentPayload,
    },
};

#[utoipa::path(
    get,
    path = "/bots",
    tag = "Agents",
    responses(
        (status = 200, description = "Bots visíveis ao usuário", body = Vec<AgentView>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_bots(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
) -> Result<Json<Vec<AgentView>>, AppError> {
    Ok(Json(app_state.agent_service.list(&principal).await?))
}

#[utoipa::path(
    get,
    path = "/bots/{id}",
    tag = "Agents",
    params(("id" = Uuid, Path, description = "ID do bot")),
    responses(
        (status = 200, description = "Bot", body = AgentView),
        (status = 403, description = "Sem acesso")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_bot(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<AgentView>, AppError> {
    Ok(Json(app_state.agent_service.get(&principal, id).await?))
}

#[utoipa::path(
    post,
    path = "/bots",
    tag = "Agents",
    request_body = CreateAgentPayload,
    responses(
        (status = 201, description = "Bot criado", body = AgentView),
        (status = 409, description = "Nome já em uso")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_bot(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Json(payload): Json<CreateAgentPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let agent = app_state.agent_service.create(&principal, &payload).await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

#[utoipa::path(
    patch,
    path = "/bots/{id}",
    tag = "Agents",
    params(("id" = Uuid, Path, description = "ID do bot")),
    request_body = UpdateAgentPayload,
    responses(
        (status = 200, description = "Bot atualizado", body = AgentView)
    ),
    security(("api_jwt" = []))
)]
pub async fn update_bot(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAgentPayload>,
) -> Result<Json<AgentView>, AppError> {
    payload.validate()?;
    Ok(Json(app_state.agent_service.update(&principal, id, &payload).await?))
}

#[utoipa::path(
    patch,
    path = "/bots/{id}/expertise",
    tag = "Agents",
    params(("id" = Uuid, Path, description = "ID do bot")),
    request_body = AssignExpertisePayload,
    responses(
        (status = 200, description = "Área de especialidade atribuída", body = AgentView)
    ),
    security(("api_jwt" = []))
)]
pub async fn set_bot_expertise(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignExpertisePayload>,
) -> Result<Json<AgentView>, AppError> {
    let agent = app_state
        .agent_service
        .set_expertise(&principal, id, payload.expertise_area_id)
        .await?;
    Ok(Json(agent))
}

#[utoipa::path(
    delete,
    path = "/bots/{id}",
    tag = "Agents",
    params(("id" = Uuid, Path, description = "ID do bot")),
    responses(
        (status = 204, description = "Bot removido")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_bot(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    app_state.agent_service.delete(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/expertise-areas",
    tag = "Agents",
    responses(
        (status = 200, description = "Áreas de especialidade", body = Vec<ExpertiseArea>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_expertise_areas(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<Json<Vec<ExpertiseArea>>, AppError> {
    Ok(Json(app_state.agent_service.list_areas().await?))
}

#[utoipa::path(
    post,
    path = "/expertise-areas",
    tag = "Agents",
    request_body = CreateExpertiseAreaPayload,
    responses(
        (status = 201, description = "Área criada", body = ExpertiseArea),
        (status = 409, description = "Nome já em uso")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_expertise_area(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Json(payload): Json<CreateExpertiseAreaPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let area = app_state.agent_service.create_area(&principal, &payload).await?;
    Ok((StatusCode::CREATED, Json(area)))
}
