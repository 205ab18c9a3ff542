// src/handlers/tenancy.rs

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
    models::{
        agents::AgentView,
        auth::User,
        tenancy::{
            AttachmentReport, BotAttachmentReport, Client, ClientPayload, ClientSummary,
            CreateProjectPayload, DetachmentReport, IdsPayload, Project, UpdateProjectPayload,
        },
    },
};

// ---
// Clientes
// ---

#[utoipa::path(
    get,
    path = "/clients",
    tag = "Tenancy",
    responses(
        (status = 200, description = "Clientes visíveis ao usuário", body = Vec<ClientSummary>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_clients(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
) -> Result<Json<Vec<ClientSummary>>, AppError> {
    Ok(Json(app_state.tenancy_service.list_clients(&principal).await?))
}

#[utoipa::path(
    get,
    path = "/clients/{id}",
    tag = "Tenancy",
    params(("id" = Uuid, Path, description = "ID do cliente")),
    responses(
        (status = 200, description = "Cliente", body = Client),
        (status = 403, description = "Sem acesso"),
        (status = 404, description = "Não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_client(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Client>, AppError> {
    Ok(Json(app_state.tenancy_service.get_client(&principal, id).await?))
}

#[utoipa::path(
    post,
    path = "/clients",
    tag = "Tenancy",
    request_body = ClientPayload,
    responses(
        (status = 201, description = "Cliente criado", body = Client),
        (status = 409, description = "Nome já em uso")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_client(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Json(payload): Json<ClientPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let client = app_state.tenancy_service.create_client(&principal, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

#[utoipa::path(
    patch,
    path = "/clients/{id}",
    tag = "Tenancy",
    params(("id" = Uuid, Path, description = "ID do cliente")),
    request_body = ClientPayload,
    responses(
        (status = 200, description = "Cliente atualizado", body = Client)
    ),
    security(("api_jwt" = []))
)]
pub async fn update_client(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ClientPayload>,
) -> Result<Json<Client>, AppError> {
    payload.validate()?;
    Ok(Json(app_state.tenancy_service.update_client(&principal, id, &payload.name).await?))
}

#[utoipa::path(
    delete,
    path = "/clients/{id}",
    tag = "Tenancy",
    params(("id" = Uuid, Path, description = "ID do cliente")),
    responses(
        (status = 204, description = "Cliente removido")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_client(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    app_state.tenancy_service.delete_client(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---
// Projetos
// ---

#[utoipa::path(
    get,
    path = "/projects",
    tag = "Tenancy",
    responses(
        (status = 200, description = "Projetos do usuário (todos para administradores)", body = Vec<Project>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_projects(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
) -> Result<Json<Vec<Project>>, AppError> {
    Ok(Json(app_state.tenancy_service.list_projects(&principal).await?))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "Tenancy",
    params(("id" = Uuid, Path, description = "ID do projeto")),
    responses(
        (status = 200, description = "Projeto", body = Project),
        (status = 403, description = "Sem acesso (não revela se existe)")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_project(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(app_state.tenancy_service.get_project(&principal, id).await?))
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Tenancy",
    request_body = CreateProjectPayload,
    responses(
        (status = 201, description = "Projeto criado", body = Project)
    ),
    security(("api_jwt" = []))
)]
pub async fn create_project(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Json(payload): Json<CreateProjectPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let project = app_state.tenancy_service.create_project(&principal, &payload).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    patch,
    path = "/projects/{id}",
    tag = "Tenancy",
    params(("id" = Uuid, Path, description = "ID do projeto")),
    request_body = UpdateProjectPayload,
    responses(
        (status = 200, description = "Projeto atualizado", body = Project)
    ),
    security(("api_jwt" = []))
)]
pub async fn update_project(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProjectPayload>,
) -> Result<Json<Project>, AppError> {
    payload.validate()?;
    Ok(Json(app_state.tenancy_service.update_project(&principal, id, &payload).await?))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}",
    tag = "Tenancy",
    params(("id" = Uuid, Path, description = "ID do projeto")),
    responses(
        (status = 204, description = "Projeto removido")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_project(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    app_state.tenancy_service.delete_project(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---
// Vínculos do projeto
// ---

#[utoipa::path(
    post,
    path = "/projects/{id}/users/attach",
    tag = "Tenancy",
    params(("id" = Uuid, Path, description = "ID do projeto")),
    request_body = IdsPayload,
    responses(
        (status = 200, description = "Relatório do vínculo", body = AttachmentReport),
        (status = 403, description = "Apenas administradores")
    ),
    security(("api_jwt" = []))
)]
pub async fn attach_users(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<IdsPayload>,
) -> Result<Json<AttachmentReport>, AppError> {
    payload.validate()?;
    Ok(Json(app_state.tenancy_service.attach_users(&principal, id, &payload.ids).await?))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/users/detach",
    tag = "Tenancy",
    params(("id" = Uuid, Path, description = "ID do projeto")),
    request_body = IdsPayload,
    responses(
        (status = 200, description = "Relatório da remoção", body = DetachmentReport)
    ),
    security(("api_jwt" = []))
)]
pub async fn detach_users(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<IdsPayload>,
) -> Result<Json<DetachmentReport>, AppError> {
    payload.validate()?;
    Ok(Json(app_state.tenancy_service.detach_users(&principal, id, &payload.ids).await?))
}

#[utoipa::path(
    get,
    path = "/projects/{id}/bots",
    tag = "Tenancy",
    params(("id" = Uuid, Path, description = "ID do projeto")),
    responses(
        (status = 200, description = "Bots do projeto", body = Vec<AgentView>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_project_bots(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AgentView>>, AppError> {
    Ok(Json(app_state.tenancy_service.project_bots(&principal, id).await?))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/bots/attach",
    tag = "Tenancy",
    params(("id" = Uuid, Path, description = "ID do projeto")),
    request_body = IdsPayload,
    responses(
        (status = 200, description = "Relatório do vínculo", body = BotAttachmentReport)
    ),
    security(("api_jwt" = []))
)]
pub async fn attach_bots(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<IdsPayload>,
) -> Result<Json<BotAttachmentReport>, AppError> {
    payload.validate()?;
    Ok(Json(app_state.tenancy_service.attach_bots(&principal, id, &payload.ids).await?))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/bots/detach",
    tag = "Tenancy",
    params(("id" = Uuid, Path, description = "ID do projeto")),
    request_body = IdsPayload,
    responses(
        (status = 200, description = "Relatório da remoção", body = DetachmentReport)
    ),
    security(("api_jwt" = []))
)]
pub async fn detach_bots(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<IdsPayload>,
) -> Result<Json<DetachmentReport>, AppError> {
    payload.validate()?;
    Ok(Json(app_state.tenancy_service.detach_bots(&principal, id, &payload.ids).await?))
}

// ---
// Diretório de usuários
// ---

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses(
        (status = 200, description = "Usuários visíveis (todos para administradores)", body = Vec<User>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_users(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(app_state.tenancy_service.list_users(&principal).await?))
}
