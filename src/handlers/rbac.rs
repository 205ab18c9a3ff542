// src/handlers/rbac.rs

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        rbac::{AdminOnly, RequireRole},
    },
    models::rbac::{GroupNamePayload, UserGroupsResponse},
    services::rbac_service::role_options,
};

#[utoipa::path(
    get,
    path = "/roles",
    tag = "RBAC",
    responses(
        (status = 200, description = "Papéis disponíveis: {\"roles\": [{value, label}]}")
    )
)]
pub async fn list_roles() -> Json<Value> {
    Json(json!({ "roles": role_options() }))
}

#[utoipa::path(
    get,
    path = "/users/{user_id}/roles",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "ID do usuário")),
    responses(
        (status = 200, description = "Grupos do usuário", body = UserGroupsResponse),
        (status = 404, description = "Usuário não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn user_groups(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserGroupsResponse>, AppError> {
    Ok(Json(app_state.rbac_service.groups_of(user_id).await?))
}

#[utoipa::path(
    post,
    path = "/users/{user_id}/roles/add",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "ID do usuário")),
    request_body = GroupNamePayload,
    responses(
        (status = 200, description = "Usuário adicionado ao grupo", body = UserGroupsResponse),
        (status = 403, description = "Apenas administradores")
    ),
    security(("api_jwt" = []))
)]
pub async fn add_user_group(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<GroupNamePayload>,
) -> Result<Json<UserGroupsResponse>, AppError> {
    payload.validate()?;
    let groups = app_state
        .rbac_service
        .add_to_group(&principal, user_id, &payload.role)
        .await?;
    Ok(Json(groups))
}

#[utoipa::path(
    delete,
    path = "/users/{user_id}/roles/remove",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "ID do usuário")),
    request_body = GroupNamePayload,
    responses(
        (status = 200, description = "Usuário removido do grupo", body = UserGroupsResponse),
        (status = 404, description = "Grupo ou usuário não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn remove_user_group(
    State(app_state): State<AppState>,
    _guard: RequireRole<AdminOnly>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<GroupNamePayload>,
) -> Result<Json<UserGroupsResponse>, AppError> {
    payload.validate()?;
    let groups = app_state
        .rbac_service
        .remove_from_group(&principal, user_id, &payload.role)
        .await?;
    Ok(Json(groups))
}
