// src/handlers/chat.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::{
        auth::DetailResponse,
        chat::{
            ChatSession, ChatSessionKeyPayload, CreateChatSessionPayload, CreateFavoritePayload,
            FavoriteFilter, FavoriteView, SearchPayload, SearchResponse,
        },
    },
};

#[utoipa::path(
    get,
    path = "/chat-session",
    tag = "Chat",
    responses(
        (status = 200, description = "As 6 sessões mais recentes do usuário", body = Vec<ChatSession>),
        (status = 401, description = "Não autenticado")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_sessions(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
) -> Result<Json<Vec<ChatSession>>, AppError> {
    Ok(Json(app_state.chat_service.recent_sessions(&principal).await?))
}

#[utoipa::path(
    post,
    path = "/chat-session",
    tag = "Chat",
    request_body = CreateChatSessionPayload,
    responses(
        (status = 201, description = "Sessão criada", body = ChatSession),
        (status = 400, description = "session_key ou agent_id ausente"),
        (status = 403, description = "Bot fora do escopo do usuário"),
        (status = 409, description = "Sessão já existe")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_session(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Json(payload): Json<CreateChatSessionPayload>,
) -> Result<impl IntoResponse, AppError> {
    let session = app_state.chat_service.create_session(&principal, &payload).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[utoipa::path(
    delete,
    path = "/chat-session",
    tag = "Chat",
    request_body = ChatSessionKeyPayload,
    responses(
        (status = 200, description = "Sessão removida", body = DetailResponse),
        (status = 404, description = "Sessão não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_session(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Json(payload): Json<ChatSessionKeyPayload>,
) -> Result<Json<DetailResponse>, AppError> {
    app_state.chat_service.delete_session(&principal, &payload).await?;
    Ok(Json(DetailResponse::new("Sessão removida.")))
}

#[utoipa::path(
    get,
    path = "/chat-favorites",
    tag = "Chat",
    params(FavoriteFilter),
    responses((status = 200, description = "Favoritos do usuário", body = Vec<FavoriteView>)),
    security(("api_jwt" = []))
)]
pub async fn list_favorites(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Query(filter): Query<FavoriteFilter>,
) -> Result<Json<Vec<FavoriteView>>, AppError> {
    Ok(Json(app_state.chat_service.favorites(&principal, &filter).await?))
}

#[utoipa::path(
    post,
    path = "/chat-favorites",
    tag = "Chat",
    request_body = CreateFavoritePayload,
    responses(
        (status = 201, description = "Favorito criado", body = FavoriteView),
        (status = 200, description = "Mensagem já era favorita", body = FavoriteView),
        (status = 404, description = "Sessão não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn add_favorite(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Json(payload): Json<CreateFavoritePayload>,
) -> Result<impl IntoResponse, AppError> {
    let (favorite, created) = app_state.chat_service.add_favorite(&principal, &payload).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(favorite)))
}

#[utoipa::path(
    delete,
    path = "/chat-favorites/{message_id}",
    tag = "Chat",
    params(("message_id" = String, Path, description = "ID da mensagem no frontend")),
    responses((status = 200, description = "Favorito removido", body = DetailResponse)),
    security(("api_jwt" = []))
)]
pub async fn remove_favorite(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Path(message_id): Path<String>,
) -> Result<Json<DetailResponse>, AppError> {
    app_state.chat_service.remove_favorite(&principal, &message_id).await?;
    Ok(Json(DetailResponse::new("Favorito removido.")))
}

#[utoipa::path(
    post,
    path = "/search",
    tag = "Chat",
    request_body = SearchPayload,
    responses(
        (status = 200, description = "Mensagens encontradas", body = SearchResponse),
        (status = 502, description = "n8n indisponível"),
        (status = 504, description = "n8n não respondeu a tempo")
    ),
    security(("api_jwt" = []))
)]
pub async fn search(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Json(payload): Json<SearchPayload>,
) -> Result<Json<SearchResponse>, AppError> {
    payload.validate()?;
    Ok(Json(app_state.chat_service.search(&principal, &payload.query).await?))
}
