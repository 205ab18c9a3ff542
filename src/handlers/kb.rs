// src/handlers/kb.rs

//! Proxy das bases de conhecimento (n8n). Cada rota passa pela política de
//! acesso no serviço antes de qualquer chamada externa.

use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes as RawBody, // alias: utoipa não implementa ToSchema para `Bytes`
    extract::{Multipart, Query, State},
};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{AppError, AppResult},
    config::AppState,
    middleware::{auth::AuthenticatedUser, tenancy::ProjectScope},
    models::kb::{HashIdQuery, KbAttachPayload, KbAttachResponse, KbCreatePayload, KbEditPayload, UploadedFile},
    services::gateway::UpstreamResponse,
};

fn required(value: Option<String>, name: &str) -> AppResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("Parâmetro '{name}' é obrigatório.")))
}

// Alguns clientes mandam os parâmetros no corpo JSON, mesmo em GET/DELETE.
fn body_field(body: &RawBody, key: &str) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn hash_id_of(query: HashIdQuery, body: &RawBody) -> AppResult<String> {
    required(query.hash_id.or_else(|| body_field(body, "hash_id")), "hash_id")
}

#[derive(Debug, Default)]
struct KbForm {
    fields: HashMap<String, String>,
    file: Option<UploadedFile>,
}

impl KbForm {
    fn take(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    fn take_file(&mut self) -> AppResult<UploadedFile> {
        self.file
            .take()
            .ok_or_else(|| AppError::BadRequest("Arquivo 'file' é obrigatório.".into()))
    }
}

async fn read_form(mut multipart: Multipart) -> AppResult<KbForm> {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        AppError::BadRequest(format!("Formulário multipart inválido: {}", e.body_text()))
    };

    let mut form = KbForm::default();
    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.map_err(invalid)?;
            form.file = Some(UploadedFile { file_name, content_type, bytes: bytes.to_vec() });
        } else {
            let text = field.text().await.map_err(invalid)?;
            form.fields.insert(name, text);
        }
    }
    Ok(form)
}

#[utoipa::path(
    get,
    path = "/kb/get",
    tag = "KB",
    params(HashIdQuery),
    responses(
        (status = 200, description = "Resposta repassada do n8n"),
        (status = 403, description = "KB fora do escopo do usuário"),
        (status = 502, description = "n8n indisponível")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_kb(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Query(query): Query<HashIdQuery>,
    body: RawBody,
) -> AppResult<UpstreamResponse> {
    let hash_id = hash_id_of(query, &body)?;
    app_state.kb_service.get(&principal, &hash_id).await
}

#[utoipa::path(
    get,
    path = "/kb/file/list",
    tag = "KB",
    params(HashIdQuery),
    responses(
        (status = 200, description = "Resposta repassada do n8n"),
        (status = 403, description = "KB fora do escopo do usuário")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_files(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Query(query): Query<HashIdQuery>,
    body: RawBody,
) -> AppResult<UpstreamResponse> {
    let hash_id = hash_id_of(query, &body)?;
    app_state.kb_service.list_files(&principal, &hash_id).await
}

#[utoipa::path(
    post,
    path = "/kb/create",
    tag = "KB",
    request_body = KbCreatePayload,
    responses(
        (status = 200, description = "Resposta repassada do n8n"),
        (status = 403, description = "Sem acesso ao projeto")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_kb(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Json(payload): Json<KbCreatePayload>,
) -> AppResult<UpstreamResponse> {
    payload.validate()?;
    app_state.kb_service.create(&principal, &payload).await
}

#[utoipa::path(
    patch,
    path = "/kb/edit",
    tag = "KB",
    request_body = KbEditPayload,
    responses((status = 200, description = "Resposta repassada do n8n")),
    security(("api_jwt" = []))
)]
pub async fn edit_kb(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Json(payload): Json<KbEditPayload>,
) -> AppResult<UpstreamResponse> {
    required(Some(payload.hash_id.clone()), "hash_id")?;
    app_state.kb_service.edit(&principal, &payload).await
}

#[utoipa::path(
    delete,
    path = "/kb/delete",
    tag = "KB",
    params(HashIdQuery),
    responses((status = 200, description = "Resposta repassada do n8n")),
    security(("api_jwt" = []))
)]
pub async fn delete_kb(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Query(query): Query<HashIdQuery>,
    body: RawBody,
) -> AppResult<UpstreamResponse> {
    let hash_id = hash_id_of(query, &body)?;
    app_state.kb_service.delete(&principal, &hash_id).await
}

/// Multipart: `hash_id` + `file`.
#[utoipa::path(
    post,
    path = "/kb/file/add",
    tag = "KB",
    responses(
        (status = 200, description = "Resposta repassada do n8n"),
        (status = 400, description = "hash_id ou arquivo ausente")
    ),
    security(("api_jwt" = []))
)]
pub async fn add_file(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<UpstreamResponse> {
    let mut form = read_form(multipart).await?;
    let hash_id = required(form.take("hash_id"), "hash_id")?;
    let file = form.take_file()?;
    app_state.kb_service.add_file(&principal, &hash_id, &file).await
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct FileDeleteQuery {
    hash_id: Option<String>,
    file: Option<String>,
}

#[utoipa::path(
    delete,
    path = "/kb/file/delete",
    tag = "KB",
    params(FileDeleteQuery),
    responses((status = 200, description = "Resposta repassada do n8n")),
    security(("api_jwt" = []))
)]
pub async fn delete_file(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    Query(query): Query<FileDeleteQuery>,
    body: RawBody,
) -> AppResult<UpstreamResponse> {
    let hash_id = required(query.hash_id.or_else(|| body_field(&body, "hash_id")), "hash_id")?;
    let file = required(query.file.or_else(|| body_field(&body, "file")), "file")?;
    app_state.kb_service.delete_file(&principal, &hash_id, &file).await
}

#[utoipa::path(
    get,
    path = "/kb/list-all",
    tag = "KB",
    params(("project_id" = Uuid, Query, description = "Projeto")),
    responses((status = 200, description = "Resposta repassada do n8n")),
    security(("api_jwt" = []))
)]
pub async fn list_all(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    ProjectScope(project_id): ProjectScope,
) -> AppResult<UpstreamResponse> {
    app_state.kb_service.list_all(&principal, project_id).await
}

/// Multipart: `hash_id`, `project_id`, `old_file` (opcional) e `file`.
#[utoipa::path(
    patch,
    path = "/kb/file/update",
    tag = "KB",
    responses(
        (status = 200, description = "Resposta repassada do n8n"),
        (status = 502, description = "n8n indisponível")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_file(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<UpstreamResponse> {
    let mut form = read_form(multipart).await?;
    let hash_id = required(form.take("hash_id"), "hash_id")?;
    let project_id = required(form.take("project_id"), "project_id")?;
    let project_id = Uuid::parse_str(&project_id)
        .map_err(|_| AppError::BadRequest("project_id inválido.".into()))?;
    let old_file = form.take("old_file");
    let file = form.take_file()?;

    app_state
        .kb_service
        .update_file(&principal, project_id, &hash_id, old_file, &file)
        .await
}

#[utoipa::path(
    post,
    path = "/kb/attach",
    tag = "KB",
    params(("project_id" = Uuid, Query, description = "Projeto")),
    request_body = KbAttachPayload,
    responses(
        (status = 200, description = "KB vinculada ao projeto", body = KbAttachResponse),
        (status = 403, description = "Sem acesso ao projeto")
    ),
    security(("api_jwt" = []))
)]
pub async fn attach_kb(
    State(app_state): State<AppState>,
    AuthenticatedUser { principal, .. }: AuthenticatedUser,
    ProjectScope(project_id): ProjectScope,
    Json(payload): Json<KbAttachPayload>,
) -> AppResult<Json<KbAttachResponse>> {
    payload.validate()?;
    let name = if payload.name.trim().is_empty() { payload.hash_id.as_str() } else { payload.name.trim() };
    let response = app_state
        .kb_service
        .attach(&principal, project_id, payload.hash_id.trim(), name)
        .await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_wins_over_body_for_hash_id() {
        let body = RawBody::from_static(br#"{"hash_id":"do-corpo"}"#);
        let from_query = hash_id_of(HashIdQuery { hash_id: Some("da-query".into()) }, &body).unwrap();
        assert_eq!(from_query, "da-query");
        assert_eq!(hash_id_of(HashIdQuery { hash_id: None }, &body).unwrap(), "do-corpo");
    }

    #[test]
    fn blank_hash_id_is_rejected() {
        let result = hash_id_of(HashIdQuery { hash_id: Some("  ".into()) }, &RawBody::new());
        assert!(matches!(result, Err(AppError::BadRequest(msg)) if msg.contains("hash_id")));
        assert!(hash_id_of(HashIdQuery { hash_id: None }, &RawBody::from_static(b"lixo")).is_err());
    }

    #[test]
    fn numeric_body_fields_are_stringified() {
        let body = RawBody::from_static(br#"{"file": 42, "hash_id": null}"#);
        assert_eq!(body_field(&body, "file").as_deref(), Some("42"));
        assert_eq!(body_field(&body, "hash_id"), None);
    }
}
