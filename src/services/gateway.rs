// src/services/gateway.rs

//! Cliente do motor de workflows (n8n). Apenas repassa chamadas e traduz
//! falhas de transporte; o acesso é decidido antes, pelo serviço de KB.

use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use reqwest::{
    Method,
    multipart::{Form, Part},
};
use serde_json::{Value, json};

use crate::{
    common::error::{AppError, AppResult},
    models::kb::UploadedFile,
};

/// Resposta do upstream repassada ao chamador (status + corpo JSON).
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// Corpos que não são JSON voltam embrulhados em `{"raw": ...}`.
fn parse_body(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text }))
}

fn map_transport_error(path: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        tracing::warn!(%path, "Timeout ao chamar o n8n");
        return AppError::UpstreamTimeout;
    }
    tracing::error!(%path, error = %e, connect = e.is_connect(), "Falha ao chamar o n8n");
    AppError::UpstreamUnavailable(e.to_string())
}

#[derive(Clone)]
pub struct WorkflowGateway {
    client: reqwest::Client,
    base_url: Option<String>,
    kb_key: Option<String>,
}

impl WorkflowGateway {
    pub fn new(base_url: Option<String>, kb_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.filter(|u| !u.trim().is_empty()),
            kb_key: kb_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn endpoint(&self, path: &str) -> AppResult<(String, &str)> {
        match (self.base_url.as_deref(), self.kb_key.as_deref()) {
            (Some(base), Some(key)) => Ok((format!("{}{}", base.trim_end_matches('/'), path), key)),
            _ => Err(AppError::InternalServerError(anyhow::anyhow!(
                "Configuração do n8n ausente (N8N_BASE_URL/N8N_KB_KEY)"
            ))),
        }
    }

    async fn read(path: &str, response: reqwest::Response) -> AppResult<UpstreamResponse> {
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let text = response
            .text()
            .await
            .map_err(|e| map_transport_error(path, e))?;
        if !status.is_success() {
            tracing::warn!(%path, status = status.as_u16(), "n8n respondeu com erro");
        }
        Ok(UpstreamResponse::new(status, parse_body(&text)))
    }

    /// Chamada JSON. GETs também levam corpo, como o n8n espera.
    pub async fn send_json(&self, method: Method, path: &str, payload: Option<&Value>) -> AppResult<UpstreamResponse> {
        let (url, key) = self.endpoint(path)?;
        let mut request = self.client.request(method, &url).header("key", key);
        if let Some(payload) = payload {
            request = request.json(payload);
        }
        let response = request.send().await.map_err(|e| map_transport_error(path, e))?;
        Self::read(path, response).await
    }

    /// Upload multipart: campo `file` + `hash_id`.
    pub async fn send_file(&self, path: &str, hash_id: &str, file: &UploadedFile) -> AppResult<UpstreamResponse> {
        let (url, key) = self.endpoint(path)?;
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(|_| AppError::BadRequest("Tipo de arquivo inválido.".into()))?;
        let form = Form::new().text("hash_id", hash_id.to_string()).part("file", part);

        let response = self
            .client
            .post(&url)
            .header("key", key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| map_transport_error(path, e))?;
        Self::read(path, response).await
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, routing::get};
    use tokio::net::TcpListener;

    use super::*;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn gateway(base: &str, timeout: Duration) -> WorkflowGateway {
        WorkflowGateway::new(Some(base.to_string()), Some("segredo".into()), timeout).unwrap()
    }

    #[test]
    fn non_json_bodies_are_wrapped() {
        assert_eq!(parse_body("oops"), json!({ "raw": "oops" }));
        assert_eq!(parse_body(r#"{"ok":true}"#), json!({ "ok": true }));
    }

    #[tokio::test]
    async fn missing_configuration_is_an_internal_error() {
        let gw = WorkflowGateway::new(None, Some("k".into()), Duration::from_secs(1)).unwrap();
        let result = gw.send_json(Method::GET, "/webhook/kb/get/", None).await;
        assert!(matches!(result, Err(AppError::InternalServerError(_))));
    }

    #[tokio::test]
    async fn status_and_body_pass_through_with_key_header() {
        let router = Router::new().route(
            "/webhook/kb/get/",
            get(|headers: axum::http::HeaderMap| async move {
                let key = headers.get("key").and_then(|v| v.to_str().ok()).unwrap_or("").to_string();
                (StatusCode::IM_A_TEAPOT, Json(json!({ "key": key })))
            }),
        );
        let base = serve(router).await;

        let response = gateway(&base, Duration::from_secs(5))
            .send_json(Method::GET, "/webhook/kb/get/", Some(&json!({ "hash_id": "h1" })))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
        assert_eq!(response.body["key"], "segredo");
    }

    #[tokio::test]
    async fn slow_upstream_maps_to_timeout() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "tarde demais"
            }),
        );
        let base = serve(router).await;

        let result = gateway(&base, Duration::from_millis(100))
            .send_json(Method::GET, "/slow", None)
            .await;
        assert!(matches!(result, Err(AppError::UpstreamTimeout)));
    }

    #[tokio::test]
    async fn refused_connection_maps_to_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = gateway(&format!("http://{addr}"), Duration::from_secs(2))
            .send_json(Method::GET, "/webhook/kb/list-all", None)
            .await;
        assert!(matches!(result, Err(AppError::UpstreamUnavailable(_))));
    }
}
