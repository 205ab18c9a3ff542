//src/main.rs

use anyhow::Context;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::{AppState, Settings};
use crate::docs::ApiDoc;
use crate::middleware::auth::auth_guard;

// Uploads de arquivos da KB passam do limite padrão do axum (2 MB).
const KB_UPLOAD_LIMIT: usize = 50 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let settings = Settings::from_env()?;
    let bind_addr = settings.bind_addr.clone();
    let app_state = AppState::new(settings).await?;

    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .context("Falha ao rodar as migrações do banco de dados.")?;
    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Falha ao iniciar o listener TCP em {bind_addr}"))?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);

    axum::serve(listener, app(app_state))
        .await
        .context("Erro no servidor Axum")?;
    Ok(())
}

/// Monta o router completo: rotas públicas, rotas protegidas pelo
/// `auth_guard` e a documentação.
pub fn app(app_state: AppState) -> Router {
    // Credenciais e fluxos que carregam a própria autenticação
    let public_routes = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/health/db", get(handlers::health::db_health))
        .route("/login", post(handlers::auth::login))
        .route("/create", post(handlers::auth::signup))
        .route("/refresh", post(handlers::auth::refresh))
        .route("/logout", post(handlers::auth::logout))
        .route("/verify-token", post(handlers::auth::verify_token))
        .route("/roles", get(handlers::rbac::list_roles))
        .route("/password/forgot", post(handlers::auth::forgot_password))
        .route("/password/reset", post(handlers::auth::reset_password))
        .route(
            "/invite/confirm",
            post(handlers::invite::confirm_invite).get(handlers::invite::confirm_invite_page),
        );

    let user_routes = Router::new()
        .route("/me", get(handlers::auth::get_me).patch(handlers::auth::update_me))
        .route("/me/update", patch(handlers::auth::update_me))
        .route("/users", get(handlers::tenancy::list_users))
        .route("/users/{user_id}/roles", get(handlers::rbac::user_groups))
        .route("/users/{user_id}/roles/add", post(handlers::rbac::add_user_group))
        .route("/users/{user_id}/roles/remove", delete(handlers::rbac::remove_user_group))
        .route("/invite", post(handlers::invite::create_invite))
        .route("/login-as/{user_id}", get(handlers::auth::login_as));

    let chat_routes = Router::new()
        .route(
            "/chat-session",
            get(handlers::chat::list_sessions)
                .post(handlers::chat::create_session)
                .delete(handlers::chat::delete_session),
        )
        .route(
            "/chat-favorites",
            get(handlers::chat::list_favorites).post(handlers::chat::add_favorite),
        )
        .route("/chat-favorites/{message_id}", delete(handlers::chat::remove_favorite))
        .route("/search", post(handlers::chat::search));

    let directory_routes = Router::new()
        .route(
            "/clients",
            get(handlers::tenancy::list_clients).post(handlers::tenancy::create_client),
        )
        .route(
            "/clients/{id}",
            get(handlers::tenancy::get_client)
                .patch(handlers::tenancy::update_client)
                .delete(handlers::tenancy::delete_client),
        )
        .route(
            "/projects",
            get(handlers::tenancy::list_projects).post(handlers::tenancy::create_project),
        )
        .route(
            "/projects/{id}",
            get(handlers::tenancy::get_project)
                .patch(handlers::tenancy::update_project)
                .delete(handlers::tenancy::delete_project),
        )
        .route("/projects/{id}/users/attach", post(handlers::tenancy::attach_users))
        .route("/projects/{id}/users/detach", post(handlers::tenancy::detach_users))
        .route("/projects/{id}/bots", get(handlers::tenancy::list_project_bots))
        .route("/projects/{id}/bots/attach", post(handlers::tenancy::attach_bots))
        .route("/projects/{id}/bots/detach", post(handlers::tenancy::detach_bots))
        .route("/bots", get(handlers::agents::list_bots).post(handlers::agents::create_bot))
        .route(
            "/bots/{id}",
            get(handlers::agents::get_bot)
                .patch(handlers::agents::update_bot)
                .delete(handlers::agents::delete_bot),
        )
        .route("/bots/{id}/expertise", patch(handlers::agents::set_bot_expertise))
        .route(
            "/expertise-areas",
            get(handlers::agents::list_expertise_areas).post(handlers::agents::create_expertise_area),
        );

    let kb_routes = Router::new()
        .route("/get", get(handlers::kb::get_kb))
        .route("/create", post(handlers::kb::create_kb))
        .route("/edit", patch(handlers::kb::edit_kb))
        .route("/delete", delete(handlers::kb::delete_kb))
        .route("/file/list", get(handlers::kb::list_files))
        .route("/files/list", get(handlers::kb::list_files))
        .route("/file/add", post(handlers::kb::add_file))
        .route("/file/delete", delete(handlers::kb::delete_file))
        .route("/file/update", patch(handlers::kb::update_file))
        .route("/attach", post(handlers::kb::attach_kb))
        .route("/list-all", get(handlers::kb::list_all))
        .layer(DefaultBodyLimit::max(KB_UPLOAD_LIMIT));

    let protected_routes = Router::new()
        .merge(user_routes)
        .merge(chat_routes)
        .merge(directory_routes)
        .nest("/kb", kb_routes)
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), auth_guard));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::testing,
        models::auth::{Role, User},
        services::tokens::memory::MemoryTokenStore,
    };

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn health_and_roles_are_public() {
        let app = app(testing::state(Arc::new(MemoryTokenStore::default())));

        let health = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let roles = app
            .oneshot(Request::builder().uri("/roles").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(roles.status(), StatusCode::OK);
        let body = json_body(roles).await;
        let values: Vec<&str> = body["roles"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|r| r["value"].as_str())
            .collect();
        assert!(values.contains(&"ADMINISTRATOR"));
        assert!(values.contains(&"USER"));
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let app = app(testing::state(Arc::new(MemoryTokenStore::default())));

        for uri in ["/me", "/projects", "/kb/get?hash_id=abc", "/login-as/00000000-0000-0000-0000-000000000001"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn garbage_bearer_token_is_rejected() {
        let app = app(testing::state(Arc::new(MemoryTokenStore::default())));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/me")
                    .header(header::AUTHORIZATION, "Bearer nao.e.um.jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_rotates_and_logout_blacklists() {
        let store = Arc::new(MemoryTokenStore::default());
        let state = testing::state(store.clone());
        let issued = state
            .auth_service
            .tokens()
            .issue(&User::sample("a@x.com", Role::User))
            .await
            .unwrap();
        let first_refresh = issued.refresh.unwrap();
        let app = app(state);

        let response = app
            .clone()
            .oneshot(post_json("/refresh", json!({ "refresh": first_refresh })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert!(cookies.iter().any(|c| c.starts_with("access=") && c.contains("HttpOnly")));
        let body = json_body(response).await;
        let rotated = body["refresh"].as_str().unwrap().to_string();
        assert_ne!(rotated, first_refresh);

        // O refresh antigo foi para a blacklist na rotação.
        let reused = app
            .clone()
            .oneshot(post_json("/refresh", json!({ "refresh": first_refresh })))
            .await
            .unwrap();
        assert_eq!(reused.status(), StatusCode::UNAUTHORIZED);

        let logout = app
            .clone()
            .oneshot(post_json("/logout", json!({ "refresh": rotated })))
            .await
            .unwrap();
        assert_eq!(logout.status(), StatusCode::OK);
        assert!(set_cookies(&logout).iter().any(|c| c.starts_with("refresh=")));
        assert_eq!(json_body(logout).await["detail"], "Logout realizado.");

        let after_logout = app
            .oneshot(post_json("/refresh", json!({ "refresh": rotated })))
            .await
            .unwrap();
        assert_eq!(after_logout.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_reads_the_cookie_when_the_body_is_empty() {
        let store = Arc::new(MemoryTokenStore::default());
        let state = testing::state(store);
        let issued = state
            .auth_service
            .tokens()
            .issue(&User::sample("b@x.com", Role::Manager))
            .await
            .unwrap();
        let app = app(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/refresh")
                    .header(header::COOKIE, format!("refresh={}", issued.refresh.unwrap()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let missing = app
            .oneshot(Request::builder().method("POST").uri("/refresh").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let app = app(testing::state(Arc::new(MemoryTokenStore::default())));
        let response = app
            .oneshot(Request::builder().uri("/api-docs/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let doc = json_body(response).await;
        assert!(doc["paths"]["/login"].is_object());
        assert!(doc["paths"]["/kb/attach"].is_object());
        assert!(doc["paths"]["/verify-token"].is_object());
        assert!(doc["paths"]["/chat-session"].is_object());
    }

    #[tokio::test]
    async fn verify_token_names_the_token_type() {
        let state = testing::state(Arc::new(MemoryTokenStore::default()));
        let issued = state
            .auth_service
            .tokens()
            .issue(&User::sample("v@x.com", Role::User))
            .await
            .unwrap();
        let app = app(state);

        let access = app
            .clone()
            .oneshot(post_json("/verify-token", json!({ "token": issued.access })))
            .await
            .unwrap();
        assert_eq!(access.status(), StatusCode::OK);
        assert_eq!(json_body(access).await, json!({ "valid": true, "token_type": "access" }));

        let refresh = app
            .clone()
            .oneshot(post_json("/verify-token", json!({ "token": issued.refresh.unwrap() })))
            .await
            .unwrap();
        assert_eq!(json_body(refresh).await["token_type"], "refresh");

        let garbage = app
            .clone()
            .oneshot(post_json("/verify-token", json!({ "token": "nao.e.um.jwt" })))
            .await
            .unwrap();
        assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);

        let missing = app.oneshot(post_json("/verify-token", json!({}))).await.unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn db_health_reports_an_unreachable_database() {
        let app = app(testing::state(Arc::new(MemoryTokenStore::default())));
        let response = app
            .oneshot(Request::builder().uri("/health/db").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["db"], "down");
    }

    #[tokio::test]
    async fn login_still_issues_both_tokens_when_tracking_fails() {
        let Some(pool) = testing::database().await else { return };
        let email = format!("degradado-{}@x.com", testing::tag());
        testing::user(&pool, &email, Role::User, None).await;
        let store = Arc::new(MemoryTokenStore::failing_records());
        let app = app(testing::state_with(pool, store.clone()));

        let response = app
            .oneshot(post_json("/login", json!({ "email": email, "password": testing::PASSWORD })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["access"].is_string());
        assert!(body["refresh"].is_string());
        assert!(store.outstanding.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn managers_cannot_invite_administrators_over_http() {
        let Some(pool) = testing::database().await else { return };
        let client = testing::client(&pool).await;
        let project = testing::project(&pool, client.id).await;
        let manager = testing::user(&pool, &format!("gerente-{}@x.com", testing::tag()), Role::Manager, Some(client.id)).await;
        testing::join(&pool, project.id, manager.id).await;
        let state = testing::state_with(pool, Arc::new(MemoryTokenStore::default()));
        let issued = state.auth_service.tokens().issue(&manager).await.unwrap();
        let app = app(state);

        let request = Request::builder()
            .method("POST")
            .uri("/invite")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", issued.access))
            .body(Body::from(
                json!({ "email": "novo-admin@x.com", "project_id": project.id, "role": "ADMINISTRATOR" }).to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
