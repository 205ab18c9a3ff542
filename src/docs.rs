// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Auth ---
        handlers::auth::login,
        handlers::auth::signup,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::forgot_password,
        handlers::auth::reset_password,
        handlers::auth::login_as,
        handlers::auth::verify_token,
        handlers::health::db_health,

        // --- Users ---
        handlers::auth::get_me,
        handlers::auth::update_me,
        handlers::tenancy::list_users,

        // --- Invites ---
        handlers::invite::create_invite,
        handlers::invite::confirm_invite,

        // --- RBAC ---
        handlers::rbac::list_roles,
        handlers::rbac::user_groups,
        handlers::rbac::add_user_group,
        handlers::rbac::remove_user_group,

        // --- Tenancy ---
        handlers::tenancy::list_clients,
        handlers::tenancy::get_client,
        handlers::tenancy::create_client,
        handlers::tenancy::update_client,
        handlers::tenancy::delete_client,
        handlers::tenancy::list_projects,
        handlers::tenancy::get_project,
        handlers::tenancy::create_project,
        handlers::tenancy::update_project,
        handlers::tenancy::delete_project,
        handlers::tenancy::attach_users,
        handlers::tenancy::detach_users,
        handlers::tenancy::list_project_bots,
        handlers::tenancy::attach_bots,
        handlers::tenancy::detach_bots,

        // --- Agents ---
        handlers::agents::list_bots,
        handlers::agents::get_bot,
        handlers::agents::create_bot,
        handlers::agents::update_bot,
        handlers::agents::set_bot_expertise,
        handlers::agents::delete_bot,
        handlers::agents::list_expertise_areas,
        handlers::agents::create_expertise_area,

        // --- KB ---
        handlers::kb::get_kb,
        handlers::kb::list_files,
        handlers::kb::create_kb,
        handlers::kb::edit_kb,
        handlers::kb::delete_kb,
        handlers::kb::add_file,
        handlers::kb::delete_file,
        handlers::kb::list_all,
        handlers::kb::update_file,
        handlers::kb::attach_kb,

        // --- Chat ---
        handlers::chat::list_sessions,
        handlers::chat::create_session,
        handlers::chat::delete_session,
        handlers::chat::list_favorites,
        handlers::chat::add_favorite,
        handlers::chat::remove_favorite,
        handlers::chat::search,
    ),
    components(
        schemas(
            // --- Auth ---
            models::auth::Role,
            models::auth::User,
            models::auth::LoginUserPayload,
            models::auth::RegisterUserPayload,
            models::auth::UpdateProfilePayload,
            models::auth::AuthResponse,
            models::auth::SignupResponse,
            models::auth::RefreshPayload,
            models::auth::ForgotPasswordPayload,
            models::auth::ResetPasswordPayload,
            models::auth::DetailResponse,
            models::auth::VerifyTokenPayload,
            models::auth::VerifyTokenResponse,

            // --- Invites ---
            models::invite::Invite,
            models::invite::CreateInvitePayload,
            models::invite::ConfirmInvitePayload,
            models::invite::InviteCreatedResponse,

            // --- RBAC ---
            models::rbac::Group,
            models::rbac::GroupNamePayload,
            models::rbac::UserGroupsResponse,
            models::rbac::RoleOption,

            // --- Tenancy ---
            models::tenancy::Client,
            models::tenancy::ClientSummary,
            models::tenancy::ClientPayload,
            models::tenancy::Project,
            models::tenancy::CreateProjectPayload,
            models::tenancy::UpdateProjectPayload,
            models::tenancy::IdsPayload,
            models::tenancy::AttachmentReport,
            models::tenancy::DetachmentReport,
            models::tenancy::BotAttachmentReport,

            // --- Agents ---
            models::agents::Agent,
            models::agents::AgentView,
            models::agents::CreateAgentPayload,
            models::agents::UpdateAgentPayload,
            models::agents::AssignExpertisePayload,
            models::agents::ExpertiseArea,
            models::agents::CreateExpertiseAreaPayload,

            // --- KB ---
            models::kb::KbLink,
            models::kb::KbCreatePayload,
            models::kb::KbEditPayload,
            models::kb::KbAttachPayload,
            models::kb::KbAttachResponse,

            // --- Chat ---
            models::chat::ChatSession,
            models::chat::CreateChatSessionPayload,
            models::chat::ChatSessionKeyPayload,
            models::chat::FavoriteView,
            models::chat::CreateFavoritePayload,
            models::chat::SearchPayload,
            models::chat::SearchHit,
            models::chat::SearchResponse,
        )
    ),
    tags(
        (name = "Auth", description = "Autenticação, tokens e recuperação de senha"),
        (name = "Users", description = "Perfil e diretório de usuários"),
        (name = "Invites", description = "Convites para projetos"),
        (name = "RBAC", description = "Papéis e grupos de usuários"),
        (name = "Tenancy", description = "Clientes, projetos e vínculos"),
        (name = "Agents", description = "Bots e áreas de especialidade"),
        (name = "KB", description = "Proxy das bases de conhecimento (n8n)"),
        (name = "Chat", description = "Sessões, favoritos e busca no histórico"),
        (name = "Health", description = "Verificações de saúde")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
