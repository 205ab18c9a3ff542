pub mod agent_repo;
pub mod chat_repo;
pub mod invite_repo;
pub mod kb_repo;
pub mod rbac_repo;
pub mod tenancy_repo;
pub mod token_repo;
pub mod user_repo;

pub use agent_repo::{AgentRepository, ExpertiseAreaRepository};
pub use chat_repo::ChatRepository;
pub use invite_repo::InviteRepository;
pub use kb_repo::KbLinkRepository;
pub use rbac_repo::GroupRepository;
pub use tenancy_repo::{ClientRepository, ProjectRepository};
pub use token_repo::PgTokenStore;
pub use user_repo::UserRepository;
