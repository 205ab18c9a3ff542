pub mod agent_service;
pub mod auth;
pub mod chat_service;
pub mod gateway;
pub mod invite_service;
pub mod kb_service;
pub mod mailer;
pub mod policy;
pub mod rbac_service;
pub mod tenancy_service;
pub mod tokens;
