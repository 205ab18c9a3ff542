pub mod agents;
pub mod auth;
pub mod chat;
pub mod invite;
pub mod kb;
pub mod rbac;
pub mod tenancy;
