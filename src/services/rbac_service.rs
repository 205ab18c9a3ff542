// src/services/rbac_service.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::{AppError, AppResult},
    db::{GroupRepository, UserRepository},
    models::{
        auth::Role,
        rbac::{RoleOption, UserGroupsResponse},
    },
    services::policy::{self, Principal},
};

/// A enumeração de papéis, como exposta em `GET /roles`.
pub fn role_options() -> Vec<RoleOption> {
    Role::ALL
        .iter()
        .map(|role| RoleOption { value: role.as_str(), label: role.as_str() })
        .collect()
}

#[derive(Clone)]
pub struct RbacService {
    group_repo: GroupRepository,
    user_repo: UserRepository,
    pool: PgPool,
}

impl RbacService {
    pub fn new(group_repo: GroupRepository, user_repo: UserRepository, pool: PgPool) -> Self {
        Self { group_repo, user_repo, pool }
    }

    async fn ensure_user(&self, user_id: Uuid) -> AppResult<()> {
        self.user_repo
            .find_by_id(user_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("Usuário não encontrado.".into()))
    }

    pub async fn groups_of(&self, user_id: Uuid) -> AppResult<UserGroupsResponse> {
        self.ensure_user(user_id).await?;
        let roles = self.group_repo.names_for_user(user_id).await?;
        Ok(UserGroupsResponse { user_id, roles })
    }

    /// Adiciona o usuário ao grupo, criando o grupo se preciso.
    pub async fn add_to_group(&self, principal: &Principal, user_id: Uuid, name: &str) -> AppResult<UserGroupsResponse> {
        policy::require_admin(principal)?;
        self.ensure_user(user_id).await?;

        // --- INÍCIO DA TRANSAÇÃO ---
        let mut tx = self.pool.begin().await?;
        let group = self.group_repo.find_or_create(&mut *tx, name.trim()).await?;
        self.group_repo.add_user(&mut *tx, user_id, group.id).await?;
        tx.commit().await?;
        // --- FIM DA TRANSAÇÃO ---

        tracing::info!(%user_id, group = %group.name, actor = %principal.user_id, "Usuário adicionado ao grupo");
        self.groups_of(user_id).await
    }

    pub async fn remove_from_group(&self, principal: &Principal, user_id: Uuid, name: &str) -> AppResult<UserGroupsResponse> {
        policy::require_admin(principal)?;
        self.ensure_user(user_id).await?;

        let group = self
            .group_repo
            .find_by_name(name.trim())
            .await?
            .ok_or_else(|| AppError::NotFound("Grupo não encontrado.".into()))?;
        self.group_repo.remove_user(user_id, group.id).await?;

        tracing::info!(%user_id, group = %group.name, actor = %principal.user_id, "Usuário removido do grupo");
        self.groups_of(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_options_mirror_the_enumeration() {
        let options = role_options();
        let values: Vec<&str> = options.iter().map(|o| o.value).collect();
        assert_eq!(values, vec!["ADMINISTRATOR", "MANAGER", "USER"]);
        assert!(options.iter().all(|o| o.value == o.label));
    }
}
