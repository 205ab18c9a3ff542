// src/services/policy.rs

//! Motor de decisão de acesso.
//!
//! Funções puras: recebem o principal já resolvido e o recurso alvo e
//! devolvem ALLOW/DENY. Nenhuma consulta ao banco acontece aqui; os serviços
//! carregam os vínculos necessários e chamam `decide` antes de expor dados.

use std::collections::{BTreeSet, HashSet};

use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        auth::Role,
        tenancy::{AttachmentReport, MemberCandidate},
    },
};

pub const MSG_PROJECT_DENIED: &str = "Você não tem acesso a este projeto.";
pub const MSG_KB_DENIED: &str = "Você não tem acesso a este KB.";
pub const MSG_CLIENT_DENIED: &str = "Você não tem acesso a este cliente.";
pub const MSG_AGENT_DENIED: &str = "Você não tem acesso a este bot.";
pub const MSG_ADMIN_ONLY: &str = "Apenas administradores podem realizar esta ação.";

/// A identidade autenticada, com os vínculos carregados uma vez por requisição.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
    pub is_superuser: bool,
    pub client_id: Option<Uuid>,
    pub project_ids: HashSet<Uuid>,
}

impl Principal {
    /// O único predicado de administrador do sistema.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator || self.is_superuser
    }

    pub fn is_member_of(&self, project_id: Uuid) -> bool {
        self.project_ids.contains(&project_id)
    }

    fn shares_any_project(&self, project_ids: &[Uuid]) -> bool {
        project_ids.iter().any(|id| self.project_ids.contains(id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Mutate,
}

#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Client(Uuid),
    Project(Uuid),
    // Projetos aos quais a KB está vinculada (vazio se a KB não existe).
    KnowledgeBase { linked_projects: &'a [Uuid] },
    Agent { project_ids: &'a [Uuid] },
    UserDirectory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    Project,
    KnowledgeBase,
    Client,
    Agent,
    AdminOnly,
}

impl Denial {
    pub fn message(&self) -> &'static str {
        match self {
            Denial::Unauthenticated => "Autenticação obrigatória.",
            Denial::Project => MSG_PROJECT_DENIED,
            Denial::KnowledgeBase => MSG_KB_DENIED,
            Denial::Client => MSG_CLIENT_DENIED,
            Denial::Agent => MSG_AGENT_DENIED,
            Denial::AdminOnly => MSG_ADMIN_ONLY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(Denial::Unauthenticated) => Err(AppError::Unauthenticated),
            Decision::Deny(denial) => Err(AppError::Forbidden(denial.message().to_string())),
        }
    }
}

fn allow_if(condition: bool, denial: Denial) -> Decision {
    if condition { Decision::Allow } else { Decision::Deny(denial) }
}

/// Regras avaliadas em ordem: anônimo nega, admin libera, depois vínculos.
pub fn decide(principal: Option<&Principal>, action: Action, resource: &Resource<'_>) -> Decision {
    let Some(principal) = principal else {
        return Decision::Deny(Denial::Unauthenticated);
    };

    if principal.is_admin() {
        return Decision::Allow;
    }

    match (resource, action) {
        (Resource::Client(client_id), Action::View) => {
            allow_if(principal.client_id == Some(*client_id), Denial::Client)
        }
        (Resource::Client(_), Action::Mutate) => Decision::Deny(Denial::AdminOnly),

        (Resource::Project(project_id), _) => {
            allow_if(principal.is_member_of(*project_id), Denial::Project)
        }

        (Resource::KnowledgeBase { linked_projects }, _) => {
            allow_if(principal.shares_any_project(linked_projects), Denial::KnowledgeBase)
        }

        (Resource::Agent { project_ids }, Action::View) => {
            allow_if(principal.shares_any_project(project_ids), Denial::Agent)
        }
        (Resource::Agent { .. }, Action::Mutate) => Decision::Deny(Denial::AdminOnly),

        (Resource::UserDirectory, Action::View) => Decision::Allow,
        (Resource::UserDirectory, Action::Mutate) => Decision::Deny(Denial::AdminOnly),
    }
}

/// Atalho para operações exclusivas de administradores.
pub fn require_admin(principal: &Principal) -> Result<(), AppError> {
    allow_if(principal.is_admin(), Denial::AdminOnly).into_result()
}

// ---
// Convites
// ---

/// Quem pode convidar, para qual projeto e concedendo qual papel.
///
/// Deve rodar antes de qualquer consulta ao projeto, para não revelar se ele
/// existe a um gerente que não participa dele.
pub fn authorize_invite(inviter: &Principal, project_id: Uuid, granted: Role) -> Result<(), AppError> {
    if inviter.is_admin() {
        return Ok(());
    }
    if inviter.role != Role::Manager {
        return Err(AppError::Forbidden(
            "Apenas administradores e gerentes podem enviar convites.".into(),
        ));
    }
    if !inviter.is_member_of(project_id) {
        return Err(AppError::Forbidden(MSG_PROJECT_DENIED.into()));
    }
    if granted == Role::Administrator {
        return Err(AppError::Forbidden(
            "Gerentes não podem convidar um ADMINISTRATOR.".into(),
        ));
    }
    Ok(())
}

/// O cliente do convite: sempre o do projeto para gerentes; administradores
/// podem informar um, desde que coincida com o do projeto.
pub fn resolve_invite_client(
    inviter: &Principal,
    project_client_id: Uuid,
    requested: Option<Uuid>,
) -> Result<Uuid, AppError> {
    match requested {
        Some(client_id) if inviter.is_admin() && client_id != project_client_id => Err(
            AppError::BadRequest("O client_id não corresponde ao cliente do projeto.".into()),
        ),
        _ => Ok(project_client_id),
    }
}

// ---
// Vínculo usuário <-> projeto
// ---

/// Classifica os IDs pedidos em anexados, já anexados, inexistentes e
/// rejeitados por pertencerem a outro cliente.
///
/// A regra de cliente cruzado só vale quando os dois lados têm cliente.
pub fn partition_attachment(
    project_client_id: Option<Uuid>,
    requested: &[Uuid],
    found: &[MemberCandidate],
    existing: &HashSet<Uuid>,
) -> AttachmentReport {
    let mut report = AttachmentReport::default();
    let mut seen = BTreeSet::new();

    for id in requested.iter().copied() {
        if !seen.insert(id) {
            continue;
        }
        let Some(candidate) = found.iter().find(|c| c.id == id) else {
            report.missing.push(id);
            continue;
        };
        if existing.contains(&id) {
            report.already_attached.push(id);
            continue;
        }
        match (candidate.client_id, project_client_id) {
            (Some(user_client), Some(project_client)) if user_client != project_client => {
                report.rejected_cross_client.push(id);
            }
            _ => report.attached_now.push(id),
        }
    }

    report
}

// ---
// Nomes livres para convites
// ---

/// Primeiro alias livre para um e-mail obsoleto: `+EXPIRED`, `+EXPIRED1`, ...
pub fn pick_expired_alias(email: &str, taken: &HashSet<String>) -> String {
    let base = format!("{email}+EXPIRED");
    if !taken.contains(&base.to_lowercase()) {
        return base;
    }
    (1..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !taken.contains(&candidate.to_lowercase()))
        .unwrap_or(base)
}

/// Username do placeholder: a parte local do e-mail, depois `local1`, `local2`, ...
pub fn pick_username(email: &str, taken: &HashSet<String>) -> String {
    let local = email.split('@').next().unwrap_or(email);
    let base = if local.is_empty() { "user" } else { local };
    if !taken.contains(&base.to_lowercase()) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !taken.contains(&candidate.to_lowercase()))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role, projects: &[Uuid]) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            role,
            is_superuser: false,
            client_id: Some(Uuid::new_v4()),
            project_ids: projects.iter().copied().collect(),
        }
    }

    #[test]
    fn anonymous_is_denied_everything() {
        let decision = decide(None, Action::View, &Resource::UserDirectory);
        assert_eq!(decision, Decision::Deny(Denial::Unauthenticated));
        assert!(matches!(decision.into_result(), Err(AppError::Unauthenticated)));
    }

    #[test]
    fn admin_and_superuser_bypass_every_resource() {
        let admin = principal(Role::Administrator, &[]);
        let mut superuser = principal(Role::User, &[]);
        superuser.is_superuser = true;
        let project = Uuid::new_v4();

        for who in [&admin, &superuser] {
            for action in [Action::View, Action::Mutate] {
                for resource in [
                    Resource::Client(Uuid::new_v4()),
                    Resource::Project(project),
                    Resource::KnowledgeBase { linked_projects: &[] },
                    Resource::Agent { project_ids: &[] },
                    Resource::UserDirectory,
                ] {
                    assert!(decide(Some(who), action, &resource).is_allowed());
                }
            }
        }
    }

    #[test]
    fn non_member_cannot_tell_missing_project_from_foreign_project() {
        let mine = Uuid::new_v4();
        let user = principal(Role::Manager, &[mine]);

        let foreign = decide(Some(&user), Action::View, &Resource::Project(Uuid::new_v4()));
        let missing = decide(Some(&user), Action::View, &Resource::Project(Uuid::nil()));
        assert_eq!(foreign, missing);

        match foreign.into_result() {
            Err(AppError::Forbidden(msg)) => assert_eq!(msg, MSG_PROJECT_DENIED),
            other => panic!("esperava Forbidden, veio {other:?}"),
        }
        assert!(decide(Some(&user), Action::Mutate, &Resource::Project(mine)).is_allowed());
    }

    #[test]
    fn kb_access_follows_any_linked_project() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let user = principal(Role::User, &[p2]);

        let linked = [p1, p2];
        assert!(decide(Some(&user), Action::View, &Resource::KnowledgeBase { linked_projects: &linked }).is_allowed());

        let only_p1 = [p1];
        let denied = decide(Some(&user), Action::View, &Resource::KnowledgeBase { linked_projects: &only_p1 });
        let unknown = decide(Some(&user), Action::View, &Resource::KnowledgeBase { linked_projects: &[] });
        assert_eq!(denied, Decision::Deny(Denial::KnowledgeBase));
        assert_eq!(denied, unknown);
    }

    #[test]
    fn clients_are_visible_only_to_their_own_users() {
        let user = principal(Role::User, &[]);
        let own = user.client_id.unwrap();
        assert!(decide(Some(&user), Action::View, &Resource::Client(own)).is_allowed());
        assert!(!decide(Some(&user), Action::View, &Resource::Client(Uuid::new_v4())).is_allowed());
        assert_eq!(
            decide(Some(&user), Action::Mutate, &Resource::Client(own)),
            Decision::Deny(Denial::AdminOnly)
        );
    }

    #[test]
    fn bot_mutation_is_admin_only_even_for_members() {
        let project = Uuid::new_v4();
        let manager = principal(Role::Manager, &[project]);
        let projects = [project];
        let bot = Resource::Agent { project_ids: &projects };

        assert!(decide(Some(&manager), Action::View, &bot).is_allowed());
        assert_eq!(decide(Some(&manager), Action::Mutate, &bot), Decision::Deny(Denial::AdminOnly));
        assert!(require_admin(&manager).is_err());
    }

    #[test]
    fn manager_cannot_grant_administrator() {
        let project = Uuid::new_v4();
        let manager = principal(Role::Manager, &[project]);

        assert!(authorize_invite(&manager, project, Role::User).is_ok());
        assert!(matches!(
            authorize_invite(&manager, project, Role::Administrator),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            authorize_invite(&manager, Uuid::new_v4(), Role::User),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn plain_users_cannot_invite() {
        let project = Uuid::new_v4();
        let user = principal(Role::User, &[project]);
        assert!(authorize_invite(&user, project, Role::User).is_err());

        let admin = principal(Role::Administrator, &[]);
        assert!(authorize_invite(&admin, project, Role::Administrator).is_ok());
    }

    #[test]
    fn invite_client_is_inferred_or_validated() {
        let project_client = Uuid::new_v4();
        let admin = principal(Role::Administrator, &[]);
        let manager = principal(Role::Manager, &[]);

        assert_eq!(resolve_invite_client(&admin, project_client, None).unwrap(), project_client);
        assert_eq!(
            resolve_invite_client(&admin, project_client, Some(project_client)).unwrap(),
            project_client
        );
        assert!(matches!(
            resolve_invite_client(&admin, project_client, Some(Uuid::new_v4())),
            Err(AppError::BadRequest(_))
        ));
        // O valor enviado por um gerente é ignorado.
        assert_eq!(
            resolve_invite_client(&manager, project_client, Some(Uuid::new_v4())).unwrap(),
            project_client
        );
    }

    #[test]
    fn attachment_reports_all_four_buckets() {
        let client_a = Uuid::new_v4();
        let client_b = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        let member = Uuid::new_v4();
        let foreign = Uuid::new_v4();
        let clientless = Uuid::new_v4();
        let ghost = Uuid::new_v4();

        let found = [
            MemberCandidate { id: fresh, client_id: Some(client_b) },
            MemberCandidate { id: member, client_id: Some(client_b) },
            MemberCandidate { id: foreign, client_id: Some(client_a) },
            MemberCandidate { id: clientless, client_id: None },
        ];
        let existing: HashSet<Uuid> = [member].into_iter().collect();
        let requested = [fresh, member, foreign, clientless, ghost, fresh];

        let report = partition_attachment(Some(client_b), &requested, &found, &existing);
        assert_eq!(report.attached_now, vec![fresh, clientless]);
        assert_eq!(report.already_attached, vec![member]);
        assert_eq!(report.rejected_cross_client, vec![foreign]);
        assert_eq!(report.missing, vec![ghost]);
    }

    #[test]
    fn expired_alias_takes_first_free_suffix() {
        let mut taken = HashSet::new();
        assert_eq!(pick_expired_alias("a@x.com", &taken), "a@x.com+EXPIRED");

        taken.insert("a@x.com+expired".to_string());
        taken.insert("a@x.com+expired1".to_string());
        assert_eq!(pick_expired_alias("a@x.com", &taken), "a@x.com+EXPIRED2");
    }

    #[test]
    fn placeholder_username_uses_local_part() {
        let mut taken = HashSet::new();
        assert_eq!(pick_username("maria@x.com", &taken), "maria");

        taken.insert("maria".to_string());
        assert_eq!(pick_username("maria@x.com", &taken), "maria1");
    }
}
