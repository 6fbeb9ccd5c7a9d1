// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Per-request security context and the access policy.
//!
//! [`decide`] is a pure function over a [`SecurityContext`], a [`Resource`] and
//! an [`Action`]. Resources are addressed as `namespace.sub(kind)`, where the
//! namespace is either the system or one project. The order of evaluation:
//!
//! 1. anonymous caller on a resource not annotated public-readable → 401
//! 2. system admin → allow
//! 3. solution user → allow reads plus its provisioned set
//! 4. project roles (robots: bound policy ∩ project-role table)
//! 5. otherwise → 403

use crate::models::{ProjectRole, RobotAccess};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Pull,
    Push,
    Create,
    Read,
    Update,
    Delete,
    List,
    Operate,
    Stop,
}

impl Action {
    /// Actions that never change state.
    pub fn is_read(&self) -> bool {
        matches!(self, Action::Read | Action::List | Action::Pull)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    // project-scoped
    #[serde(rename = "project")]
    SelfProject,
    Member,
    Metadata,
    Log,
    Label,
    Quota,
    Repository,
    RepositoryTag,
    RepositoryLabel,
    TagRetention,
    ImmutableTag,
    HelmChart,
    HelmChartVersion,
    HelmChartVersionLabel,
    Configuration,
    Robot,
    NotificationPolicy,
    ReplicationPolicy,
    Scan,
    Scanner,
    // system-scoped
    AdminJob,
    User,
    UserGroup,
}

/// Namespace a resource belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    System,
    Project(i64),
}

impl Namespace {
    pub fn project(id: i64) -> Self {
        Namespace::Project(id)
    }

    pub fn sub(self, kind: ResourceKind) -> Resource {
        Resource {
            namespace: self,
            kind,
            public_readable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resource {
    pub namespace: Namespace,
    pub kind: ResourceKind,
    /// Set when the owning project is public; grants the public read set.
    pub public_readable: bool,
}

impl Resource {
    pub fn public(mut self, public: bool) -> Self {
        self.public_readable = public;
        self
    }
}

/// Who is calling.
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    Anonymous,
    User {
        user_id: i64,
        username: String,
        sys_admin: bool,
    },
    Robot {
        robot_id: i64,
        name: String,
        project_id: i64,
        access: Vec<RobotAccess>,
    },
    /// Trusted internal caller (e.g. the job service).
    Solution {
        name: String,
        provisioned: Vec<(ResourceKind, Action)>,
    },
}

/// Per-request view of the caller's identity and roles.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    principal: Principal,
    project_roles: HashMap<i64, Vec<ProjectRole>>,
}

impl SecurityContext {
    pub fn anonymous() -> Self {
        Self {
            principal: Principal::Anonymous,
            project_roles: HashMap::new(),
        }
    }

    pub fn new(principal: Principal, project_roles: HashMap<i64, Vec<ProjectRole>>) -> Self {
        Self {
            principal,
            project_roles,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self.principal, Principal::Anonymous)
    }

    pub fn username(&self) -> String {
        match &self.principal {
            Principal::Anonymous => String::new(),
            Principal::User { username, .. } => username.clone(),
            Principal::Robot { name, .. } => name.clone(),
            Principal::Solution { name, .. } => name.clone(),
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        match &self.principal {
            Principal::User { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }

    pub fn is_sys_admin(&self) -> bool {
        matches!(self.principal, Principal::User { sys_admin: true, .. })
    }

    pub fn is_solution_user(&self) -> bool {
        matches!(self.principal, Principal::Solution { .. })
    }

    pub fn project_roles(&self, project_id: i64) -> &[ProjectRole] {
        self.project_roles
            .get(&project_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Ids of every project the caller holds a role in.
    pub fn member_projects(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = match &self.principal {
            Principal::Robot { project_id, .. } => vec![*project_id],
            _ => self.project_roles.keys().copied().collect(),
        };
        ids.sort_unstable();
        ids
    }

    pub fn can(&self, action: Action, resource: &Resource) -> bool {
        decide(self, resource, action) == Decision::Allow
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Caller must authenticate first (401).
    Unauthenticated,
    /// Caller is known but not permitted (403).
    Forbidden,
}

/// Evaluate the access policy. Deterministic, performs no I/O.
pub fn decide(ctx: &SecurityContext, resource: &Resource, action: Action) -> Decision {
    let publicly_allowed =
        resource.public_readable && public_policies().contains(&(resource.kind, action));

    if !ctx.is_authenticated() {
        return if publicly_allowed {
            Decision::Allow
        } else {
            Decision::Unauthenticated
        };
    }

    if ctx.is_sys_admin() {
        return Decision::Allow;
    }

    if let Principal::Solution { provisioned, .. } = &ctx.principal {
        if action.is_read() || provisioned.contains(&(resource.kind, action)) {
            return Decision::Allow;
        }
        return Decision::Forbidden;
    }

    if publicly_allowed {
        return Decision::Allow;
    }

    let Namespace::Project(project_id) = resource.namespace else {
        return Decision::Forbidden;
    };

    let allowed = match &ctx.principal {
        Principal::Robot {
            project_id: bound,
            access,
            ..
        } => {
            *bound == project_id
                && access
                    .iter()
                    .any(|a| a.resource == resource.kind && a.action == action)
                && role_allows(ProjectRole::ProjectAdmin, resource.kind, action)
        }
        _ => ctx
            .project_roles(project_id)
            .iter()
            .any(|role| role_allows(*role, resource.kind, action)),
    };

    if allowed {
        Decision::Allow
    } else {
        Decision::Forbidden
    }
}

pub fn role_allows(role: ProjectRole, kind: ResourceKind, action: Action) -> bool {
    role_policies(role).contains(&(kind, action))
}

type PolicySet = HashSet<(ResourceKind, Action)>;

/// Permissions granted on a public project to anyone.
fn public_policies() -> &'static PolicySet {
    static PUBLIC: OnceLock<PolicySet> = OnceLock::new();
    PUBLIC.get_or_init(build_public_policies)
}

fn role_policies(role: ProjectRole) -> &'static PolicySet {
    static ROLES: OnceLock<HashMap<ProjectRole, PolicySet>> = OnceLock::new();
    let roles = ROLES.get_or_init(|| {
        [
            ProjectRole::ProjectAdmin,
            ProjectRole::Maintainer,
            ProjectRole::Developer,
            ProjectRole::Guest,
            ProjectRole::LimitedGuest,
        ]
        .into_iter()
        .map(|role| (role, build_role_policies(role)))
        .collect()
    });
    &roles[&role]
}

fn build_public_policies() -> PolicySet {
    use Action::*;
    use ResourceKind::*;
    [
        (SelfProject, Read),
        (Label, Read),
        (Label, List),
        (Repository, Pull),
        (Repository, Read),
        (Repository, List),
        (RepositoryTag, List),
        (RepositoryTag, Read),
        (RepositoryLabel, List),
        (HelmChart, Read),
        (HelmChart, List),
        (HelmChartVersion, Read),
        (HelmChartVersion, List),
    ]
    .into_iter()
    .collect()
}

fn build_role_policies(role: ProjectRole) -> PolicySet {
    use Action::*;
    use ResourceKind::*;

    let guest: Vec<(ResourceKind, Action)> = vec![
        (SelfProject, Read),
        (Member, Read),
        (Member, List),
        (Log, List),
        (Label, Read),
        (Label, List),
        (Quota, Read),
        (Repository, Read),
        (Repository, List),
        (Repository, Pull),
        (RepositoryTag, Read),
        (RepositoryTag, List),
        (RepositoryLabel, List),
        (HelmChart, Read),
        (HelmChart, List),
        (HelmChartVersion, Read),
        (HelmChartVersion, List),
        (Configuration, Read),
        (Robot, Read),
        (Robot, List),
        (Scan, Read),
        (Scanner, Read),
    ];

    let developer_extra = vec![
        (Repository, Create),
        (Repository, Update),
        (Repository, Push),
        (RepositoryTag, Create),
        (RepositoryLabel, Create),
        (RepositoryLabel, Delete),
        (HelmChart, Create),
        (HelmChartVersion, Create),
        (HelmChartVersionLabel, Create),
        (HelmChartVersionLabel, Delete),
    ];

    let maintainer_extra = vec![
        (Metadata, Create),
        (Metadata, Read),
        (Metadata, Update),
        (Metadata, Delete),
        (Label, Create),
        (Label, Update),
        (Label, Delete),
        (Repository, Delete),
        (RepositoryTag, Delete),
        (TagRetention, Create),
        (TagRetention, Read),
        (TagRetention, Update),
        (TagRetention, Delete),
        (TagRetention, List),
        (TagRetention, Operate),
        (ImmutableTag, Create),
        (ImmutableTag, Read),
        (ImmutableTag, Update),
        (ImmutableTag, Delete),
        (ImmutableTag, List),
        (HelmChart, Delete),
        (HelmChartVersion, Delete),
        (NotificationPolicy, List),
        (NotificationPolicy, Read),
        (Scan, Create),
        (Scan, Stop),
    ];

    let admin_extra = vec![
        (SelfProject, Update),
        (SelfProject, Delete),
        (Member, Create),
        (Member, Update),
        (Member, Delete),
        (Configuration, Update),
        (Robot, Create),
        (Robot, Update),
        (Robot, Delete),
        (NotificationPolicy, Create),
        (NotificationPolicy, Update),
        (NotificationPolicy, Delete),
        (Scanner, Create),
    ];

    let limited_guest: Vec<(ResourceKind, Action)> = vec![
        (SelfProject, Read),
        (Quota, Read),
        (Repository, List),
        (Repository, Pull),
        (RepositoryTag, List),
        (HelmChart, Read),
        (HelmChart, List),
        (HelmChartVersion, Read),
        (HelmChartVersion, List),
        (Configuration, Read),
        (Scan, Read),
    ];

    let layers: Vec<Vec<(ResourceKind, Action)>> = match role {
        ProjectRole::LimitedGuest => vec![limited_guest],
        ProjectRole::Guest => vec![guest],
        ProjectRole::Developer => vec![guest, developer_extra],
        ProjectRole::Maintainer => vec![guest, developer_extra, maintainer_extra],
        ProjectRole::ProjectAdmin => vec![guest, developer_extra, maintainer_extra, admin_extra],
    };
    layers.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(sys_admin: bool, roles: &[(i64, ProjectRole)]) -> SecurityContext {
        let mut project_roles: HashMap<i64, Vec<ProjectRole>> = HashMap::new();
        for (pid, role) in roles {
            project_roles.entry(*pid).or_default().push(*role);
        }
        SecurityContext::new(
            Principal::User {
                user_id: 2,
                username: "alice".into(),
                sys_admin,
            },
            project_roles,
        )
    }

    #[test]
    fn policy_tables_are_built_once_and_layered() {
        assert!(std::ptr::eq(public_policies(), public_policies()));
        assert!(std::ptr::eq(
            role_policies(ProjectRole::Guest),
            role_policies(ProjectRole::Guest)
        ));
        let ladder = [
            ProjectRole::Guest,
            ProjectRole::Developer,
            ProjectRole::Maintainer,
            ProjectRole::ProjectAdmin,
        ];
        for pair in ladder.windows(2) {
            assert!(role_policies(pair[0]).is_subset(role_policies(pair[1])));
        }
        assert!(!role_allows(ProjectRole::LimitedGuest, ResourceKind::Member, Action::List));
    }

    #[test]
    fn anonymous_private_resource_is_unauthenticated() {
        let ctx = SecurityContext::anonymous();
        let res = Namespace::project(1).sub(ResourceKind::HelmChart);
        assert_eq!(decide(&ctx, &res, Action::Read), Decision::Unauthenticated);
    }

    #[test]
    fn anonymous_public_read_is_allowed_but_write_is_not() {
        let ctx = SecurityContext::anonymous();
        let res = Namespace::project(1).sub(ResourceKind::HelmChart).public(true);
        assert_eq!(decide(&ctx, &res, Action::Read), Decision::Allow);
        assert_eq!(decide(&ctx, &res, Action::Create), Decision::Unauthenticated);
    }

    #[test]
    fn sys_admin_allows_everything() {
        let ctx = user(true, &[]);
        let res = Namespace::System.sub(ResourceKind::AdminJob);
        assert_eq!(decide(&ctx, &res, Action::Create), Decision::Allow);
    }

    #[test]
    fn developer_can_upload_but_not_delete_charts() {
        let ctx = user(false, &[(1, ProjectRole::Developer)]);
        let res = Namespace::project(1).sub(ResourceKind::HelmChartVersion);
        assert!(ctx.can(Action::Create, &res));
        assert_eq!(decide(&ctx, &res, Action::Delete), Decision::Forbidden);
    }

    #[test]
    fn roles_do_not_leak_across_projects() {
        let ctx = user(false, &[(1, ProjectRole::ProjectAdmin)]);
        let res = Namespace::project(2).sub(ResourceKind::HelmChart);
        assert_eq!(decide(&ctx, &res, Action::Create), Decision::Forbidden);
    }

    #[test]
    fn system_resources_are_forbidden_to_regular_users() {
        let ctx = user(false, &[(1, ProjectRole::ProjectAdmin)]);
        let res = Namespace::System.sub(ResourceKind::AdminJob);
        assert_eq!(decide(&ctx, &res, Action::Read), Decision::Forbidden);
    }

    #[test]
    fn solution_user_reads_and_provisioned_writes() {
        let ctx = SecurityContext::new(
            Principal::Solution {
                name: "jobservice".into(),
                provisioned: vec![(ResourceKind::AdminJob, Action::Update)],
            },
            HashMap::new(),
        );
        let job = Namespace::System.sub(ResourceKind::AdminJob);
        assert!(ctx.can(Action::Read, &job));
        assert!(ctx.can(Action::Update, &job));
        assert!(!ctx.can(Action::Delete, &job));
    }

    #[test]
    fn robot_is_bound_to_its_project_and_policy() {
        let ctx = SecurityContext::new(
            Principal::Robot {
                robot_id: 1,
                name: "robot$ci".into(),
                project_id: 3,
                access: vec![
                    RobotAccess {
                        resource: ResourceKind::Repository,
                        action: Action::Push,
                    },
                    RobotAccess {
                        resource: ResourceKind::AdminJob,
                        action: Action::Create,
                    },
                ],
            },
            HashMap::new(),
        );
        assert!(ctx.can(Action::Push, &Namespace::project(3).sub(ResourceKind::Repository)));
        assert!(!ctx.can(Action::Push, &Namespace::project(4).sub(ResourceKind::Repository)));
        assert!(!ctx.can(Action::Pull, &Namespace::project(3).sub(ResourceKind::Repository)));
        // outside the project-role table, even when granted
        assert!(!ctx.can(Action::Create, &Namespace::project(3).sub(ResourceKind::AdminJob)));
        assert_eq!(ctx.member_projects(), vec![3]);
    }
}
