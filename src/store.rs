// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Persistence contracts and the in-memory store.
//!
//! One trait per aggregate; [`Store`] is their union and is what
//! [`AppState`](crate::db::AppState) carries. Two implementations exist:
//! [`MemoryStore`] (development and tests) and
//! [`PgStore`](crate::store_pg::PgStore) (Postgres, production).

use crate::models::*;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait AdminJobStore: Send + Sync {
    async fn add_admin_job(&self, job: NewAdminJob) -> StoreResult<i64>;
    async fn get_admin_job(&self, id: i64) -> StoreResult<Option<AdminJob>>;
    /// Newest (highest id) first.
    async fn list_admin_jobs(&self, query: &AdminJobQuery) -> StoreResult<Vec<AdminJob>>;
    async fn set_admin_job_uuid(&self, id: i64, uuid: &str) -> StoreResult<()>;
    async fn update_admin_job_status(&self, id: i64, status: JobStatus) -> StoreResult<()>;
    async fn delete_admin_job(&self, id: i64) -> StoreResult<bool>;
}

#[async_trait]
pub trait ScanTaskStore: Send + Sync {
    /// Progress of the scans tracked under `track_id` (an admin job id).
    async fn scan_stats(&self, track_id: &str) -> StoreResult<ScanStats>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn add_project(&self, project: NewProject) -> StoreResult<i64>;
    async fn get_project(&self, project: &ProjectRef) -> StoreResult<Option<Project>>;
    /// Ordered by name.
    async fn list_projects(&self, query: &ProjectQuery) -> StoreResult<ProjectList>;
    async fn update_project_metadata(
        &self,
        id: i64,
        metadata: BTreeMap<String, String>,
    ) -> StoreResult<()>;
    async fn delete_project(&self, id: i64) -> StoreResult<bool>;
}

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn add_member(
        &self,
        project_id: i64,
        entity_type: MemberEntityType,
        entity_id: i64,
        role: ProjectRole,
    ) -> StoreResult<i64>;
    async fn list_members(&self, project_id: i64) -> StoreResult<Vec<Member>>;
    async fn get_member(&self, project_id: i64, member_id: i64) -> StoreResult<Option<Member>>;
    async fn delete_member(&self, project_id: i64, member_id: i64) -> StoreResult<bool>;
    /// Roles held by a user directly or through one of its groups.
    async fn roles_of(&self, user_id: i64, group_ids: &[i64])
        -> StoreResult<Vec<(i64, ProjectRole)>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn add_user(&self, user: NewUser) -> StoreResult<i64>;
    async fn get_user(&self, id: i64) -> StoreResult<Option<User>>;
    async fn get_user_by_name(&self, username: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self, page: Option<Page>) -> StoreResult<(i64, Vec<User>)>;
    async fn delete_user(&self, id: i64) -> StoreResult<bool>;
    async fn set_sysadmin(&self, id: i64, flag: bool) -> StoreResult<()>;
    async fn add_group(&self, group_name: &str) -> StoreResult<i64>;
    async fn list_groups(&self) -> StoreResult<Vec<UserGroup>>;
    async fn delete_group(&self, id: i64) -> StoreResult<bool>;
}

#[async_trait]
pub trait RobotStore: Send + Sync {
    async fn add_robot(&self, robot: NewRobot) -> StoreResult<i64>;
    async fn get_robot(&self, id: i64) -> StoreResult<Option<RobotAccount>>;
    async fn get_robot_by_name(&self, name: &str) -> StoreResult<Option<RobotAccount>>;
    async fn list_robots(&self, project_id: i64) -> StoreResult<Vec<RobotAccount>>;
    async fn set_robot_disabled(&self, id: i64, disabled: bool) -> StoreResult<()>;
    async fn delete_robot(&self, id: i64) -> StoreResult<bool>;
}

#[async_trait]
pub trait LabelStore: Send + Sync {
    async fn add_label(&self, label: NewLabel) -> StoreResult<i64>;
    async fn get_label(&self, id: i64) -> StoreResult<Option<Label>>;
    async fn list_labels(&self, query: &LabelQuery) -> StoreResult<Vec<Label>>;
    async fn update_label(
        &self,
        id: i64,
        name: &str,
        description: &str,
        color: &str,
    ) -> StoreResult<()>;
    /// Also drops every association of the label.
    async fn delete_label(&self, id: i64) -> StoreResult<bool>;
    async fn add_resource_label(
        &self,
        label_id: i64,
        resource_type: ResourceType,
        resource_name: &str,
    ) -> StoreResult<i64>;
    async fn get_labels_of_resource(
        &self,
        resource_type: ResourceType,
        resource_name: &str,
    ) -> StoreResult<Vec<Label>>;
    async fn remove_resource_label(
        &self,
        resource_type: ResourceType,
        resource_name: &str,
        label_id: i64,
    ) -> StoreResult<bool>;
    async fn list_resource_labels(
        &self,
        label_id: Option<i64>,
        resource_type: Option<ResourceType>,
    ) -> StoreResult<Vec<ResourceLabel>>;
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn add_policy(&self, policy: NewPolicy) -> StoreResult<i64>;
    async fn get_policy(&self, id: i64) -> StoreResult<Option<Policy>>;
    async fn list_policies(&self, project_id: i64, kind: PolicyKind) -> StoreResult<Vec<Policy>>;
    async fn update_policy(&self, id: i64, request: PolicyRequest) -> StoreResult<()>;
    async fn delete_policy(&self, id: i64) -> StoreResult<bool>;
}

#[async_trait]
pub trait AccessLogStore: Send + Sync {
    async fn add_access_log(&self, log: NewAccessLog) -> StoreResult<()>;
    /// Newest first.
    async fn list_access_logs(
        &self,
        project_id: i64,
        page: Option<Page>,
    ) -> StoreResult<(i64, Vec<AccessLog>)>;
}

#[async_trait]
pub trait ImageRepositoryStore: Send + Sync {
    async fn add_repository(&self, project_id: i64, name: &str) -> StoreResult<i64>;
    async fn get_repository(&self, name: &str) -> StoreResult<Option<ImageRepository>>;
    /// Ordered by name.
    async fn list_repositories(
        &self,
        query: &RepositoryQuery,
    ) -> StoreResult<(i64, Vec<ImageRepository>)>;
}

/// Everything the handlers persist.
#[async_trait]
pub trait Store:
    AdminJobStore
    + ScanTaskStore
    + ProjectStore
    + MemberStore
    + UserStore
    + RobotStore
    + LabelStore
    + PolicyStore
    + AccessLogStore
    + ImageRepositoryStore
{
    async fn ping(&self) -> StoreResult<()>;
}

// ── In-memory implementation ──────────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    next_id: i64,
    admin_jobs: BTreeMap<i64, AdminJob>,
    scan_stats: HashMap<String, ScanStats>,
    projects: BTreeMap<i64, Project>,
    members: BTreeMap<i64, Member>,
    users: BTreeMap<i64, User>,
    groups: BTreeMap<i64, UserGroup>,
    robots: BTreeMap<i64, RobotAccount>,
    labels: BTreeMap<i64, Label>,
    resource_labels: BTreeMap<i64, ResourceLabel>,
    policies: BTreeMap<i64, Policy>,
    access_logs: BTreeMap<i64, AccessLog>,
    repositories: BTreeMap<i64, ImageRepository>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local store. State is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a fully-formed admin job row, keeping its id and timestamps.
    pub fn insert_admin_job(&self, job: AdminJob) {
        let mut inner = self.lock();
        inner.next_id = inner.next_id.max(job.id);
        inner.admin_jobs.insert(job.id, job);
    }

    /// Record scan progress for a tracking id.
    pub fn set_scan_stats(&self, track_id: &str, stats: ScanStats) {
        self.lock().scan_stats.insert(track_id.to_string(), stats);
    }
}

#[async_trait]
impl AdminJobStore for MemoryStore {
    async fn add_admin_job(&self, job: NewAdminJob) -> StoreResult<i64> {
        let mut inner = self.lock();
        if job.kind == JobKind::Periodic
            && inner
                .admin_jobs
                .values()
                .any(|j| j.kind == JobKind::Periodic && j.name == job.name)
        {
            return Err(StoreError::Duplicate(format!("periodic admin job {}", job.name)));
        }
        let id = inner.next_id();
        let now = Utc::now();
        inner.admin_jobs.insert(
            id,
            AdminJob {
                id,
                name: job.name,
                kind: job.kind,
                cron: job.cron,
                status: JobStatus::Pending,
                uuid: String::new(),
                creation_time: now,
                update_time: now,
            },
        );
        Ok(id)
    }

    async fn get_admin_job(&self, id: i64) -> StoreResult<Option<AdminJob>> {
        Ok(self.lock().admin_jobs.get(&id).cloned())
    }

    async fn list_admin_jobs(&self, query: &AdminJobQuery) -> StoreResult<Vec<AdminJob>> {
        let inner = self.lock();
        let jobs = inner
            .admin_jobs
            .values()
            .rev()
            .filter(|j| query.id.map_or(true, |id| j.id == id))
            .filter(|j| query.name.as_deref().map_or(true, |n| j.name == n))
            .filter(|j| query.kind.map_or(true, |k| j.kind == k))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(jobs)
    }

    async fn set_admin_job_uuid(&self, id: i64, uuid: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        let job = inner
            .admin_jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("admin job {id}")))?;
        job.uuid = uuid.to_string();
        job.update_time = Utc::now();
        Ok(())
    }

    async fn update_admin_job_status(&self, id: i64, status: JobStatus) -> StoreResult<()> {
        let mut inner = self.lock();
        let job = inner
            .admin_jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("admin job {id}")))?;
        job.status = status;
        job.update_time = Utc::now();
        Ok(())
    }

    async fn delete_admin_job(&self, id: i64) -> StoreResult<bool> {
        Ok(self.lock().admin_jobs.remove(&id).is_some())
    }
}

#[async_trait]
impl ScanTaskStore for MemoryStore {
    async fn scan_stats(&self, track_id: &str) -> StoreResult<ScanStats> {
        Ok(self
            .lock()
            .scan_stats
            .get(track_id)
            .copied()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn add_project(&self, project: NewProject) -> StoreResult<i64> {
        let mut inner = self.lock();
        if inner.projects.values().any(|p| p.name == project.name) {
            return Err(StoreError::Duplicate(format!("project {}", project.name)));
        }
        let id = inner.next_id();
        let now = Utc::now();
        inner.projects.insert(
            id,
            Project {
                project_id: id,
                name: project.name,
                owner_id: project.owner_id,
                metadata: project.metadata,
                creation_time: now,
                update_time: now,
            },
        );
        Ok(id)
    }

    async fn get_project(&self, project: &ProjectRef) -> StoreResult<Option<Project>> {
        let inner = self.lock();
        let found = match project {
            ProjectRef::Id(id) => inner.projects.get(id).cloned(),
            ProjectRef::Name(name) => inner.projects.values().find(|p| &p.name == name).cloned(),
        };
        Ok(found)
    }

    async fn list_projects(&self, query: &ProjectQuery) -> StoreResult<ProjectList> {
        let inner = self.lock();
        let mut projects: Vec<Project> = inner
            .projects
            .values()
            .filter(|p| query.name.as_deref().map_or(true, |n| p.name.contains(n)))
            .filter(|p| query.public.map_or(true, |public| p.is_public() == public))
            .filter(|p| {
                query
                    .member_or_public
                    .as_ref()
                    .map_or(true, |ids| p.is_public() || ids.contains(&p.project_id))
            })
            .cloned()
            .collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        let total = projects.len() as i64;
        let projects = match query.page {
            Some(page) => page.apply(projects),
            None => projects,
        };
        Ok(ProjectList { total, projects })
    }

    async fn update_project_metadata(
        &self,
        id: i64,
        metadata: BTreeMap<String, String>,
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        let project = inner
            .projects
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("project {id}")))?;
        project.metadata.extend(metadata);
        project.update_time = Utc::now();
        Ok(())
    }

    async fn delete_project(&self, id: i64) -> StoreResult<bool> {
        let mut inner = self.lock();
        inner.members.retain(|_, m| m.project_id != id);
        Ok(inner.projects.remove(&id).is_some())
    }
}

#[async_trait]
impl MemberStore for MemoryStore {
    async fn add_member(
        &self,
        project_id: i64,
        entity_type: MemberEntityType,
        entity_id: i64,
        role: ProjectRole,
    ) -> StoreResult<i64> {
        let mut inner = self.lock();
        if inner.members.values().any(|m| {
            m.project_id == project_id && m.entity_type == entity_type && m.entity_id == entity_id
        }) {
            return Err(StoreError::Duplicate(format!(
                "{entity_type} {entity_id} in project {project_id}"
            )));
        }
        let id = inner.next_id();
        inner.members.insert(
            id,
            Member {
                id,
                project_id,
                entity_type,
                entity_id,
                role,
            },
        );
        Ok(id)
    }

    async fn list_members(&self, project_id: i64) -> StoreResult<Vec<Member>> {
        Ok(self
            .lock()
            .members
            .values()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn get_member(&self, project_id: i64, member_id: i64) -> StoreResult<Option<Member>> {
        Ok(self
            .lock()
            .members
            .get(&member_id)
            .filter(|m| m.project_id == project_id)
            .cloned())
    }

    async fn delete_member(&self, project_id: i64, member_id: i64) -> StoreResult<bool> {
        let mut inner = self.lock();
        match inner.members.get(&member_id) {
            Some(m) if m.project_id == project_id => {
                inner.members.remove(&member_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn roles_of(
        &self,
        user_id: i64,
        group_ids: &[i64],
    ) -> StoreResult<Vec<(i64, ProjectRole)>> {
        Ok(self
            .lock()
            .members
            .values()
            .filter(|m| match m.entity_type {
                MemberEntityType::User => m.entity_id == user_id,
                MemberEntityType::Group => group_ids.contains(&m.entity_id),
            })
            .map(|m| (m.project_id, m.role))
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn add_user(&self, user: NewUser) -> StoreResult<i64> {
        let mut inner = self.lock();
        if inner.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate(format!("user {}", user.username)));
        }
        let id = inner.next_id();
        let now = Utc::now();
        inner.users.insert(
            id,
            User {
                user_id: id,
                username: user.username,
                email: user.email,
                realname: user.realname,
                password_hash: user.password_hash,
                salt: user.salt,
                sysadmin_flag: user.sysadmin_flag,
                group_ids: user.group_ids,
                creation_time: now,
                update_time: now,
            },
        );
        Ok(id)
    }

    async fn get_user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn get_user_by_name(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn list_users(&self, page: Option<Page>) -> StoreResult<(i64, Vec<User>)> {
        let users: Vec<User> = self.lock().users.values().cloned().collect();
        let total = users.len() as i64;
        let users = match page {
            Some(page) => page.apply(users),
            None => users,
        };
        Ok((total, users))
    }

    async fn delete_user(&self, id: i64) -> StoreResult<bool> {
        let mut inner = self.lock();
        inner
            .members
            .retain(|_, m| !(m.entity_type == MemberEntityType::User && m.entity_id == id));
        Ok(inner.users.remove(&id).is_some())
    }

    async fn set_sysadmin(&self, id: i64, flag: bool) -> StoreResult<()> {
        let mut inner = self.lock();
        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user.sysadmin_flag = flag;
        user.update_time = Utc::now();
        Ok(())
    }

    async fn add_group(&self, group_name: &str) -> StoreResult<i64> {
        let mut inner = self.lock();
        if inner.groups.values().any(|g| g.group_name == group_name) {
            return Err(StoreError::Duplicate(format!("group {group_name}")));
        }
        let id = inner.next_id();
        inner.groups.insert(
            id,
            UserGroup {
                id,
                group_name: group_name.to_string(),
            },
        );
        Ok(id)
    }

    async fn list_groups(&self) -> StoreResult<Vec<UserGroup>> {
        Ok(self.lock().groups.values().cloned().collect())
    }

    async fn delete_group(&self, id: i64) -> StoreResult<bool> {
        let mut inner = self.lock();
        inner
            .members
            .retain(|_, m| !(m.entity_type == MemberEntityType::Group && m.entity_id == id));
        Ok(inner.groups.remove(&id).is_some())
    }
}

#[async_trait]
impl RobotStore for MemoryStore {
    async fn add_robot(&self, robot: NewRobot) -> StoreResult<i64> {
        let mut inner = self.lock();
        if inner.robots.values().any(|r| r.name == robot.name) {
            return Err(StoreError::Duplicate(format!("robot account {}", robot.name)));
        }
        let id = inner.next_id();
        let now = Utc::now();
        inner.robots.insert(
            id,
            RobotAccount {
                id,
                name: robot.name,
                description: robot.description,
                project_id: robot.project_id,
                token_hash: robot.token_hash,
                disabled: false,
                access: robot.access,
                creation_time: now,
                update_time: now,
            },
        );
        Ok(id)
    }

    async fn get_robot(&self, id: i64) -> StoreResult<Option<RobotAccount>> {
        Ok(self.lock().robots.get(&id).cloned())
    }

    async fn get_robot_by_name(&self, name: &str) -> StoreResult<Option<RobotAccount>> {
        Ok(self
            .lock()
            .robots
            .values()
            .find(|r| r.name == name)
            .cloned())
    }

    async fn list_robots(&self, project_id: i64) -> StoreResult<Vec<RobotAccount>> {
        Ok(self
            .lock()
            .robots
            .values()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn set_robot_disabled(&self, id: i64, disabled: bool) -> StoreResult<()> {
        let mut inner = self.lock();
        let robot = inner
            .robots
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("robot account {id}")))?;
        robot.disabled = disabled;
        robot.update_time = Utc::now();
        Ok(())
    }

    async fn delete_robot(&self, id: i64) -> StoreResult<bool> {
        Ok(self.lock().robots.remove(&id).is_some())
    }
}

#[async_trait]
impl LabelStore for MemoryStore {
    async fn add_label(&self, label: NewLabel) -> StoreResult<i64> {
        let mut inner = self.lock();
        if inner.labels.values().any(|l| {
            l.name == label.name && l.scope == label.scope && l.project_id == label.project_id
        }) {
            return Err(StoreError::Duplicate(format!("label {}", label.name)));
        }
        let id = inner.next_id();
        let now = Utc::now();
        inner.labels.insert(
            id,
            Label {
                id,
                name: label.name,
                description: label.description,
                color: label.color,
                level: label.level,
                scope: label.scope,
                project_id: label.project_id,
                creation_time: now,
                update_time: now,
            },
        );
        Ok(id)
    }

    async fn get_label(&self, id: i64) -> StoreResult<Option<Label>> {
        Ok(self.lock().labels.get(&id).cloned())
    }

    async fn list_labels(&self, query: &LabelQuery) -> StoreResult<Vec<Label>> {
        Ok(self
            .lock()
            .labels
            .values()
            .filter(|l| query.name.as_deref().map_or(true, |n| l.name.contains(n)))
            .filter(|l| query.scope.map_or(true, |s| l.scope == s))
            .filter(|l| query.project_id.map_or(true, |p| l.project_id == p))
            .filter(|l| query.level.map_or(true, |lv| l.level == lv))
            .cloned()
            .collect())
    }

    async fn update_label(
        &self,
        id: i64,
        name: &str,
        description: &str,
        color: &str,
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        let current = inner
            .labels
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("label {id}")))?;
        if inner.labels.values().any(|l| {
            l.id != id
                && l.name == name
                && l.scope == current.scope
                && l.project_id == current.project_id
        }) {
            return Err(StoreError::Duplicate(format!("label {name}")));
        }
        if let Some(label) = inner.labels.get_mut(&id) {
            label.name = name.to_string();
            label.description = description.to_string();
            label.color = color.to_string();
            label.update_time = Utc::now();
        }
        Ok(())
    }

    async fn delete_label(&self, id: i64) -> StoreResult<bool> {
        let mut inner = self.lock();
        inner.resource_labels.retain(|_, rl| rl.label_id != id);
        Ok(inner.labels.remove(&id).is_some())
    }

    async fn add_resource_label(
        &self,
        label_id: i64,
        resource_type: ResourceType,
        resource_name: &str,
    ) -> StoreResult<i64> {
        let mut inner = self.lock();
        if inner.resource_labels.values().any(|rl| {
            rl.label_id == label_id
                && rl.resource_type == resource_type
                && rl.resource_name == resource_name
        }) {
            return Err(StoreError::Duplicate(format!(
                "label {label_id} on {resource_name}"
            )));
        }
        let id = inner.next_id();
        inner.resource_labels.insert(
            id,
            ResourceLabel {
                id,
                label_id,
                resource_type,
                resource_name: resource_name.to_string(),
                creation_time: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_labels_of_resource(
        &self,
        resource_type: ResourceType,
        resource_name: &str,
    ) -> StoreResult<Vec<Label>> {
        let inner = self.lock();
        Ok(inner
            .resource_labels
            .values()
            .filter(|rl| rl.resource_type == resource_type && rl.resource_name == resource_name)
            .filter_map(|rl| inner.labels.get(&rl.label_id).cloned())
            .collect())
    }

    async fn remove_resource_label(
        &self,
        resource_type: ResourceType,
        resource_name: &str,
        label_id: i64,
    ) -> StoreResult<bool> {
        let mut inner = self.lock();
        let before = inner.resource_labels.len();
        inner.resource_labels.retain(|_, rl| {
            !(rl.label_id == label_id
                && rl.resource_type == resource_type
                && rl.resource_name == resource_name)
        });
        Ok(inner.resource_labels.len() != before)
    }

    async fn list_resource_labels(
        &self,
        label_id: Option<i64>,
        resource_type: Option<ResourceType>,
    ) -> StoreResult<Vec<ResourceLabel>> {
        Ok(self
            .lock()
            .resource_labels
            .values()
            .filter(|rl| label_id.map_or(true, |id| rl.label_id == id))
            .filter(|rl| resource_type.map_or(true, |t| rl.resource_type == t))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PolicyStore for MemoryStore {
    async fn add_policy(&self, policy: NewPolicy) -> StoreResult<i64> {
        let mut inner = self.lock();
        if inner.policies.values().any(|p| {
            p.project_id == policy.project_id
                && p.kind == policy.kind
                && p.name == policy.request.name
        }) {
            return Err(StoreError::Duplicate(format!(
                "{} policy {}",
                policy.kind, policy.request.name
            )));
        }
        let id = inner.next_id();
        let now = Utc::now();
        let request = policy.request;
        inner.policies.insert(
            id,
            Policy {
                id,
                project_id: policy.project_id,
                kind: policy.kind,
                name: request.name,
                description: request.description,
                selectors: request.selectors,
                trigger: request.trigger,
                enabled: request.enabled,
                creation_time: now,
                update_time: now,
            },
        );
        Ok(id)
    }

    async fn get_policy(&self, id: i64) -> StoreResult<Option<Policy>> {
        Ok(self.lock().policies.get(&id).cloned())
    }

    async fn list_policies(&self, project_id: i64, kind: PolicyKind) -> StoreResult<Vec<Policy>> {
        Ok(self
            .lock()
            .policies
            .values()
            .filter(|p| p.project_id == project_id && p.kind == kind)
            .cloned()
            .collect())
    }

    async fn update_policy(&self, id: i64, request: PolicyRequest) -> StoreResult<()> {
        let mut inner = self.lock();
        let current = inner
            .policies
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("policy {id}")))?;
        if inner.policies.values().any(|p| {
            p.id != id
                && p.project_id == current.project_id
                && p.kind == current.kind
                && p.name == request.name
        }) {
            return Err(StoreError::Duplicate(format!(
                "{} policy {}",
                current.kind, request.name
            )));
        }
        if let Some(policy) = inner.policies.get_mut(&id) {
            policy.name = request.name;
            policy.description = request.description;
            policy.selectors = request.selectors;
            policy.trigger = request.trigger;
            policy.enabled = request.enabled;
            policy.update_time = Utc::now();
        }
        Ok(())
    }

    async fn delete_policy(&self, id: i64) -> StoreResult<bool> {
        Ok(self.lock().policies.remove(&id).is_some())
    }
}

#[async_trait]
impl AccessLogStore for MemoryStore {
    async fn add_access_log(&self, log: NewAccessLog) -> StoreResult<()> {
        let mut inner = self.lock();
        let id = inner.next_id();
        inner.access_logs.insert(
            id,
            AccessLog {
                id,
                project_id: log.project_id,
                username: log.username,
                repo_name: log.repo_name,
                repo_tag: log.repo_tag,
                operation: log.operation,
                op_time: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list_access_logs(
        &self,
        project_id: i64,
        page: Option<Page>,
    ) -> StoreResult<(i64, Vec<AccessLog>)> {
        let logs: Vec<AccessLog> = self
            .lock()
            .access_logs
            .values()
            .rev()
            .filter(|l| l.project_id == project_id)
            .cloned()
            .collect();
        let total = logs.len() as i64;
        let logs = match page {
            Some(page) => page.apply(logs),
            None => logs,
        };
        Ok((total, logs))
    }
}

#[async_trait]
impl ImageRepositoryStore for MemoryStore {
    async fn add_repository(&self, project_id: i64, name: &str) -> StoreResult<i64> {
        let mut inner = self.lock();
        if inner.repositories.values().any(|r| r.name == name) {
            return Err(StoreError::Duplicate(format!("repository {name}")));
        }
        let id = inner.next_id();
        let now = Utc::now();
        inner.repositories.insert(
            id,
            ImageRepository {
                repository_id: id,
                name: name.to_string(),
                project_id,
                description: String::new(),
                pull_count: 0,
                star_count: 0,
                creation_time: now,
                update_time: now,
            },
        );
        Ok(id)
    }

    async fn get_repository(&self, name: &str) -> StoreResult<Option<ImageRepository>> {
        Ok(self
            .lock()
            .repositories
            .values()
            .find(|r| r.name == name)
            .cloned())
    }

    async fn list_repositories(
        &self,
        query: &RepositoryQuery,
    ) -> StoreResult<(i64, Vec<ImageRepository>)> {
        let inner = self.lock();
        let labelled: Option<Vec<String>> = query.label_id.map(|label_id| {
            inner
                .resource_labels
                .values()
                .filter(|rl| rl.label_id == label_id && rl.resource_type == ResourceType::Repository)
                .map(|rl| rl.resource_name.clone())
                .collect()
        });
        let mut repos: Vec<ImageRepository> = inner
            .repositories
            .values()
            .filter(|r| r.project_id == query.project_id)
            .filter(|r| query.name.as_deref().map_or(true, |n| r.name.contains(n)))
            .filter(|r| {
                labelled
                    .as_ref()
                    .map_or(true, |ids| ids.contains(&r.repository_id.to_string()))
            })
            .cloned()
            .collect();
        repos.sort_by(|a, b| a.name.cmp(&b.name));
        let total = repos.len() as i64;
        let repos = match query.page {
            Some(page) => page.apply(repos),
            None => repos,
        };
        Ok((total, repos))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admin_jobs_list_newest_first_with_limit() {
        let store = MemoryStore::new();
        for _ in 0..12 {
            store
                .add_admin_job(NewAdminJob {
                    name: "gc".into(),
                    kind: JobKind::Generic,
                    cron: String::new(),
                })
                .await
                .unwrap();
        }
        let jobs = store
            .list_admin_jobs(&AdminJobQuery {
                name: Some("gc".into()),
                limit: Some(10),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(jobs.len(), 10);
        assert!(jobs.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[tokio::test]
    async fn duplicate_project_names_are_rejected() {
        let store = MemoryStore::new();
        let new = || NewProject {
            name: "library".into(),
            owner_id: 1,
            metadata: BTreeMap::new(),
        };
        store.add_project(new()).await.unwrap();
        assert!(matches!(
            store.add_project(new()).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn one_schedule_per_job_name() {
        let store = MemoryStore::new();
        let new = |kind| NewAdminJob {
            name: "gc".into(),
            kind,
            cron: String::new(),
        };
        store.add_admin_job(new(JobKind::Periodic)).await.unwrap();
        assert!(matches!(
            store.add_admin_job(new(JobKind::Periodic)).await,
            Err(StoreError::Duplicate(_))
        ));
        store.add_admin_job(new(JobKind::Generic)).await.unwrap();
        store
            .add_admin_job(NewAdminJob {
                name: "scan_all".into(),
                kind: JobKind::Periodic,
                cron: String::new(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn deleting_a_label_drops_its_associations() {
        let store = MemoryStore::new();
        let id = store
            .add_label(NewLabel {
                name: "prod".into(),
                description: String::new(),
                color: String::new(),
                level: LabelLevel::User,
                scope: LabelScope::Global,
                project_id: 0,
            })
            .await
            .unwrap();
        store
            .add_resource_label(id, ResourceType::Chart, "library/web:1.2.3")
            .await
            .unwrap();
        assert!(store.delete_label(id).await.unwrap());
        assert!(store
            .get_labels_of_resource(ResourceType::Chart, "library/web:1.2.3")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn roles_include_group_memberships() {
        let store = MemoryStore::new();
        store
            .add_member(10, MemberEntityType::Group, 5, ProjectRole::Developer)
            .await
            .unwrap();
        store
            .add_member(11, MemberEntityType::User, 1, ProjectRole::Guest)
            .await
            .unwrap();
        let mut roles = store.roles_of(1, &[5]).await.unwrap();
        roles.sort();
        assert_eq!(
            roles,
            vec![(10, ProjectRole::Developer), (11, ProjectRole::Guest)]
        );
    }

    #[tokio::test]
    async fn visible_projects_are_public_or_member() {
        let store = MemoryStore::new();
        let mut public = BTreeMap::new();
        public.insert(METADATA_PUBLIC.to_string(), "true".to_string());
        store
            .add_project(NewProject {
                name: "library".into(),
                owner_id: 1,
                metadata: public,
            })
            .await
            .unwrap();
        let private = store
            .add_project(NewProject {
                name: "ops".into(),
                owner_id: 1,
                metadata: BTreeMap::new(),
            })
            .await
            .unwrap();
        store
            .add_project(NewProject {
                name: "secret".into(),
                owner_id: 1,
                metadata: BTreeMap::new(),
            })
            .await
            .unwrap();

        let list = store
            .list_projects(&ProjectQuery {
                member_or_public: Some(vec![private]),
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<_> = list.projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["library", "ops"]);
    }
}
