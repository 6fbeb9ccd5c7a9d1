// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Projects and what hangs off them: members, robot accounts, access logs.
//!
//! ## Endpoints
//!
//! - `GET    /api/v2.0/projects`                       — Projects visible to the caller (paginated)
//! - `POST   /api/v2.0/projects`                       — Create a project; the creator becomes its admin
//! - `GET    /api/v2.0/projects/:project`              — Get by id or name
//! - `PUT    /api/v2.0/projects/:project`              — Update metadata
//! - `DELETE /api/v2.0/projects/:project`              — Delete (only when no repositories remain)
//! - `GET    /api/v2.0/projects/:project/logs`         — Access log (paginated)
//! - `GET    /api/v2.0/projects/:project/members`      — List members
//! - `POST   /api/v2.0/projects/:project/members`      — Add a user or group
//! - `DELETE /api/v2.0/projects/:project/members/:mid` — Remove a member
//! - `GET    /api/v2.0/projects/:project/robots`       — List robot accounts
//! - `POST   /api/v2.0/projects/:project/robots`       — Create; the token is returned once
//! - `GET    /api/v2.0/projects/:project/robots/:rid`  — Get
//! - `PUT    /api/v2.0/projects/:project/robots/:rid`  — Enable or disable
//! - `DELETE /api/v2.0/projects/:project/robots/:rid`  — Delete

use crate::{
    auth,
    controller::{JsonBody, RequestContext, Validate, ValidatedJson},
    db::AppState,
    error::RegistryError,
    models::{
        AccessLog, Member, MemberEntityType, MemberRequest, NewProject, NewRobot, Project,
        ProjectMetadataRequest, ProjectQuery, ProjectRef, ProjectRequest, ProjectRole,
        RepositoryQuery, RobotAccount, RobotCreated, RobotRequest, RobotUpdate, METADATA_PUBLIC,
        ROBOT_PREFIX,
    },
    pagination::{Paginated, Pagination},
    security::{Action, ResourceKind},
    store::{AccessLogStore, ImageRepositoryStore, MemberStore, RobotStore, Store, UserStore},
};
use axum::{
    extract::{Path, Query, State},
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};

pub const PROJECTS_PATH: &str = "/api/v2.0/projects";
pub const MAX_PROJECT_NAME_LEN: usize = 255;

fn project_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*$").ok())
        .as_ref()
}

impl Validate for ProjectRequest {
    fn validate(&self) -> Result<(), String> {
        let name = &self.project_name;
        if name.is_empty() || name.len() > MAX_PROJECT_NAME_LEN {
            return Err(format!(
                "project name must be 1 to {MAX_PROJECT_NAME_LEN} characters"
            ));
        }
        if !project_name_pattern().is_some_and(|p| p.is_match(name)) {
            return Err(format!("project name {name} is not valid"));
        }
        validate_metadata(&self.metadata)
    }
}

impl Validate for ProjectMetadataRequest {
    fn validate(&self) -> Result<(), String> {
        validate_metadata(&self.metadata)
    }
}

fn validate_metadata(metadata: &std::collections::BTreeMap<String, String>) -> Result<(), String> {
    match metadata.get(METADATA_PUBLIC).map(|v| v.to_ascii_lowercase()) {
        None => Ok(()),
        Some(v) if v == "true" || v == "false" => Ok(()),
        Some(v) => Err(format!("invalid value for {METADATA_PUBLIC}: {v}")),
    }
}

impl Validate for RobotRequest {
    fn validate(&self) -> Result<(), String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("robot name is required".into());
        }
        if name.contains('$') {
            return Err("robot name must not contain '$'".into());
        }
        if self.access.is_empty() {
            return Err("a robot needs at least one access entry".into());
        }
        Ok(())
    }
}

fn created_at(path: String) -> Result<Response, RegistryError> {
    let location = HeaderValue::from_str(&path)
        .map_err(|e| RegistryError::internal(format!("location header: {e}")))?;
    Ok((StatusCode::CREATED, [(LOCATION, location)]).into_response())
}

// ── Projects ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ProjectListParams {
    pub name: Option<String>,
    pub public: Option<bool>,
}

/// `GET /api/v2.0/projects` — System admins see every project, members see
/// theirs plus public ones, anonymous callers only public ones.
pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Pagination(page): Pagination,
    Query(params): Query<ProjectListParams>,
) -> Result<Paginated<Project>, RegistryError> {
    let mut query = ProjectQuery {
        name: params.name,
        public: params.public,
        member_or_public: None,
        page: Some(page),
    };
    if !ctx.security.is_authenticated() {
        query.public = Some(true);
    } else if !ctx.security.is_sys_admin() {
        query.member_or_public = Some(ctx.security.member_projects());
    }

    let list = state.projects.list(&query).await?;
    Ok(Paginated {
        items: list.projects,
        total: list.total,
        page,
        uri: ctx.uri,
    })
}

/// `POST /api/v2.0/projects`
pub async fn create_project(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<ProjectRequest>,
) -> Result<Response, RegistryError> {
    ctx.require_authenticated()?;
    let Some(owner_id) = ctx.security.user_id() else {
        return Err(RegistryError::Forbidden(
            "only users can create projects".into(),
        ));
    };

    let mut metadata = req.metadata;
    let public = metadata
        .get(METADATA_PUBLIC)
        .map(|v| v.to_ascii_lowercase())
        .unwrap_or_else(|| "false".into());
    metadata.insert(METADATA_PUBLIC.to_string(), public);

    let id = state
        .projects
        .create(NewProject {
            name: req.project_name.clone(),
            owner_id,
            metadata,
        })
        .await?;
    state
        .store
        .add_member(id, MemberEntityType::User, owner_id, ProjectRole::ProjectAdmin)
        .await?;
    tracing::info!("Project {} created by {}", req.project_name, ctx.username());
    created_at(format!("{PROJECTS_PATH}/{id}"))
}

/// `GET /api/v2.0/projects/:project`
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(project): Path<String>,
) -> Result<Json<Project>, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::Read, ResourceKind::SelfProject)
        .await?;
    Ok(Json(project))
}

/// `PUT /api/v2.0/projects/:project` — Merge the given metadata keys.
pub async fn update_project(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(project): Path<String>,
    ValidatedJson(req): ValidatedJson<ProjectMetadataRequest>,
) -> Result<StatusCode, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::Update, ResourceKind::Metadata)
        .await?;
    let metadata = req
        .metadata
        .into_iter()
        .map(|(k, v)| {
            if k == METADATA_PUBLIC {
                (k, v.to_ascii_lowercase())
            } else {
                (k, v)
            }
        })
        .collect();
    state
        .projects
        .metadata_manager()
        .update(project.project_id, metadata)
        .await?;
    Ok(StatusCode::OK)
}

/// `DELETE /api/v2.0/projects/:project`
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(project): Path<String>,
) -> Result<StatusCode, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::Delete, ResourceKind::SelfProject)
        .await?;
    let (repositories, _) = state
        .store
        .list_repositories(&RepositoryQuery {
            project_id: project.project_id,
            ..Default::default()
        })
        .await?;
    if repositories > 0 {
        return Err(RegistryError::Precondition(format!(
            "project {} still contains {repositories} repositories",
            project.name
        )));
    }
    if !state.projects.delete(&project).await? {
        return Err(RegistryError::NotFound(format!(
            "project {} not found",
            project.name
        )));
    }
    tracing::info!("Project {} deleted by {}", project.name, ctx.username());
    Ok(StatusCode::OK)
}

/// `GET /api/v2.0/projects/:project/logs`
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Pagination(page): Pagination,
    Path(project): Path<String>,
) -> Result<Paginated<AccessLog>, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::List, ResourceKind::Log)
        .await?;
    let (total, items) = state
        .store
        .list_access_logs(project.project_id, Some(page))
        .await?;
    Ok(Paginated {
        items,
        total,
        page,
        uri: ctx.uri,
    })
}

// ── Members ───────────────────────────────────────────────────────────────────

/// `GET /api/v2.0/projects/:project/members`
pub async fn list_members(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(project): Path<String>,
) -> Result<Json<Vec<Member>>, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::List, ResourceKind::Member)
        .await?;
    Ok(Json(state.store.list_members(project.project_id).await?))
}

/// `POST /api/v2.0/projects/:project/members`
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(project): Path<String>,
    JsonBody(req): JsonBody<MemberRequest>,
) -> Result<Response, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::Create, ResourceKind::Member)
        .await?;

    let exists = match req.entity_type {
        MemberEntityType::User => state.store.get_user(req.entity_id).await?.is_some(),
        MemberEntityType::Group => state
            .store
            .list_groups()
            .await?
            .iter()
            .any(|g| g.id == req.entity_id),
    };
    if !exists {
        return Err(RegistryError::BadInput(format!(
            "{} {} does not exist",
            req.entity_type, req.entity_id
        )));
    }

    let id = state
        .store
        .add_member(project.project_id, req.entity_type, req.entity_id, req.role)
        .await?;
    tracing::info!(
        "{} {} joined project {} as {}",
        req.entity_type,
        req.entity_id,
        project.name,
        req.role
    );
    created_at(format!(
        "{PROJECTS_PATH}/{}/members/{id}",
        project.project_id
    ))
}

/// `DELETE /api/v2.0/projects/:project/members/:mid`
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((project, member_id)): Path<(String, i64)>,
) -> Result<StatusCode, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::Delete, ResourceKind::Member)
        .await?;
    if !state
        .store
        .delete_member(project.project_id, member_id)
        .await?
    {
        return Err(RegistryError::NotFound(format!(
            "member {member_id} not found"
        )));
    }
    Ok(StatusCode::OK)
}

// ── Robot accounts ────────────────────────────────────────────────────────────

async fn project_robot(
    state: &AppState,
    project: &Project,
    robot_id: i64,
) -> Result<RobotAccount, RegistryError> {
    state
        .store
        .get_robot(robot_id)
        .await?
        .filter(|r| r.project_id == project.project_id)
        .ok_or_else(|| RegistryError::NotFound(format!("robot {robot_id} not found")))
}

/// `GET /api/v2.0/projects/:project/robots`
pub async fn list_robots(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(project): Path<String>,
) -> Result<Json<Vec<RobotAccount>>, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::List, ResourceKind::Robot)
        .await?;
    Ok(Json(state.store.list_robots(project.project_id).await?))
}

/// `POST /api/v2.0/projects/:project/robots`
pub async fn create_robot(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(project): Path<String>,
    ValidatedJson(req): ValidatedJson<RobotRequest>,
) -> Result<(StatusCode, Json<RobotCreated>), RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::Create, ResourceKind::Robot)
        .await?;

    let name = format!("{ROBOT_PREFIX}{}", req.name.trim());
    if state.store.get_robot_by_name(&name).await?.is_some() {
        return Err(RegistryError::Conflict(format!("robot {name} already exists")));
    }

    let token = auth::generate_token();
    let id = state
        .store
        .add_robot(NewRobot {
            name: name.clone(),
            description: req.description,
            project_id: project.project_id,
            token_hash: auth::hash_token(&token),
            access: req.access,
        })
        .await?;
    tracing::info!("Robot {name} created in project {}", project.name);
    Ok((StatusCode::CREATED, Json(RobotCreated { id, name, token })))
}

/// `GET /api/v2.0/projects/:project/robots/:rid`
pub async fn get_robot(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((project, robot_id)): Path<(String, i64)>,
) -> Result<Json<RobotAccount>, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::Read, ResourceKind::Robot)
        .await?;
    Ok(Json(project_robot(&state, &project, robot_id).await?))
}

/// `PUT /api/v2.0/projects/:project/robots/:rid` — Body `{"disabled": bool}`.
pub async fn update_robot(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((project, robot_id)): Path<(String, i64)>,
    JsonBody(update): JsonBody<RobotUpdate>,
) -> Result<StatusCode, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::Update, ResourceKind::Robot)
        .await?;
    let robot = project_robot(&state, &project, robot_id).await?;
    state
        .store
        .set_robot_disabled(robot.id, update.disabled)
        .await?;
    Ok(StatusCode::OK)
}

/// `DELETE /api/v2.0/projects/:project/robots/:rid`
pub async fn delete_robot(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((project, robot_id)): Path<(String, i64)>,
) -> Result<StatusCode, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::Delete, ResourceKind::Robot)
        .await?;
    let robot = project_robot(&state, &project, robot_id).await?;
    state.store.delete_robot(robot.id).await?;
    tracing::info!("Robot {} deleted from project {}", robot.name, project.name);
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn project(name: &str) -> ProjectRequest {
        ProjectRequest {
            project_name: name.into(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn project_names_follow_the_repository_grammar() {
        assert!(project("library").validate().is_ok());
        assert!(project("team-a.tools_x").validate().is_ok());
        assert!(project("").validate().is_err());
        assert!(project("Library").validate().is_err());
        assert!(project("a--b").validate().is_err());
        assert!(project("-lead").validate().is_err());
        assert!(project(&"a".repeat(256)).validate().is_err());
    }

    #[test]
    fn public_metadata_must_be_boolean() {
        let mut req = project("library");
        req.metadata.insert(METADATA_PUBLIC.into(), "TRUE".into());
        assert!(req.validate().is_ok());
        req.metadata.insert(METADATA_PUBLIC.into(), "yes".into());
        assert!(req.validate().is_err());
    }

    #[test]
    fn robot_names_may_not_carry_the_prefix() {
        let req: RobotRequest = serde_json::from_value(serde_json::json!({
            "name": "robot$ci",
            "access": [{"resource": "repository", "action": "push"}]
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }
}
