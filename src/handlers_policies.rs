// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Project-scoped policies: replication, webhook, tag retention and
//! immutable-tag rules. Names are unique per project and kind.
//!
//! ## Endpoints
//!
//! - `GET    /api/v2.0/projects/:project/policies/:kind`      — List policies of a kind
//! - `POST   /api/v2.0/projects/:project/policies/:kind`      — Create
//! - `GET    /api/v2.0/projects/:project/policies/:kind/:id`  — Get
//! - `PUT    /api/v2.0/projects/:project/policies/:kind/:id`  — Replace
//! - `DELETE /api/v2.0/projects/:project/policies/:kind/:id`  — Delete
//!
//! `:kind` is one of `replication`, `webhook`, `retention`, `immutable_tag`.

use crate::{
    controller::{RequestContext, Validate, ValidatedJson},
    db::AppState,
    error::RegistryError,
    models::{NewPolicy, Policy, PolicyKind, PolicyRequest, Project, ProjectRef, TriggerKind},
    security::{Action, ResourceKind},
    store::{PolicyStore, Store},
};
use axum::{
    extract::{Path, State},
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

impl Validate for PolicyRequest {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("policy name is required".into());
        }
        if self.trigger.kind == TriggerKind::Scheduled
            && self.trigger.cron.as_deref().map_or(true, |c| c.trim().is_empty())
        {
            return Err("a scheduled trigger requires a cron".into());
        }
        if let Some(selector) = self.selectors.iter().find(|s| s.pattern.trim().is_empty()) {
            return Err(format!("empty pattern in {:?} selector", selector.kind));
        }
        Ok(())
    }
}

/// Resource guarding each policy kind.
fn resource_of(kind: PolicyKind) -> ResourceKind {
    match kind {
        PolicyKind::Replication => ResourceKind::ReplicationPolicy,
        PolicyKind::Webhook => ResourceKind::NotificationPolicy,
        PolicyKind::Retention => ResourceKind::TagRetention,
        PolicyKind::ImmutableTag => ResourceKind::ImmutableTag,
    }
}

fn parse_kind(raw: &str) -> Result<PolicyKind, RegistryError> {
    raw.parse()
        .map_err(|_| RegistryError::BadInput(format!("unknown policy kind: {raw}")))
}

async fn policy_project(
    state: &AppState,
    ctx: &RequestContext,
    project: &str,
    kind: PolicyKind,
    action: Action,
) -> Result<Project, RegistryError> {
    ctx.require_project_access(state, &ProjectRef::parse(project), action, resource_of(kind))
        .await
}

async fn require_policy(
    state: &AppState,
    project: &Project,
    kind: PolicyKind,
    id: i64,
) -> Result<Policy, RegistryError> {
    state
        .store
        .get_policy(id)
        .await?
        .filter(|p| p.project_id == project.project_id && p.kind == kind)
        .ok_or_else(|| RegistryError::NotFound(format!("{kind} policy {id} not found")))
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `GET /api/v2.0/projects/:project/policies/:kind`
pub async fn list_policies(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((project, kind)): Path<(String, String)>,
) -> Result<Json<Vec<Policy>>, RegistryError> {
    let kind = parse_kind(&kind)?;
    let project = policy_project(&state, &ctx, &project, kind, Action::List).await?;
    Ok(Json(state.store.list_policies(project.project_id, kind).await?))
}

/// `POST /api/v2.0/projects/:project/policies/:kind`
pub async fn create_policy(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((project, kind)): Path<(String, String)>,
    ValidatedJson(req): ValidatedJson<PolicyRequest>,
) -> Result<Response, RegistryError> {
    let kind = parse_kind(&kind)?;
    let project = policy_project(&state, &ctx, &project, kind, Action::Create).await?;
    let name = req.name.clone();
    let id = state
        .store
        .add_policy(NewPolicy {
            project_id: project.project_id,
            kind,
            request: req,
        })
        .await?;
    tracing::info!("{kind} policy {name} created in project {}", project.name);

    let location = HeaderValue::from_str(&format!(
        "/api/v2.0/projects/{}/policies/{kind}/{id}",
        project.project_id
    ))
    .map_err(|e| RegistryError::internal(format!("location header: {e}")))?;
    Ok((StatusCode::CREATED, [(LOCATION, location)]).into_response())
}

/// `GET /api/v2.0/projects/:project/policies/:kind/:id`
pub async fn get_policy(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((project, kind, id)): Path<(String, String, i64)>,
) -> Result<Json<Policy>, RegistryError> {
    let kind = parse_kind(&kind)?;
    let project = policy_project(&state, &ctx, &project, kind, Action::Read).await?;
    Ok(Json(require_policy(&state, &project, kind, id).await?))
}

/// `PUT /api/v2.0/projects/:project/policies/:kind/:id`
pub async fn update_policy(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((project, kind, id)): Path<(String, String, i64)>,
    ValidatedJson(req): ValidatedJson<PolicyRequest>,
) -> Result<StatusCode, RegistryError> {
    let kind = parse_kind(&kind)?;
    let project = policy_project(&state, &ctx, &project, kind, Action::Update).await?;
    require_policy(&state, &project, kind, id).await?;
    state.store.update_policy(id, req).await?;
    Ok(StatusCode::OK)
}

/// `DELETE /api/v2.0/projects/:project/policies/:kind/:id`
pub async fn delete_policy(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((project, kind, id)): Path<(String, String, i64)>,
) -> Result<StatusCode, RegistryError> {
    let kind = parse_kind(&kind)?;
    let project = policy_project(&state, &ctx, &project, kind, Action::Delete).await?;
    let policy = require_policy(&state, &project, kind, id).await?;
    state.store.delete_policy(policy.id).await?;
    tracing::info!("{kind} policy {} deleted from project {}", policy.name, project.name);
    Ok(StatusCode::OK)
}
