// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Label definitions. Global labels are managed by system admins; project
//! labels by whoever holds the label permissions in that project.
//!
//! ## Endpoints
//!
//! - `GET    /api/v2.0/labels`     — List (`scope=g`, or `scope=p&project_id=N`; optional `name`)
//! - `POST   /api/v2.0/labels`     — Create
//! - `GET    /api/v2.0/labels/:id` — Get
//! - `PUT    /api/v2.0/labels/:id` — Update name, description and color
//! - `DELETE /api/v2.0/labels/:id` — Delete, dropping every association

use crate::{
    controller::{RequestContext, ValidatedJson},
    db::AppState,
    error::RegistryError,
    labels::LabelManager,
    models::{Label, LabelLevel, LabelQuery, LabelRequest, LabelScope, NewLabel, ProjectRef},
    security::{Action, ResourceKind},
    store::{LabelStore, Store},
};
use axum::{
    extract::{Path, Query, State},
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

/// Check `action` on labels of the given scope.
async fn check_label_access(
    state: &AppState,
    ctx: &RequestContext,
    scope: LabelScope,
    project_id: i64,
    action: Action,
) -> Result<(), RegistryError> {
    match scope {
        LabelScope::Global => {
            if action == Action::Read || action == Action::List {
                ctx.require_authenticated()
            } else {
                ctx.require_system_access(ResourceKind::Label, action)
            }
        }
        LabelScope::Project => ctx
            .require_project_access(state, &ProjectRef::Id(project_id), action, ResourceKind::Label)
            .await
            .map(|_| ()),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LabelListParams {
    pub name: Option<String>,
    pub scope: Option<String>,
    pub project_id: Option<i64>,
}

/// `GET /api/v2.0/labels`
pub async fn list_labels(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(params): Query<LabelListParams>,
) -> Result<Json<Vec<Label>>, RegistryError> {
    let scope: LabelScope = params
        .scope
        .as_deref()
        .ok_or_else(|| RegistryError::BadInput("scope is required".into()))?
        .parse()
        .map_err(RegistryError::BadInput)?;

    let project_id = match scope {
        LabelScope::Global => None,
        LabelScope::Project => Some(params.project_id.filter(|id| *id > 0).ok_or_else(|| {
            RegistryError::BadInput("project_id is required for project labels".into())
        })?),
    };
    check_label_access(&state, &ctx, scope, project_id.unwrap_or(0), Action::List).await?;

    let labels = state
        .store
        .list_labels(&LabelQuery {
            name: params.name,
            scope: Some(scope),
            project_id,
            level: Some(LabelLevel::User),
        })
        .await?;
    Ok(Json(labels))
}

/// `POST /api/v2.0/labels`
pub async fn create_label(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<LabelRequest>,
) -> Result<Response, RegistryError> {
    check_label_access(&state, &ctx, req.scope, req.project_id, Action::Create).await?;

    let name = req.name.trim().to_string();
    let existing = state
        .store
        .list_labels(&LabelQuery {
            name: Some(name.clone()),
            scope: Some(req.scope),
            project_id: Some(req.project_id),
            level: None,
        })
        .await?;
    if existing.iter().any(|l| l.name == name) {
        return Err(RegistryError::Conflict(format!("label {name} already exists")));
    }

    let id = state
        .store
        .add_label(NewLabel {
            name,
            description: req.description,
            color: req.color,
            level: LabelLevel::User,
            scope: req.scope,
            project_id: req.project_id,
        })
        .await?;
    let location = HeaderValue::from_str(&format!("/api/v2.0/labels/{id}"))
        .map_err(|e| RegistryError::internal(format!("location header: {e}")))?;
    Ok((StatusCode::CREATED, [(LOCATION, location)]).into_response())
}

/// `GET /api/v2.0/labels/:id`
pub async fn get_label(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<Json<Label>, RegistryError> {
    let label = LabelManager::new(state.store.clone()).require(id).await?;
    check_label_access(&state, &ctx, label.scope, label.project_id, Action::Read).await?;
    Ok(Json(label))
}

/// `PUT /api/v2.0/labels/:id` — Scope and project are fixed at creation.
pub async fn update_label(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<LabelRequest>,
) -> Result<StatusCode, RegistryError> {
    let label = LabelManager::new(state.store.clone()).require(id).await?;
    check_label_access(&state, &ctx, label.scope, label.project_id, Action::Update).await?;
    if req.scope != label.scope || req.project_id != label.project_id {
        return Err(RegistryError::BadInput(
            "the scope of a label cannot be changed".into(),
        ));
    }
    state
        .store
        .update_label(id, req.name.trim(), &req.description, &req.color)
        .await?;
    Ok(StatusCode::OK)
}

/// `DELETE /api/v2.0/labels/:id`
pub async fn delete_label(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<StatusCode, RegistryError> {
    let label = LabelManager::new(state.store.clone()).require(id).await?;
    check_label_access(&state, &ctx, label.scope, label.project_id, Action::Delete).await?;
    state.store.delete_label(id).await?;
    tracing::info!("Label {} deleted by {}", label.name, ctx.username());
    Ok(StatusCode::OK)
}
