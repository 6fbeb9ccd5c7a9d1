// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Image repositories, their tags and their labels.
//!
//! List items are assembled with one registry / store lookup per item, run
//! through [`assemble_ordered`] so the output keeps the store's order.
//!
//! ## Endpoints
//!
//! - `GET    /api/v2.0/projects/:project/repositories`                  — List (`name`, `label_id`, paginated)
//! - `GET    /api/v2.0/projects/:project/repositories/:repo/tags`       — Tags (`detail`, `label_id`)
//! - `GET    /api/v2.0/projects/:project/repositories/:repo/labels`     — Labels of a repository
//! - `POST   /api/v2.0/projects/:project/repositories/:repo/labels`     — Attach a label
//! - `DELETE /api/v2.0/projects/:project/repositories/:repo/labels/:id` — Detach a label

use crate::{
    assemble::{assemble_ordered, DEFAULT_PARALLELISM},
    controller::{JsonBody, RequestContext},
    db::AppState,
    error::RegistryError,
    labels::LabelManager,
    models::{
        ImageRepository, Label, LabelRef, Project, ProjectRef, RepositoryQuery, RepositoryResp,
        ResourceType, TagResp,
    },
    pagination::{Paginated, Pagination},
    registry_client::RegistryClient,
    security::{Action, ResourceKind},
    store::{ImageRepositoryStore, LabelStore, Store},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::task::JoinError;

fn join_error(e: JoinError) -> RegistryError {
    RegistryError::internal(format!("list assembly task failed: {e}"))
}

/// Canonical name of an image, as used for its labels.
pub fn image_full_name(repository: &str, tag: &str) -> String {
    format!("{repository}:{tag}")
}

async fn require_repository(
    state: &AppState,
    project: &Project,
    repo: &str,
) -> Result<ImageRepository, RegistryError> {
    let name = format!("{}/{repo}", project.name);
    state
        .store
        .get_repository(&name)
        .await?
        .ok_or_else(|| RegistryError::NotFound(format!("repository {name} not found")))
}

// ── Repositories ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct RepositoryListParams {
    pub name: Option<String>,
    pub label_id: Option<i64>,
}

/// `GET /api/v2.0/projects/:project/repositories`
pub async fn list_repositories(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Pagination(page): Pagination,
    Path(project): Path<String>,
    Query(params): Query<RepositoryListParams>,
) -> Result<Paginated<RepositoryResp>, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::List, ResourceKind::Repository)
        .await?;
    let (total, repositories) = state
        .store
        .list_repositories(&RepositoryQuery {
            project_id: project.project_id,
            name: params.name,
            label_id: params.label_id,
            page: Some(page),
        })
        .await?;

    let items = assemble_ordered(repositories, DEFAULT_PARALLELISM, |repo| {
        let store = state.store.clone();
        let registry = state.registry.clone();
        async move { repository_resp(store, registry, repo).await }
    })
    .await
    .map_err(join_error)?
    .into_iter()
    .collect::<Result<Vec<_>, _>>()?;

    Ok(Paginated {
        items,
        total,
        page,
        uri: ctx.uri,
    })
}

async fn repository_resp(
    store: Arc<dyn Store>,
    registry: Arc<dyn RegistryClient>,
    repo: ImageRepository,
) -> Result<RepositoryResp, RegistryError> {
    let labels = store
        .get_labels_of_resource(ResourceType::Repository, &repo.repository_id.to_string())
        .await?;
    let tags = registry
        .list_tags(&repo.name)
        .await
        .map_err(|e| RegistryError::from_registry("failed to list tags", e))?;
    Ok(RepositoryResp {
        id: repo.repository_id,
        name: repo.name,
        project_id: repo.project_id,
        description: repo.description,
        pull_count: repo.pull_count,
        star_count: repo.star_count,
        tags_count: tags.len() as i64,
        labels,
        creation_time: repo.creation_time,
        update_time: repo.update_time,
    })
}

// ── Tags ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct TagListParams {
    pub detail: Option<bool>,
    pub label_id: Option<i64>,
}

/// `GET /api/v2.0/projects/:project/repositories/:repo/tags` — With
/// `detail=false` only the tag names are returned.
pub async fn list_tags(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((project, repo)): Path<(String, String)>,
    Query(params): Query<TagListParams>,
) -> Result<Response, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::List, ResourceKind::RepositoryTag)
        .await?;
    let repository = require_repository(&state, &project, &repo).await?;

    let mut tags = state
        .registry
        .list_tags(&repository.name)
        .await
        .map_err(|e| RegistryError::from_registry("failed to list tags", e))?;

    if let Some(label_id) = params.label_id {
        let labelled = state
            .store
            .list_resource_labels(Some(label_id), Some(ResourceType::Image))
            .await?;
        tags.retain(|tag| {
            let full_name = image_full_name(&repository.name, tag);
            labelled.iter().any(|rl| rl.resource_name == full_name)
        });
    }

    if params.detail == Some(false) {
        return Ok(Json(tags).into_response());
    }

    let name = repository.name;
    let items = assemble_ordered(tags, DEFAULT_PARALLELISM, |tag| {
        let store = state.store.clone();
        let registry = state.registry.clone();
        let repository = name.clone();
        async move { tag_resp(store, registry, repository, tag).await }
    })
    .await
    .map_err(join_error)?
    .into_iter()
    .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items).into_response())
}

async fn tag_resp(
    store: Arc<dyn Store>,
    registry: Arc<dyn RegistryClient>,
    repository: String,
    tag: String,
) -> Result<TagResp, RegistryError> {
    let detail = registry
        .tag_detail(&repository, &tag)
        .await
        .map_err(|e| RegistryError::from_registry("failed to get the tag detail", e))?;
    let labels = store
        .get_labels_of_resource(ResourceType::Image, &image_full_name(&repository, &tag))
        .await?;
    Ok(TagResp {
        name: tag,
        detail,
        labels,
    })
}

// ── Repository labels ─────────────────────────────────────────────────────────

/// `GET /api/v2.0/projects/:project/repositories/:repo/labels`
pub async fn list_repository_labels(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((project, repo)): Path<(String, String)>,
) -> Result<Json<Vec<Label>>, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::List, ResourceKind::RepositoryLabel)
        .await?;
    let repository = require_repository(&state, &project, &repo).await?;
    let labels = LabelManager::new(state.store.clone())
        .labels_of(ResourceType::Repository, &repository.repository_id.to_string())
        .await?;
    Ok(Json(labels))
}

/// `POST /api/v2.0/projects/:project/repositories/:repo/labels` — Body `{"id": <label>}`.
pub async fn add_repository_label(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((project, repo)): Path<(String, String)>,
    JsonBody(label): JsonBody<LabelRef>,
) -> Result<StatusCode, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::Create, ResourceKind::RepositoryLabel)
        .await?;
    let repository = require_repository(&state, &project, &repo).await?;
    LabelManager::new(state.store.clone())
        .attach(
            label.id,
            project.project_id,
            ResourceType::Repository,
            &repository.repository_id.to_string(),
        )
        .await?;
    Ok(StatusCode::OK)
}

/// `DELETE /api/v2.0/projects/:project/repositories/:repo/labels/:id`
pub async fn remove_repository_label(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((project, repo, label_id)): Path<(String, String, i64)>,
) -> Result<StatusCode, RegistryError> {
    let project = ctx
        .require_project_access(&state, &ProjectRef::parse(&project), Action::Delete, ResourceKind::RepositoryLabel)
        .await?;
    let repository = require_repository(&state, &project, &repo).await?;
    LabelManager::new(state.store.clone())
        .detach(
            label_id,
            ResourceType::Repository,
            &repository.repository_id.to_string(),
        )
        .await?;
    Ok(StatusCode::OK)
}
