// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Chart repository: an access-controlled proxy in front of the chart backend.
//!
//! ## Endpoints
//!
//! - `GET    /chartrepo/index.yaml`                         — Merged index of every project (system admin)
//! - `GET    /chartrepo/:repo/index.yaml`                   — Index of one project
//! - `GET    /chartrepo/:repo/charts/:filename`             — Download a packaged chart
//! - `GET    /api/v2.0/chartrepo/health`                    — Backend health
//! - `GET    /api/v2.0/chartrepo/:repo/charts`              — Charts of a project
//! - `POST   /api/v2.0/chartrepo/:repo/charts`              — Upload a chart (multipart `chart`, optional `prov`)
//! - `POST   /api/v2.0/chartrepo/:repo/prov`                — Upload a provenance file
//! - `POST   /api/v2.0/chartrepo/charts`                    — Upload into the default project
//! - `GET    /api/v2.0/chartrepo/:repo/charts/:name`        — Versions of a chart, with labels
//! - `DELETE /api/v2.0/chartrepo/:repo/charts/:name`        — Delete every version
//! - `GET    /api/v2.0/chartrepo/:repo/charts/:name/:version` — Version details, with labels
//! - `DELETE /api/v2.0/chartrepo/:repo/charts/:name/:version` — Delete one version
//! - `GET|POST /api/v2.0/chartrepo/:repo/charts/:name/:version/labels`, `DELETE .../labels/:id`

use crate::{
    chart::{
        chart_full_name, parse_chart_archive, parse_chart_filename, ChartInfo, ChartVersion,
        ChartVersionDetails, ProxyRequest, DEFAULT_NAMESPACE,
    },
    controller::{JsonBody, RequestContext, Yaml},
    db::AppState,
    error::RegistryError,
    events::{ChartDeleteEvent, ChartDownloadEvent, ChartUploadEvent, Event},
    labels::LabelManager,
    models::{Label, LabelRef, Project, ProjectQuery, ProjectRef, ResourceType},
    multipart::{
        is_multipart, rewrite_form, FormField, RewriteError, RewrittenForm, CHART_FIELD,
        CHART_UPLOAD_FIELDS, PROV_UPLOAD_FIELDS,
    },
    security::{Action, ResourceKind},
};
use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::Response,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

/// Largest chart or provenance upload accepted.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Resolve the project behind a chart namespace and check access to it.
/// A namespace without a project is a bad request rather than a 404.
async fn chart_project(
    state: &AppState,
    ctx: &RequestContext,
    repo: &str,
    action: Action,
    kind: ResourceKind,
) -> Result<Project, RegistryError> {
    ctx.require_project_access(state, &ProjectRef::Name(repo.to_string()), action, kind)
        .await
        .map_err(|e| match e {
            RegistryError::NotFound(_) => {
                RegistryError::BadInput(format!("namespace {repo} is not existing"))
            }
            other => other,
        })
}

/// Forward the request as received, with an optional replacement body.
async fn forward(
    state: &AppState,
    ctx: &RequestContext,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RegistryError> {
    let path_and_query = ctx
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| ctx.uri.path().to_string());
    state
        .charts
        .proxy(ProxyRequest {
            method: ctx.method.clone(),
            path_and_query,
            headers,
            body,
        })
        .await
        .map_err(|e| RegistryError::from_chart("failed to reach the chart backend", e))
}

fn chart_error(operation: &str) -> impl FnOnce(crate::chart::ChartError) -> RegistryError + '_ {
    move |e| RegistryError::from_chart(operation, e)
}

/// Attach stored labels to each version.
async fn with_labels(
    labels: &LabelManager,
    repo: &str,
    mut versions: Vec<ChartVersion>,
) -> Result<Vec<ChartVersion>, RegistryError> {
    for version in versions.iter_mut() {
        let full_name = chart_full_name(repo, &version.name, &version.version);
        version.labels = labels.labels_of(ResourceType::Chart, &full_name).await?;
    }
    Ok(versions)
}

// ── Index and download ────────────────────────────────────────────────────────

/// `GET /chartrepo/index.yaml` — Index merged across all projects.
pub async fn index_all(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Yaml<crate::chart::IndexFile>, RegistryError> {
    ctx.require_sys_admin()?;
    let projects = state.projects.list(&ProjectQuery::default()).await?;
    let namespaces: Vec<String> = projects.projects.into_iter().map(|p| p.name).collect();
    let index = state
        .charts
        .build_index(&namespaces)
        .await
        .map_err(chart_error("failed to build the chart index"))?;
    Ok(Yaml(index))
}

/// `GET /chartrepo/:repo/index.yaml`
pub async fn index(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(repo): Path<String>,
    headers: HeaderMap,
) -> Result<Response, RegistryError> {
    chart_project(&state, &ctx, &repo, Action::Read, ResourceKind::HelmChart).await?;
    forward(&state, &ctx, headers, Bytes::new()).await
}

/// `GET /chartrepo/:repo/charts/:filename` — Download; records a download event.
pub async fn download(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((repo, filename)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, RegistryError> {
    chart_project(&state, &ctx, &repo, Action::Read, ResourceKind::HelmChart).await?;
    let response = forward(&state, &ctx, headers, Bytes::new()).await?;

    if response.status().is_success() && filename.ends_with(".tgz") {
        let (chart_name, version) = parse_chart_filename(&filename);
        state.events.publish(Event::ChartDownload(ChartDownloadEvent {
            operator: ctx.username(),
            project_name: repo,
            chart_name,
            version,
            occur_at: Utc::now(),
        }));
    }
    Ok(response)
}

/// `GET /api/v2.0/chartrepo/health`
pub async fn health(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    headers: HeaderMap,
) -> Result<Response, RegistryError> {
    ctx.require_sys_admin()?;
    forward(&state, &ctx, headers, Bytes::new()).await
}

// ── Charts and versions ───────────────────────────────────────────────────────

/// `GET /api/v2.0/chartrepo/:repo/charts`
pub async fn list_charts(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(repo): Path<String>,
) -> Result<Json<Vec<ChartInfo>>, RegistryError> {
    chart_project(&state, &ctx, &repo, Action::List, ResourceKind::HelmChart).await?;
    let charts = state
        .charts
        .list_charts(&repo)
        .await
        .map_err(chart_error("failed to list charts"))?;
    Ok(Json(charts))
}

/// `GET /api/v2.0/chartrepo/:repo/charts/:name`
pub async fn list_versions(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((repo, name)): Path<(String, String)>,
) -> Result<Json<Vec<ChartVersion>>, RegistryError> {
    chart_project(&state, &ctx, &repo, Action::List, ResourceKind::HelmChartVersion).await?;
    let versions = state
        .charts
        .get_chart(&repo, &name)
        .await
        .map_err(chart_error("failed to get the chart"))?;
    let labels = LabelManager::new(state.store.clone());
    Ok(Json(with_labels(&labels, &repo, versions).await?))
}

/// `GET /api/v2.0/chartrepo/:repo/charts/:name/:version`
pub async fn get_version(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((repo, name, version)): Path<(String, String, String)>,
) -> Result<Json<ChartVersionDetails>, RegistryError> {
    chart_project(&state, &ctx, &repo, Action::Read, ResourceKind::HelmChartVersion).await?;
    let mut details = state
        .charts
        .get_chart_version_details(&repo, &name, &version)
        .await
        .map_err(chart_error("failed to get the chart version"))?;
    details.labels = LabelManager::new(state.store.clone())
        .labels_of(ResourceType::Chart, &chart_full_name(&repo, &name, &version))
        .await?;
    Ok(Json(details))
}

/// `DELETE /api/v2.0/chartrepo/:repo/charts/:name` — Labels go first, then every version.
pub async fn delete_chart(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((repo, name)): Path<(String, String)>,
) -> Result<StatusCode, RegistryError> {
    chart_project(&state, &ctx, &repo, Action::Delete, ResourceKind::HelmChart).await?;
    let versions = state
        .charts
        .get_chart(&repo, &name)
        .await
        .map_err(chart_error("failed to get the chart"))?;

    let labels = LabelManager::new(state.store.clone());
    for version in &versions {
        labels
            .detach_all(ResourceType::Chart, &chart_full_name(&repo, &name, &version.version))
            .await?;
    }
    state
        .charts
        .delete_chart(&repo, &name)
        .await
        .map_err(chart_error("failed to delete the chart"))?;
    tracing::info!("Deleted chart {repo}/{name} ({} versions)", versions.len());

    state.events.publish(Event::ChartDelete(ChartDeleteEvent {
        operator: ctx.username(),
        project_name: repo,
        chart_name: name,
        versions: versions.into_iter().map(|v| v.version).collect(),
        occur_at: Utc::now(),
    }));
    Ok(StatusCode::OK)
}

/// `DELETE /api/v2.0/chartrepo/:repo/charts/:name/:version`
pub async fn delete_version(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((repo, name, version)): Path<(String, String, String)>,
) -> Result<StatusCode, RegistryError> {
    chart_project(&state, &ctx, &repo, Action::Delete, ResourceKind::HelmChartVersion).await?;
    LabelManager::new(state.store.clone())
        .detach_all(ResourceType::Chart, &chart_full_name(&repo, &name, &version))
        .await?;
    state
        .charts
        .delete_chart_version(&repo, &name, &version)
        .await
        .map_err(chart_error("failed to delete the chart version"))?;
    tracing::info!("Deleted chart {repo}/{name}:{version}");

    state.events.publish(Event::ChartDelete(ChartDeleteEvent {
        operator: ctx.username(),
        project_name: repo,
        chart_name: name,
        versions: vec![version],
        occur_at: Utc::now(),
    }));
    Ok(StatusCode::OK)
}

// ── Uploads ───────────────────────────────────────────────────────────────────

/// Build the upload event from the rewritten form. Failures only log.
fn upload_event(ctx: &RequestContext, project: &Project, form: &RewrittenForm) -> Option<ChartUploadEvent> {
    let chart = form.file(CHART_FIELD)?;
    match parse_chart_archive(&chart.data) {
        Ok(archive) => Some(ChartUploadEvent {
            operator: ctx.username(),
            project_name: project.name.clone(),
            chart_name: archive.metadata.name,
            version: archive.metadata.version,
            public: project.is_public(),
            occur_at: Utc::now(),
        }),
        Err(e) => {
            tracing::warn!("no upload event for {}: {e}", chart.filename);
            None
        }
    }
}

async fn upload(
    state: &AppState,
    ctx: &RequestContext,
    repo: &str,
    req: Request,
    fields: &[FormField],
) -> Result<Response, RegistryError> {
    let project =
        chart_project(state, ctx, repo, Action::Create, ResourceKind::HelmChartVersion).await?;

    let mut headers = req.headers().clone();
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    if !is_multipart(content_type) {
        let body = axum::body::to_bytes(req.into_body(), MAX_UPLOAD_BYTES)
            .await
            .map_err(|e| RegistryError::BadInput(format!("failed to read the upload: {e}")))?;
        return forward(state, ctx, headers, body).await;
    }

    let multipart = Multipart::from_request(req, &())
        .await
        .map_err(|e| RegistryError::BadInput(e.body_text()))?;
    let form = rewrite_form(multipart, fields).await.map_err(|e| match e {
        RewriteError::MissingField(_) => RegistryError::internal(format!("rewrite: {e}")),
        RewriteError::Read(_) => RegistryError::BadInput(e.to_string()),
    })?;

    let event = upload_event(ctx, &project, &form);
    let content_type = HeaderValue::from_str(&form.content_type)
        .map_err(|e| RegistryError::internal(format!("rewrite: {e}")))?;
    headers.insert(CONTENT_TYPE, content_type);
    headers.remove(CONTENT_LENGTH);

    let response = forward(state, ctx, headers, form.body).await?;
    if response.status().is_success() {
        if let Some(event) = event {
            tracing::info!(
                "Uploaded chart {}/{}:{}",
                event.project_name,
                event.chart_name,
                event.version
            );
            state.events.publish(Event::ChartUpload(event));
        }
    }
    Ok(response)
}

/// `POST /api/v2.0/chartrepo/:repo/charts`
pub async fn upload_chart(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(repo): Path<String>,
    req: Request,
) -> Result<Response, RegistryError> {
    upload(&state, &ctx, &repo, req, &CHART_UPLOAD_FIELDS).await
}

/// `POST /api/v2.0/chartrepo/charts` — Upload into the default project.
pub async fn upload_chart_default(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    req: Request,
) -> Result<Response, RegistryError> {
    upload(&state, &ctx, DEFAULT_NAMESPACE, req, &CHART_UPLOAD_FIELDS).await
}

/// `POST /api/v2.0/chartrepo/:repo/prov`
pub async fn upload_prov(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(repo): Path<String>,
    req: Request,
) -> Result<Response, RegistryError> {
    upload(&state, &ctx, &repo, req, &PROV_UPLOAD_FIELDS).await
}

// ── Version labels ────────────────────────────────────────────────────────────

async fn require_version(
    state: &AppState,
    repo: &str,
    name: &str,
    version: &str,
) -> Result<(), RegistryError> {
    let versions = state
        .charts
        .get_chart(repo, name)
        .await
        .map_err(chart_error("failed to get the chart"))?;
    if versions.iter().any(|v| v.version == version) {
        Ok(())
    } else {
        Err(RegistryError::NotFound(format!(
            "chart {repo}/{name}:{version} not found"
        )))
    }
}

/// `GET /api/v2.0/chartrepo/:repo/charts/:name/:version/labels`
pub async fn list_version_labels(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((repo, name, version)): Path<(String, String, String)>,
) -> Result<Json<Vec<Label>>, RegistryError> {
    chart_project(&state, &ctx, &repo, Action::Read, ResourceKind::HelmChartVersion).await?;
    let labels = LabelManager::new(state.store.clone())
        .labels_of(ResourceType::Chart, &chart_full_name(&repo, &name, &version))
        .await?;
    Ok(Json(labels))
}

/// `POST /api/v2.0/chartrepo/:repo/charts/:name/:version/labels` — Body `{"id": <label>}`.
pub async fn add_version_label(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((repo, name, version)): Path<(String, String, String)>,
    JsonBody(label): JsonBody<LabelRef>,
) -> Result<StatusCode, RegistryError> {
    let project = chart_project(
        &state,
        &ctx,
        &repo,
        Action::Create,
        ResourceKind::HelmChartVersionLabel,
    )
    .await?;
    require_version(&state, &repo, &name, &version).await?;
    LabelManager::new(state.store.clone())
        .attach(
            label.id,
            project.project_id,
            ResourceType::Chart,
            &chart_full_name(&repo, &name, &version),
        )
        .await?;
    Ok(StatusCode::OK)
}

/// `DELETE /api/v2.0/chartrepo/:repo/charts/:name/:version/labels/:id`
pub async fn remove_version_label(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((repo, name, version, label_id)): Path<(String, String, String, i64)>,
) -> Result<StatusCode, RegistryError> {
    chart_project(
        &state,
        &ctx,
        &repo,
        Action::Delete,
        ResourceKind::HelmChartVersionLabel,
    )
    .await?;
    LabelManager::new(state.store.clone())
        .detach(
            label_id,
            ResourceType::Chart,
            &chart_full_name(&repo, &name, &version),
        )
        .await?;
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::tests::chart_tgz;
    use crate::multipart::{FormFile, PROV_FIELD};
    use crate::security::{Principal, SecurityContext};
    use axum::http::{Method, Uri};
    use std::collections::{BTreeMap, HashMap};

    fn developer() -> RequestContext {
        RequestContext {
            security: Arc::new(SecurityContext::new(
                Principal::User {
                    user_id: 3,
                    username: "dev".into(),
                    sys_admin: false,
                },
                HashMap::new(),
            )),
            method: Method::POST,
            uri: Uri::from_static("/api/v2.0/chartrepo/library/charts"),
        }
    }

    fn library(public: bool) -> Project {
        let mut metadata = BTreeMap::new();
        metadata.insert("public".to_string(), public.to_string());
        Project {
            project_id: 1,
            name: "library".into(),
            owner_id: 1,
            metadata,
            creation_time: Utc::now(),
            update_time: Utc::now(),
        }
    }

    fn form(files: Vec<FormFile>) -> RewrittenForm {
        RewrittenForm {
            content_type: "multipart/form-data; boundary=x".into(),
            body: Bytes::new(),
            files,
        }
    }

    #[test]
    fn upload_event_reads_name_and_version_from_the_archive() {
        let form = form(vec![FormFile {
            field: CHART_FIELD.into(),
            filename: "whatever.tgz".into(),
            data: Bytes::from(chart_tgz("web", "1.2.3")),
        }]);
        let event = upload_event(&developer(), &library(true), &form).unwrap();
        assert_eq!(event.project_name, "library");
        assert_eq!(event.chart_name, "web");
        assert_eq!(event.version, "1.2.3");
        assert_eq!(event.operator, "dev");
        assert!(event.public);
    }

    #[test]
    fn unreadable_chart_or_prov_only_upload_has_no_event() {
        let garbage = form(vec![FormFile {
            field: CHART_FIELD.into(),
            filename: "web-1.2.3.tgz".into(),
            data: Bytes::from_static(b"nope"),
        }]);
        assert!(upload_event(&developer(), &library(false), &garbage).is_none());

        let prov = form(vec![FormFile {
            field: PROV_FIELD.into(),
            filename: "web-1.2.3.tgz.prov".into(),
            data: Bytes::from_static(b"sig"),
        }]);
        assert!(upload_event(&developer(), &library(false), &prov).is_none());
    }
}
