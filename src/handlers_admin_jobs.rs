// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Handlers for administrative jobs.
//!
//! ## Endpoints
//!
//! - `POST   /api/v2.0/admin-jobs`                 — Launch or schedule a job
//! - `GET    /api/v2.0/admin-jobs?name=`           — Ten most recent executions
//! - `GET    /api/v2.0/admin-jobs/schedule?name=`  — Current schedule
//! - `PUT    /api/v2.0/admin-jobs/schedule`        — Replace or cancel a schedule
//! - `GET    /api/v2.0/admin-jobs/:id`             — One job
//! - `DELETE /api/v2.0/admin-jobs/:id`             — Delete a finished job
//! - `GET    /api/v2.0/admin-jobs/:id/log`         — Job log (text/plain)
//! - `/api/v2.0/system/gc*`, `/api/v2.0/system/scanAll/schedule` — the same, bound to one job name
//! - `POST   /service/notifications/jobs/adminjob/:id` — Status hook for the job service

use crate::{
    admin_job::{AdminJobController, StatusHook},
    controller::{JsonBody, RequestContext, Validate, ValidatedJson},
    db::AppState,
    error::RegistryError,
    models::{AdminJobRep, AdminJobRequest, AdminJobSchedule, GC_JOB, SCAN_ALL_JOB},
    security::{Action, ResourceKind},
};
use axum::{
    extract::{Path, Query, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

pub const ADMIN_JOBS_PATH: &str = "/api/v2.0/admin-jobs";

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: Option<String>,
}

impl NameQuery {
    fn required(self) -> Result<String, RegistryError> {
        self.name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| RegistryError::BadInput("query parameter 'name' is required".into()))
    }
}

/// Body of the name-bound schedule endpoints; the name comes from the path.
#[derive(Debug, Deserialize)]
pub struct ScheduleBody {
    pub schedule: Option<crate::models::Schedule>,
    #[serde(default)]
    pub parameters: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ScheduleBody {
    fn named(self, name: &str) -> AdminJobRequest {
        AdminJobRequest {
            name: name.to_string(),
            schedule: self.schedule,
            parameters: self.parameters,
        }
    }
}

fn created(id: Option<i64>) -> Response {
    match id {
        Some(id) => {
            let location = format!("{ADMIN_JOBS_PATH}/{id}");
            match HeaderValue::from_str(&location) {
                Ok(value) => (StatusCode::CREATED, [(LOCATION, value)]).into_response(),
                Err(_) => StatusCode::CREATED.into_response(),
            }
        }
        None => StatusCode::OK.into_response(),
    }
}

fn text_log(body: bytes::Bytes) -> Response {
    let len = body.len();
    (
        [
            (CONTENT_TYPE, HeaderValue::from_static("text/plain")),
            (CONTENT_LENGTH, HeaderValue::from(len)),
        ],
        body,
    )
        .into_response()
}

// ── Generic admin-job API ─────────────────────────────────────────────────────

/// `POST /api/v2.0/admin-jobs` — Launch a job, or schedule it when periodic.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<AdminJobRequest>,
) -> Result<Response, RegistryError> {
    ctx.require_system_access(ResourceKind::AdminJob, Action::Create)?;
    let id = AdminJobController::from_state(&state).submit(&req).await?;
    Ok(created(id))
}

/// `GET /api/v2.0/admin-jobs?name=` — Most recent executions of one job.
pub async fn list(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(q): Query<NameQuery>,
) -> Result<Json<Vec<AdminJobRep>>, RegistryError> {
    ctx.require_system_access(ResourceKind::AdminJob, Action::List)?;
    let name = q.required()?;
    Ok(Json(AdminJobController::from_state(&state).list(&name).await?))
}

/// `GET /api/v2.0/admin-jobs/schedule?name=`
pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(q): Query<NameQuery>,
) -> Result<Json<AdminJobSchedule>, RegistryError> {
    ctx.require_system_access(ResourceKind::AdminJob, Action::Read)?;
    let name = q.required()?;
    Ok(Json(
        AdminJobController::from_state(&state)
            .get_schedule(&name)
            .await?,
    ))
}

/// `PUT /api/v2.0/admin-jobs/schedule` — Replace the schedule; type `None` cancels it.
pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<AdminJobRequest>,
) -> Result<StatusCode, RegistryError> {
    ctx.require_system_access(ResourceKind::AdminJob, Action::Update)?;
    AdminJobController::from_state(&state)
        .update_schedule(&req)
        .await?;
    Ok(StatusCode::OK)
}

/// `GET /api/v2.0/admin-jobs/:id`
pub async fn get(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<Json<AdminJobRep>, RegistryError> {
    ctx.require_system_access(ResourceKind::AdminJob, Action::Read)?;
    Ok(Json(AdminJobController::from_state(&state).get(id).await?))
}

/// `DELETE /api/v2.0/admin-jobs/:id` — Only finished jobs can be deleted.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<StatusCode, RegistryError> {
    ctx.require_system_access(ResourceKind::AdminJob, Action::Delete)?;
    AdminJobController::from_state(&state).delete(id).await?;
    Ok(StatusCode::OK)
}

/// `GET /api/v2.0/admin-jobs/:id/log`
pub async fn log(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<Response, RegistryError> {
    ctx.require_system_access(ResourceKind::AdminJob, Action::Read)?;
    let body = AdminJobController::from_state(&state).get_log(id).await?;
    Ok(text_log(body))
}

// ── Name-bound wrappers ───────────────────────────────────────────────────────

async fn submit_named(
    state: &AppState,
    ctx: &RequestContext,
    name: &str,
    body: ScheduleBody,
) -> Result<Response, RegistryError> {
    ctx.require_system_access(ResourceKind::AdminJob, Action::Create)?;
    let req = body.named(name);
    req.validate().map_err(RegistryError::BadInput)?;
    let id = AdminJobController::from_state(state).submit(&req).await?;
    Ok(created(id))
}

async fn update_named(
    state: &AppState,
    ctx: &RequestContext,
    name: &str,
    body: ScheduleBody,
) -> Result<StatusCode, RegistryError> {
    ctx.require_system_access(ResourceKind::AdminJob, Action::Update)?;
    let req = body.named(name);
    req.validate().map_err(RegistryError::BadInput)?;
    AdminJobController::from_state(state)
        .update_schedule(&req)
        .await?;
    Ok(StatusCode::OK)
}

async fn schedule_named(
    state: &AppState,
    ctx: &RequestContext,
    name: &str,
) -> Result<Json<AdminJobSchedule>, RegistryError> {
    ctx.require_system_access(ResourceKind::AdminJob, Action::Read)?;
    Ok(Json(
        AdminJobController::from_state(state)
            .get_schedule(name)
            .await?,
    ))
}

/// `GET /api/v2.0/system/gc` — Recent garbage-collection runs.
pub async fn gc_list(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Json<Vec<AdminJobRep>>, RegistryError> {
    ctx.require_system_access(ResourceKind::AdminJob, Action::List)?;
    Ok(Json(AdminJobController::from_state(&state).list(GC_JOB).await?))
}

/// `GET /api/v2.0/system/gc/:id`
pub async fn gc_get(
    state: State<Arc<AppState>>,
    ctx: RequestContext,
    id: Path<i64>,
) -> Result<Json<AdminJobRep>, RegistryError> {
    get(state, ctx, id).await
}

/// `GET /api/v2.0/system/gc/:id/log`
pub async fn gc_log(
    state: State<Arc<AppState>>,
    ctx: RequestContext,
    id: Path<i64>,
) -> Result<Response, RegistryError> {
    log(state, ctx, id).await
}

/// `GET /api/v2.0/system/gc/schedule`
pub async fn gc_get_schedule(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Json<AdminJobSchedule>, RegistryError> {
    schedule_named(&state, &ctx, GC_JOB).await
}

/// `POST /api/v2.0/system/gc/schedule`
pub async fn gc_create_schedule(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    JsonBody(body): JsonBody<ScheduleBody>,
) -> Result<Response, RegistryError> {
    submit_named(&state, &ctx, GC_JOB, body).await
}

/// `PUT /api/v2.0/system/gc/schedule`
pub async fn gc_update_schedule(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    JsonBody(body): JsonBody<ScheduleBody>,
) -> Result<StatusCode, RegistryError> {
    update_named(&state, &ctx, GC_JOB, body).await
}

/// `GET /api/v2.0/system/scanAll/schedule`
pub async fn scan_all_get_schedule(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Json<AdminJobSchedule>, RegistryError> {
    schedule_named(&state, &ctx, SCAN_ALL_JOB).await
}

/// `POST /api/v2.0/system/scanAll/schedule`
pub async fn scan_all_create_schedule(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    JsonBody(body): JsonBody<ScheduleBody>,
) -> Result<Response, RegistryError> {
    submit_named(&state, &ctx, SCAN_ALL_JOB, body).await
}

/// `PUT /api/v2.0/system/scanAll/schedule`
pub async fn scan_all_update_schedule(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    JsonBody(body): JsonBody<ScheduleBody>,
) -> Result<StatusCode, RegistryError> {
    update_named(&state, &ctx, SCAN_ALL_JOB, body).await
}

// ── Status hook ───────────────────────────────────────────────────────────────

/// `POST /service/notifications/jobs/adminjob/:id` — Called by the job service.
pub async fn status_hook(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<i64>,
    JsonBody(hook): JsonBody<StatusHook>,
) -> Result<StatusCode, RegistryError> {
    ctx.require_system_access(ResourceKind::AdminJob, Action::Update)?;
    AdminJobController::from_state(&state)
        .reconcile(id, &hook)
        .await?;
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_sets_location() {
        let response = created(Some(12));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[LOCATION], "/api/v2.0/admin-jobs/12");
        assert_eq!(created(None).status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn log_body_has_length_and_type() {
        let response = text_log(bytes::Bytes::from_static(b"line 1\nline 2\n"));
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(response.headers()[CONTENT_LENGTH], "14");
    }

    #[test]
    fn name_query_must_be_present() {
        assert!(NameQuery { name: None }.required().is_err());
        assert!(NameQuery { name: Some(" ".into()) }.required().is_err());
        assert_eq!(NameQuery { name: Some("gc".into()) }.required().unwrap(), "gc");
    }
}
