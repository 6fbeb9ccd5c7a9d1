// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Registry Control — control-plane API of a container image registry.
//!
//! Administrative jobs run on an external job service, charts are proxied to
//! a chart backend, and every request passes through one access policy.
//!
//! ## Endpoints
//!
//! - `GET /api/v2.0/ping`, `GET /api/v2.0/health`
//! - `/api/v2.0/admin-jobs…`, `/api/v2.0/system/gc…`, `/api/v2.0/system/scanAll/schedule`
//! - `/chartrepo/…`, `/api/v2.0/chartrepo/…`
//! - `/api/v2.0/projects…` (members, robots, logs, repositories, policies)
//! - `/api/v2.0/users…`, `/api/v2.0/usergroups…`, `/api/v2.0/labels…`
//! - `POST /service/notifications/jobs/adminjob/:id`

pub mod admin_job;
pub mod assemble;
pub mod auth;
pub mod chart;
pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod events;
pub mod handlers;
pub mod handlers_admin_jobs;
pub mod handlers_charts;
pub mod handlers_labels;
pub mod handlers_policies;
pub mod handlers_projects;
pub mod handlers_repositories;
pub mod handlers_users;
pub mod health;
pub mod labels;
pub mod models;
pub mod multipart;
pub mod pagination;
pub mod project_manager;
pub mod registry_client;
pub mod scan;
pub mod security;
pub mod store;
pub mod store_pg;
pub mod worker;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use db::AppState;

fn upload_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::max(handlers_charts::MAX_UPLOAD_BYTES)
}

/// Build the full router over `state`.
pub fn app(state: Arc<AppState>) -> Router {
    let admin_jobs = Router::new()
        .route(
            "/admin-jobs",
            get(handlers_admin_jobs::list).post(handlers_admin_jobs::submit),
        )
        .route(
            "/admin-jobs/schedule",
            get(handlers_admin_jobs::get_schedule).put(handlers_admin_jobs::update_schedule),
        )
        .route(
            "/admin-jobs/:id",
            get(handlers_admin_jobs::get).delete(handlers_admin_jobs::delete),
        )
        .route("/admin-jobs/:id/log", get(handlers_admin_jobs::log))
        .route("/system/gc", get(handlers_admin_jobs::gc_list))
        .route(
            "/system/gc/schedule",
            get(handlers_admin_jobs::gc_get_schedule)
                .post(handlers_admin_jobs::gc_create_schedule)
                .put(handlers_admin_jobs::gc_update_schedule),
        )
        .route("/system/gc/:id", get(handlers_admin_jobs::gc_get))
        .route("/system/gc/:id/log", get(handlers_admin_jobs::gc_log))
        .route(
            "/system/scanAll/schedule",
            get(handlers_admin_jobs::scan_all_get_schedule)
                .post(handlers_admin_jobs::scan_all_create_schedule)
                .put(handlers_admin_jobs::scan_all_update_schedule),
        );

    let charts = Router::new()
        .route("/chartrepo/health", get(handlers_charts::health))
        .route(
            "/chartrepo/charts",
            post(handlers_charts::upload_chart_default).layer(upload_limit()),
        )
        .route(
            "/chartrepo/:repo/charts",
            get(handlers_charts::list_charts).post(handlers_charts::upload_chart).layer(upload_limit()),
        )
        .route(
            "/chartrepo/:repo/prov",
            post(handlers_charts::upload_prov).layer(upload_limit()),
        )
        .route(
            "/chartrepo/:repo/charts/:name",
            get(handlers_charts::list_versions).delete(handlers_charts::delete_chart),
        )
        .route(
            "/chartrepo/:repo/charts/:name/:version",
            get(handlers_charts::get_version).delete(handlers_charts::delete_version),
        )
        .route(
            "/chartrepo/:repo/charts/:name/:version/labels",
            get(handlers_charts::list_version_labels).post(handlers_charts::add_version_label),
        )
        .route(
            "/chartrepo/:repo/charts/:name/:version/labels/:id",
            axum::routing::delete(handlers_charts::remove_version_label),
        );

    let projects = Router::new()
        .route(
            "/projects",
            get(handlers_projects::list_projects).post(handlers_projects::create_project),
        )
        .route(
            "/projects/:project",
            get(handlers_projects::get_project)
                .put(handlers_projects::update_project)
                .delete(handlers_projects::delete_project),
        )
        .route("/projects/:project/logs", get(handlers_projects::list_logs))
        .route(
            "/projects/:project/members",
            get(handlers_projects::list_members).post(handlers_projects::add_member),
        )
        .route(
            "/projects/:project/members/:mid",
            axum::routing::delete(handlers_projects::remove_member),
        )
        .route(
            "/projects/:project/robots",
            get(handlers_projects::list_robots).post(handlers_projects::create_robot),
        )
        .route(
            "/projects/:project/robots/:rid",
            get(handlers_projects::get_robot)
                .put(handlers_projects::update_robot)
                .delete(handlers_projects::delete_robot),
        )
        .route(
            "/projects/:project/repositories",
            get(handlers_repositories::list_repositories),
        )
        .route(
            "/projects/:project/repositories/:repo/tags",
            get(handlers_repositories::list_tags),
        )
        .route(
            "/projects/:project/repositories/:repo/labels",
            get(handlers_repositories::list_repository_labels)
                .post(handlers_repositories::add_repository_label),
        )
        .route(
            "/projects/:project/repositories/:repo/labels/:id",
            axum::routing::delete(handlers_repositories::remove_repository_label),
        )
        .route(
            "/projects/:project/policies/:kind",
            get(handlers_policies::list_policies).post(handlers_policies::create_policy),
        )
        .route(
            "/projects/:project/policies/:kind/:id",
            get(handlers_policies::get_policy)
                .put(handlers_policies::update_policy)
                .delete(handlers_policies::delete_policy),
        );

    let principals = Router::new()
        .route(
            "/users",
            get(handlers_users::list_users).post(handlers_users::create_user),
        )
        .route(
            "/users/:id",
            get(handlers_users::get_user).delete(handlers_users::delete_user),
        )
        .route("/users/:id/sysadmin", put(handlers_users::set_sysadmin))
        .route(
            "/usergroups",
            get(handlers_users::list_groups).post(handlers_users::create_group),
        )
        .route(
            "/usergroups/:id",
            axum::routing::delete(handlers_users::delete_group),
        )
        .route(
            "/labels",
            get(handlers_labels::list_labels).post(handlers_labels::create_label),
        )
        .route(
            "/labels/:id",
            get(handlers_labels::get_label)
                .put(handlers_labels::update_label)
                .delete(handlers_labels::delete_label),
        );

    let api = Router::new()
        .route("/ping", get(handlers::ping))
        .route("/health", get(handlers::health))
        .merge(admin_jobs)
        .merge(charts)
        .merge(projects)
        .merge(principals);

    Router::new()
        .nest("/api/v2.0", api)
        .route("/chartrepo/index.yaml", get(handlers_charts::index_all))
        .route("/chartrepo/:repo/index.yaml", get(handlers_charts::index))
        .route(
            "/chartrepo/:repo/charts/:filename",
            get(handlers_charts::download),
        )
        .route(
            "/service/notifications/jobs/adminjob/:id",
            post(handlers_admin_jobs::status_hook),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::attach_security_context,
        ))
        .layer(middleware::from_fn(controller::log_requests))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
