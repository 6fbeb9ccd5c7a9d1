// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Local users and user groups. System administrators only, except that a
//! user may read their own record.
//!
//! ## Endpoints
//!
//! - `GET    /api/v2.0/users`                  — List (paginated)
//! - `POST   /api/v2.0/users`                  — Create
//! - `GET    /api/v2.0/users/:id`              — Get
//! - `DELETE /api/v2.0/users/:id`              — Delete
//! - `PUT    /api/v2.0/users/:id/sysadmin`     — Grant or revoke system admin
//! - `GET    /api/v2.0/usergroups`             — List groups
//! - `POST   /api/v2.0/usergroups`             — Create a group
//! - `DELETE /api/v2.0/usergroups/:id`         — Delete a group

use crate::{
    auth,
    controller::{JsonBody, RequestContext, Validate, ValidatedJson},
    db::AppState,
    error::RegistryError,
    models::{NewUser, SysAdminFlag, User, UserGroup, UserGroupRequest, UserRequest, ROBOT_PREFIX},
    pagination::{Paginated, Pagination},
    security::{Action, ResourceKind},
    store::{Store, UserStore},
};
use axum::{
    extract::{Path, State},
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

pub const MIN_PASSWORD_LEN: usize = 8;

impl Validate for UserRequest {
    fn validate(&self) -> Result<(), String> {
        let name = self.username.trim();
        if name.is_empty() || name.len() > 255 {
            return Err("username must be 1 to 255 characters".into());
        }
        if name.starts_with(ROBOT_PREFIX) {
            return Err(format!("username must not start with {ROBOT_PREFIX}"));
        }
        if name.contains([',', '~', '#', '$', '%', ':']) {
            return Err(format!("username {name} contains illegal characters"));
        }
        if self.password.len() < MIN_PASSWORD_LEN {
            return Err(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            ));
        }
        Ok(())
    }
}

impl Validate for UserGroupRequest {
    fn validate(&self) -> Result<(), String> {
        if self.group_name.trim().is_empty() {
            return Err("group_name is required".into());
        }
        Ok(())
    }
}

// ── Users ─────────────────────────────────────────────────────────────────────

/// `GET /api/v2.0/users`
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Pagination(page): Pagination,
) -> Result<Paginated<User>, RegistryError> {
    ctx.require_system_access(ResourceKind::User, Action::List)?;
    let (total, items) = state.store.list_users(Some(page)).await?;
    Ok(Paginated {
        items,
        total,
        page,
        uri: ctx.uri,
    })
}

/// `POST /api/v2.0/users`
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<UserRequest>,
) -> Result<Response, RegistryError> {
    ctx.require_system_access(ResourceKind::User, Action::Create)?;
    let username = req.username.trim().to_string();
    if state.store.get_user_by_name(&username).await?.is_some() {
        return Err(RegistryError::Conflict(format!(
            "user {username} already exists"
        )));
    }

    let salt = auth::generate_salt();
    let id = state
        .store
        .add_user(NewUser {
            username: username.clone(),
            email: req.email,
            realname: req.realname,
            password_hash: auth::hash_password(&req.password, &salt),
            salt,
            sysadmin_flag: false,
            group_ids: req.group_ids,
        })
        .await?;
    tracing::info!("User {username} created by {}", ctx.username());

    let location = HeaderValue::from_str(&format!("/api/v2.0/users/{id}"))
        .map_err(|e| RegistryError::internal(format!("location header: {e}")))?;
    Ok((StatusCode::CREATED, [(LOCATION, location)]).into_response())
}

/// `GET /api/v2.0/users/:id`
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<Json<User>, RegistryError> {
    ctx.require_authenticated()?;
    if ctx.security.user_id() != Some(id) {
        ctx.require_system_access(ResourceKind::User, Action::Read)?;
    }
    state
        .store
        .get_user(id)
        .await?
        .map(Json)
        .ok_or_else(|| RegistryError::NotFound(format!("user {id} not found")))
}

/// `DELETE /api/v2.0/users/:id`
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<StatusCode, RegistryError> {
    ctx.require_system_access(ResourceKind::User, Action::Delete)?;
    if ctx.security.user_id() == Some(id) {
        return Err(RegistryError::Forbidden("cannot delete yourself".into()));
    }
    if !state.store.delete_user(id).await? {
        return Err(RegistryError::NotFound(format!("user {id} not found")));
    }
    tracing::info!("User {id} deleted by {}", ctx.username());
    Ok(StatusCode::OK)
}

/// `PUT /api/v2.0/users/:id/sysadmin` — Body `{"sysadmin_flag": bool}`.
pub async fn set_sysadmin(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<i64>,
    JsonBody(flag): JsonBody<SysAdminFlag>,
) -> Result<StatusCode, RegistryError> {
    ctx.require_system_access(ResourceKind::User, Action::Update)?;
    if state.store.get_user(id).await?.is_none() {
        return Err(RegistryError::NotFound(format!("user {id} not found")));
    }
    state.store.set_sysadmin(id, flag.sysadmin_flag).await?;
    tracing::info!(
        "User {id} sysadmin={} set by {}",
        flag.sysadmin_flag,
        ctx.username()
    );
    Ok(StatusCode::OK)
}

// ── Groups ────────────────────────────────────────────────────────────────────

/// `GET /api/v2.0/usergroups`
pub async fn list_groups(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Json<Vec<UserGroup>>, RegistryError> {
    ctx.require_system_access(ResourceKind::UserGroup, Action::List)?;
    Ok(Json(state.store.list_groups().await?))
}

/// `POST /api/v2.0/usergroups`
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<UserGroupRequest>,
) -> Result<(StatusCode, Json<UserGroup>), RegistryError> {
    ctx.require_system_access(ResourceKind::UserGroup, Action::Create)?;
    let group_name = req.group_name.trim().to_string();
    let id = state.store.add_group(&group_name).await?;
    Ok((StatusCode::CREATED, Json(UserGroup { id, group_name })))
}

/// `DELETE /api/v2.0/usergroups/:id`
pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<StatusCode, RegistryError> {
    ctx.require_system_access(ResourceKind::UserGroup, Action::Delete)?;
    if !state.store.delete_group(id).await? {
        return Err(RegistryError::NotFound(format!("user group {id} not found")));
    }
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(username: &str, password: &str) -> UserRequest {
        UserRequest {
            username: username.into(),
            email: String::new(),
            realname: String::new(),
            password: password.into(),
            group_ids: Vec::new(),
        }
    }

    #[test]
    fn usernames_and_passwords_are_checked() {
        assert!(req("alice", "s3cretpass").validate().is_ok());
        assert!(req("", "s3cretpass").validate().is_err());
        assert!(req("robot$ci", "s3cretpass").validate().is_err());
        assert!(req("a:b", "s3cretpass").validate().is_err());
        assert!(req("alice", "short").validate().is_err());
    }
}
