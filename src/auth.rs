// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Caller authentication.
//!
//! [`attach_security_context`] runs in front of every route and stores an
//! `Arc<SecurityContext>` in the request extensions. Accepted credentials:
//!
//! ```text
//! Authorization: Secret <core secret>        → solution user "jobservice"
//! Authorization: Basic robot$<name>:<token>  → robot account
//! Authorization: Basic <user>:<password>     → local user
//! ```
//!
//! Anything else, including credentials that fail verification, yields an
//! anonymous context; the access policy then decides between 401 and allow.

use crate::{
    db::AppState,
    error::RegistryError,
    models::{ProjectRole, ROBOT_PREFIX},
    security::{Action, Principal, ResourceKind, SecurityContext},
    store::{MemberStore, RobotStore, UserStore},
};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const SOLUTION_USER: &str = "jobservice";

/// Credentials found in the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Secret(String),
    Basic { username: String, password: String },
    None,
}

pub fn parse_authorization(headers: &HeaderMap) -> Credentials {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return Credentials::None;
    };
    if let Some(secret) = value.strip_prefix("Secret ") {
        return Credentials::Secret(secret.trim().to_string());
    }
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return Credentials::None;
    };
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return Credentials::None;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return Credentials::None;
    };
    match decoded.split_once(':') {
        Some((username, password)) => Credentials::Basic {
            username: username.to_string(),
            password: password.to_string(),
        },
        None => Credentials::None,
    }
}

// ── Hashing ───────────────────────────────────────────────────────────────────

/// Hex SHA-256 of `salt || password`.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Constant-time string equality for secrets and stored hashes.
pub fn secrets_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

pub fn generate_salt() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// 32 random bytes, base64url without padding.
pub fn generate_token() -> String {
    let mut raw = Vec::with_capacity(32);
    raw.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    raw.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(raw)
}

// ── Context resolution ────────────────────────────────────────────────────────

/// Build the security context for a set of request headers.
pub async fn resolve(state: &AppState, headers: &HeaderMap) -> Result<SecurityContext, RegistryError> {
    match parse_authorization(headers) {
        Credentials::Secret(secret) => {
            if state.config.core_secret.as_deref().is_some_and(|s| secrets_match(s, &secret)) {
                return Ok(SecurityContext::new(
                    Principal::Solution {
                        name: SOLUTION_USER.into(),
                        provisioned: vec![(ResourceKind::AdminJob, Action::Update)],
                    },
                    HashMap::new(),
                ));
            }
            tracing::debug!("rejected secret credentials");
        }
        Credentials::Basic { username, password } if username.starts_with(ROBOT_PREFIX) => {
            if let Some(robot) = state.store.get_robot_by_name(&username).await? {
                if !robot.disabled && secrets_match(&robot.token_hash, &hash_token(&password)) {
                    return Ok(SecurityContext::new(
                        Principal::Robot {
                            robot_id: robot.id,
                            name: robot.name,
                            project_id: robot.project_id,
                            access: robot.access,
                        },
                        HashMap::new(),
                    ));
                }
            }
            tracing::debug!("rejected robot credentials for {username}");
        }
        Credentials::Basic { username, password } => {
            if let Some(user) = state.store.get_user_by_name(&username).await? {
                if secrets_match(&user.password_hash, &hash_password(&password, &user.salt)) {
                    let mut roles: HashMap<i64, Vec<ProjectRole>> = HashMap::new();
                    for (project_id, role) in state.store.roles_of(user.user_id, &user.group_ids).await? {
                        roles.entry(project_id).or_default().push(role);
                    }
                    return Ok(SecurityContext::new(
                        Principal::User {
                            user_id: user.user_id,
                            username: user.username,
                            sys_admin: user.sysadmin_flag,
                        },
                        roles,
                    ));
                }
            }
            tracing::debug!("rejected credentials for {username}");
        }
        Credentials::None => {}
    }
    Ok(SecurityContext::anonymous())
}

/// Middleware: attach the caller's [`SecurityContext`] to the request.
pub async fn attach_security_context(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    match resolve(&state, req.headers()).await {
        Ok(ctx) => {
            req.extensions_mut().insert(Arc::new(ctx));
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}
