// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Per-request controller kernel shared by every handler.
//!
//! Handlers take a [`RequestContext`] (the caller's security context plus the
//! request line) and use its gates before touching the store:
//!
//! ```text
//! ctx.require_authenticated()?;
//! let project = ctx.require_project_access(&state, &project_ref, Action::Read, ResourceKind::Repository).await?;
//! ```
//!
//! Bodies are decoded with [`JsonBody`] or, when the type implements
//! [`Validate`], with [`ValidatedJson`]. Decode failures use the same error
//! envelope as every other failure.

use crate::{
    db::AppState,
    error::{FailureDetail, RegistryError},
    models::{Project, ProjectRef},
    security::{decide, Action, Decision, Namespace, Resource, ResourceKind, SecurityContext},
};
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, OriginalUri, Request},
    http::{header::CONTENT_TYPE, request::Parts, HeaderValue, Method, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

/// Path excluded from the request log; it is polled constantly.
pub const HEALTH_PATH: &str = "/api/v2.0/health";

// ── Request context ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub security: Arc<SecurityContext>,
    pub method: Method,
    pub uri: Uri,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = RegistryError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let security = parts
            .extensions
            .get::<Arc<SecurityContext>>()
            .cloned()
            .unwrap_or_else(|| Arc::new(SecurityContext::anonymous()));
        // nested routers strip their prefix from `parts.uri`
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| original.0.clone())
            .unwrap_or_else(|| parts.uri.clone());
        Ok(Self {
            security,
            method: parts.method.clone(),
            uri,
        })
    }
}

impl RequestContext {
    pub fn username(&self) -> String {
        self.security.username()
    }

    pub fn require_authenticated(&self) -> Result<(), RegistryError> {
        if self.security.is_authenticated() {
            Ok(())
        } else {
            Err(RegistryError::Unauthenticated("UnAuthorize".into()))
        }
    }

    pub fn require_sys_admin(&self) -> Result<(), RegistryError> {
        self.require_authenticated()?;
        if self.security.is_sys_admin() {
            Ok(())
        } else {
            Err(RegistryError::Forbidden(format!(
                "{} is not a system administrator",
                self.username()
            )))
        }
    }

    /// Gate a resource, mapping the policy decision onto 401 / 403.
    pub fn check(&self, resource: &Resource, action: Action) -> Result<(), RegistryError> {
        match decide(&self.security, resource, action) {
            Decision::Allow => Ok(()),
            Decision::Unauthenticated => Err(RegistryError::Unauthenticated("UnAuthorize".into())),
            Decision::Forbidden => Err(RegistryError::Forbidden(format!(
                "{} has no permission to {action:?} {:?}",
                display_name(&self.security),
                resource.kind
            ))),
        }
    }

    pub fn require_system_access(&self, kind: ResourceKind, action: Action) -> Result<(), RegistryError> {
        self.check(&Namespace::System.sub(kind), action)
    }

    /// Load the project and check `action` on `kind` inside it.
    ///
    /// A missing project is 404 for authenticated callers and 401 for
    /// anonymous ones, so existence is not disclosed without credentials.
    pub async fn require_project_access(
        &self,
        state: &AppState,
        project: &ProjectRef,
        action: Action,
        kind: ResourceKind,
    ) -> Result<Project, RegistryError> {
        let Some(found) = state.projects.get(project).await? else {
            self.require_authenticated()?;
            return Err(RegistryError::NotFound(format!("project {project} not found")));
        };
        let resource = Namespace::project(found.project_id)
            .sub(kind)
            .public(found.is_public());
        self.check(&resource, action)?;
        Ok(found)
    }
}

fn display_name(ctx: &SecurityContext) -> String {
    let name = ctx.username();
    if name.is_empty() {
        "anonymous".into()
    } else {
        name
    }
}

// ── Request bodies ────────────────────────────────────────────────────────────

/// Declarative field validation run after decoding.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// JSON body whose decode failures use the error envelope.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = RegistryError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| RegistryError::BadInput(rejection.body_text()))?;
        Ok(JsonBody(value))
    }
}

/// JSON body that is decoded and then validated.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = RegistryError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let JsonBody(value) = JsonBody::<T>::from_request(req, state).await?;
        value.validate().map_err(RegistryError::BadInput)?;
        Ok(ValidatedJson(value))
    }
}

// ── Responses ─────────────────────────────────────────────────────────────────

pub const YAML_CONTENT_TYPE: &str = "application/x-yaml";

/// YAML response body.
pub struct Yaml<T>(pub T);

impl<T: Serialize> IntoResponse for Yaml<T> {
    fn into_response(self) -> Response {
        match serde_yaml::to_string(&self.0) {
            Ok(body) => (
                [(CONTENT_TYPE, HeaderValue::from_static(YAML_CONTENT_TYPE))],
                body,
            )
                .into_response(),
            Err(e) => RegistryError::internal(format!("encode yaml: {e}")).into_response(),
        }
    }
}

// ── Request log ───────────────────────────────────────────────────────────────

/// Middleware: log every request with its status, and the full cause of
/// every error envelope.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;
    let status = response.status();

    if let Some(FailureDetail(detail)) = response.extensions().get::<FailureDetail>() {
        if status.is_server_error() {
            tracing::error!("{method} {uri} -> {}: {detail}", status.as_u16());
        } else {
            tracing::warn!("{method} {uri} -> {}: {detail}", status.as_u16());
        }
    } else if uri.path() != HEALTH_PATH {
        tracing::info!("{method} {uri} -> {}", status.as_u16());
    }
    response
}
