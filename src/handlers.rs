// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Liveness and component health.

use crate::{db::AppState, health::OverallHealth};
use axum::{extract::State, Json};
use std::sync::Arc;

// ── Ping ──────────────────────────────────────────────────────────────────────

/// `GET /api/v2.0/ping` — Always the JSON string `"Pong"`.
pub async fn ping() -> Json<&'static str> {
    Json("Pong")
}

// ── Health ────────────────────────────────────────────────────────────────────

/// `GET /api/v2.0/health` — Status of every registered component.
///
/// Each checker gets the configured timeout; one that does not answer in
/// time is reported unhealthy without holding up the others.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<OverallHealth> {
    let health = state
        .health
        .check_all(state.config.health_check_timeout)
        .await;
    if health.status != crate::health::HEALTHY {
        for component in health.components.iter().filter(|c| c.error.is_some()) {
            tracing::warn!(
                "component {} is {}: {}",
                component.name,
                component.status,
                component.error.as_deref().unwrap_or_default()
            );
        }
    }
    Json(health)
}
