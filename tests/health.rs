// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

mod common;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{harness, harness_with};
use registry_control::{
    app,
    health::{Checker, OverallHealth, HEALTHY, TIMEOUT_MESSAGE, UNHEALTHY},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

/// Never answers.
struct HangingChecker;

#[async_trait]
impl Checker for HangingChecker {
    async fn check(&self) -> Result<(), String> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

struct FailingChecker;

#[async_trait]
impl Checker for FailingChecker {
    async fn check(&self) -> Result<(), String> {
        Err("connection refused".into())
    }
}

#[tokio::test]
async fn ping_answers_pong() {
    let h = harness();
    let response = app(h.state.clone())
        .oneshot(
            Request::builder()
                .uri("/api/v2.0/ping")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"\"Pong\"");
}

#[tokio::test]
async fn all_components_healthy() {
    let h = harness();
    let health: OverallHealth = h.server.get("/api/v2.0/health").await.json();
    assert_eq!(health.status, HEALTHY);
    let names: Vec<&str> = health.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["core", "database"]);
    assert!(health.components.iter().all(|c| c.error.is_none()));
}

#[tokio::test]
async fn hanging_component_times_out_without_holding_up_the_rest() {
    let h = harness_with(|state| {
        state.config.health_check_timeout = Duration::from_millis(200);
        state.health.register("external", Arc::new(HangingChecker));
    });

    let started = Instant::now();
    let response = h.server.get("/api/v2.0/health").await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(response.status_code(), StatusCode::OK);

    let health: OverallHealth = response.json();
    assert_eq!(health.status, UNHEALTHY);
    let external = health
        .components
        .iter()
        .find(|c| c.name == "external")
        .unwrap();
    assert_eq!(external.status, UNHEALTHY);
    assert_eq!(external.error.as_deref(), Some(TIMEOUT_MESSAGE));
    for name in ["core", "database"] {
        let component = health.components.iter().find(|c| c.name == name).unwrap();
        assert_eq!(component.status, HEALTHY);
    }
}

#[tokio::test]
async fn failing_component_reports_its_error() {
    let h = harness_with(|state| {
        state.health.register("chartmuseum", Arc::new(FailingChecker));
    });
    let health: OverallHealth = h.server.get("/api/v2.0/health").await.json();
    assert_eq!(health.status, UNHEALTHY);
    let chart = health.components.last().unwrap();
    assert_eq!(chart.name, "chartmuseum");
    assert_eq!(chart.error.as_deref(), Some("connection refused"));
}
