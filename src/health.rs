// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Component health checks and their aggregation.

use crate::store::Store;
use async_trait::async_trait;
use reqwest::{header::HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const HEALTHY: &str = "healthy";
pub const UNHEALTHY: &str = "unhealthy";
pub const UNKNOWN_STATUS: &str = "unknown status";
pub const TIMEOUT_MESSAGE: &str = "failed to check the health status: timeout";

/// Maximum number of response-body bytes quoted in a status-mismatch error.
const BODY_EXCERPT_LIMIT: usize = 1024;

/// A liveness check of one component. `Ok(())` means healthy.
#[async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self) -> Result<(), String>;
}

/// This process itself.
pub struct CoreChecker;

#[async_trait]
impl Checker for CoreChecker {
    async fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

pub struct DatabaseChecker {
    store: Arc<dyn Store>,
}

impl DatabaseChecker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Checker for DatabaseChecker {
    async fn check(&self) -> Result<(), String> {
        self.store.ping().await.map_err(|e| e.to_string())
    }
}

/// Healthy iff the endpoint answers with the expected status code.
pub struct HttpStatusChecker {
    client: reqwest::Client,
    method: Method,
    url: String,
    headers: HeaderMap,
    expected: StatusCode,
}

impl HttpStatusChecker {
    pub fn new(
        method: Method,
        url: impl Into<String>,
        headers: HeaderMap,
        timeout: Duration,
        expected: StatusCode,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            method,
            url: url.into(),
            headers,
            expected,
        })
    }
}

#[async_trait]
impl Checker for HttpStatusChecker {
    async fn check(&self) -> Result<(), String> {
        let resp = self
            .client
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| format!("failed to check health of {}: {e}", self.url))?;
        let status = resp.status();
        if status == self.expected {
            return Ok(());
        }
        let body = resp.bytes().await.unwrap_or_default();
        let excerpt = String::from_utf8_lossy(&body[..body.len().min(BODY_EXCERPT_LIMIT)]);
        Err(format!(
            "unexpected status code {} from {}: {}",
            status.as_u16(),
            self.url,
            excerpt
        ))
    }
}

/// Runs the inner checker on a fixed period in the background and answers
/// with the last result. Until the first run completes the answer is
/// [`UNKNOWN_STATUS`].
pub struct PeriodicChecker {
    last: Arc<Mutex<Result<(), String>>>,
    task: JoinHandle<()>,
}

impl PeriodicChecker {
    pub fn new(inner: Arc<dyn Checker>, period: Duration) -> Self {
        let last = Arc::new(Mutex::new(Err(UNKNOWN_STATUS.to_string())));
        let slot = last.clone();
        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                let result = inner.check().await;
                *slot.lock().unwrap_or_else(|p| p.into_inner()) = result;
            }
        });
        Self { last, task }
    }
}

impl Drop for PeriodicChecker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl Checker for PeriodicChecker {
    async fn check(&self) -> Result<(), String> {
        self.last.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallHealth {
    pub status: String,
    pub components: Vec<ComponentHealth>,
}

/// Named checkers, reported in registration order.
#[derive(Clone, Default)]
pub struct HealthRegistry {
    checkers: Vec<(String, Arc<dyn Checker>)>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, checker: Arc<dyn Checker>) {
        self.checkers.push((name.into(), checker));
    }

    pub fn names(&self) -> Vec<&str> {
        self.checkers.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Run every checker concurrently, giving each at most `timeout`.
    pub async fn check_all(&self, timeout: Duration) -> OverallHealth {
        let checks = self.checkers.iter().map(|(name, checker)| {
            let (tx, rx) = oneshot::channel();
            let checker = checker.clone();
            let task = tokio::spawn(async move {
                let _ = tx.send(checker.check().await);
            });
            let name = name.clone();
            async move {
                let result = match tokio::time::timeout(timeout, rx).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err("health checker aborted".to_string()),
                    Err(_) => {
                        task.abort();
                        Err(TIMEOUT_MESSAGE.to_string())
                    }
                };
                match result {
                    Ok(()) => ComponentHealth {
                        name,
                        status: HEALTHY.into(),
                        error: None,
                    },
                    Err(error) => ComponentHealth {
                        name,
                        status: UNHEALTHY.into(),
                        error: Some(error),
                    },
                }
            }
        });
        let components = futures::future::join_all(checks).await;
        let status = if components.iter().all(|c| c.status == HEALTHY) {
            HEALTHY
        } else {
            UNHEALTHY
        };
        OverallHealth {
            status: status.into(),
            components,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Sleeps, then answers with a fixed result.
    pub(crate) struct SlowChecker {
        pub delay: Duration,
        pub result: Result<(), String>,
    }

    #[async_trait]
    impl Checker for SlowChecker {
        async fn check(&self) -> Result<(), String> {
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }
    }

    struct CountingChecker {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Checker for CountingChecker {
        async fn check(&self) -> Result<(), String> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            Err(format!("run {run}"))
        }
    }

    #[tokio::test]
    async fn slow_checker_times_out_others_stay_healthy() {
        let mut registry = HealthRegistry::new();
        registry.register(
            "core",
            Arc::new(SlowChecker {
                delay: Duration::from_millis(10),
                result: Ok(()),
            }),
        );
        registry.register(
            "database",
            Arc::new(SlowChecker {
                delay: Duration::from_millis(20),
                result: Ok(()),
            }),
        );
        registry.register(
            "external",
            Arc::new(SlowChecker {
                delay: Duration::from_secs(3600),
                result: Ok(()),
            }),
        );

        let health = registry.check_all(Duration::from_millis(200)).await;
        assert_eq!(health.status, UNHEALTHY);
        assert_eq!(health.components[0].status, HEALTHY);
        assert_eq!(health.components[1].status, HEALTHY);
        assert_eq!(health.components[2].name, "external");
        assert_eq!(health.components[2].error.as_deref(), Some(TIMEOUT_MESSAGE));
    }

    /// Hangs forever; flags when its future is dropped.
    struct StuckChecker {
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Checker for StuckChecker {
        async fn check(&self) -> Result<(), String> {
            let _flag = DropFlag(self.dropped.clone());
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn timed_out_check_is_cancelled() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut registry = HealthRegistry::new();
        registry.register(
            "external",
            Arc::new(StuckChecker {
                dropped: dropped.clone(),
            }),
        );

        let health = registry.check_all(Duration::from_millis(50)).await;
        assert_eq!(health.components[0].error.as_deref(), Some(TIMEOUT_MESSAGE));
        for _ in 0..50 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn all_healthy_is_healthy() {
        let mut registry = HealthRegistry::new();
        registry.register("core", Arc::new(CoreChecker));
        let health = registry.check_all(Duration::from_secs(1)).await;
        assert_eq!(health.status, HEALTHY);
        assert_eq!(health.components[0].error, None);
    }

    #[tokio::test]
    async fn periodic_checker_reports_sentinel_then_latest_run() {
        let inner = Arc::new(CountingChecker {
            runs: AtomicUsize::new(0),
        });
        let periodic = PeriodicChecker::new(inner.clone(), Duration::from_millis(40));
        assert_eq!(periodic.check().await, Err(UNKNOWN_STATUS.to_string()));

        tokio::time::sleep(Duration::from_millis(150)).await;
        let before = inner.runs.load(Ordering::SeqCst);
        let reported = periodic.check().await.unwrap_err();
        let after = inner.runs.load(Ordering::SeqCst);
        assert!(before >= 1);
        let latest = (before..=after).map(|n| format!("run {n}")).collect::<Vec<_>>();
        assert!(latest.contains(&reported), "{reported} is not among {latest:?}");
    }

    #[tokio::test]
    async fn status_mismatch_quotes_the_body() {
        use axum::{http::StatusCode as AxumStatus, routing::get, Router};

        let app = Router::new().route(
            "/api/v1/stats",
            get(|| async { (AxumStatus::SERVICE_UNAVAILABLE, "x".repeat(4096)) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let checker = HttpStatusChecker::new(
            Method::GET,
            format!("http://{addr}/api/v1/stats"),
            HeaderMap::new(),
            Duration::from_secs(5),
            StatusCode::OK,
        )
        .unwrap();
        let err = checker.check().await.unwrap_err();
        assert!(err.contains("503"));
        assert!(err.len() < 1024 + 200);
    }
}
