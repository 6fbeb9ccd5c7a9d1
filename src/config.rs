// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Runtime configuration, read from the environment at startup.

use anyhow::Context;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    /// `None` → in-memory store.
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    /// Externally reachable URL of this service, used for job status hooks.
    pub core_url: String,
    /// Shared secret presented by internal callers as `Authorization: Secret <s>`.
    pub core_secret: Option<String>,
    pub jobservice_url: String,
    pub chart_backend_url: String,
    pub chart_backend_credentials: Option<(String, String)>,
    pub registry_url: String,
    pub registry_credentials: Option<(String, String)>,
    pub admin_username: String,
    pub admin_password: Option<String>,
    pub health_check_timeout: Duration,
    pub health_check_period: Duration,
    pub outbound_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: None,
            redis_url: None,
            core_url: "http://localhost:8080".into(),
            core_secret: None,
            jobservice_url: "http://jobservice:8080".into(),
            chart_backend_url: "http://chartmuseum:9999".into(),
            chart_backend_credentials: None,
            registry_url: "http://registry:5000".into(),
            registry_credentials: None,
            admin_username: "admin".into(),
            admin_password: None,
            health_check_timeout: Duration::from_secs(60),
            health_check_period: Duration::from_secs(30),
            outbound_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();
        Ok(Self {
            listen_addr: var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: var("DATABASE_URL"),
            redis_url: var("REDIS_URL"),
            core_url: var("CORE_URL").unwrap_or(defaults.core_url),
            core_secret: var("CORE_SECRET"),
            jobservice_url: var("JOBSERVICE_URL").unwrap_or(defaults.jobservice_url),
            chart_backend_url: var("CHART_BACKEND_URL").unwrap_or(defaults.chart_backend_url),
            chart_backend_credentials: credentials(
                "CHART_BACKEND_USERNAME",
                "CHART_BACKEND_PASSWORD",
            ),
            registry_url: var("REGISTRY_URL").unwrap_or(defaults.registry_url),
            registry_credentials: credentials("REGISTRY_USERNAME", "REGISTRY_PASSWORD"),
            admin_username: var("ADMIN_USERNAME").unwrap_or(defaults.admin_username),
            admin_password: var("ADMIN_PASSWORD"),
            health_check_timeout: seconds("HEALTH_CHECK_TIMEOUT_SECS", defaults.health_check_timeout)?,
            health_check_period: seconds("HEALTH_CHECK_PERIOD_SECS", defaults.health_check_period)?,
            outbound_timeout: seconds("OUTBOUND_TIMEOUT_SECS", defaults.outbound_timeout)?,
        })
    }
}

/// Non-empty value of an environment variable.
fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn credentials(user_var: &str, password_var: &str) -> Option<(String, String)> {
    Some((var(user_var)?, var(password_var).unwrap_or_default()))
}

fn seconds(name: &str, default: Duration) -> anyhow::Result<Duration> {
    match var(name) {
        Some(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{name} must be a number of seconds, got '{raw}'"))?;
            Ok(Duration::from_secs(secs))
        }
        None => Ok(default),
    }
}
