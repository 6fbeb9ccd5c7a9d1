// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Client for the job service that executes admin jobs.
//!
//! The job service speaks a small JSON API under `/api/v1`:
//!
//! - `POST /api/v1/jobs`                 — launch, answers `{"job": {"id", "status", ..}}`
//! - `GET  /api/v1/jobs/:id/log`         — raw log text
//! - `GET  /api/v1/jobs/:id/executions`  — executions of a periodic job
//! - `POST /api/v1/jobs/:id`             — `{"action": "stop"}`, answers 204
//!
//! Internal calls authenticate with `Authorization: Secret <CORE_SECRET>`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::AUTHORIZATION, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The status the caller acted on is older than the job's real status,
    /// e.g. stopping a job that already finished.
    #[error("job status is behind the actual status: {0}")]
    StatusBehind(String),

    #[error("job service returned {code}: {message}")]
    Http { code: StatusCode, message: String },

    #[error("job service unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected job service response: {0}")]
    Decode(String),
}

impl WorkerError {
    pub fn http_status(&self) -> Option<StatusCode> {
        match self {
            WorkerError::Http { code, .. } => Some(*code),
            WorkerError::StatusBehind(_) => Some(StatusCode::CONFLICT),
            WorkerError::Transport(_) | WorkerError::Decode(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WorkerError::Http { code, .. } if *code == StatusCode::NOT_FOUND)
    }
}

/// Job metadata as understood by the job service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cron_spec: String,
    pub is_unique: bool,
}

/// Body of a launch request (wrapped as `{"job": ..}` on the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobData {
    pub name: String,
    pub parameters: Map<String, Value>,
    pub metadata: JobMetadata,
    pub status_hook: String,
}

/// Status summary of one job or one execution of a periodic job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStats {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub name: String,
}

impl JobStats {
    /// Finished with `Success` or `Error`.
    pub fn is_finished(&self) -> bool {
        self.status == "Success" || self.status == "Error"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    Stop,
}

impl JobAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobAction::Stop => "stop",
        }
    }
}

#[derive(Serialize, Deserialize)]
struct JobEnvelope<T> {
    job: T,
}

/// Operations the core needs from the job service.
#[async_trait]
pub trait JobServiceClient: Send + Sync {
    /// Launch a job and return the job-service id.
    async fn submit_job(&self, job: &JobData) -> Result<String, WorkerError>;
    async fn get_job_log(&self, uuid: &str) -> Result<Bytes, WorkerError>;
    /// Executions of a periodic job, in the order the job service returns them.
    async fn get_executions(&self, uuid: &str) -> Result<Vec<JobStats>, WorkerError>;
    async fn post_action(&self, uuid: &str, action: JobAction) -> Result<(), WorkerError>;
}

pub struct HttpJobServiceClient {
    client: reqwest::Client,
    base_url: String,
    secret: Option<String>,
}

impl HttpJobServiceClient {
    pub fn new(
        base_url: &str,
        secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, WorkerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/jobs{path}", self.base_url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.secret {
            Some(secret) => req.header(AUTHORIZATION, format!("Secret {secret}")),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, WorkerError> {
        let resp = self.authorize(req).send().await?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let code = resp.status();
        let message = resp.text().await.unwrap_or_default();
        Err(WorkerError::Http { code, message })
    }
}

#[async_trait]
impl JobServiceClient for HttpJobServiceClient {
    async fn submit_job(&self, job: &JobData) -> Result<String, WorkerError> {
        let resp = self
            .send(self.client.post(self.url("")).json(&JobEnvelope { job }))
            .await?;
        let stats: JobEnvelope<JobStats> = resp
            .json()
            .await
            .map_err(|e| WorkerError::Decode(e.to_string()))?;
        tracing::debug!("job service accepted job {} as {}", job.name, stats.job.id);
        Ok(stats.job.id)
    }

    async fn get_job_log(&self, uuid: &str) -> Result<Bytes, WorkerError> {
        let resp = self
            .send(self.client.get(self.url(&format!("/{uuid}/log"))))
            .await?;
        Ok(resp.bytes().await?)
    }

    async fn get_executions(&self, uuid: &str) -> Result<Vec<JobStats>, WorkerError> {
        let resp = self
            .send(self.client.get(self.url(&format!("/{uuid}/executions"))))
            .await?;
        let executions: Vec<JobEnvelope<JobStats>> = resp
            .json()
            .await
            .map_err(|e| WorkerError::Decode(e.to_string()))?;
        Ok(executions.into_iter().map(|e| e.job).collect())
    }

    async fn post_action(&self, uuid: &str, action: JobAction) -> Result<(), WorkerError> {
        let body = serde_json::json!({ "action": action.as_str() });
        let result = self
            .send(self.client.post(self.url(&format!("/{uuid}"))).json(&body))
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(WorkerError::Http { code, message }) if code == StatusCode::CONFLICT => {
                Err(WorkerError::StatusBehind(message))
            }
            Err(e) => Err(e),
        }
    }
}
