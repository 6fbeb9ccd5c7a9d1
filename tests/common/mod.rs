// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Shared fixtures: an in-memory store, fake collaborators and a test server.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header::AUTHORIZATION, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use axum_test::TestServer;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use registry_control::{
    app, auth,
    chart::{
        ChartBackend, ChartError, ChartInfo, ChartVersion, ChartVersionDetails, IndexFile,
        ProxyRequest,
    },
    config::Config,
    db::AppState,
    models::{MemberEntityType, NewProject, NewUser, ProjectRole, TagDetail, METADATA_PUBLIC},
    registry_client::{RegistryClient, RegistryClientError},
    store::{MemberStore, MemoryStore, ProjectStore, UserStore},
    worker::{JobAction, JobData, JobServiceClient, JobStats, WorkerError},
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

pub const PASSWORD: &str = "Passw0rd!";
pub const CORE_SECRET: &str = "internal-secret";

// ── Job service ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeWorker {
    pub submitted: Mutex<Vec<JobData>>,
    pub actions: Mutex<Vec<String>>,
    pub stop_error: Mutex<Option<WorkerError>>,
    pub executions: Mutex<Vec<JobStats>>,
}

#[async_trait]
impl JobServiceClient for FakeWorker {
    async fn submit_job(&self, job: &JobData) -> Result<String, WorkerError> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(job.clone());
        Ok(format!("job-{}", submitted.len()))
    }

    async fn get_job_log(&self, uuid: &str) -> Result<Bytes, WorkerError> {
        Ok(Bytes::from(format!("log of {uuid}\n")))
    }

    async fn get_executions(&self, _uuid: &str) -> Result<Vec<JobStats>, WorkerError> {
        Ok(self.executions.lock().unwrap().clone())
    }

    async fn post_action(&self, uuid: &str, action: JobAction) -> Result<(), WorkerError> {
        self.actions
            .lock()
            .unwrap()
            .push(format!("{uuid}:{}", action.as_str()));
        match self.stop_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ── Chart backend ─────────────────────────────────────────────────────────────

/// What the fake backend saw of a proxied request.
#[derive(Debug, Clone)]
pub struct Proxied {
    pub method: String,
    pub path_and_query: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

pub struct FakeCharts {
    pub proxied: Mutex<Vec<Proxied>>,
    pub index_calls: Mutex<Vec<Vec<String>>>,
    pub deleted: Mutex<Vec<String>>,
    pub proxy_status: Mutex<StatusCode>,
    /// `namespace/name` → versions.
    pub charts: Mutex<HashMap<String, Vec<ChartVersion>>>,
}

impl Default for FakeCharts {
    fn default() -> Self {
        Self {
            proxied: Mutex::default(),
            index_calls: Mutex::default(),
            deleted: Mutex::default(),
            proxy_status: Mutex::new(StatusCode::CREATED),
            charts: Mutex::default(),
        }
    }
}

impl FakeCharts {
    pub fn add_version(&self, namespace: &str, name: &str, version: &str) {
        self.charts
            .lock()
            .unwrap()
            .entry(format!("{namespace}/{name}"))
            .or_default()
            .push(ChartVersion {
                name: name.into(),
                version: version.into(),
                urls: vec![format!("charts/{name}-{version}.tgz")],
                created: None,
                labels: Vec::new(),
                extra: Default::default(),
            });
    }

    fn versions(&self, namespace: &str, name: &str) -> Result<Vec<ChartVersion>, ChartError> {
        self.charts
            .lock()
            .unwrap()
            .get(&format!("{namespace}/{name}"))
            .cloned()
            .ok_or_else(|| ChartError::Http {
                code: StatusCode::NOT_FOUND,
                message: "no chart".into(),
            })
    }
}

#[async_trait]
impl ChartBackend for FakeCharts {
    async fn proxy(&self, req: ProxyRequest) -> Result<Response, ChartError> {
        self.proxied.lock().unwrap().push(Proxied {
            method: req.method.to_string(),
            path_and_query: req.path_and_query,
            content_type: req
                .headers
                .get(axum::http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: req.body,
        });
        let status = *self.proxy_status.lock().unwrap();
        Ok(Response::builder()
            .status(status)
            .body(Body::from(r#"{"saved":true}"#))
            .unwrap())
    }

    async fn build_index(&self, namespaces: &[String]) -> Result<IndexFile, ChartError> {
        self.index_calls.lock().unwrap().push(namespaces.to_vec());
        let mut entries = BTreeMap::new();
        for ns in namespaces {
            entries.insert(format!("{ns}/web"), Vec::new());
        }
        Ok(IndexFile {
            api_version: "v1".into(),
            entries,
            generated: "2026-01-01T00:00:00Z".into(),
        })
    }

    async fn list_charts(&self, namespace: &str) -> Result<Vec<ChartInfo>, ChartError> {
        let prefix = format!("{namespace}/");
        let charts = self.charts.lock().unwrap();
        let mut names: Vec<&String> = charts.keys().filter(|k| k.starts_with(&prefix)).collect();
        names.sort();
        Ok(names
            .into_iter()
            .map(|key| {
                let versions = &charts[key];
                serde_json::from_value(serde_json::json!({
                    "name": key.trim_start_matches(&prefix),
                    "total_versions": versions.len(),
                    "latest_version": versions.last().map(|v| v.version.clone()).unwrap_or_default(),
                }))
                .unwrap()
            })
            .collect())
    }

    async fn get_chart(&self, namespace: &str, name: &str) -> Result<Vec<ChartVersion>, ChartError> {
        self.versions(namespace, name)
    }

    async fn get_chart_version_details(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
    ) -> Result<ChartVersionDetails, ChartError> {
        let metadata = self
            .versions(namespace, name)?
            .into_iter()
            .find(|v| v.version == version)
            .ok_or_else(|| ChartError::Http {
                code: StatusCode::NOT_FOUND,
                message: "no version".into(),
            })?;
        Ok(ChartVersionDetails {
            metadata,
            dependencies: Vec::new(),
            values: BTreeMap::new(),
            files: BTreeMap::new(),
            labels: Vec::new(),
        })
    }

    async fn delete_chart(&self, namespace: &str, name: &str) -> Result<(), ChartError> {
        self.charts
            .lock()
            .unwrap()
            .remove(&format!("{namespace}/{name}"));
        self.deleted.lock().unwrap().push(format!("{namespace}/{name}"));
        Ok(())
    }

    async fn delete_chart_version(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
    ) -> Result<(), ChartError> {
        if let Some(versions) = self
            .charts
            .lock()
            .unwrap()
            .get_mut(&format!("{namespace}/{name}"))
        {
            versions.retain(|v| v.version != version);
        }
        self.deleted
            .lock()
            .unwrap()
            .push(format!("{namespace}/{name}:{version}"));
        Ok(())
    }
}

// ── Image registry ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeRegistry {
    /// repository → tags.
    pub tags: Mutex<HashMap<String, Vec<String>>>,
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, RegistryClientError> {
        let mut tags = self
            .tags
            .lock()
            .unwrap()
            .get(repository)
            .cloned()
            .unwrap_or_default();
        tags.sort();
        Ok(tags)
    }

    async fn tag_detail(&self, repository: &str, tag: &str) -> Result<TagDetail, RegistryClientError> {
        Ok(TagDetail {
            digest: format!("sha256:{repository}-{tag}"),
            size: 1024,
            architecture: "amd64".into(),
            os: "linux".into(),
            author: String::new(),
            created: None,
        })
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct Harness {
    pub server: TestServer,
    pub store: Arc<MemoryStore>,
    pub worker: Arc<FakeWorker>,
    pub charts: Arc<FakeCharts>,
    pub registry: Arc<FakeRegistry>,
    pub state: Arc<AppState>,
}

pub fn test_config() -> Config {
    Config {
        core_secret: Some(CORE_SECRET.into()),
        core_url: "http://core:8080".into(),
        ..Config::default()
    }
}

/// Build collaborators and hand the state to `customize` before serving.
pub fn harness_with(customize: impl FnOnce(&mut AppState)) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let worker = Arc::new(FakeWorker::default());
    let charts = Arc::new(FakeCharts::default());
    let registry = Arc::new(FakeRegistry::default());
    let mut state = AppState::new(
        test_config(),
        store.clone(),
        worker.clone(),
        charts.clone(),
        registry.clone(),
    );
    customize(&mut state);
    let state = Arc::new(state);
    let server = TestServer::new(app(state.clone())).unwrap();
    Harness {
        server,
        store,
        worker,
        charts,
        registry,
        state,
    }
}

pub fn harness() -> Harness {
    harness_with(|_| {})
}

impl Harness {
    pub async fn user(&self, username: &str, sys_admin: bool) -> i64 {
        let salt = auth::generate_salt();
        self.store
            .add_user(NewUser {
                username: username.into(),
                email: format!("{username}@example.com"),
                realname: username.into(),
                password_hash: auth::hash_password(PASSWORD, &salt),
                salt,
                sysadmin_flag: sys_admin,
                group_ids: Vec::new(),
            })
            .await
            .unwrap()
    }

    pub async fn project(&self, name: &str, public: bool) -> i64 {
        let mut metadata = BTreeMap::new();
        metadata.insert(METADATA_PUBLIC.to_string(), public.to_string());
        self.store
            .add_project(NewProject {
                name: name.into(),
                owner_id: 1,
                metadata,
            })
            .await
            .unwrap()
    }

    pub async fn member(&self, project_id: i64, user_id: i64, role: ProjectRole) {
        self.store
            .add_member(project_id, MemberEntityType::User, user_id, role)
            .await
            .unwrap();
    }
}

/// `Authorization` header for a user created with [`PASSWORD`].
pub fn basic(username: &str) -> (HeaderName, HeaderValue) {
    let token = STANDARD.encode(format!("{username}:{PASSWORD}"));
    (
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Basic {token}")).unwrap(),
    )
}

pub fn secret() -> (HeaderName, HeaderValue) {
    (
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Secret {CORE_SECRET}")).unwrap(),
    )
}

/// A minimal packaged chart.
pub fn chart_tgz(name: &str, version: &str) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let files = [
        (
            "Chart.yaml",
            format!("apiVersion: v2\nname: {name}\nversion: {version}\n"),
        ),
        ("values.yaml", "replicas: 1\n".to_string()),
    ];
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{name}/{path}"), content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}
