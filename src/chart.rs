// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Chart backend client (ChartMuseum-compatible HTTP API) and chart archive
//! helpers.
//!
//! Most chart traffic is proxied verbatim; the typed calls below are used where
//! the response must be enriched with labels or merged across projects.

use crate::models::Label;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, Method, StatusCode},
    response::Response,
};
use bytes::Bytes;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

pub const API_PREFIX: &str = "/api/v2.0/chartrepo";
pub const REPO_PREFIX: &str = "/chartrepo";
pub const DEFAULT_NAMESPACE: &str = "library";

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("chart backend returned {code}: {message}")]
    Http { code: StatusCode, message: String },

    #[error("chart backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected chart backend response: {0}")]
    Decode(String),

    #[error("invalid chart archive: {0}")]
    Archive(String),
}

impl ChartError {
    pub fn http_status(&self) -> Option<StatusCode> {
        match self {
            ChartError::Http { code, .. } => Some(*code),
            _ => None,
        }
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

/// One version of a chart as reported by the backend. Unknown fields are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartVersion {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Summary of one chart across its versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartInfo {
    pub name: String,
    pub total_versions: usize,
    pub latest_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub repository: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartVersionDetails {
    pub metadata: ChartVersion,
    pub dependencies: Vec<Dependency>,
    /// Values flattened to dotted keys, e.g. `image.tag`.
    pub values: BTreeMap<String, Value>,
    /// `values.yaml` and `README.md` contents when present.
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: Vec<Label>,
}

/// Merged repository index served at `/chartrepo/index.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexFile {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub entries: BTreeMap<String, Vec<serde_yaml::Value>>,
    #[serde(default)]
    pub generated: String,
}

/// A request forwarded to the backend.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Path and query as received by this service.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

// ── Backend contract ──────────────────────────────────────────────────────────

#[async_trait]
pub trait ChartBackend: Send + Sync {
    /// Forward a request and hand the backend's answer back unchanged.
    async fn proxy(&self, req: ProxyRequest) -> Result<Response, ChartError>;
    /// Merge the per-namespace indexes into one, prefixing entries with their namespace.
    async fn build_index(&self, namespaces: &[String]) -> Result<IndexFile, ChartError>;
    async fn list_charts(&self, namespace: &str) -> Result<Vec<ChartInfo>, ChartError>;
    async fn get_chart(&self, namespace: &str, name: &str) -> Result<Vec<ChartVersion>, ChartError>;
    async fn get_chart_version_details(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
    ) -> Result<ChartVersionDetails, ChartError>;
    async fn delete_chart(&self, namespace: &str, name: &str) -> Result<(), ChartError>;
    async fn delete_chart_version(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
    ) -> Result<(), ChartError>;
}

pub struct HttpChartBackend {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

/// Headers that describe one hop and must not be forwarded.
const HOP_HEADERS: [HeaderName; 4] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::HOST,
    header::CONTENT_LENGTH,
];

impl HttpChartBackend {
    pub fn new(
        base_url: &str,
        credentials: Option<(String, String)>,
        timeout: Duration,
    ) -> Result<Self, ChartError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let req = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.credentials {
            Some((user, password)) => req.basic_auth(user, Some(password)),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ChartError> {
        let resp = req.send().await?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let code = resp.status();
        let message = resp.text().await.unwrap_or_default();
        Err(ChartError::Http { code, message })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ChartError> {
        let resp = self.send(self.request(Method::GET, path)).await?;
        resp.json()
            .await
            .map_err(|e| ChartError::Decode(format!("{path}: {e}")))
    }
}

#[async_trait]
impl ChartBackend for HttpChartBackend {
    async fn proxy(&self, req: ProxyRequest) -> Result<Response, ChartError> {
        let target = rewrite_path(&req.path_and_query);
        tracing::debug!("proxy {} {} -> {}", req.method, req.path_and_query, target);

        let mut outbound = self.request(req.method, &target);
        for (name, value) in req.headers.iter() {
            if HOP_HEADERS.contains(name) || *name == header::AUTHORIZATION {
                continue;
            }
            outbound = outbound.header(name, value);
        }
        let upstream = outbound.body(req.body).send().await?;

        let mut response = Response::builder().status(upstream.status());
        for (name, value) in upstream.headers().iter() {
            if HOP_HEADERS.contains(name) {
                continue;
            }
            response = response.header(name, value);
        }
        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| ChartError::Decode(e.to_string()))
    }

    async fn build_index(&self, namespaces: &[String]) -> Result<IndexFile, ChartError> {
        let mut merged = IndexFile {
            api_version: "v1".into(),
            entries: BTreeMap::new(),
            generated: chrono::Utc::now().to_rfc3339(),
        };
        for namespace in namespaces {
            let resp = self
                .send(self.request(Method::GET, &format!("/{namespace}/index.yaml")))
                .await?;
            let text = resp.text().await?;
            let index: IndexFile = serde_yaml::from_str(&text)
                .map_err(|e| ChartError::Decode(format!("index of {namespace}: {e}")))?;
            merge_index(&mut merged, namespace, index);
        }
        Ok(merged)
    }

    async fn list_charts(&self, namespace: &str) -> Result<Vec<ChartInfo>, ChartError> {
        let charts: BTreeMap<String, Vec<ChartVersion>> =
            self.get_json(&format!("/api/{namespace}/charts")).await?;
        Ok(summarize_charts(charts))
    }

    async fn get_chart(&self, namespace: &str, name: &str) -> Result<Vec<ChartVersion>, ChartError> {
        self.get_json(&format!("/api/{namespace}/charts/{name}")).await
    }

    async fn get_chart_version_details(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
    ) -> Result<ChartVersionDetails, ChartError> {
        let metadata: ChartVersion = self
            .get_json(&format!("/api/{namespace}/charts/{name}/{version}"))
            .await?;
        let archive_path = metadata
            .urls
            .first()
            .ok_or_else(|| ChartError::Decode(format!("no download url for {name}:{version}")))?;
        let archive = self
            .send(self.request(Method::GET, &format!("/{namespace}/{archive_path}")))
            .await?
            .bytes()
            .await?;
        let content = parse_chart_archive(&archive)?;
        Ok(content.into_details(metadata))
    }

    async fn delete_chart(&self, namespace: &str, name: &str) -> Result<(), ChartError> {
        for version in self.get_chart(namespace, name).await? {
            self.delete_chart_version(namespace, name, &version.version)
                .await?;
        }
        Ok(())
    }

    async fn delete_chart_version(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
    ) -> Result<(), ChartError> {
        self.send(self.request(
            Method::DELETE,
            &format!("/api/{namespace}/charts/{name}/{version}"),
        ))
        .await?;
        Ok(())
    }
}

// ── Path and name helpers ─────────────────────────────────────────────────────

/// Map a path of this service onto the backend's layout:
/// `/api/v2.0/chartrepo/health` → `/health`, `/api/v2.0/chartrepo/x` → `/api/x`,
/// `/chartrepo/x` → `/x`.
pub fn rewrite_path(path_and_query: &str) -> String {
    if let Some(rest) = path_and_query.strip_prefix(API_PREFIX) {
        if rest == "/health" || rest.starts_with("/health?") {
            return rest.to_string();
        }
        if rest == "/charts" || rest.starts_with("/charts?") {
            return format!("/api/{DEFAULT_NAMESPACE}{rest}");
        }
        return format!("/api{rest}");
    }
    if let Some(rest) = path_and_query.strip_prefix(REPO_PREFIX) {
        return rest.to_string();
    }
    path_and_query.to_string()
}

/// Key that links a chart version to the label store.
pub fn chart_full_name(namespace: &str, chart: &str, version: &str) -> String {
    if chart.starts_with("http") {
        format!("{chart}:{version}")
    } else {
        format!("{namespace}/{chart}:{version}")
    }
}

/// Split `web-frontend-1.2.3-rc.1.tgz` into (`web-frontend`, `1.2.3-rc.1`).
pub fn parse_chart_filename(filename: &str) -> (String, String) {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    let stem = base.strip_suffix(".tgz").unwrap_or(base);
    let parts: Vec<&str> = stem.split('-').collect();

    let version_start = parts
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, part)| part.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .map(|(idx, _)| idx);

    match version_start {
        Some(idx) => (parts[..idx].join("-"), parts[idx..].join("-")),
        None => {
            let last = parts.len() - 1;
            (parts[..last].join("-"), parts[last].to_string())
        }
    }
}

fn summarize_charts(charts: BTreeMap<String, Vec<ChartVersion>>) -> Vec<ChartInfo> {
    charts
        .into_iter()
        .filter_map(|(name, versions)| {
            let latest = versions.first()?;
            let oldest = versions.last()?;
            let extra_str = |key: &str| latest.extra.get(key).and_then(Value::as_str).map(String::from);
            Some(ChartInfo {
                name,
                total_versions: versions.len(),
                latest_version: latest.version.clone(),
                created: oldest.created.clone(),
                updated: latest.created.clone(),
                icon: extra_str("icon"),
                home: extra_str("home"),
                deprecated: latest
                    .extra
                    .get("deprecated")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            })
        })
        .collect()
}

fn merge_index(merged: &mut IndexFile, namespace: &str, index: IndexFile) {
    for (name, mut versions) in index.entries {
        for version in versions.iter_mut() {
            prefix_urls(version, namespace);
        }
        merged
            .entries
            .insert(format!("{namespace}/{name}"), versions);
    }
}

/// Relative download urls become namespace-relative so they resolve under
/// `/chartrepo/`.
fn prefix_urls(version: &mut serde_yaml::Value, namespace: &str) {
    let Some(urls) = version
        .get_mut("urls")
        .and_then(serde_yaml::Value::as_sequence_mut)
    else {
        return;
    };
    for url in urls.iter_mut() {
        if let Some(s) = url.as_str() {
            if !s.starts_with("http") {
                *url = serde_yaml::Value::String(format!("{namespace}/{s}"));
            }
        }
    }
}

// ── Archive parsing ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "appVersion")]
    pub app_version: String,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Default, Deserialize)]
struct Requirements {
    #[serde(default)]
    dependencies: Vec<Dependency>,
}

/// Files of interest read from a packaged chart.
#[derive(Debug, Clone, Default)]
pub struct ChartArchive {
    pub metadata: ChartMetadata,
    pub values_yaml: Option<String>,
    pub readme: Option<String>,
    pub requirements: Vec<Dependency>,
}

impl ChartArchive {
    pub fn into_details(self, metadata: ChartVersion) -> ChartVersionDetails {
        let mut dependencies = self.metadata.dependencies;
        dependencies.extend(self.requirements);

        let values = self
            .values_yaml
            .as_deref()
            .and_then(|text| serde_yaml::from_str::<serde_yaml::Value>(text).ok())
            .map(|doc| flatten_values(&doc))
            .unwrap_or_default();

        let mut files = BTreeMap::new();
        if let Some(values_yaml) = self.values_yaml {
            files.insert("values.yaml".to_string(), values_yaml);
        }
        if let Some(readme) = self.readme {
            files.insert("README.md".to_string(), readme);
        }

        ChartVersionDetails {
            metadata,
            dependencies,
            values,
            files,
            labels: Vec::new(),
        }
    }
}

/// Read `Chart.yaml`, `values.yaml`, `README.md` and `requirements.yaml` of the
/// top-level chart from a gzipped tarball. Subcharts are ignored.
pub fn parse_chart_archive(data: &[u8]) -> Result<ChartArchive, ChartError> {
    let mut archive = tar::Archive::new(GzDecoder::new(data));
    let entries = archive
        .entries()
        .map_err(|e| ChartError::Archive(e.to_string()))?;

    let mut chart_yaml = None;
    let mut content = ChartArchive::default();
    for entry in entries {
        let mut entry = entry.map_err(|e| ChartError::Archive(e.to_string()))?;
        let path = entry
            .path()
            .map_err(|e| ChartError::Archive(e.to_string()))?
            .to_string_lossy()
            .into_owned();
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let (Some(_chart_dir), Some(file), None) =
            (segments.next(), segments.next(), segments.next())
        else {
            continue;
        };
        let file = file.to_string();
        if !matches!(
            file.as_str(),
            "Chart.yaml" | "values.yaml" | "README.md" | "requirements.yaml"
        ) {
            continue;
        }

        let mut text = String::new();
        entry
            .read_to_string(&mut text)
            .map_err(|e| ChartError::Archive(format!("{path}: {e}")))?;
        match file.as_str() {
            "Chart.yaml" => chart_yaml = Some(text),
            "values.yaml" => content.values_yaml = Some(text),
            "README.md" => content.readme = Some(text),
            _ => {
                let req: Requirements = serde_yaml::from_str(&text)
                    .map_err(|e| ChartError::Archive(format!("requirements.yaml: {e}")))?;
                content.requirements = req.dependencies;
            }
        }
    }

    let chart_yaml =
        chart_yaml.ok_or_else(|| ChartError::Archive("missing Chart.yaml".into()))?;
    content.metadata = serde_yaml::from_str(&chart_yaml)
        .map_err(|e| ChartError::Archive(format!("Chart.yaml: {e}")))?;
    Ok(content)
}

fn flatten_values(doc: &serde_yaml::Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into(doc, String::new(), &mut out);
    out
}

fn flatten_into(value: &serde_yaml::Value, prefix: String, out: &mut BTreeMap<String, Value>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, child) in map {
                let key = match key {
                    serde_yaml::Value::String(s) => s.clone(),
                    other => serde_yaml::to_string(other)
                        .map(|s| s.trim().to_string())
                        .unwrap_or_default(),
                };
                let path = if prefix.is_empty() {
                    key
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(child, path, out);
            }
        }
        leaf => {
            if !prefix.is_empty() {
                out.insert(prefix, serde_json::to_value(leaf).unwrap_or(Value::Null));
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};

    /// Build a minimal packaged chart.
    pub(crate) fn chart_tgz(name: &str, version: &str) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let files = [
            (
                "Chart.yaml",
                format!("apiVersion: v2\nname: {name}\nversion: {version}\ndependencies:\n  - name: redis\n    version: 17.0.0\n    repository: https://charts.example.com\n"),
            ),
            ("values.yaml", "image:\n  repository: nginx\n  tag: \"1.25\"\nreplicas: 2\n".to_string()),
            ("README.md", format!("# {name}\n")),
            ("charts/redis/Chart.yaml", "name: redis\nversion: 17.0.0\n".to_string()),
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

    #[test]
    fn filename_version_is_first_numeric_suffix() {
        assert_eq!(
            parse_chart_filename("web-1.2.3.tgz"),
            ("web".to_string(), "1.2.3".to_string())
        );
        assert_eq!(
            parse_chart_filename("web-frontend-1.2.3-rc.1.tgz"),
            ("web-frontend".to_string(), "1.2.3-rc.1".to_string())
        );
        assert_eq!(
            parse_chart_filename("charts/web-app-latest.tgz"),
            ("web-app".to_string(), "latest".to_string())
        );
    }

    #[test]
    fn full_name_keeps_absolute_chart_urls() {
        assert_eq!(chart_full_name("library", "web", "1.2.3"), "library/web:1.2.3");
        assert_eq!(
            chart_full_name("library", "https://x/web", "1.0"),
            "https://x/web:1.0"
        );
    }

    #[test]
    fn paths_are_rewritten_for_the_backend() {
        assert_eq!(rewrite_path("/api/v2.0/chartrepo/health"), "/health");
        assert_eq!(
            rewrite_path("/api/v2.0/chartrepo/library/charts"),
            "/api/library/charts"
        );
        assert_eq!(rewrite_path("/api/v2.0/chartrepo/charts"), "/api/library/charts");
        assert_eq!(
            rewrite_path("/chartrepo/library/charts/web-1.2.3.tgz"),
            "/library/charts/web-1.2.3.tgz"
        );
        assert_eq!(rewrite_path("/chartrepo/library/index.yaml"), "/library/index.yaml");
    }

    #[test]
    fn archive_yields_metadata_values_and_readme() {
        let content = parse_chart_archive(&chart_tgz("web", "1.2.3")).unwrap();
        assert_eq!(content.metadata.name, "web");
        assert_eq!(content.metadata.version, "1.2.3");
        assert!(content.readme.unwrap().starts_with("# web"));

        let content = parse_chart_archive(&chart_tgz("web", "1.2.3")).unwrap();
        let details = content.into_details(ChartVersion {
            name: "web".into(),
            version: "1.2.3".into(),
            urls: vec!["charts/web-1.2.3.tgz".into()],
            created: None,
            labels: Vec::new(),
            extra: Map::new(),
        });
        assert_eq!(details.values["image.tag"], "1.25");
        assert_eq!(details.values["replicas"], 2);
        assert_eq!(details.dependencies[0].name, "redis");
        assert!(details.files.contains_key("values.yaml"));
    }

    #[test]
    fn garbage_is_not_a_chart() {
        assert!(matches!(
            parse_chart_archive(b"not a tarball"),
            Err(ChartError::Archive(_))
        ));
    }

    #[test]
    fn merged_index_prefixes_names_and_urls() {
        let index: IndexFile = serde_yaml::from_str(
            "apiVersion: v1\nentries:\n  web:\n    - name: web\n      version: 1.2.3\n      urls:\n        - charts/web-1.2.3.tgz\n",
        )
        .unwrap();
        let mut merged = IndexFile::default();
        merge_index(&mut merged, "library", index);
        let web = &merged.entries["library/web"][0];
        assert_eq!(web["urls"][0].as_str(), Some("library/charts/web-1.2.3.tgz"));
    }
}
