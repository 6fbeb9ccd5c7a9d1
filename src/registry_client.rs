// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Read-only client for the image registry (Distribution v2 API).

use crate::models::TagDetail;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::ACCEPT, StatusCode};
use serde::Deserialize;
use std::time::Duration;

const MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
const DIGEST_HEADER: &str = "docker-content-digest";

#[derive(Debug, thiserror::Error)]
pub enum RegistryClientError {
    #[error("registry returned {code}: {message}")]
    Http { code: StatusCode, message: String },

    #[error("registry unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected registry response: {0}")]
    Decode(String),
}

impl RegistryClientError {
    pub fn http_status(&self) -> Option<StatusCode> {
        match self {
            RegistryClientError::Http { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Tag names of a repository, sorted.
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, RegistryClientError>;
    async fn tag_detail(&self, repository: &str, tag: &str)
        -> Result<TagDetail, RegistryClientError>;
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct Descriptor {
    digest: String,
    size: i64,
}

#[derive(Deserialize)]
struct Manifest {
    config: Descriptor,
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Deserialize, Default)]
struct ImageConfig {
    #[serde(default)]
    architecture: String,
    #[serde(default)]
    os: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
}

pub struct HttpRegistryClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl HttpRegistryClient {
    pub fn new(
        base_url: &str,
        credentials: Option<(String, String)>,
        timeout: Duration,
    ) -> Result<Self, RegistryClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn get(
        &self,
        path: &str,
        accept: Option<&str>,
    ) -> Result<reqwest::Response, RegistryClientError> {
        let mut req = self.client.get(format!("{}{path}", self.base_url));
        if let Some((user, password)) = &self.credentials {
            req = req.basic_auth(user, Some(password));
        }
        if let Some(accept) = accept {
            req = req.header(ACCEPT, accept);
        }
        let resp = req.send().await?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let code = resp.status();
        let message = resp.text().await.unwrap_or_default();
        Err(RegistryClientError::Http { code, message })
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, RegistryClientError> {
        let list: TagList = self
            .get(&format!("/v2/{repository}/tags/list"), None)
            .await?
            .json()
            .await
            .map_err(|e| RegistryClientError::Decode(e.to_string()))?;
        let mut tags = list.tags.unwrap_or_default();
        tags.sort();
        Ok(tags)
    }

    async fn tag_detail(
        &self,
        repository: &str,
        tag: &str,
    ) -> Result<TagDetail, RegistryClientError> {
        let accept = format!("{MANIFEST_V2}, {OCI_MANIFEST}");
        let resp = self
            .get(&format!("/v2/{repository}/manifests/{tag}"), Some(&accept))
            .await?;
        let digest = resp
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let manifest: Manifest = resp
            .json()
            .await
            .map_err(|e| RegistryClientError::Decode(format!("manifest {repository}:{tag}: {e}")))?;

        let config: ImageConfig = self
            .get(
                &format!("/v2/{repository}/blobs/{}", manifest.config.digest),
                None,
            )
            .await?
            .json()
            .await
            .unwrap_or_default();

        Ok(TagDetail {
            digest,
            size: manifest.config.size + manifest.layers.iter().map(|l| l.size).sum::<i64>(),
            architecture: config.architecture,
            os: config.os,
            author: config.author,
            created: config.created,
        })
    }
}
