// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Chart events and the in-process event bus.
//!
//! Handlers publish after the backend accepted the operation. Publishing is
//! best-effort: nothing a subscriber does can fail a request.

use crate::models::{NewAccessLog, ProjectRef};
use crate::store::{AccessLogStore, ProjectStore, Store};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartUploadEvent {
    pub operator: String,
    pub project_name: String,
    pub chart_name: String,
    pub version: String,
    pub public: bool,
    pub occur_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDownloadEvent {
    pub operator: String,
    pub project_name: String,
    pub chart_name: String,
    pub version: String,
    pub occur_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDeleteEvent {
    pub operator: String,
    pub project_name: String,
    pub chart_name: String,
    pub versions: Vec<String>,
    pub occur_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ChartUpload(ChartUploadEvent),
    ChartDownload(ChartDownloadEvent),
    ChartDelete(ChartDeleteEvent),
}

impl Event {
    /// Repository name, tags and operation recorded in the access log.
    fn access_entries(&self) -> (String, String, Vec<String>, &'static str) {
        match self {
            Event::ChartUpload(e) => (
                e.project_name.clone(),
                e.operator.clone(),
                vec![format!("{}:{}", e.chart_name, e.version)],
                "create",
            ),
            Event::ChartDownload(e) => (
                e.project_name.clone(),
                e.operator.clone(),
                vec![format!("{}:{}", e.chart_name, e.version)],
                "pull",
            ),
            Event::ChartDelete(e) => (
                e.project_name.clone(),
                e.operator.clone(),
                e.versions
                    .iter()
                    .map(|v| format!("{}:{}", e.chart_name, v))
                    .collect(),
                "delete",
            ),
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<Event>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: Event) {
        debug!("publishing event: {:?}", event);
        if self.sender.send(event).is_err() {
            debug!("no subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Write every chart event into the project's access log until the bus closes.
pub fn spawn_access_log_recorder(bus: &EventBus, store: Arc<dyn Store>) -> tokio::task::JoinHandle<()> {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => record(store.as_ref(), &event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("access log recorder lagged by {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn record(store: &dyn Store, event: &Event) {
    let (project_name, username, tags, operation) = event.access_entries();
    let project = match store.get_project(&ProjectRef::Name(project_name.clone())).await {
        Ok(Some(project)) => project,
        Ok(None) => {
            warn!("access log: project {project_name} no longer exists");
            return;
        }
        Err(e) => {
            warn!("access log: failed to look up project {project_name}: {e}");
            return;
        }
    };
    for tagged in tags {
        let (chart, tag) = tagged.rsplit_once(':').unwrap_or((tagged.as_str(), ""));
        let entry = NewAccessLog {
            project_id: project.project_id,
            username: username.clone(),
            repo_name: format!("{project_name}/{chart}"),
            repo_tag: tag.to_string(),
            operation: operation.to_string(),
        };
        if let Err(e) = store.add_access_log(entry).await {
            warn!("failed to record access log for {project_name}/{chart}: {e}");
        }
    }
}
