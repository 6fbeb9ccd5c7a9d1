// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Project lookups shared by every project-scoped handler.
//!
//! Projects are read on almost every request (access checks need the public
//! flag), so [`StoreProjectManager`] keeps a short-lived copy in Redis when a
//! cache is configured. Cache failures are logged and otherwise ignored.

use crate::models::{NewProject, Project, ProjectList, ProjectQuery, ProjectRef};
use crate::store::{ProjectStore, Store, StoreResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::BTreeMap;
use std::sync::Arc;

const CACHE_TTL_SECS: u64 = 60;

#[async_trait]
pub trait MetadataManager: Send + Sync {
    async fn get(&self, project_id: i64) -> StoreResult<BTreeMap<String, String>>;
    /// Set the given keys; other keys are left as they are.
    async fn update(&self, project_id: i64, metadata: BTreeMap<String, String>)
        -> StoreResult<()>;
}

#[async_trait]
pub trait ProjectManager: Send + Sync {
    async fn get(&self, project: &ProjectRef) -> StoreResult<Option<Project>>;
    async fn exists(&self, project: &ProjectRef) -> StoreResult<bool> {
        Ok(self.get(project).await?.is_some())
    }
    async fn is_public(&self, project: &ProjectRef) -> StoreResult<bool> {
        Ok(self.get(project).await?.is_some_and(|p| p.is_public()))
    }
    async fn list(&self, query: &ProjectQuery) -> StoreResult<ProjectList>;
    async fn create(&self, project: NewProject) -> StoreResult<i64>;
    async fn delete(&self, project: &Project) -> StoreResult<bool>;
    fn metadata_manager(&self) -> &dyn MetadataManager;
}

pub struct StoreProjectManager {
    store: Arc<dyn Store>,
    cache: Option<ConnectionManager>,
}

impl StoreProjectManager {
    pub fn new(store: Arc<dyn Store>, cache: Option<ConnectionManager>) -> Self {
        Self { store, cache }
    }

    fn cache_key(project: &ProjectRef) -> String {
        match project {
            ProjectRef::Id(id) => format!("project:id:{id}"),
            ProjectRef::Name(name) => format!("project:name:{name}"),
        }
    }

    async fn cached(&self, project: &ProjectRef) -> Option<Project> {
        let mut conn = self.cache.clone()?;
        let key = Self::cache_key(project);
        match conn.get::<_, Option<String>>(&key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("project cache read failed for {key}: {e}");
                None
            }
        }
    }

    async fn remember(&self, project: &Project) {
        let Some(mut conn) = self.cache.clone() else {
            return;
        };
        let Ok(raw) = serde_json::to_string(project) else {
            return;
        };
        for key in [
            Self::cache_key(&ProjectRef::Id(project.project_id)),
            Self::cache_key(&ProjectRef::Name(project.name.clone())),
        ] {
            if let Err(e) = conn.set_ex::<_, _, ()>(&key, &raw, CACHE_TTL_SECS).await {
                tracing::warn!("project cache write failed for {key}: {e}");
            }
        }
    }

    async fn forget(&self, project_id: i64, name: &str) {
        let Some(mut conn) = self.cache.clone() else {
            return;
        };
        let keys = vec![
            Self::cache_key(&ProjectRef::Id(project_id)),
            Self::cache_key(&ProjectRef::Name(name.to_string())),
        ];
        if let Err(e) = conn.del::<_, ()>(keys).await {
            tracing::warn!("project cache eviction failed for {name}: {e}");
        }
    }
}

#[async_trait]
impl ProjectManager for StoreProjectManager {
    async fn get(&self, project: &ProjectRef) -> StoreResult<Option<Project>> {
        if let Some(hit) = self.cached(project).await {
            return Ok(Some(hit));
        }
        let found = self.store.get_project(project).await?;
        if let Some(project) = &found {
            self.remember(project).await;
        }
        Ok(found)
    }

    async fn list(&self, query: &ProjectQuery) -> StoreResult<ProjectList> {
        self.store.list_projects(query).await
    }

    async fn create(&self, project: NewProject) -> StoreResult<i64> {
        self.store.add_project(project).await
    }

    async fn delete(&self, project: &Project) -> StoreResult<bool> {
        let deleted = self.store.delete_project(project.project_id).await?;
        self.forget(project.project_id, &project.name).await;
        Ok(deleted)
    }

    fn metadata_manager(&self) -> &dyn MetadataManager {
        self
    }
}

#[async_trait]
impl MetadataManager for StoreProjectManager {
    async fn get(&self, project_id: i64) -> StoreResult<BTreeMap<String, String>> {
        Ok(self
            .store
            .get_project(&ProjectRef::Id(project_id))
            .await?
            .map(|p| p.metadata)
            .unwrap_or_default())
    }

    async fn update(
        &self,
        project_id: i64,
        metadata: BTreeMap<String, String>,
    ) -> StoreResult<()> {
        self.store
            .update_project_metadata(project_id, metadata)
            .await?;
        if let Some(project) = self.store.get_project(&ProjectRef::Id(project_id)).await? {
            self.forget(project.project_id, &project.name).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::METADATA_PUBLIC;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn public_flag_follows_metadata_updates() {
        let store = Arc::new(MemoryStore::new());
        let manager = StoreProjectManager::new(store, None);
        let id = manager
            .create(NewProject {
                name: "library".into(),
                owner_id: 1,
                metadata: BTreeMap::new(),
            })
            .await
            .unwrap();
        let by_name = ProjectRef::Name("library".into());
        assert!(manager.exists(&by_name).await.unwrap());
        assert!(!manager.is_public(&by_name).await.unwrap());

        let mut public = BTreeMap::new();
        public.insert(METADATA_PUBLIC.to_string(), "true".to_string());
        manager.metadata_manager().update(id, public).await.unwrap();
        assert!(manager.is_public(&ProjectRef::Id(id)).await.unwrap());
        assert_eq!(
            manager.metadata_manager().get(id).await.unwrap()[METADATA_PUBLIC],
            "true"
        );
    }

    #[tokio::test]
    async fn missing_projects_do_not_exist() {
        let manager = StoreProjectManager::new(Arc::new(MemoryStore::new()), None);
        assert!(!manager.exists(&ProjectRef::Id(9)).await.unwrap());
        assert!(!manager.is_public(&ProjectRef::Id(9)).await.unwrap());
    }
}
