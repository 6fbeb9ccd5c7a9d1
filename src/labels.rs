// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Label bookkeeping shared by the label, repository and chart handlers.
//!
//! A project-scoped label may only be attached to resources of its own
//! project; global labels attach anywhere.

use crate::{
    controller::Validate,
    error::RegistryError,
    models::{Label, LabelRequest, LabelScope, ResourceType},
    store::{LabelStore, Store},
};
use std::sync::Arc;

pub const MAX_LABEL_NAME_LEN: usize = 128;

impl Validate for LabelRequest {
    fn validate(&self) -> Result<(), String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("label name is required".into());
        }
        if name.len() > MAX_LABEL_NAME_LEN {
            return Err(format!("label name exceeds {MAX_LABEL_NAME_LEN} characters"));
        }
        match self.scope {
            LabelScope::Global if self.project_id != 0 => {
                Err("a global label cannot belong to a project".into())
            }
            LabelScope::Project if self.project_id <= 0 => {
                Err("a project label requires a project_id".into())
            }
            _ => Ok(()),
        }
    }
}

/// Fail unless `label` may be attached to a resource in `project_id`.
pub fn check_scope(label: &Label, project_id: i64) -> Result<(), RegistryError> {
    if label.scope == LabelScope::Project && label.project_id != project_id {
        return Err(RegistryError::BadInput(format!(
            "label {} does not belong to project {project_id}",
            label.id
        )));
    }
    Ok(())
}

pub struct LabelManager {
    store: Arc<dyn Store>,
}

impl LabelManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn require(&self, label_id: i64) -> Result<Label, RegistryError> {
        self.store
            .get_label(label_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("label {label_id} not found")))
    }

    pub async fn labels_of(
        &self,
        resource_type: ResourceType,
        resource_name: &str,
    ) -> Result<Vec<Label>, RegistryError> {
        Ok(self
            .store
            .get_labels_of_resource(resource_type, resource_name)
            .await?)
    }

    /// Attach a label to a resource of `project_id`. Attaching twice is a conflict.
    pub async fn attach(
        &self,
        label_id: i64,
        project_id: i64,
        resource_type: ResourceType,
        resource_name: &str,
    ) -> Result<(), RegistryError> {
        let label = self.require(label_id).await?;
        check_scope(&label, project_id)?;
        self.store
            .add_resource_label(label_id, resource_type, resource_name)
            .await?;
        tracing::debug!("label {} attached to {resource_name}", label.name);
        Ok(())
    }

    pub async fn detach(
        &self,
        label_id: i64,
        resource_type: ResourceType,
        resource_name: &str,
    ) -> Result<(), RegistryError> {
        if !self
            .store
            .remove_resource_label(resource_type, resource_name, label_id)
            .await?
        {
            return Err(RegistryError::NotFound(format!(
                "label {label_id} is not attached to {resource_name}"
            )));
        }
        Ok(())
    }

    /// Drop every label of a resource that is about to disappear.
    pub async fn detach_all(
        &self,
        resource_type: ResourceType,
        resource_name: &str,
    ) -> Result<(), RegistryError> {
        for label in self.labels_of(resource_type, resource_name).await? {
            self.store
                .remove_resource_label(resource_type, resource_name, label.id)
                .await?;
        }
        Ok(())
    }
}
