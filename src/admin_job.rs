// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Admin-job lifecycle: submission to the job service, schedule updates, log
//! retrieval and the status reconciler.
//!
//! A job is persisted before it is submitted; when the job service rejects it
//! the row is removed again so no orphan survives the failed request.

use crate::{
    controller::Validate,
    db::AppState,
    error::RegistryError,
    models::{
        AdminJob, AdminJobQuery, AdminJobRep, AdminJobRequest, AdminJobSchedule, JobKind,
        JobStatus, NewAdminJob, Schedule, ScheduleType, SCAN_ALL_JOB,
    },
    scan::ScanController,
    store::{AdminJobStore, Store, StoreError},
    worker::{JobAction, JobData, JobMetadata, JobServiceClient, WorkerError},
};
use bytes::Bytes;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// A generic job updated within this many hours may still be in flight.
const IN_FLIGHT_HOURS: i64 = 2;

/// Number of executions returned by [`AdminJobController::list`].
pub const LIST_LIMIT: usize = 10;

/// Path of the status hook the job service calls back on.
pub const STATUS_HOOK_PATH: &str = "/service/notifications/jobs/adminjob";

impl Validate for AdminJobRequest {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("admin job name is required".into());
        }
        match &self.schedule {
            Some(schedule) => schedule.validate(),
            None => Err("schedule is required".into()),
        }
    }
}

/// Body posted by the job service to the status hook.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusHook {
    #[serde(default)]
    pub job_id: String,
    pub status: String,
}

pub struct AdminJobController {
    store: Arc<dyn Store>,
    worker: Arc<dyn JobServiceClient>,
    scans: Arc<dyn ScanController>,
    core_url: String,
}

impl AdminJobController {
    pub fn new(
        store: Arc<dyn Store>,
        worker: Arc<dyn JobServiceClient>,
        scans: Arc<dyn ScanController>,
        core_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            worker,
            scans,
            core_url: core_url.into(),
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.store.clone(),
            state.worker.clone(),
            state.scans.clone(),
            state.config.core_url.clone(),
        )
    }

    // ── Submit ────────────────────────────────────────────────────────────────

    /// Launch the requested job. Returns the new row id, or `None` when the
    /// schedule type is `None` and nothing was launched.
    pub async fn submit(&self, req: &AdminJobRequest) -> Result<Option<i64>, RegistryError> {
        if req.schedule_type() == ScheduleType::None {
            return Ok(None);
        }

        if req.is_periodic() {
            let existing = self.periodic_jobs(&req.name).await?;
            if !existing.is_empty() {
                return Err(schedule_taken(&req.name));
            }
        } else {
            self.ensure_not_in_flight(&req.name).await?;
        }

        let id = self
            .store
            .add_admin_job(NewAdminJob {
                name: req.name.clone(),
                kind: req.job_kind(),
                cron: req.cron_string(),
            })
            .await
            .map_err(|e| match e {
                // A concurrent submit won the schedule slot.
                StoreError::Duplicate(_) => schedule_taken(&req.name),
                other => other.into(),
            })?;

        let job = self.job_data(id, req);
        let uuid = match self.worker.submit_job(&job).await {
            Ok(uuid) => uuid,
            Err(e) => {
                if let Err(cleanup) = self.store.delete_admin_job(id).await {
                    tracing::error!("failed to remove admin job {id} after a rejected submit: {cleanup}");
                }
                return Err(RegistryError::from_worker("failed to submit admin job", e));
            }
        };
        self.store.set_admin_job_uuid(id, &uuid).await?;
        tracing::info!("Submitted admin job {} ({}) as {uuid}", req.name, req.job_kind());
        Ok(Some(id))
    }

    /// Reject a generic job whose previous run may still be working.
    async fn ensure_not_in_flight(&self, name: &str) -> Result<(), RegistryError> {
        let latest = self
            .store
            .list_admin_jobs(&AdminJobQuery {
                name: Some(name.to_string()),
                kind: Some(JobKind::Generic),
                limit: Some(1),
                ..Default::default()
            })
            .await?;
        let Some(latest) = latest.into_iter().next() else {
            return Ok(());
        };
        if latest.update_time + Duration::hours(IN_FLIGHT_HOURS) <= Utc::now() {
            return Ok(());
        }

        if latest.status.is_ongoing() {
            return Err(RegistryError::Conflict(format!(
                "admin job {name} is already in progress ({})",
                latest.status
            )));
        }

        if name == SCAN_ALL_JOB {
            let stats = self.scans.get_stats(&latest.id.to_string()).await?;
            if !stats.is_done() {
                return Err(RegistryError::Precondition(format!(
                    "scan all job is still in progress: {}%",
                    stats.percent()
                )));
            }
        }
        Ok(())
    }

    fn job_data(&self, id: i64, req: &AdminJobRequest) -> JobData {
        let mut parameters: Map<String, Value> = req.parameters.clone().unwrap_or_default();
        parameters.insert("admin_job_id".into(), Value::from(id));
        JobData {
            name: req.name.clone(),
            parameters,
            metadata: JobMetadata {
                kind: req.job_kind().to_string(),
                cron_spec: req.cron_string(),
                is_unique: false,
            },
            status_hook: format!(
                "{}{STATUS_HOOK_PATH}/{id}",
                self.core_url.trim_end_matches('/')
            ),
        }
    }

    // ── Schedule ──────────────────────────────────────────────────────────────

    /// Replace (or, with type `None`, cancel) the schedule of a periodic job.
    pub async fn update_schedule(&self, req: &AdminJobRequest) -> Result<(), RegistryError> {
        if req.schedule_type() == ScheduleType::Manual {
            return Err(RegistryError::internal(
                "a manual job cannot replace a schedule",
            ));
        }

        let mut jobs = self.periodic_jobs(&req.name).await?;
        if jobs.len() != 1 {
            return Err(RegistryError::internal(format!(
                "expected exactly one schedule for {}, found {}",
                req.name,
                jobs.len()
            )));
        }
        let job = jobs.remove(0);

        match self.worker.post_action(&job.uuid, JobAction::Stop).await {
            Ok(()) => {}
            Err(WorkerError::StatusBehind(msg)) => {
                tracing::debug!("schedule {} already finished: {msg}", job.uuid);
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!("schedule {} unknown to the job service", job.uuid);
            }
            Err(e) => return Err(RegistryError::from_worker("failed to stop the current schedule", e)),
        }
        self.store.delete_admin_job(job.id).await?;
        tracing::info!("Removed schedule of {} ({})", req.name, job.cron);

        if req.schedule_type() != ScheduleType::None {
            self.submit(req).await?;
        }
        Ok(())
    }

    pub async fn get_schedule(&self, name: &str) -> Result<AdminJobSchedule, RegistryError> {
        let jobs = self.periodic_jobs(name).await?;
        match jobs.as_slice() {
            [] => Ok(AdminJobSchedule::default()),
            [job] => Ok(AdminJobSchedule {
                schedule: Some(Schedule::from_cron(&job.cron)),
            }),
            many => Err(RegistryError::internal(format!(
                "found {} schedules for {name}",
                many.len()
            ))),
        }
    }

    async fn periodic_jobs(&self, name: &str) -> Result<Vec<AdminJob>, RegistryError> {
        Ok(self
            .store
            .list_admin_jobs(&AdminJobQuery {
                name: Some(name.to_string()),
                kind: Some(JobKind::Periodic),
                ..Default::default()
            })
            .await?)
    }

    // ── Read ──────────────────────────────────────────────────────────────────

    pub async fn get(&self, id: i64) -> Result<AdminJobRep, RegistryError> {
        Ok(self.require(id).await?.into())
    }

    /// The most recent executions of `name`, newest first.
    pub async fn list(&self, name: &str) -> Result<Vec<AdminJobRep>, RegistryError> {
        let jobs = self
            .store
            .list_admin_jobs(&AdminJobQuery {
                name: Some(name.to_string()),
                limit: Some(LIST_LIMIT),
                ..Default::default()
            })
            .await?;
        Ok(jobs.into_iter().map(AdminJobRep::from).collect())
    }

    /// Log of a job. For a periodic job this is the log of the first finished
    /// execution in the order the job service lists them.
    pub async fn get_log(&self, id: i64) -> Result<Bytes, RegistryError> {
        let job = self.require(id).await?;
        if job.uuid.is_empty() {
            return Err(RegistryError::NotFound(format!("admin job {id} has no log")));
        }

        let log_id = match job.kind {
            JobKind::Generic => job.uuid,
            JobKind::Periodic => {
                let executions = self
                    .worker
                    .get_executions(&job.uuid)
                    .await
                    .map_err(|e| RegistryError::from_worker("failed to get the job executions", e))?;
                executions
                    .into_iter()
                    .find(|e| e.is_finished())
                    .map(|e| e.id)
                    .ok_or_else(|| RegistryError::NotFound("no execution log found".into()))?
            }
        };

        self.worker
            .get_job_log(&log_id)
            .await
            .map_err(|e| RegistryError::from_worker("failed to get the job log", e))
    }

    async fn require(&self, id: i64) -> Result<AdminJob, RegistryError> {
        self.store
            .get_admin_job(id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("admin job {id} not found")))
    }

    // ── Delete / reconcile ────────────────────────────────────────────────────

    /// Delete a finished job.
    pub async fn delete(&self, id: i64) -> Result<(), RegistryError> {
        let job = self.require(id).await?;
        if !job.status.is_terminal() {
            return Err(RegistryError::Precondition(format!(
                "admin job {id} is {}, only finished jobs can be deleted",
                job.status
            )));
        }
        if !self.store.delete_admin_job(id).await? {
            return Err(RegistryError::NotFound(format!("admin job {id} not found")));
        }
        tracing::info!("Deleted admin job {id} ({})", job.name);
        Ok(())
    }

    /// Apply a status reported by the job service.
    pub async fn reconcile(&self, id: i64, hook: &StatusHook) -> Result<(), RegistryError> {
        let status: JobStatus = hook.status.parse().map_err(RegistryError::BadInput)?;
        let job = self.require(id).await?;
        self.store.update_admin_job_status(id, status).await?;
        tracing::debug!(
            "admin job {id} ({}) {} -> {status}, reported by {}",
            job.name,
            job.status,
            hook.job_id
        );
        Ok(())
    }
}

fn schedule_taken(name: &str) -> RegistryError {
    RegistryError::Conflict(format!(
        "failed to set schedule for {name} as it already had one, please delete it first then re-schedule"
    ))
}
