// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Domain models for Registry Control.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// stored representation is a fixed string per variant.
macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(format!("unknown {}: {other}", stringify!($ty))),
                }
            }
        }
    };
}

// ── Admin jobs ────────────────────────────────────────────────────────────────

pub const SCAN_ALL_JOB: &str = "scan-all";
pub const GC_JOB: &str = "garbage-collect";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    Generic,
    Periodic,
}

string_enum!(JobKind {
    Generic => "Generic",
    Periodic => "Periodic",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Scheduled,
    Running,
    Success,
    Error,
    Stopped,
}

string_enum!(JobStatus {
    Pending => "Pending",
    Scheduled => "Scheduled",
    Running => "Running",
    Success => "Success",
    Error => "Error",
    Stopped => "Stopped",
});

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Error | JobStatus::Stopped)
    }

    pub fn is_ongoing(&self) -> bool {
        matches!(self, JobStatus::Running | JobStatus::Scheduled | JobStatus::Pending)
    }
}

/// One invocation of a named administrative task executed by the job service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminJob {
    pub id: i64,
    pub name: String,
    pub kind: JobKind,
    /// Empty unless `kind` is `Periodic`.
    pub cron: String,
    pub status: JobStatus,
    /// Job-service identifier, empty until the job service accepted the job.
    pub uuid: String,
    pub creation_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

/// Row to insert; id, status and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewAdminJob {
    pub name: String,
    pub kind: JobKind,
    pub cron: String,
}

#[derive(Debug, Clone, Default)]
pub struct AdminJobQuery {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub kind: Option<JobKind>,
    /// Maximum number of rows, newest (highest id) first.
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleType {
    Manual,
    Hourly,
    Daily,
    Weekly,
    Custom,
    None,
}

pub const CRON_HOURLY: &str = "0 0 * * * *";
pub const CRON_DAILY: &str = "0 0 0 * * *";
pub const CRON_WEEKLY: &str = "0 0 0 * * 0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(rename = "type")]
    pub schedule_type: ScheduleType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cron: String,
}

impl Schedule {
    pub fn is_periodic(&self) -> bool {
        matches!(
            self.schedule_type,
            ScheduleType::Hourly | ScheduleType::Daily | ScheduleType::Weekly | ScheduleType::Custom
        )
    }

    /// Cron expression handed to the job service; empty for one-shot jobs.
    pub fn cron_string(&self) -> String {
        match self.schedule_type {
            ScheduleType::Hourly => CRON_HOURLY.to_string(),
            ScheduleType::Daily => CRON_DAILY.to_string(),
            ScheduleType::Weekly => CRON_WEEKLY.to_string(),
            ScheduleType::Custom => self.cron.trim().to_string(),
            ScheduleType::Manual | ScheduleType::None => String::new(),
        }
    }

    /// Rebuild a schedule from a stored cron expression.
    pub fn from_cron(cron: &str) -> Self {
        let schedule_type = match cron.trim() {
            CRON_HOURLY => ScheduleType::Hourly,
            CRON_DAILY => ScheduleType::Daily,
            CRON_WEEKLY => ScheduleType::Weekly,
            _ => ScheduleType::Custom,
        };
        Self {
            schedule_type,
            cron: cron.trim().to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.schedule_type == ScheduleType::Custom {
            let fields = self.cron.split_whitespace().count();
            if !(5..=6).contains(&fields) {
                return Err(format!(
                    "custom schedule requires a cron expression with 5 or 6 fields, got '{}'",
                    self.cron
                ));
            }
        }
        Ok(())
    }
}

/// Request body for `POST /admin-jobs` and `PUT /admin-jobs/schedule`.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminJobRequest {
    #[serde(default)]
    pub name: String,
    pub schedule: Option<Schedule>,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
}

impl AdminJobRequest {
    pub fn is_periodic(&self) -> bool {
        self.schedule.as_ref().is_some_and(Schedule::is_periodic)
    }

    pub fn schedule_type(&self) -> ScheduleType {
        self.schedule
            .as_ref()
            .map(|s| s.schedule_type)
            .unwrap_or(ScheduleType::None)
    }

    pub fn job_kind(&self) -> JobKind {
        if self.is_periodic() {
            JobKind::Periodic
        } else {
            JobKind::Generic
        }
    }

    pub fn cron_string(&self) -> String {
        self.schedule
            .as_ref()
            .map(Schedule::cron_string)
            .unwrap_or_default()
    }
}

/// Response shape for an admin job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminJobRep {
    pub id: i64,
    pub job_name: String,
    pub job_kind: JobKind,
    pub job_status: JobStatus,
    pub job_uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    pub creation_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl From<AdminJob> for AdminJobRep {
    fn from(job: AdminJob) -> Self {
        let schedule = (!job.cron.is_empty()).then(|| Schedule::from_cron(&job.cron));
        Self {
            id: job.id,
            job_name: job.name,
            job_kind: job.kind,
            job_status: job.status,
            job_uuid: job.uuid,
            schedule,
            creation_time: job.creation_time,
            update_time: job.update_time,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminJobSchedule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

/// Progress of the scans started by one scan-all job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total: u64,
    pub completed: u64,
}

// ── Projects ──────────────────────────────────────────────────────────────────

pub const METADATA_PUBLIC: &str = "public";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: i64,
    pub name: String,
    pub owner_id: i64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub creation_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Project {
    pub fn is_public(&self) -> bool {
        self.metadata
            .get(METADATA_PUBLIC)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub owner_id: i64,
    pub metadata: BTreeMap<String, String>,
}

/// Request body for `POST /projects`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectRequest {
    pub project_name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMetadataRequest {
    pub metadata: BTreeMap<String, String>,
}

/// Either a numeric id or a name, as accepted on project-scoped paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProjectRef {
    Id(i64),
    Name(String),
}

impl ProjectRef {
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(id) => ProjectRef::Id(id),
            Err(_) => ProjectRef::Name(raw.to_string()),
        }
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectRef::Id(id) => write!(f, "{id}"),
            ProjectRef::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectQuery {
    pub name: Option<String>,
    pub public: Option<bool>,
    /// When set, only projects that are public or whose id is listed.
    pub member_or_public: Option<Vec<i64>>,
    pub page: Option<Page>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectList {
    pub total: i64,
    pub projects: Vec<Project>,
}

/// A 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u64,
    pub size: u64,
}

impl Page {
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.size)
    }

    /// Slice an already-ordered in-memory list.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(usize::try_from(self.offset()).unwrap_or(usize::MAX))
            .take(self.size as usize)
            .collect()
    }
}

// ── Principals ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub realname: String,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(skip)]
    pub salt: String,
    pub sysadmin_flag: bool,
    #[serde(default)]
    pub group_ids: Vec<i64>,
    pub creation_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub realname: String,
    pub password_hash: String,
    pub salt: String,
    pub sysadmin_flag: bool,
    pub group_ids: Vec<i64>,
}

/// Request body for `POST /users`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRequest {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub realname: String,
    pub password: String,
    #[serde(default)]
    pub group_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SysAdminFlag {
    pub sysadmin_flag: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserGroup {
    pub id: i64,
    pub group_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserGroupRequest {
    pub group_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectRole {
    ProjectAdmin,
    Maintainer,
    Developer,
    Guest,
    LimitedGuest,
}

string_enum!(ProjectRole {
    ProjectAdmin => "project_admin",
    Maintainer => "maintainer",
    Developer => "developer",
    Guest => "guest",
    LimitedGuest => "limited_guest",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberEntityType {
    User,
    Group,
}

string_enum!(MemberEntityType {
    User => "user",
    Group => "group",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub project_id: i64,
    pub entity_type: MemberEntityType,
    pub entity_id: i64,
    pub role: ProjectRole,
}

/// Request body for `POST /projects/:id/members`.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberRequest {
    pub entity_type: MemberEntityType,
    pub entity_id: i64,
    pub role: ProjectRole,
}

pub const ROBOT_PREFIX: &str = "robot$";

/// One permission granted to a robot account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RobotAccess {
    pub resource: crate::security::ResourceKind,
    pub action: crate::security::Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotAccount {
    pub id: i64,
    /// Always carries the `robot$` prefix.
    pub name: String,
    pub description: String,
    pub project_id: i64,
    #[serde(skip)]
    pub token_hash: String,
    pub disabled: bool,
    pub access: Vec<RobotAccess>,
    pub creation_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRobot {
    pub name: String,
    pub description: String,
    pub project_id: i64,
    pub token_hash: String,
    pub access: Vec<RobotAccess>,
}

/// Request body for `POST /projects/:id/robots`.
#[derive(Debug, Clone, Deserialize)]
pub struct RobotRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub access: Vec<RobotAccess>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RobotUpdate {
    pub disabled: bool,
}

/// Returned once, on creation; the token is never shown again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotCreated {
    pub id: i64,
    pub name: String,
    pub token: String,
}

// ── Labels ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelScope {
    #[serde(rename = "g")]
    Global,
    #[serde(rename = "p")]
    Project,
}

string_enum!(LabelScope {
    Global => "g",
    Project => "p",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelLevel {
    System,
    User,
}

string_enum!(LabelLevel {
    System => "system",
    User => "user",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    pub level: LabelLevel,
    pub scope: LabelScope,
    /// Zero for global labels.
    pub project_id: i64,
    pub creation_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLabel {
    pub name: String,
    pub description: String,
    pub color: String,
    pub level: LabelLevel,
    pub scope: LabelScope,
    pub project_id: i64,
}

/// Request body for `POST /labels` and `PUT /labels/:id`.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    pub scope: LabelScope,
    #[serde(default)]
    pub project_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct LabelQuery {
    pub name: Option<String>,
    pub scope: Option<LabelScope>,
    pub project_id: Option<i64>,
    pub level: Option<LabelLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Repository,
    Image,
    Chart,
}

string_enum!(ResourceType {
    Repository => "r",
    Image => "i",
    Chart => "c",
});

/// Association between a label and a resource, keyed by the resource's
/// canonical name (`project/chart:version`, `repo:tag`, or a repository id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLabel {
    pub id: i64,
    pub label_id: i64,
    pub resource_type: ResourceType,
    pub resource_name: String,
    pub creation_time: DateTime<Utc>,
}

/// Body for attaching a label to a resource.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelRef {
    pub id: i64,
}

// ── Policies ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Replication,
    Webhook,
    Retention,
    ImmutableTag,
}

string_enum!(PolicyKind {
    Replication => "replication",
    Webhook => "webhook",
    Retention => "retention",
    ImmutableTag => "immutable_tag",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    Repository,
    Tag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorDecoration {
    Matches,
    Excludes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub kind: SelectorKind,
    pub decoration: SelectorDecoration,
    pub pattern: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerKind {
    Manual,
    Scheduled,
    EventBased,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: TriggerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: i64,
    pub project_id: i64,
    pub kind: PolicyKind,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub selectors: Vec<Selector>,
    pub trigger: Trigger,
    pub enabled: bool,
    pub creation_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

/// Request body for creating or replacing a policy.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub selectors: Vec<Selector>,
    pub trigger: Trigger,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct NewPolicy {
    pub project_id: i64,
    pub kind: PolicyKind,
    pub request: PolicyRequest,
}

// ── Access log ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLog {
    pub id: i64,
    pub project_id: i64,
    pub username: String,
    pub repo_name: String,
    pub repo_tag: String,
    pub operation: String,
    pub op_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAccessLog {
    pub project_id: i64,
    pub username: String,
    pub repo_name: String,
    pub repo_tag: String,
    pub operation: String,
}

// ── Image repositories ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRepository {
    pub repository_id: i64,
    /// Full name including the project, e.g. `library/web`.
    pub name: String,
    pub project_id: i64,
    #[serde(default)]
    pub description: String,
    pub pull_count: i64,
    pub star_count: i64,
    pub creation_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct RepositoryQuery {
    pub project_id: i64,
    pub name: Option<String>,
    pub label_id: Option<i64>,
    pub page: Option<Page>,
}

/// List item returned by `GET /projects/:project/repositories`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryResp {
    pub id: i64,
    pub name: String,
    pub project_id: i64,
    pub description: String,
    pub pull_count: i64,
    pub star_count: i64,
    pub tags_count: i64,
    pub labels: Vec<Label>,
    pub creation_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

/// Manifest-derived detail of one tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagDetail {
    pub digest: String,
    pub size: i64,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagResp {
    pub name: String,
    #[serde(flatten)]
    pub detail: TagDetail,
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_job_json_round_trip() {
        let now = Utc::now();
        let job = AdminJob {
            id: 7,
            name: "scan-all".into(),
            kind: JobKind::Periodic,
            cron: CRON_DAILY.into(),
            status: JobStatus::Scheduled,
            uuid: "u1".into(),
            creation_time: now,
            update_time: now,
        };
        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: AdminJob = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn schedule_presets_map_to_cron() {
        let daily = Schedule {
            schedule_type: ScheduleType::Daily,
            cron: String::new(),
        };
        assert_eq!(daily.cron_string(), CRON_DAILY);
        assert_eq!(Schedule::from_cron(CRON_DAILY).schedule_type, ScheduleType::Daily);
        assert_eq!(Schedule::from_cron(CRON_WEEKLY).schedule_type, ScheduleType::Weekly);
        assert_eq!(
            Schedule::from_cron("0 30 2 * * 1").schedule_type,
            ScheduleType::Custom
        );
    }

    #[test]
    fn custom_schedule_requires_cron() {
        let custom = Schedule {
            schedule_type: ScheduleType::Custom,
            cron: String::new(),
        };
        assert!(custom.validate().is_err());

        let ok = Schedule {
            schedule_type: ScheduleType::Custom,
            cron: "0 30 2 * * 1".into(),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn request_kind_follows_schedule() {
        let manual: AdminJobRequest =
            serde_json::from_value(serde_json::json!({"name": "gc", "schedule": {"type": "Manual"}}))
                .unwrap();
        assert_eq!(manual.job_kind(), JobKind::Generic);
        assert_eq!(manual.cron_string(), "");

        let hourly: AdminJobRequest =
            serde_json::from_value(serde_json::json!({"name": "gc", "schedule": {"type": "Hourly"}}))
                .unwrap();
        assert_eq!(hourly.job_kind(), JobKind::Periodic);
        assert_eq!(hourly.cron_string(), CRON_HOURLY);
    }

    #[test]
    fn job_status_classes() {
        assert!(JobStatus::Stopped.is_terminal());
        assert!(JobStatus::Pending.is_ongoing());
        assert!(!JobStatus::Success.is_ongoing());
        assert_eq!("Running".parse::<JobStatus>().unwrap(), JobStatus::Running);
    }

    #[test]
    fn project_ref_parses_ids_and_names() {
        assert_eq!(ProjectRef::parse("12"), ProjectRef::Id(12));
        assert_eq!(ProjectRef::parse("library"), ProjectRef::Name("library".into()));
    }

    #[test]
    fn page_slices_in_order() {
        let page = Page { page: 2, size: 2 };
        assert_eq!(page.apply(vec![1, 2, 3, 4, 5]), vec![3, 4]);
    }
}
