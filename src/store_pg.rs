// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Postgres implementation of [`Store`](crate::store::Store).
//!
//! Enumerations are stored as their text form; nested values (robot access,
//! policy selectors and triggers) as JSONB.

use crate::models::*;
use crate::store::*;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a unique-constraint violation to `Duplicate`.
fn unique_violation(e: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505") {
            return StoreError::Duplicate(what());
        }
    }
    StoreError::Database(e)
}

fn parse<T: FromStr<Err = String>>(row: &PgRow, column: &str) -> StoreResult<T> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(StoreError::Serialization)
}

fn from_json<T: serde::de::DeserializeOwned>(row: &PgRow, column: &str) -> StoreResult<T> {
    let raw: serde_json::Value = row.try_get(column)?;
    serde_json::from_value(raw).map_err(|e| StoreError::Serialization(format!("{column}: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> StoreResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn page_bounds(page: Option<Page>) -> (Option<i64>, i64) {
    match page {
        Some(p) => (
            Some(i64::try_from(p.size).unwrap_or(i64::MAX)),
            i64::try_from(p.offset()).unwrap_or(i64::MAX),
        ),
        None => (None, 0),
    }
}

// ── Row mapping ───────────────────────────────────────────────────────────────

fn admin_job_row(row: &PgRow) -> StoreResult<AdminJob> {
    Ok(AdminJob {
        id: row.try_get("id")?,
        name: row.try_get("job_name")?,
        kind: parse(row, "job_kind")?,
        cron: row.try_get("cron_str")?,
        status: parse(row, "status")?,
        uuid: row.try_get("job_uuid")?,
        creation_time: row.try_get("creation_time")?,
        update_time: row.try_get("update_time")?,
    })
}

fn project_row(row: &PgRow) -> StoreResult<Project> {
    Ok(Project {
        project_id: row.try_get("project_id")?,
        name: row.try_get("name")?,
        owner_id: row.try_get("owner_id")?,
        metadata: BTreeMap::new(),
        creation_time: row.try_get("creation_time")?,
        update_time: row.try_get("update_time")?,
    })
}

fn member_row(row: &PgRow) -> StoreResult<Member> {
    Ok(Member {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        entity_type: parse(row, "entity_type")?,
        entity_id: row.try_get("entity_id")?,
        role: parse(row, "role")?,
    })
}

fn user_row(row: &PgRow) -> StoreResult<User> {
    Ok(User {
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        realname: row.try_get("realname")?,
        password_hash: row.try_get("password")?,
        salt: row.try_get("salt")?,
        sysadmin_flag: row.try_get("sysadmin_flag")?,
        group_ids: row.try_get("group_ids")?,
        creation_time: row.try_get("creation_time")?,
        update_time: row.try_get("update_time")?,
    })
}

fn robot_row(row: &PgRow) -> StoreResult<RobotAccount> {
    Ok(RobotAccount {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        project_id: row.try_get("project_id")?,
        token_hash: row.try_get("token_hash")?,
        disabled: row.try_get("disabled")?,
        access: from_json(row, "access")?,
        creation_time: row.try_get("creation_time")?,
        update_time: row.try_get("update_time")?,
    })
}

fn label_row(row: &PgRow) -> StoreResult<Label> {
    Ok(Label {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        color: row.try_get("color")?,
        level: parse(row, "level")?,
        scope: parse(row, "scope")?,
        project_id: row.try_get("project_id")?,
        creation_time: row.try_get("creation_time")?,
        update_time: row.try_get("update_time")?,
    })
}

fn resource_label_row(row: &PgRow) -> StoreResult<ResourceLabel> {
    Ok(ResourceLabel {
        id: row.try_get("id")?,
        label_id: row.try_get("label_id")?,
        resource_type: parse(row, "resource_type")?,
        resource_name: row.try_get("resource_name")?,
        creation_time: row.try_get("creation_time")?,
    })
}

fn policy_row(row: &PgRow) -> StoreResult<Policy> {
    Ok(Policy {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        kind: parse(row, "kind")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        selectors: from_json(row, "selectors")?,
        trigger: from_json(row, "trigger")?,
        enabled: row.try_get("enabled")?,
        creation_time: row.try_get("creation_time")?,
        update_time: row.try_get("update_time")?,
    })
}

fn access_log_row(row: &PgRow) -> StoreResult<AccessLog> {
    Ok(AccessLog {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        username: row.try_get("username")?,
        repo_name: row.try_get("repo_name")?,
        repo_tag: row.try_get("repo_tag")?,
        operation: row.try_get("operation")?,
        op_time: row.try_get("op_time")?,
    })
}

fn repository_row(row: &PgRow) -> StoreResult<ImageRepository> {
    Ok(ImageRepository {
        repository_id: row.try_get("repository_id")?,
        name: row.try_get("name")?,
        project_id: row.try_get("project_id")?,
        description: row.try_get("description")?,
        pull_count: row.try_get("pull_count")?,
        star_count: row.try_get("star_count")?,
        creation_time: row.try_get("creation_time")?,
        update_time: row.try_get("update_time")?,
    })
}

// ── Admin jobs ────────────────────────────────────────────────────────────────

#[async_trait]
impl AdminJobStore for PgStore {
    async fn add_admin_job(&self, job: NewAdminJob) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO admin_job (job_name, job_kind, cron_str, status)
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&job.name)
        .bind(job.kind.as_str())
        .bind(&job.cron)
        .bind(JobStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || format!("periodic admin job {}", job.name)))?;
        Ok(id)
    }

    async fn get_admin_job(&self, id: i64) -> StoreResult<Option<AdminJob>> {
        sqlx::query("SELECT * FROM admin_job WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| admin_job_row(&row))
            .transpose()
    }

    async fn list_admin_jobs(&self, query: &AdminJobQuery) -> StoreResult<Vec<AdminJob>> {
        let rows = sqlx::query(
            "SELECT * FROM admin_job
             WHERE ($1::BIGINT IS NULL OR id = $1)
               AND ($2::TEXT IS NULL OR job_name = $2)
               AND ($3::TEXT IS NULL OR job_kind = $3)
             ORDER BY id DESC
             LIMIT $4",
        )
        .bind(query.id)
        .bind(query.name.as_deref())
        .bind(query.kind.map(|k| k.as_str()))
        .bind(query.limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(admin_job_row).collect()
    }

    async fn set_admin_job_uuid(&self, id: i64, uuid: &str) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE admin_job SET job_uuid = $2, update_time = NOW() WHERE id = $1")
                .bind(id)
                .bind(uuid)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("admin job {id}")));
        }
        Ok(())
    }

    async fn update_admin_job_status(&self, id: i64, status: JobStatus) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE admin_job SET status = $2, update_time = NOW() WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("admin job {id}")));
        }
        Ok(())
    }

    async fn delete_admin_job(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM admin_job WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ScanTaskStore for PgStore {
    async fn scan_stats(&self, track_id: &str) -> StoreResult<ScanStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE status IN ('Success', 'Error', 'Stopped')) AS completed
             FROM scan_task WHERE track_id = $1",
        )
        .bind(track_id)
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.try_get("total")?;
        let completed: i64 = row.try_get("completed")?;
        Ok(ScanStats {
            total: total as u64,
            completed: completed as u64,
        })
    }
}

// ── Projects ──────────────────────────────────────────────────────────────────

impl PgStore {
    async fn attach_metadata(&self, projects: &mut [Project]) -> StoreResult<()> {
        if projects.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = projects.iter().map(|p| p.project_id).collect();
        let rows = sqlx::query(
            "SELECT project_id, name, value FROM project_metadata WHERE project_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        let mut by_project: HashMap<i64, BTreeMap<String, String>> = HashMap::new();
        for row in rows {
            let project_id: i64 = row.try_get("project_id")?;
            by_project
                .entry(project_id)
                .or_default()
                .insert(row.try_get("name")?, row.try_get("value")?);
        }
        for project in projects.iter_mut() {
            if let Some(metadata) = by_project.remove(&project.project_id) {
                project.metadata = metadata;
            }
        }
        Ok(())
    }

    async fn upsert_metadata(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        project_id: i64,
        metadata: &BTreeMap<String, String>,
    ) -> StoreResult<()> {
        for (name, value) in metadata {
            sqlx::query(
                "INSERT INTO project_metadata (project_id, name, value) VALUES ($1, $2, $3)
                 ON CONFLICT (project_id, name) DO UPDATE SET value = EXCLUDED.value",
            )
            .bind(project_id)
            .bind(name)
            .bind(value)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

const PROJECT_FILTER: &str = "
    ($1::TEXT IS NULL OR p.name LIKE '%' || $1 || '%')
    AND ($2::BOOLEAN IS NULL OR EXISTS (
            SELECT 1 FROM project_metadata m
            WHERE m.project_id = p.project_id AND m.name = 'public' AND LOWER(m.value) = 'true'
        ) = $2)
    AND ($3::BIGINT[] IS NULL OR p.project_id = ANY($3) OR EXISTS (
            SELECT 1 FROM project_metadata m
            WHERE m.project_id = p.project_id AND m.name = 'public' AND LOWER(m.value) = 'true'
        ))";

#[async_trait]
impl ProjectStore for PgStore {
    async fn add_project(&self, project: NewProject) -> StoreResult<i64> {
        let mut tx = self.pool.begin().await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO project (name, owner_id) VALUES ($1, $2) RETURNING project_id",
        )
        .bind(&project.name)
        .bind(project.owner_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, || format!("project {}", project.name)))?;
        self.upsert_metadata(&mut tx, id, &project.metadata).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn get_project(&self, project: &ProjectRef) -> StoreResult<Option<Project>> {
        let row = match project {
            ProjectRef::Id(id) => {
                sqlx::query("SELECT * FROM project WHERE project_id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            ProjectRef::Name(name) => {
                sqlx::query("SELECT * FROM project WHERE name = $1")
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        let Some(row) = row else {
            return Ok(None);
        };
        let mut projects = vec![project_row(&row)?];
        self.attach_metadata(&mut projects).await?;
        Ok(projects.pop())
    }

    async fn list_projects(&self, query: &ProjectQuery) -> StoreResult<ProjectList> {
        let (limit, offset) = page_bounds(query.page);
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM project p WHERE {PROJECT_FILTER}"
        ))
        .bind(query.name.as_deref())
        .bind(query.public)
        .bind(query.member_or_public.as_deref())
        .fetch_one(&self.pool)
        .await?;
        let rows = sqlx::query(&format!(
            "SELECT p.* FROM project p WHERE {PROJECT_FILTER}
             ORDER BY p.name LIMIT $4 OFFSET $5"
        ))
        .bind(query.name.as_deref())
        .bind(query.public)
        .bind(query.member_or_public.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let mut projects = rows.iter().map(project_row).collect::<StoreResult<Vec<_>>>()?;
        self.attach_metadata(&mut projects).await?;
        Ok(ProjectList { total, projects })
    }

    async fn update_project_metadata(
        &self,
        id: i64,
        metadata: BTreeMap<String, String>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE project SET update_time = NOW() WHERE project_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("project {id}")));
        }
        self.upsert_metadata(&mut tx, id, &metadata).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_project(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM project WHERE project_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ── Members ───────────────────────────────────────────────────────────────────

#[async_trait]
impl MemberStore for PgStore {
    async fn add_member(
        &self,
        project_id: i64,
        entity_type: MemberEntityType,
        entity_id: i64,
        role: ProjectRole,
    ) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO project_member (project_id, entity_type, entity_id, role)
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(project_id)
        .bind(entity_type.as_str())
        .bind(entity_id)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                format!("{entity_type} {entity_id} in project {project_id}")
            })
        })?;
        Ok(id)
    }

    async fn list_members(&self, project_id: i64) -> StoreResult<Vec<Member>> {
        let rows = sqlx::query("SELECT * FROM project_member WHERE project_id = $1 ORDER BY id")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(member_row).collect()
    }

    async fn get_member(&self, project_id: i64, member_id: i64) -> StoreResult<Option<Member>> {
        sqlx::query("SELECT * FROM project_member WHERE project_id = $1 AND id = $2")
            .bind(project_id)
            .bind(member_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| member_row(&row))
            .transpose()
    }

    async fn delete_member(&self, project_id: i64, member_id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM project_member WHERE project_id = $1 AND id = $2")
            .bind(project_id)
            .bind(member_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn roles_of(
        &self,
        user_id: i64,
        group_ids: &[i64],
    ) -> StoreResult<Vec<(i64, ProjectRole)>> {
        let rows = sqlx::query(
            "SELECT project_id, role FROM project_member
             WHERE (entity_type = 'user' AND entity_id = $1)
                OR (entity_type = 'group' AND entity_id = ANY($2))",
        )
        .bind(user_id)
        .bind(group_ids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| Ok((row.try_get("project_id")?, parse(row, "role")?)))
            .collect()
    }
}

// ── Users and groups ──────────────────────────────────────────────────────────

const USER_SELECT: &str = "
    SELECT u.*, COALESCE(
        ARRAY_AGG(g.group_id) FILTER (WHERE g.group_id IS NOT NULL), '{}'
    ) AS group_ids
    FROM harbor_user u
    LEFT JOIN user_group_member g ON g.user_id = u.user_id";

#[async_trait]
impl UserStore for PgStore {
    async fn add_user(&self, user: NewUser) -> StoreResult<i64> {
        let mut tx = self.pool.begin().await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO harbor_user (username, email, realname, password, salt, sysadmin_flag)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING user_id",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.realname)
        .bind(&user.password_hash)
        .bind(&user.salt)
        .bind(user.sysadmin_flag)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, || format!("user {}", user.username)))?;
        for group_id in &user.group_ids {
            sqlx::query("INSERT INTO user_group_member (user_id, group_id) VALUES ($1, $2)")
                .bind(id)
                .bind(group_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(id)
    }

    async fn get_user(&self, id: i64) -> StoreResult<Option<User>> {
        sqlx::query(&format!("{USER_SELECT} WHERE u.user_id = $1 GROUP BY u.user_id"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| user_row(&row))
            .transpose()
    }

    async fn get_user_by_name(&self, username: &str) -> StoreResult<Option<User>> {
        sqlx::query(&format!("{USER_SELECT} WHERE u.username = $1 GROUP BY u.user_id"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| user_row(&row))
            .transpose()
    }

    async fn list_users(&self, page: Option<Page>) -> StoreResult<(i64, Vec<User>)> {
        let (limit, offset) = page_bounds(page);
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM harbor_user")
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query(&format!(
            "{USER_SELECT} GROUP BY u.user_id ORDER BY u.user_id LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok((total, rows.iter().map(user_row).collect::<StoreResult<_>>()?))
    }

    async fn delete_user(&self, id: i64) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM project_member WHERE entity_type = 'user' AND entity_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM harbor_user WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_sysadmin(&self, id: i64, flag: bool) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE harbor_user SET sysadmin_flag = $2, update_time = NOW() WHERE user_id = $1",
        )
        .bind(id)
        .bind(flag)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    async fn add_group(&self, group_name: &str) -> StoreResult<i64> {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO user_group (group_name) VALUES ($1) RETURNING id")
                .bind(group_name)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| unique_violation(e, || format!("group {group_name}")))?;
        Ok(id)
    }

    async fn list_groups(&self) -> StoreResult<Vec<UserGroup>> {
        let rows = sqlx::query("SELECT id, group_name FROM user_group ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(UserGroup {
                    id: row.try_get("id")?,
                    group_name: row.try_get("group_name")?,
                })
            })
            .collect()
    }

    async fn delete_group(&self, id: i64) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM project_member WHERE entity_type = 'group' AND entity_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM user_group WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

// ── Robots ────────────────────────────────────────────────────────────────────

#[async_trait]
impl RobotStore for PgStore {
    async fn add_robot(&self, robot: NewRobot) -> StoreResult<i64> {
        let access = to_json(&robot.access)?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO robot (name, description, project_id, token_hash, access)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&robot.name)
        .bind(&robot.description)
        .bind(robot.project_id)
        .bind(&robot.token_hash)
        .bind(access)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || format!("robot account {}", robot.name)))?;
        Ok(id)
    }

    async fn get_robot(&self, id: i64) -> StoreResult<Option<RobotAccount>> {
        sqlx::query("SELECT * FROM robot WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| robot_row(&row))
            .transpose()
    }

    async fn get_robot_by_name(&self, name: &str) -> StoreResult<Option<RobotAccount>> {
        sqlx::query("SELECT * FROM robot WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| robot_row(&row))
            .transpose()
    }

    async fn list_robots(&self, project_id: i64) -> StoreResult<Vec<RobotAccount>> {
        let rows = sqlx::query("SELECT * FROM robot WHERE project_id = $1 ORDER BY id")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(robot_row).collect()
    }

    async fn set_robot_disabled(&self, id: i64, disabled: bool) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE robot SET disabled = $2, update_time = NOW() WHERE id = $1")
                .bind(id)
                .bind(disabled)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("robot account {id}")));
        }
        Ok(())
    }

    async fn delete_robot(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM robot WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ── Labels ────────────────────────────────────────────────────────────────────

#[async_trait]
impl LabelStore for PgStore {
    async fn add_label(&self, label: NewLabel) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO label (name, description, color, level, scope, project_id)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(&label.name)
        .bind(&label.description)
        .bind(&label.color)
        .bind(label.level.as_str())
        .bind(label.scope.as_str())
        .bind(label.project_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || format!("label {}", label.name)))?;
        Ok(id)
    }

    async fn get_label(&self, id: i64) -> StoreResult<Option<Label>> {
        sqlx::query("SELECT * FROM label WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| label_row(&row))
            .transpose()
    }

    async fn list_labels(&self, query: &LabelQuery) -> StoreResult<Vec<Label>> {
        let rows = sqlx::query(
            "SELECT * FROM label
             WHERE ($1::TEXT IS NULL OR name LIKE '%' || $1 || '%')
               AND ($2::TEXT IS NULL OR scope = $2)
               AND ($3::BIGINT IS NULL OR project_id = $3)
               AND ($4::TEXT IS NULL OR level = $4)
             ORDER BY id",
        )
        .bind(query.name.as_deref())
        .bind(query.scope.map(|s| s.as_str()))
        .bind(query.project_id)
        .bind(query.level.map(|l| l.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(label_row).collect()
    }

    async fn update_label(
        &self,
        id: i64,
        name: &str,
        description: &str,
        color: &str,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE label SET name = $2, description = $3, color = $4, update_time = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(color)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || format!("label {name}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("label {id}")));
        }
        Ok(())
    }

    async fn delete_label(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM label WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_resource_label(
        &self,
        label_id: i64,
        resource_type: ResourceType,
        resource_name: &str,
    ) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO resource_label (label_id, resource_type, resource_name)
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(label_id)
        .bind(resource_type.as_str())
        .bind(resource_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || format!("label {label_id} on {resource_name}")))?;
        Ok(id)
    }

    async fn get_labels_of_resource(
        &self,
        resource_type: ResourceType,
        resource_name: &str,
    ) -> StoreResult<Vec<Label>> {
        let rows = sqlx::query(
            "SELECT l.* FROM label l
             JOIN resource_label rl ON rl.label_id = l.id
             WHERE rl.resource_type = $1 AND rl.resource_name = $2
             ORDER BY rl.id",
        )
        .bind(resource_type.as_str())
        .bind(resource_name)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(label_row).collect()
    }

    async fn remove_resource_label(
        &self,
        resource_type: ResourceType,
        resource_name: &str,
        label_id: i64,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM resource_label
             WHERE resource_type = $1 AND resource_name = $2 AND label_id = $3",
        )
        .bind(resource_type.as_str())
        .bind(resource_name)
        .bind(label_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_resource_labels(
        &self,
        label_id: Option<i64>,
        resource_type: Option<ResourceType>,
    ) -> StoreResult<Vec<ResourceLabel>> {
        let rows = sqlx::query(
            "SELECT * FROM resource_label
             WHERE ($1::BIGINT IS NULL OR label_id = $1)
               AND ($2::TEXT IS NULL OR resource_type = $2)
             ORDER BY id",
        )
        .bind(label_id)
        .bind(resource_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(resource_label_row).collect()
    }
}

// ── Policies ──────────────────────────────────────────────────────────────────

#[async_trait]
impl PolicyStore for PgStore {
    async fn add_policy(&self, policy: NewPolicy) -> StoreResult<i64> {
        let request = policy.request;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO policy (project_id, kind, name, description, selectors, trigger, enabled)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(policy.project_id)
        .bind(policy.kind.as_str())
        .bind(&request.name)
        .bind(&request.description)
        .bind(to_json(&request.selectors)?)
        .bind(to_json(&request.trigger)?)
        .bind(request.enabled)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || format!("{} policy {}", policy.kind, request.name)))?;
        Ok(id)
    }

    async fn get_policy(&self, id: i64) -> StoreResult<Option<Policy>> {
        sqlx::query("SELECT * FROM policy WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| policy_row(&row))
            .transpose()
    }

    async fn list_policies(&self, project_id: i64, kind: PolicyKind) -> StoreResult<Vec<Policy>> {
        let rows =
            sqlx::query("SELECT * FROM policy WHERE project_id = $1 AND kind = $2 ORDER BY id")
                .bind(project_id)
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(policy_row).collect()
    }

    async fn update_policy(&self, id: i64, request: PolicyRequest) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE policy SET name = $2, description = $3, selectors = $4, trigger = $5,
                               enabled = $6, update_time = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(to_json(&request.selectors)?)
        .bind(to_json(&request.trigger)?)
        .bind(request.enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || format!("policy {}", request.name)))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("policy {id}")));
        }
        Ok(())
    }

    async fn delete_policy(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM policy WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ── Access log ────────────────────────────────────────────────────────────────

#[async_trait]
impl AccessLogStore for PgStore {
    async fn add_access_log(&self, log: NewAccessLog) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO access_log (project_id, username, repo_name, repo_tag, operation)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(log.project_id)
        .bind(&log.username)
        .bind(&log.repo_name)
        .bind(&log.repo_tag)
        .bind(&log.operation)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_access_logs(
        &self,
        project_id: i64,
        page: Option<Page>,
    ) -> StoreResult<(i64, Vec<AccessLog>)> {
        let (limit, offset) = page_bounds(page);
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM access_log WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query(
            "SELECT * FROM access_log WHERE project_id = $1
             ORDER BY id DESC LIMIT $2 OFFSET $3",
        )
        .bind(project_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok((total, rows.iter().map(access_log_row).collect::<StoreResult<_>>()?))
    }
}

// ── Image repositories ────────────────────────────────────────────────────────

const REPOSITORY_FILTER: &str = "
    r.project_id = $1
    AND ($2::TEXT IS NULL OR r.name LIKE '%' || $2 || '%')
    AND ($3::BIGINT IS NULL OR EXISTS (
            SELECT 1 FROM resource_label rl
            WHERE rl.label_id = $3 AND rl.resource_type = 'r'
              AND rl.resource_name = r.repository_id::TEXT
        ))";

#[async_trait]
impl ImageRepositoryStore for PgStore {
    async fn add_repository(&self, project_id: i64, name: &str) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO repository (name, project_id) VALUES ($1, $2) RETURNING repository_id",
        )
        .bind(name)
        .bind(project_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || format!("repository {name}")))?;
        Ok(id)
    }

    async fn get_repository(&self, name: &str) -> StoreResult<Option<ImageRepository>> {
        sqlx::query("SELECT * FROM repository WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| repository_row(&row))
            .transpose()
    }

    async fn list_repositories(
        &self,
        query: &RepositoryQuery,
    ) -> StoreResult<(i64, Vec<ImageRepository>)> {
        let (limit, offset) = page_bounds(query.page);
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM repository r WHERE {REPOSITORY_FILTER}"
        ))
        .bind(query.project_id)
        .bind(query.name.as_deref())
        .bind(query.label_id)
        .fetch_one(&self.pool)
        .await?;
        let rows = sqlx::query(&format!(
            "SELECT r.* FROM repository r WHERE {REPOSITORY_FILTER}
             ORDER BY r.name LIMIT $4 OFFSET $5"
        ))
        .bind(query.project_id)
        .bind(query.name.as_deref())
        .bind(query.label_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok((total, rows.iter().map(repository_row).collect::<StoreResult<_>>()?))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
