// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

mod common;

use axum::http::{header::LOCATION, StatusCode};
use chrono::{Duration, Utc};
use common::{basic, harness, secret};
use registry_control::{
    models::{AdminJob, AdminJobQuery, JobKind, JobStatus, ScanStats, CRON_DAILY},
    store::AdminJobStore,
    worker::{JobStats, WorkerError},
};
use serde_json::{json, Value};

fn row(id: i64, name: &str, kind: JobKind, status: JobStatus, age: Duration, uuid: &str) -> AdminJob {
    let at = Utc::now() - age;
    AdminJob {
        id,
        name: name.into(),
        kind,
        cron: if kind == JobKind::Periodic {
            CRON_DAILY.into()
        } else {
            String::new()
        },
        status,
        uuid: uuid.into(),
        creation_time: at,
        update_time: at,
    }
}

async fn all_jobs(store: &impl AdminJobStore) -> Vec<AdminJob> {
    store
        .list_admin_jobs(&AdminJobQuery::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn second_daily_schedule_conflicts_and_persists_nothing() {
    let h = harness();
    h.user("admin", true).await;
    let (name, value) = basic("admin");
    let body = json!({"name": "scan-all", "schedule": {"type": "Daily"}});

    let first = h
        .server
        .post("/api/v2.0/admin-jobs")
        .add_header(name.clone(), value.clone())
        .json(&body)
        .await;
    assert_eq!(first.status_code(), StatusCode::CREATED);
    let location = first.headers()[LOCATION].to_str().unwrap().to_string();
    assert!(location.starts_with("/api/v2.0/admin-jobs/"));

    let second = h
        .server
        .post("/api/v2.0/admin-jobs")
        .add_header(name, value)
        .json(&body)
        .await;
    assert_eq!(second.status_code(), StatusCode::CONFLICT);
    let error: Value = second.json();
    assert!(error["error"].as_str().unwrap().contains("already had one"));

    assert_eq!(all_jobs(h.store.as_ref()).await.len(), 1);
    assert_eq!(h.worker.submitted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unfinished_scan_all_blocks_a_manual_run() {
    let h = harness();
    h.user("admin", true).await;
    h.store.insert_admin_job(row(
        5,
        "scan-all",
        JobKind::Generic,
        JobStatus::Success,
        Duration::minutes(10),
        "old",
    ));
    h.store.set_scan_stats(
        "5",
        ScanStats {
            total: 100,
            completed: 40,
        },
    );

    let (name, value) = basic("admin");
    let response = h
        .server
        .post("/api/v2.0/admin-jobs")
        .add_header(name, value)
        .json(&json!({"name": "scan-all", "schedule": {"type": "Manual"}}))
        .await;
    assert_eq!(response.status_code(), StatusCode::PRECONDITION_FAILED);
    assert!(response.text().contains("40%"));
    assert!(h.worker.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancelling_a_schedule_tolerates_a_finished_worker_job() {
    let h = harness();
    h.user("admin", true).await;
    h.store.insert_admin_job(row(
        3,
        "gc",
        JobKind::Periodic,
        JobStatus::Scheduled,
        Duration::days(1),
        "u1",
    ));
    *h.worker.stop_error.lock().unwrap() =
        Some(WorkerError::StatusBehind("job already finished".into()));

    let (name, value) = basic("admin");
    let response = h
        .server
        .put("/api/v2.0/admin-jobs/schedule")
        .add_header(name, value)
        .json(&json!({"name": "gc", "schedule": {"type": "None"}}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(*h.worker.actions.lock().unwrap(), vec!["u1:stop".to_string()]);
    assert!(all_jobs(h.store.as_ref()).await.is_empty());
    assert!(h.worker.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn ambiguous_schedule_is_an_internal_error() {
    let h = harness();
    h.user("admin", true).await;
    for id in [1, 2] {
        h.store.insert_admin_job(row(
            id,
            "gc",
            JobKind::Periodic,
            JobStatus::Scheduled,
            Duration::days(1),
            &format!("u{id}"),
        ));
    }

    let (name, value) = basic("admin");
    let response = h
        .server
        .get("/api/v2.0/admin-jobs/schedule?name=gc")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: Value = response.json();
    assert!(error["error"].is_string());
}

#[tokio::test]
async fn anonymous_and_non_admin_callers_change_nothing() {
    let h = harness();
    h.user("dev", false).await;
    let body = json!({"name": "gc", "schedule": {"type": "Manual"}});

    let anonymous = h.server.post("/api/v2.0/admin-jobs").json(&body).await;
    assert_eq!(anonymous.status_code(), StatusCode::UNAUTHORIZED);

    let (name, value) = basic("dev");
    let forbidden = h
        .server
        .post("/api/v2.0/admin-jobs")
        .add_header(name, value)
        .json(&body)
        .await;
    assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);

    assert!(all_jobs(h.store.as_ref()).await.is_empty());
    assert!(h.worker.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn submitted_job_reads_back_with_its_worker_id() {
    let h = harness();
    h.user("admin", true).await;
    let (name, value) = basic("admin");

    let created = h
        .server
        .post("/api/v2.0/admin-jobs")
        .add_header(name.clone(), value.clone())
        .json(&json!({"name": "garbage-collect", "schedule": {"type": "Manual"}, "parameters": {"dry_run": true}}))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let location = created.headers()[LOCATION].to_str().unwrap().to_string();

    let job: Value = h
        .server
        .get(&location)
        .add_header(name, value)
        .await
        .json();
    assert_eq!(job["job_name"], "garbage-collect");
    assert_eq!(job["job_kind"], "Generic");
    assert_eq!(job["job_uuid"].as_str().map(str::is_empty), Some(false));

    let submitted = h.worker.submitted.lock().unwrap();
    assert_eq!(submitted[0].parameters["dry_run"], json!(true));
    assert!(submitted[0].status_hook.starts_with("http://core:8080/service/notifications/jobs/adminjob/"));
}

#[tokio::test]
async fn listing_returns_newest_first() {
    let h = harness();
    h.user("admin", true).await;
    for (id, hours) in [(1, 30), (2, 20), (3, 10)] {
        h.store.insert_admin_job(row(
            id,
            "gc",
            JobKind::Generic,
            JobStatus::Success,
            Duration::hours(hours),
            &format!("u{id}"),
        ));
    }

    let (name, value) = basic("admin");
    let jobs: Vec<Value> = h
        .server
        .get("/api/v2.0/admin-jobs")
        .add_query_param("name", "gc")
        .add_header(name, value)
        .await
        .json();
    let ids: Vec<i64> = jobs.iter().map(|j| j["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![3, 2, 1]);
}

#[tokio::test]
async fn deleting_twice_is_not_found() {
    let h = harness();
    h.user("admin", true).await;
    h.store.insert_admin_job(row(
        9,
        "gc",
        JobKind::Generic,
        JobStatus::Error,
        Duration::hours(3),
        "u9",
    ));
    let (name, value) = basic("admin");

    let first = h
        .server
        .delete("/api/v2.0/admin-jobs/9")
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);
    let second = h
        .server
        .delete("/api/v2.0/admin-jobs/9")
        .add_header(name, value)
        .await;
    assert_eq!(second.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn running_job_cannot_be_deleted() {
    let h = harness();
    h.user("admin", true).await;
    h.store.insert_admin_job(row(
        4,
        "gc",
        JobKind::Generic,
        JobStatus::Running,
        Duration::minutes(1),
        "u4",
    ));
    let (name, value) = basic("admin");
    let response = h
        .server
        .delete("/api/v2.0/admin-jobs/4")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn periodic_log_comes_from_the_first_finished_execution() {
    let h = harness();
    h.user("admin", true).await;
    h.store.insert_admin_job(row(
        6,
        "gc",
        JobKind::Periodic,
        JobStatus::Scheduled,
        Duration::days(2),
        "p6",
    ));
    *h.worker.executions.lock().unwrap() = vec![
        JobStats {
            id: "e-running".into(),
            status: "Running".into(),
            name: "gc".into(),
        },
        JobStats {
            id: "e-done".into(),
            status: "Success".into(),
            name: "gc".into(),
        },
    ];

    let (name, value) = basic("admin");
    let response = h
        .server
        .get("/api/v2.0/admin-jobs/6/log")
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "log of e-done\n");
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    h.worker.executions.lock().unwrap().clear();
    let missing = h
        .server
        .get("/api/v2.0/admin-jobs/6/log")
        .add_header(name, value)
        .await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_hook_updates_the_row_for_the_job_service_only() {
    let h = harness();
    h.user("dev", false).await;
    h.store.insert_admin_job(row(
        7,
        "gc",
        JobKind::Generic,
        JobStatus::Pending,
        Duration::minutes(1),
        "u7",
    ));
    let hook = json!({"job_id": "u7", "status": "Running"});

    let (name, value) = basic("dev");
    let denied = h
        .server
        .post("/service/notifications/jobs/adminjob/7")
        .add_header(name, value)
        .json(&hook)
        .await;
    assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);

    let (name, value) = secret();
    let accepted = h
        .server
        .post("/service/notifications/jobs/adminjob/7")
        .add_header(name, value)
        .json(&hook)
        .await;
    assert_eq!(accepted.status_code(), StatusCode::OK);
    let job = h.store.get_admin_job(7).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Running);
}

#[tokio::test]
async fn gc_schedule_wrappers_bind_the_job_name() {
    let h = harness();
    h.user("admin", true).await;
    let (name, value) = basic("admin");

    let created = h
        .server
        .post("/api/v2.0/system/gc/schedule")
        .add_header(name.clone(), value.clone())
        .json(&json!({"schedule": {"type": "Weekly"}}))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);

    let schedule: Value = h
        .server
        .get("/api/v2.0/system/gc/schedule")
        .add_header(name, value)
        .await
        .json();
    assert_eq!(schedule["schedule"]["type"], "Weekly");
    assert_eq!(h.worker.submitted.lock().unwrap()[0].name, "garbage-collect");
}
