// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

mod common;

use axum::http::{header::CONTENT_TYPE, StatusCode};
use bytes::Bytes;
use common::{basic, chart_tgz, harness};
use registry_control::{
    events::Event,
    models::{LabelLevel, LabelScope, NewLabel, ProjectRole, ResourceType},
    multipart::FormWriter,
    store::LabelStore,
};
use serde_json::{json, Value};

#[tokio::test]
async fn developer_upload_is_rewritten_proxied_and_announced() {
    let h = harness();
    let dev = h.user("dev", false).await;
    let library = h.project("library", false).await;
    h.member(library, dev, ProjectRole::Developer).await;
    let mut events = h.state.events.subscribe();

    let archive = chart_tgz("web", "1.2.3");
    let mut form = FormWriter::new();
    form.add_file("chart", "web-1.2.3.tgz", &archive);
    form.add_file("prov", "web-1.2.3.tgz.prov", b"signature");
    let content_type = form.content_type();
    let body = form.finish();

    let (name, value) = basic("dev");
    let response = h
        .server
        .post("/api/v2.0/chartrepo/library/charts")
        .add_header(name, value)
        .bytes(body)
        .content_type(&content_type)
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    let proxied = h.charts.proxied.lock().unwrap().clone();
    assert_eq!(proxied.len(), 1);
    assert_eq!(proxied[0].method, "POST");
    assert_eq!(proxied[0].path_and_query, "/api/v2.0/chartrepo/library/charts");
    assert!(proxied[0]
        .content_type
        .as_deref()
        .unwrap()
        .starts_with("multipart/form-data; boundary="));
    let forwarded = &proxied[0].body;
    assert!(contains(forwarded, &archive));
    assert!(contains(forwarded, b"name=\"prov\""));

    match events.try_recv().unwrap() {
        Event::ChartUpload(event) => {
            assert_eq!(event.project_name, "library");
            assert_eq!(event.chart_name, "web");
            assert_eq!(event.version, "1.2.3");
            assert_eq!(event.operator, "dev");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn failed_backend_upload_publishes_nothing() {
    let h = harness();
    h.user("admin", true).await;
    h.project("library", false).await;
    *h.charts.proxy_status.lock().unwrap() = StatusCode::CONFLICT;
    let mut events = h.state.events.subscribe();

    let mut form = FormWriter::new();
    form.add_file("chart", "web-1.2.3.tgz", &chart_tgz("web", "1.2.3"));
    let content_type = form.content_type();

    let (name, value) = basic("admin");
    let response = h
        .server
        .post("/api/v2.0/chartrepo/library/charts")
        .add_header(name, value)
        .bytes(form.finish())
        .content_type(&content_type)
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn upload_without_the_chart_field_is_an_internal_error() {
    let h = harness();
    h.user("admin", true).await;
    h.project("library", false).await;

    let mut form = FormWriter::new();
    form.add_file("prov", "web-1.2.3.tgz.prov", b"signature");
    let content_type = form.content_type();

    let (name, value) = basic("admin");
    let response = h
        .server
        .post("/api/v2.0/chartrepo/library/charts")
        .add_header(name, value)
        .bytes(form.finish())
        .content_type(&content_type)
        .await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(h.charts.proxied.lock().unwrap().is_empty());
}

#[tokio::test]
async fn guest_cannot_upload() {
    let h = harness();
    let guest = h.user("guest", false).await;
    let library = h.project("library", true).await;
    h.member(library, guest, ProjectRole::Guest).await;

    let mut form = FormWriter::new();
    form.add_file("chart", "web-1.2.3.tgz", &chart_tgz("web", "1.2.3"));
    let content_type = form.content_type();

    let (name, value) = basic("guest");
    let response = h
        .server
        .post("/api/v2.0/chartrepo/library/charts")
        .add_header(name, value)
        .bytes(form.finish())
        .content_type(&content_type)
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert!(h.charts.proxied.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cross_project_index_asks_the_backend_once() {
    let h = harness();
    h.user("admin", true).await;
    h.project("ops", false).await;
    h.project("library", true).await;

    let (name, value) = basic("admin");
    let response = h
        .server
        .get("/chartrepo/index.yaml")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/x-yaml");
    assert!(response.text().contains("library/web"));

    let calls = h.charts.index_calls.lock().unwrap().clone();
    assert_eq!(calls, vec![vec!["library".to_string(), "ops".to_string()]]);
}

#[tokio::test]
async fn cross_project_index_is_admin_only() {
    let h = harness();
    h.user("dev", false).await;

    let anonymous = h.server.get("/chartrepo/index.yaml").await;
    assert_eq!(anonymous.status_code(), StatusCode::UNAUTHORIZED);

    let (name, value) = basic("dev");
    let response = h
        .server
        .get("/chartrepo/index.yaml")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert!(h.charts.index_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_namespace_is_a_bad_request() {
    let h = harness();
    h.user("dev", false).await;
    let (name, value) = basic("dev");
    let response = h
        .server
        .get("/api/v2.0/chartrepo/nowhere/charts")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let error: Value = response.json();
    assert_eq!(error["error"], "namespace nowhere is not existing");
}

#[tokio::test]
async fn public_download_is_proxied_and_announced() {
    let h = harness();
    h.project("library", true).await;
    let mut events = h.state.events.subscribe();
    *h.charts.proxy_status.lock().unwrap() = StatusCode::OK;

    let response = h.server.get("/chartrepo/library/charts/web-1.2.3.tgz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        h.charts.proxied.lock().unwrap()[0].path_and_query,
        "/chartrepo/library/charts/web-1.2.3.tgz"
    );
    match events.try_recv().unwrap() {
        Event::ChartDownload(event) => {
            assert_eq!(event.chart_name, "web");
            assert_eq!(event.version, "1.2.3");
            assert_eq!(event.operator, "");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn versions_carry_labels_and_deletion_detaches_them() {
    let h = harness();
    let maintainer = h.user("maint", false).await;
    let library = h.project("library", false).await;
    h.member(library, maintainer, ProjectRole::Maintainer).await;
    h.charts.add_version("library", "web", "1.0.0");
    h.charts.add_version("library", "web", "1.1.0");
    let label = h
        .store
        .add_label(NewLabel {
            name: "stable".into(),
            description: String::new(),
            color: String::new(),
            level: LabelLevel::User,
            scope: LabelScope::Project,
            project_id: library,
        })
        .await
        .unwrap();

    let (name, value) = basic("maint");
    let attached = h
        .server
        .post("/api/v2.0/chartrepo/library/charts/web/1.1.0/labels")
        .add_header(name.clone(), value.clone())
        .json(&json!({"id": label}))
        .await;
    assert_eq!(attached.status_code(), StatusCode::OK);
    let again = h
        .server
        .post("/api/v2.0/chartrepo/library/charts/web/1.1.0/labels")
        .add_header(name.clone(), value.clone())
        .json(&json!({"id": label}))
        .await;
    assert_eq!(again.status_code(), StatusCode::CONFLICT);

    let versions: Vec<Value> = h
        .server
        .get("/api/v2.0/chartrepo/library/charts/web")
        .add_header(name.clone(), value.clone())
        .await
        .json();
    assert!(versions[0]["labels"].as_array().unwrap().is_empty());
    assert_eq!(versions[1]["labels"][0]["name"], "stable");

    let deleted = h
        .server
        .delete("/api/v2.0/chartrepo/library/charts/web")
        .add_header(name, value)
        .await;
    assert_eq!(deleted.status_code(), StatusCode::OK);
    assert!(h
        .store
        .get_labels_of_resource(ResourceType::Chart, "library/web:1.1.0")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(*h.charts.deleted.lock().unwrap(), vec!["library/web".to_string()]);
}

fn contains(haystack: &Bytes, needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
