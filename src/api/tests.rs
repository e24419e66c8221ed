// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::{router, AppState};
use crate::store::DiagramStore;

const OWNER: &[(&str, &str)] = &[("x-owner", "true")];

fn app() -> Router {
    let store = DiagramStore::open_in_memory().expect("in-memory store");
    router(AppState::new(Arc::new(store)))
}

fn request(
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<&Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

fn element_body(id: &str, name: &str, x: f64, y: f64) -> Value {
    json!({
        "id": id,
        "name": name,
        "position_x": x,
        "position_y": y,
        "width": 200,
        "height": 150,
    })
}

async fn create_diagram(app: &Router, id: &str, name: &str) {
    let (status, _) = send(
        app,
        request(
            "POST",
            "/diagrams",
            &[],
            Some(&json!({ "diagram_id": id, "name": name })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn create_diagram_returns_relation_name() {
    let app = app();
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/diagrams",
            &[],
            Some(&json!({ "diagram_id": "d:sales", "name": "Sales" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["diagram_id"], "d:sales");
    assert_eq!(body["relation_name"], "diagram_sales");
}

#[tokio::test]
async fn create_diagram_without_id_generates_one() {
    let app = app();
    let (status, body) = send(
        &app,
        request("POST", "/diagrams", &[], Some(&json!({ "name": "Sales" }))),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let diagram_id = body["diagram_id"].as_str().expect("diagram_id");
    assert!(diagram_id.starts_with("d:"));
    assert!(body["relation_name"].as_str().expect("relation_name").starts_with("diagram_"));
}

#[tokio::test]
async fn create_diagram_rejects_blank_names() {
    let app = app();
    let (status, _) = send(
        &app,
        request("POST", "/diagrams", &[], Some(&json!({ "name": "   " }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn full_load_returns_diagram_and_elements() {
    let app = app();
    create_diagram(&app, "d:sales", "Sales").await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/diagrams/d:sales/elements",
            &[],
            Some(&element_body("n:customer", "Customer", 100.0, 100.0)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, request("GET", "/diagrams/d:sales", &[], None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["diagram"]["name"], "Sales");
    assert_eq!(body["diagram"]["relation_name"], "diagram_sales");
    assert_eq!(body["elements"][0]["id"], "n:customer");
    assert_eq!(body["elements"][0]["position_x"], 100.0);
}

#[tokio::test]
async fn loading_an_unknown_diagram_is_not_found() {
    let app = app();
    let (status, body) = send(&app, request("GET", "/diagrams/d:ghost", &[], None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().expect("error").contains("d:ghost"));
}

#[tokio::test]
async fn listing_includes_created_diagrams() {
    let app = app();
    create_diagram(&app, "d:sales", "Sales").await;
    create_diagram(&app, "d:billing", "Billing").await;

    let (status, body) = send(&app, request("GET", "/diagrams", &[], None)).await;
    assert_eq!(status, StatusCode::OK);
    // The listing is a bare array of diagram records.
    let names: Vec<&str> = body
        .as_array()
        .expect("diagrams array")
        .iter()
        .map(|d| d["name"].as_str().expect("name"))
        .collect();
    assert!(names.contains(&"Sales"));
    assert!(names.contains(&"Billing"));
}

#[tokio::test]
async fn patch_element_updates_and_reports_affected_rows() {
    let app = app();
    create_diagram(&app, "d:sales", "Sales").await;
    send(
        &app,
        request(
            "POST",
            "/diagrams/d:sales/elements",
            &[],
            Some(&element_body("n:customer", "Customer", 100.0, 100.0)),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/diagrams/d:sales/elements/n:customer",
            &[],
            Some(&json!({ "name": "Customers", "position_x": 250.0 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["affected"], 1);

    // The element listing is a bare array.
    let (_, body) = send(&app, request("GET", "/diagrams/d:sales/elements", &[], None)).await;
    assert_eq!(body.as_array().expect("elements array").len(), 1);
    assert_eq!(body[0]["name"], "Customers");
    assert_eq!(body[0]["position_x"], 250.0);

    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/diagrams/d:sales/elements/n:ghost",
            &[],
            Some(&json!({ "name": "Ghost" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["affected"], 0);
}

#[tokio::test]
async fn delete_element_is_idempotent() {
    let app = app();
    create_diagram(&app, "d:sales", "Sales").await;
    send(
        &app,
        request(
            "POST",
            "/diagrams/d:sales/elements",
            &[],
            Some(&element_body("n:customer", "Customer", 0.0, 0.0)),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        request("DELETE", "/diagrams/d:sales/elements/n:customer", &[], None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["affected"], 1);

    let (status, body) = send(
        &app,
        request("DELETE", "/diagrams/d:sales/elements/n:customer", &[], None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["affected"], 0);
}

#[tokio::test]
async fn classified_elements_are_hidden_without_a_grant() {
    let app = app();
    create_diagram(&app, "d:sales", "Sales").await;

    let mut classified = element_body("n:ledger", "Ledger", 0.0, 0.0);
    classified["classification_id"] = json!("c:finance");
    let (status, _) = send(
        &app,
        request("POST", "/diagrams/d:sales/elements", OWNER, Some(&classified)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    send(
        &app,
        request(
            "POST",
            "/diagrams/d:sales/elements",
            &[],
            Some(&element_body("n:open", "Open", 400.0, 0.0)),
        ),
    )
    .await;

    // No grants: only the unclassified element is served.
    let (_, body) = send(&app, request("GET", "/diagrams/d:sales", &[], None)).await;
    let ids: Vec<&str> = body["elements"]
        .as_array()
        .expect("elements")
        .iter()
        .map(|e| e["id"].as_str().expect("id"))
        .collect();
    assert_eq!(ids, vec!["n:open"]);

    // A view grant reveals it.
    let (_, body) = send(
        &app,
        request(
            "GET",
            "/diagrams/d:sales",
            &[("x-permissions", r#"{"c:finance":"view"}"#)],
            None,
        ),
    )
    .await;
    assert_eq!(body["elements"].as_array().expect("elements").len(), 2);

    // The owner sees everything without grants.
    let (_, body) = send(&app, request("GET", "/diagrams/d:sales", OWNER, None)).await;
    assert_eq!(body["elements"].as_array().expect("elements").len(), 2);
}

#[tokio::test]
async fn editing_a_classified_element_requires_an_edit_grant() {
    let app = app();
    create_diagram(&app, "d:sales", "Sales").await;
    let mut classified = element_body("n:ledger", "Ledger", 0.0, 0.0);
    classified["classification_id"] = json!("c:finance");
    send(
        &app,
        request("POST", "/diagrams/d:sales/elements", OWNER, Some(&classified)),
    )
    .await;

    let patch = json!({ "name": "General Ledger" });
    let (status, _) = send(
        &app,
        request(
            "PUT",
            "/diagrams/d:sales/elements/n:ledger",
            &[("x-permissions", r#"{"c:finance":"view"}"#)],
            Some(&patch),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/diagrams/d:sales/elements/n:ledger",
            &[("x-permissions", r#"{"c:finance":"edit"}"#)],
            Some(&patch),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["affected"], 1);

    let (status, _) = send(
        &app,
        request(
            "DELETE",
            "/diagrams/d:sales/elements/n:ledger",
            &[("x-permissions", r#"{"c:finance":"view"}"#)],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn submitting_a_classified_element_requires_an_edit_grant() {
    let app = app();
    create_diagram(&app, "d:sales", "Sales").await;

    let mut classified = element_body("n:ledger", "Ledger", 0.0, 0.0);
    classified["classification_id"] = json!("c:finance");
    let (status, _) = send(
        &app,
        request("POST", "/diagrams/d:sales/elements", &[], Some(&classified)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn dropping_a_diagram_is_owner_only() {
    let app = app();
    create_diagram(&app, "d:sales", "Sales").await;

    let (status, _) = send(&app, request("DELETE", "/diagrams/d:sales", &[], None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, request("DELETE", "/diagrams/d:sales", OWNER, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["relation_name"], "diagram_sales");

    let (status, _) = send(&app, request("GET", "/diagrams/d:sales", &[], None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn recreating_a_dropped_diagram_is_a_conflict() {
    let app = app();
    create_diagram(&app, "d:sales", "Sales").await;
    let (status, _) = send(&app, request("DELETE", "/diagrams/d:sales", OWNER, None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/diagrams",
            &[],
            Some(&json!({ "diagram_id": "d:sales", "name": "Sales" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().expect("error").contains("retired"));
}

#[tokio::test]
async fn colliding_relation_names_are_a_conflict() {
    let app = app();
    create_diagram(&app, "d:a-b", "First").await;

    // "d:a.b" derives the same relation name as "d:a-b".
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/diagrams",
            &[],
            Some(&json!({ "diagram_id": "d:a.b", "name": "Second" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().expect("error").contains("diagram_a_b"));
}

#[tokio::test]
async fn cleanup_duplicates_is_owner_only_and_reports_counts() {
    let app = app();
    create_diagram(&app, "d:sales-a", "Sales").await;
    create_diagram(&app, "d:sales-b", "Sales").await;

    let (status, _) = send(
        &app,
        request("DELETE", "/diagrams/cleanup-duplicates", &[], None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        request("DELETE", "/diagrams/cleanup-duplicates", OWNER, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);
    assert_eq!(body["remaining"], 1);
}

#[tokio::test]
async fn malformed_permissions_header_is_a_bad_request() {
    let app = app();
    create_diagram(&app, "d:sales", "Sales").await;

    let (status, _) = send(
        &app,
        request(
            "GET",
            "/diagrams/d:sales",
            &[("x-permissions", "not-json")],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_ids_in_the_path_are_rejected() {
    let app = app();
    let (status, _) = send(&app, request("GET", "/diagrams/d%2Fsales", &[], None)).await;
    // An id containing a slash never reaches the store.
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
