use super::common::*;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::config::EngineConfig;
use crate::workflows::case_study::domain::{CaseStudyStatus, Role};
use crate::workflows::case_study::router::{
    self, GradeBody, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER,
};
use crate::workflows::case_study::{Actor, CaseStudyService, InMemoryCaseStudyStore, LegalArea};

fn headers_for(actor: &Actor) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACTOR_ID_HEADER,
        actor.id.0.parse().expect("valid header value"),
    );
    headers.insert(
        ACTOR_ROLE_HEADER,
        actor.role.label().parse().expect("valid header value"),
    );
    headers
}

#[tokio::test]
async fn create_route_returns_created_record() {
    let harness = build_service();
    let response = router(&harness)
        .oneshot(actor_request(
            Method::POST,
            "/api/v1/case-studies",
            &student(),
            Some(json!({
                "legal_area": "civil_law",
                "sub_area": "Sachenrecht",
                "focus_area": "Eigentümer-Besitzer-Verhältnis",
            })),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload.get("student_id").and_then(Value::as_str),
        Some(STUDENT)
    );
    assert_eq!(
        payload.get("status").and_then(Value::as_str),
        Some("requested")
    );
    assert_eq!(
        payload.get("assigned_instructor_id").and_then(Value::as_str),
        Some(CIVIL_A)
    );
    assert_eq!(balance(&harness, STUDENT), 2);
}

#[tokio::test]
async fn requests_without_actor_headers_are_unauthorized() {
    let harness = build_service();
    let response = router(&harness)
        .oneshot(
            axum::http::Request::get("/api/v1/case-studies/csr-000001")
                .body(axum::body::Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = read_json_body(response).await;
    assert!(payload
        .get("error")
        .and_then(Value::as_str)
        .is_some_and(|message| message.contains(ACTOR_ID_HEADER)));
}

#[tokio::test]
async fn unknown_role_header_is_unauthorized() {
    let harness = build_service();
    let response = router(&harness)
        .oneshot(
            axum::http::Request::get("/api/v1/case-studies/csr-000001")
                .header(ACTOR_ID_HEADER, STUDENT)
                .header(ACTOR_ROLE_HEADER, "dean")
                .body(axum::body::Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_route_maps_missing_credits_to_payment_required() {
    let harness = build_service();
    let broke = Actor::new(BROKE_STUDENT, Role::Student);
    let response = router(&harness)
        .oneshot(actor_request(
            Method::POST,
            "/api/v1/case-studies",
            &broke,
            Some(json!({ "legal_area": "criminal_law", "random_assignment": true })),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn create_route_rejects_invalid_shape() {
    let harness = build_service();
    let response = router(&harness)
        .oneshot(actor_request(
            Method::POST,
            "/api/v1/case-studies",
            &student(),
            Some(json!({
                "legal_area": "public_law",
                "sub_area": "Kommunalrecht",
                "focus_area": "Gemeindeordnung",
            })),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(balance(&harness, STUDENT), 3);
}

#[tokio::test]
async fn submission_before_materials_is_a_conflict() {
    let harness = build_service();
    let record = request_in_status(&harness, CaseStudyStatus::Requested);

    let response = router(&harness)
        .oneshot(actor_request(
            Method::POST,
            &format!("/api/v1/case-studies/{}/submission", record.id),
            &student(),
            Some(json!({ "url": "memory://blobs/bearbeitung.pdf" })),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn materials_route_returns_status_view() {
    let harness = build_service();
    let record = request_in_status(&harness, CaseStudyStatus::Requested);

    let response = router(&harness)
        .oneshot(actor_request(
            Method::POST,
            &format!("/api/v1/case-studies/{}/materials", record.id),
            &instructor(CIVIL_A),
            Some(json!({ "url": "memory://blobs/sv.pdf" })),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload.get("status").and_then(Value::as_str),
        Some("materials_ready")
    );
    assert_eq!(
        payload.get("status_label").and_then(Value::as_str),
        Some("Sachverhalt verfügbar")
    );
}

#[tokio::test]
async fn student_cannot_attach_materials() {
    let harness = build_service();
    let record = request_in_status(&harness, CaseStudyStatus::Requested);

    let response = router(&harness)
        .oneshot(actor_request(
            Method::POST,
            &format!("/api/v1/case-studies/{}/materials", record.id),
            &student(),
            Some(json!({ "url": "memory://blobs/sv.pdf" })),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn grade_route_saves_and_reads_back() {
    let harness = build_service();
    let record = request_in_status(&harness, CaseStudyStatus::Completed);
    let uri = format!("/api/v1/case-studies/{}/grade", record.id);

    let saved = router(&harness)
        .oneshot(actor_request(
            Method::PUT,
            &uri,
            &instructor(CIVIL_A),
            Some(json!({ "value": 16.0 })),
        ))
        .await
        .expect("route executes");
    assert_eq!(saved.status(), StatusCode::OK);

    let fetched = router(&harness)
        .oneshot(actor_request(Method::GET, &uri, &student(), None))
        .await
        .expect("route executes");
    assert_eq!(fetched.status(), StatusCode::OK);
    let payload = read_json_body(fetched).await;
    assert_eq!(payload.get("value").and_then(Value::as_f64), Some(16.0));
    assert_eq!(
        payload.get("description").and_then(Value::as_str),
        Some("sehr gut")
    );
}

#[tokio::test]
async fn save_grade_handler_rejects_out_of_scale_values() {
    let harness = build_service();
    let record = request_in_status(&harness, CaseStudyStatus::Completed);

    let response = router::save_grade_handler::<
        InMemoryCaseStudyStore,
        MemoryNotifications,
        MemoryBlobs,
    >(
        State(harness.service.clone()),
        headers_for(&instructor(CIVIL_A)),
        Path(record.id.0.clone()),
        axum::Json(GradeBody {
            value: Some(-1.0),
            text: None,
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(harness
        .service
        .grade(&record.id)
        .expect("lookup")
        .is_none());
}

#[tokio::test]
async fn fetch_handler_returns_not_found_for_unknown_ids() {
    let harness = build_service();

    let response = router::fetch_handler::<
        InMemoryCaseStudyStore,
        MemoryNotifications,
        MemoryBlobs,
    >(
        State(harness.service.clone()),
        headers_for(&admin()),
        Path("csr-999999".to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn access_route_rejects_unknown_artifacts() {
    let harness = build_service();
    let record = request_in_status(&harness, CaseStudyStatus::Completed);

    let response = router(&harness)
        .oneshot(actor_request(
            Method::POST,
            &format!("/api/v1/case-studies/{}/access/audio", record.id),
            &student(),
            None,
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let stamped = router(&harness)
        .oneshot(actor_request(
            Method::POST,
            &format!("/api/v1/case-studies/{}/access/pdf", record.id),
            &student(),
            None,
        ))
        .await
        .expect("route executes");
    assert_eq!(stamped.status(), StatusCode::OK);
    let payload = read_json_body(stamped).await;
    assert!(payload
        .get("pdf_downloaded_at")
        .is_some_and(|value| !value.is_null()));
}

#[tokio::test]
async fn vacation_route_reports_moved_requests() {
    let harness = build_service();
    let record = harness
        .service
        .create_request(&student(), criminal_request(STUDENT))
        .expect("criminal request");

    let response = router(&harness)
        .oneshot(actor_request(
            Method::POST,
            &format!("/api/v1/instructors/{CRIMINAL}/vacation"),
            &instructor(CRIMINAL),
            Some(json!({ "enabled": false })),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let moved = payload.as_array().expect("array payload");
    assert_eq!(moved.len(), 1);
    assert_eq!(
        moved[0].get("case_study_id").and_then(Value::as_str),
        Some(record.id.0.as_str())
    );
    assert_eq!(
        moved[0].get("to").and_then(Value::as_str),
        Some(CRIMINAL_SPRINGER)
    );
}

#[tokio::test]
async fn credits_route_is_admin_only() {
    let harness = build_service();
    let uri = format!("/api/v1/students/{BROKE_STUDENT}/credits");

    let denied = router(&harness)
        .oneshot(actor_request(
            Method::POST,
            &uri,
            &student(),
            Some(json!({ "amount": 3 })),
        ))
        .await
        .expect("route executes");
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let granted = router(&harness)
        .oneshot(actor_request(
            Method::POST,
            &uri,
            &admin(),
            Some(json!({ "amount": 3 })),
        ))
        .await
        .expect("route executes");
    assert_eq!(granted.status(), StatusCode::OK);
    let payload = read_json_body(granted).await;
    assert_eq!(
        payload.get("credit_balance").and_then(Value::as_u64),
        Some(3)
    );

    let invalid = router(&harness)
        .oneshot(actor_request(
            Method::POST,
            &uri,
            &admin(),
            Some(json!({ "amount": 0 })),
        ))
        .await
        .expect("route executes");
    assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unavailable_store_maps_to_internal_error() {
    let service = Arc::new(CaseStudyService::new(
        Arc::new(UnavailableStore),
        Arc::new(MemoryNotifications::default()),
        Arc::new(MemoryBlobs::default()),
        EngineConfig::default(),
    ));

    let response = router::create_handler::<UnavailableStore, MemoryNotifications, MemoryBlobs>(
        State(service),
        headers_for(&student()),
        axum::Json(router::CreateCaseStudyBody {
            student_id: None,
            legal_area: LegalArea::CivilLaw,
            sub_area: Some("Schuldrecht".to_string()),
            focus_area: Some("Mietrecht".to_string()),
            federal_state: None,
            random_assignment: false,
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
