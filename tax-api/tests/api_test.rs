use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tax_api::config::AppConfig;
use tax_api::{AppState, build_router, build_state};
use tax_core::calculations::AssessmentCalculator;
use tax_core::db::MemoryRepository;
use tax_core::records::RecordService;
use tower::util::ServiceExt;

fn memory_app() -> Router {
    let records = RecordService::new(
        Arc::new(MemoryRepository::new()),
        AssessmentCalculator::default(),
    );
    build_router(AppState::new(records))
}

async fn sqlite_app() -> Router {
    let mut config = AppConfig::default();
    config.database.connection_string = ":memory:".to_string();
    build_router(build_state(&config).await.expect("Failed to build state"))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn john() -> Value {
    json!({
        "firstName": "John",
        "lastName": "Doe",
        "email": "John.Doe@Example.com",
        "phone": "0801234567",
        "dob": "1990-04-01",
        "annualIncome": 50000
    })
}

async fn create_john(app: &Router) -> String {
    let (status, body) = send(app, Method::POST, "/api/taxpayers", Some(john())).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["payerId"].as_str().unwrap().to_string()
}

fn assessment_body(payer_id: &str) -> Value {
    json!({
        "payerId": payer_id,
        "year": 2025,
        "declaredIncome": 50000,
        "otherIncome": "10,000",
        "pensionRelief": 5000,
        "taxDue": 1
    })
}

#[tokio::test]
async fn health_check_reports_running() {
    let app = memory_app();

    let (status, body) = send(&app, Method::GET, "/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["message"], "Tax API running");
}

#[tokio::test]
async fn create_taxpayer_returns_created_record() {
    let app = memory_app();

    let (status, body) = send(&app, Method::POST, "/api/taxpayers", Some(john())).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Taxpayer created");
    let payer_id = body["payerId"].as_str().unwrap();
    assert!(payer_id.starts_with("P-"));
    assert_eq!(body["taxpayer"]["payerId"], payer_id);
    assert_eq!(body["taxpayer"]["email"], "john.doe@example.com");
    assert_eq!(body["taxpayer"]["dob"], "1990-04-01");
    assert_eq!(body["taxpayer"]["address"], Value::Null);
    assert_eq!(body["taxpayer"]["annualIncome"], 50000.0);
}

#[tokio::test]
async fn create_taxpayer_with_missing_fields_is_rejected() {
    let app = memory_app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/taxpayers",
        Some(json!({"firstName": "John", "email": "john@test.com"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation failed");
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["lastName", "annualIncome"]);

    let (_, list) = send(&app, Method::GET, "/api/taxpayers", None).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let app = memory_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/taxpayers")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let app = memory_app();
    create_john(&app).await;

    let mut again = john();
    again["email"] = json!("JOHN.DOE@example.com");
    let (status, body) = send(&app, Method::POST, "/api/taxpayers", Some(again)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "email");
}

#[tokio::test]
async fn update_taxpayer_keeps_identity() {
    let app = memory_app();
    let payer_id = create_john(&app).await;
    let (_, before) = send(&app, Method::GET, &format!("/api/taxpayers/{payer_id}"), None).await;

    let mut changed = john();
    changed["occupation"] = json!("Teacher");
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/taxpayers/{payer_id}"),
        Some(changed),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Taxpayer updated");
    assert_eq!(body["payerId"], payer_id.as_str());
    assert_eq!(body["taxpayer"]["occupation"], "Teacher");
    assert_eq!(body["taxpayer"]["createdAt"], before["createdAt"]);
}

#[tokio::test]
async fn unknown_taxpayer_is_not_found() {
    let app = memory_app();

    let (get_status, get_body) = send(&app, Method::GET, "/api/taxpayers/P-202501-0404", None).await;
    let (put_status, _) = send(
        &app,
        Method::PUT,
        "/api/taxpayers/P-202501-0404",
        Some(john()),
    )
    .await;
    let (delete_status, _) =
        send(&app, Method::DELETE, "/api/taxpayers/P-202501-0404", None).await;

    assert_eq!(get_status, StatusCode::NOT_FOUND);
    assert_eq!(get_body, json!({"error": "Taxpayer not found"}));
    assert_eq!(put_status, StatusCode::NOT_FOUND);
    assert_eq!(delete_status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_assessment_calculates_figures() {
    let app = memory_app();
    let payer_id = create_john(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/assessments",
        Some(assessment_body(&payer_id)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Assessment created");
    assert_eq!(body["assessmentId"], "A-2025-0001");
    let assessment = &body["assessment"];
    assert_eq!(assessment["payerId"], payer_id.as_str());
    assert_eq!(assessment["totalIncome"], 60000.0);
    assert_eq!(assessment["consolidatedRelief"], 12000.0);
    assert_eq!(assessment["taxable"], 43000.0);
    assert_eq!(assessment["taxDue"], 9840.0);
}

#[tokio::test]
async fn assessment_for_unknown_payer_is_rejected() {
    let app = memory_app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/assessments",
        Some(assessment_body("P-202501-0042")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "payerId");
}

#[tokio::test]
async fn preview_does_not_persist() {
    let app = memory_app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/assessments/preview",
        Some(json!({"declaredIncome": 30000})),
    )
    .await;
    let (_, list) = send(&app, Method::GET, "/api/assessments", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalIncome"], 30000.0);
    assert_eq!(body["taxable"], 24000.0);
    assert_eq!(body["taxDue"], 4800.0);
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn list_assessments_filters_by_payer_and_year() {
    let app = memory_app();
    let payer_id = create_john(&app).await;
    let mut last_year = assessment_body(&payer_id);
    last_year["year"] = json!("2024");
    send(&app, Method::POST, "/api/assessments", Some(last_year)).await;
    send(
        &app,
        Method::POST,
        "/api/assessments",
        Some(assessment_body(&payer_id)),
    )
    .await;

    let (_, all) = send(&app, Method::GET, "/api/assessments?payerId=&year=", None).await;
    let (_, only_2024) = send(
        &app,
        Method::GET,
        &format!("/api/assessments?payerId={payer_id}&year=2024"),
        None,
    )
    .await;
    let (bad_status, _) = send(&app, Method::GET, "/api/assessments?year=soon", None).await;

    assert_eq!(all.as_array().unwrap().len(), 2);
    assert_eq!(only_2024.as_array().unwrap().len(), 1);
    assert_eq!(only_2024[0]["assessmentId"], "A-2024-0001");
    assert_eq!(bad_status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_and_delete_assessment() {
    let app = memory_app();
    let payer_id = create_john(&app).await;
    let (_, created) = send(
        &app,
        Method::POST,
        "/api/assessments",
        Some(assessment_body(&payer_id)),
    )
    .await;
    let assessment_id = created["assessmentId"].as_str().unwrap().to_string();
    let uri = format!("/api/assessments/{assessment_id}");

    let mut changed = assessment_body(&payer_id);
    changed["otherIncome"] = json!(0);
    changed["pensionRelief"] = json!(0);
    let (put_status, updated) = send(&app, Method::PUT, &uri, Some(changed)).await;
    let (delete_status, deleted) = send(&app, Method::DELETE, &uri, None).await;
    let (gone_status, _) = send(&app, Method::GET, &uri, None).await;

    assert_eq!(put_status, StatusCode::OK);
    assert_eq!(updated["message"], "Assessment updated");
    assert_eq!(updated["assessment"]["assessmentId"], assessment_id.as_str());
    assert_eq!(updated["assessment"]["taxDue"], 8640.0);
    assert_eq!(
        updated["assessment"]["createdAt"],
        created["assessment"]["createdAt"]
    );
    assert_eq!(delete_status, StatusCode::OK);
    assert_eq!(
        deleted,
        json!({"message": "Assessment deleted", "assessmentId": assessment_id})
    );
    assert_eq!(gone_status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_taxpayer_removes_assessments() {
    let app = memory_app();
    let payer_id = create_john(&app).await;
    send(
        &app,
        Method::POST,
        "/api/assessments",
        Some(assessment_body(&payer_id)),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/api/taxpayers/{payer_id}"),
        None,
    )
    .await;
    let (_, remaining) = send(&app, Method::GET, "/api/assessments", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Taxpayer deleted", "payerId": payer_id}));
    assert_eq!(remaining, json!([]));
}

#[tokio::test]
async fn full_flow_against_sqlite() {
    let app = sqlite_app().await;
    let payer_id = create_john(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/assessments",
        Some(assessment_body(&payer_id)),
    )
    .await;
    let (_, listed) = send(
        &app,
        Method::GET,
        &format!("/api/assessments?payerId={payer_id}"),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["assessment"]["taxDue"], 9840.0);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["taxDue"], 9840.0);
}
