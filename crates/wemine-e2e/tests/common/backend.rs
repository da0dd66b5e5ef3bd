// Mock backend - local HTTP API for integration tests
//
// Serves the endpoints the application calls during login, inspections and
// hazard reports on a random local port, and counts every hit so tests can
// assert what did (or did not) reach the backend.

use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use wemine_e2e::data::{self, LOCATIONS, USERS, endpoints, form_codes, messages};
use wemine_e2e::models::{FieldOption, FormDefinition, FormField};

/// Form code of the largest form the backend serves
pub const WIDE_FORM: &str = "FORM-050";

/// Form code of a definition that exceeds the field limit
pub const OVERSIZED_FORM: &str = "FORM-051";

pub const TENANT_ID: &str = "tenant-001";

#[derive(Default)]
struct Ledger {
    hits: Mutex<HashMap<String, usize>>,
    submissions: Mutex<Vec<Value>>,
    hazards: Mutex<Vec<Value>>,
    next_inspection: AtomicU64,
    next_hazard: AtomicU64,
}

/// What the backend has seen; clones share it.
#[derive(Clone, Default)]
pub struct BackendStats {
    ledger: Arc<Ledger>,
}

impl BackendStats {
    fn record(&self, method: &str, path: &str) {
        *self
            .ledger
            .hits
            .lock()
            .entry(format!("{} {}", method, path))
            .or_default() += 1;
    }

    /// Hits on exactly `method path`
    pub fn hits(&self, method: &str, path: &str) -> usize {
        self.ledger
            .hits
            .lock()
            .get(&format!("{} {}", method, path))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.ledger.hits.lock().values().sum()
    }

    /// Accepted inspection submission bodies
    pub fn submissions(&self) -> Vec<Value> {
        self.ledger.submissions.lock().clone()
    }

    /// Accepted hazard report bodies
    pub fn hazards(&self) -> Vec<Value> {
        self.ledger.hazards.lock().clone()
    }
}

/// Mock backend handle
pub struct MockBackend {
    addr: SocketAddr,
    handle: JoinHandle<()>,
    stats: BackendStats,
}

impl MockBackend {
    /// Start the backend on a random available port
    pub async fn start() -> Self {
        let stats = BackendStats::default();

        let app = Router::new()
            .route(endpoints::USER_WHO, post(user_who))
            .route(endpoints::TENANT_INFO, get(tenant_info))
            .route(endpoints::TENANT_LOOKUP, get(tenant_info))
            .route(endpoints::USER_ME, get(user_me))
            .route(endpoints::TENANT_MASTER, get(tenant_master))
            .route(endpoints::LOCATIONS, get(locations))
            .route(endpoints::SUBLOCATIONS, get(sublocations))
            .route(endpoints::AREAS, get(areas))
            .route(endpoints::EMPLOYEES, get(employees))
            .route(endpoints::FORMS, get(form_list))
            .route("/forms/{code}", get(form_definition))
            .route("/equipment/inspection/submissions", get(submission_list))
            .route(endpoints::EQUIPMENT_SUBMIT, post(submit_inspection))
            .route(endpoints::SAFETY_HAZARD, post(create_hazard))
            .layer(middleware::from_fn_with_state(stats.clone(), count_hits))
            .with_state(stats.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock backend");

        let addr = listener.local_addr().expect("Failed to get local address");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Mock backend failed");
        });

        MockBackend {
            addr,
            handle,
            stats,
        }
    }

    /// Base URL of the backend
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn stats(&self) -> BackendStats {
        self.stats.clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn count_hits(State(stats): State<BackendStats>, request: Request, next: Next) -> Response {
    stats.record(request.method().as_str(), request.uri().path());
    next.run(request).await
}

fn year() -> String {
    chrono::Utc::now().format("%Y").to_string()
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message.into() }))).into_response()
}

fn tenant() -> Value {
    json!({ "id": TENANT_ID, "name": "WeMine Mining Co", "domain": "wemine-mining" })
}

async fn user_who(Json(body): Json<Value>) -> Response {
    let username = body["username"].as_str().unwrap_or_default();
    match USERS.iter().position(|u| u.username == username) {
        Some(index) => Json(json!({
            "tenant": tenant(),
            "userId": format!("user-{:03}", index + 1),
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": messages::USER_NOT_FOUND })),
        )
            .into_response(),
    }
}

async fn tenant_info() -> Json<Value> {
    Json(tenant())
}

/// The profile follows the role token; anything else is the operator.
async fn user_me(headers: HeaderMap) -> Json<Value> {
    let (index, user) = match bearer(&headers) {
        Some("mock-supervisor-token") => (1, data::SUPERVISOR),
        Some("mock-pic-token") => (2, data::PIC),
        _ => (0, data::OPERATOR),
    };
    Json(json!({
        "id": format!("user-{:03}", index + 1),
        "username": user.username,
        "email": user.username,
        "role": user.role,
        "tenantId": TENANT_ID,
        "permissions": ["inspection:submit", "hazard:report"],
    }))
}

async fn tenant_master() -> Json<Value> {
    Json(json!({
        "tenantId": TENANT_ID,
        "modules": ["equipment-inspection", "hazard-report"],
        "version": 7,
    }))
}

async fn locations() -> Json<Value> {
    let names: Vec<&str> = LOCATIONS.iter().map(|l| l.location).collect();
    Json(json!(names))
}

async fn sublocations() -> Json<Value> {
    let names: Vec<&str> = LOCATIONS.iter().map(|l| l.sublocation).collect();
    Json(json!(names))
}

async fn areas() -> Json<Value> {
    let names: Vec<&str> = LOCATIONS.iter().map(|l| l.area).collect();
    Json(json!(names))
}

async fn employees() -> Json<Value> {
    let names: Vec<&str> = USERS.iter().map(|u| u.username).collect();
    Json(json!(names))
}

async fn form_list() -> Json<Value> {
    let forms: Vec<Value> = form_codes::ALL
        .iter()
        .copied()
        .chain([WIDE_FORM, OVERSIZED_FORM])
        .filter_map(definition)
        .map(|d| json!({ "code": d.code, "name": d.name }))
        .collect();
    Json(json!(forms))
}

async fn form_definition(Path(code): Path<String>) -> Response {
    match definition(&code) {
        Some(def) => Json(def).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("form {} not found", code) })),
        )
            .into_response(),
    }
}

async fn submission_list(State(stats): State<BackendStats>) -> Json<Value> {
    let receipts: Vec<Value> = stats
        .ledger
        .submissions
        .lock()
        .iter()
        .map(|s| s["receipt"].clone())
        .collect();
    Json(json!(receipts))
}

async fn submit_inspection(State(stats): State<BackendStats>, Json(body): Json<Value>) -> Response {
    let Some(form_code) = body["formCode"].as_str().filter(|c| !c.is_empty()) else {
        return bad_request("formCode is required");
    };
    if !body["fields"].is_object() {
        return bad_request("fields are required");
    }

    let n = stats.ledger.next_inspection.fetch_add(1, Ordering::SeqCst) + 1;
    let receipt = json!({
        "id": format!("sub-{}", n),
        "submissionNumber": format!("INS-{}-{:03}", year(), n),
        "formCode": form_code,
        "status": "SUBMITTED",
        "submittedAt": chrono::Utc::now().to_rfc3339(),
        "submittedBy": body["submittedBy"],
    });
    stats
        .ledger
        .submissions
        .lock()
        .push(json!({ "request": body, "receipt": receipt }));

    (StatusCode::CREATED, Json(receipt)).into_response()
}

async fn create_hazard(State(stats): State<BackendStats>, Json(body): Json<Value>) -> Response {
    let text = |key: &str| body[key].as_str().unwrap_or_default().trim().to_string();
    for key in ["location", "sublocation", "area", "areaDescription", "evidence", "pic"] {
        if text(key).is_empty() {
            return bad_request(format!("{} is required", key));
        }
    }
    if !text("evidence").starts_with("data:image/") {
        return bad_request("evidence must be an image");
    }

    let n = stats.ledger.next_hazard.fetch_add(1, Ordering::SeqCst) + 1;
    let receipt = json!({
        "id": format!("hzd-{}", n),
        "hazardNumber": format!("HZD-{}-{:03}", year(), n),
        "status": "OPEN",
        "followupTaskId": format!("task-{}", n),
        "location": text("location"),
        "sublocation": text("sublocation"),
        "area": text("area"),
        "pic": text("pic"),
    });
    stats.ledger.hazards.lock().push(body);

    (StatusCode::CREATED, Json(receipt)).into_response()
}

fn field(order: u32, name: &str, kind: &str, label: &str, required: bool) -> FormField {
    FormField {
        id: format!("f-{}", name),
        name: name.to_string(),
        kind: kind.to_string(),
        label: label.to_string(),
        required,
        order,
        options: Vec::new(),
    }
}

fn with_options(mut field: FormField, options: &[(&str, &str)]) -> FormField {
    field.options = options
        .iter()
        .map(|(value, label)| FieldOption {
            value: value.to_string(),
            label: label.to_string(),
        })
        .collect();
    field
}

fn form(code: &str, name: &str, fields: Vec<FormField>) -> FormDefinition {
    FormDefinition {
        id: format!("form-{}", code.to_lowercase()),
        code: code.to_string(),
        name: name.to_string(),
        fields,
        version: 1,
        active: true,
    }
}

/// Form definitions by code
fn definition(code: &str) -> Option<FormDefinition> {
    let site_options: Vec<(&str, &str)> = LOCATIONS
        .iter()
        .map(|l| (l.location, l.location))
        .collect();

    let def = match code {
        form_codes::BASIC_INSPECTION => form(
            code,
            "Basic Equipment Inspection",
            vec![
                field(1, "equipmentId", "text", "Equipment ID", true),
                field(2, "inspectionDate", "date", "Inspection Date", true),
                with_options(
                    field(3, "equipmentType", "select", "Equipment Type", true),
                    &[
                        ("Excavator", "Excavator"),
                        ("Dump Truck", "Dump Truck"),
                        ("Bulldozer", "Bulldozer"),
                        ("Loader", "Loader"),
                    ],
                ),
                field(4, "inspectorName", "text", "Inspector Name", true),
                with_options(field(5, "location", "select", "Location", true), &site_options),
            ],
        ),
        form_codes::DETAILED_INSPECTION => form(
            code,
            "Detailed Equipment Inspection",
            vec![
                field(1, "equipmentName", "text", "Equipment Name", true),
                field(2, "inspectionDate", "date", "Inspection Date", true),
                with_options(
                    field(3, "status", "select", "Status", true),
                    &[
                        ("operational", "Operational"),
                        ("maintenance", "Under Maintenance"),
                        ("out-of-service", "Out of Service"),
                    ],
                ),
                with_options(
                    field(4, "condition", "radio", "Condition", true),
                    &[
                        ("good", "Good"),
                        ("fair", "Fair"),
                        ("poor", "Poor"),
                        ("critical", "Critical"),
                    ],
                ),
                field(5, "equipmentPhoto", "image", "Equipment Photo", true),
                field(6, "notes", "text", "Notes", false),
            ],
        ),
        form_codes::EQUIPMENT_CHECK => form(
            code,
            "Daily Equipment Check",
            vec![
                field(1, "checkDate", "datetime", "Check Date", true),
                field(2, "equipmentId", "text", "Equipment ID", true),
                with_options(
                    field(3, "passed", "radio", "Passed", true),
                    &[("yes", "Yes"), ("no", "No")],
                ),
                field(4, "remarks", "text", "Remarks", false),
            ],
        ),
        WIDE_FORM => form(
            code,
            "Extended Sensor Readings",
            (1..=50)
                .map(|i| field(i, &format!("reading{:02}", i), "number", &format!("Reading {}", i), i <= 5))
                .collect(),
        ),
        OVERSIZED_FORM => form(
            code,
            "Oversized Form",
            (1..=51)
                .map(|i| field(i, &format!("value{:02}", i), "text", &format!("Value {}", i), false))
                .collect(),
        ),
        _ => return None,
    };
    Some(def)
}
