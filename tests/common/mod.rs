#![allow(dead_code)]

use axum::{
    Form, Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Duration as ChronoDuration, Utc};
use gworkspace_nexus::config::Config;
use gworkspace_nexus::db::models::WorkspaceConfigInput;
use gworkspace_nexus::db::{self, TokenStorage, WorkspaceStorage};
use gworkspace_nexus::google_oauth::credentials::TokenGrant;
use gworkspace_nexus::google_oauth::{GoogleAuthManager, build_http_client};
use gworkspace_nexus::router::{NexusState, nexus_router};
use gworkspace_nexus::service::maintenance;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;
use url::Url;

pub const API_KEY: &str = "test-crm-key";
pub const ORG: &str = "org-acme";
pub const ADMIN_EMAIL: &str = "admin@acme.be";

/// Knobs and call counters of the fake Google endpoints.
#[derive(Default)]
pub struct MockGoogle {
    pub token_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub code_calls: AtomicUsize,
    pub revoke_calls: AtomicUsize,
    pub userinfo_calls: AtomicUsize,
    pub api_calls: AtomicUsize,
    pub reject_refresh: AtomicBool,
    /// Answer this many refreshes with a bare 503 before recovering.
    pub unavailable_refreshes: AtomicUsize,
    pub token_delay_ms: AtomicU64,
    pub userinfo_email: Mutex<String>,
    pub last_bearer: Mutex<Option<String>>,
    pub last_sent_raw: Mutex<Option<String>>,
    pub requests: Mutex<Vec<Recorded>>,
}

/// One Gmail or Calendar API call as the mock received it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Recorded {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

impl MockGoogle {
    pub fn set_userinfo_email(&self, email: &str) {
        *self.userinfo_email.lock().unwrap() = email.to_string();
    }

    /// API calls whose method matches and whose path ends with `suffix`.
    pub fn calls(&self, method: &str, suffix: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path.ends_with(suffix))
            .cloned()
            .collect()
    }
}

pub struct MockServer {
    pub base: Url,
    pub google: Arc<MockGoogle>,
}

impl MockServer {
    pub async fn start() -> Self {
        let google = Arc::new(MockGoogle::default());
        google.set_userinfo_email(ADMIN_EMAIL);

        let app = Router::new()
            .route("/token", post(token))
            .route("/revoke", post(revoke))
            .route("/userinfo", get(userinfo))
            .fallback(google_api)
            .with_state(google.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock google");
        let addr = listener.local_addr().expect("mock google has no address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock google crashed");
        });

        Self {
            base: Url::parse(&format!("http://{addr}/")).expect("bad mock url"),
            google,
        }
    }

    pub fn url(&self, path: &str) -> Url {
        self.base.join(path).expect("bad mock path")
    }
}

async fn token(
    State(mock): State<Arc<MockGoogle>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    mock.token_calls.fetch_add(1, Ordering::SeqCst);
    let delay = mock.token_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    match form.get("grant_type").map(String::as_str) {
        Some("refresh_token") => {
            let n = mock.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if mock
                .unavailable_refreshes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok()
            {
                return (StatusCode::SERVICE_UNAVAILABLE, "upstream connect error").into_response();
            }
            if mock.reject_refresh.load(Ordering::SeqCst) {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "invalid_grant",
                        "error_description": "Token has been expired or revoked."
                    })),
                )
                    .into_response();
            }
            Json(json!({
                "access_token": format!("refreshed-{n}"),
                "expires_in": 3600,
                "token_type": "Bearer"
            }))
            .into_response()
        }
        Some("authorization_code") => {
            mock.code_calls.fetch_add(1, Ordering::SeqCst);
            Json(json!({
                "access_token": "consent-access",
                "refresh_token": "consent-refresh",
                "expires_in": 3599,
                "token_type": "Bearer",
                "scope": "openid https://www.googleapis.com/auth/gmail.modify https://www.googleapis.com/auth/calendar"
            }))
            .into_response()
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "unsupported_grant_type" })),
        )
            .into_response(),
    }
}

async fn revoke(State(mock): State<Arc<MockGoogle>>) -> StatusCode {
    mock.revoke_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn userinfo(State(mock): State<Arc<MockGoogle>>) -> Json<serde_json::Value> {
    mock.userinfo_calls.fetch_add(1, Ordering::SeqCst);
    let email = mock.userinfo_email.lock().unwrap().clone();
    Json(json!({ "email": email, "name": "Acme Admin" }))
}

fn record_bearer(mock: &MockGoogle, headers: &HeaderMap) {
    mock.api_calls.fetch_add(1, Ordering::SeqCst);
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    *mock.last_bearer.lock().unwrap() = bearer;
}

/// Gmail and Calendar REST endpoints, dispatched on method and path.
async fn google_api(
    State(mock): State<Arc<MockGoogle>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    record_bearer(&mock, &headers);
    let path = uri.path().trim_start_matches('/').to_string();
    let query: Vec<(String, String)> = url::form_urlencoded::parse(uri.query().unwrap_or_default().as_bytes())
        .into_owned()
        .collect();
    let body: Option<Value> = serde_json::from_slice(&body).ok();
    let recorded = Recorded {
        method: method.to_string(),
        path: path.clone(),
        query,
        body: body.clone(),
    };
    mock.requests.lock().unwrap().push(recorded.clone());

    let segments: Vec<&str> = path.split('/').collect();
    let name = body
        .as_ref()
        .and_then(|b| b.get("name"))
        .cloned()
        .unwrap_or(Value::Null);
    match (method.as_str(), segments.as_slice()) {
        ("GET", [.., "messages"]) => Json(message_list(&recorded)).into_response(),
        ("POST", [.., "messages", "send"]) => {
            *mock.last_sent_raw.lock().unwrap() = body
                .as_ref()
                .and_then(|b| b.get("raw"))
                .and_then(Value::as_str)
                .map(str::to_string);
            Json(json!({ "id": "sent-1", "threadId": "t9" })).into_response()
        }
        ("GET", [.., "messages", _, "attachments", _]) => {
            Json(json!({ "size": 14, "data": "JVBERi0xLjcgZGV2aXM" })).into_response()
        }
        ("POST", [.., "messages", id, "modify"]) => {
            Json(json!({ "id": id, "threadId": "t1" })).into_response()
        }
        ("POST", [.., "messages", id, "trash" | "untrash"]) => {
            Json(json!({ "id": id, "threadId": "t1" })).into_response()
        }
        ("GET", [.., "messages", id]) => Json(message(id)).into_response(),
        ("DELETE", [.., "messages", _]) => StatusCode::NO_CONTENT.into_response(),

        ("GET", [.., "labels"]) => Json(json!({
            "labels": [
                { "id": "INBOX", "name": "INBOX", "type": "system" },
                { "id": "Label_1", "name": "Clients", "type": "user" }
            ]
        }))
        .into_response(),
        ("POST", [.., "labels"]) => {
            Json(json!({ "id": "Label_9", "name": name, "type": "user" })).into_response()
        }
        ("PATCH", [.., "labels", id]) => {
            Json(json!({ "id": id, "name": name, "type": "user" })).into_response()
        }
        ("DELETE", [.., "labels", _]) => StatusCode::NO_CONTENT.into_response(),

        ("GET", [.., "drafts"]) => Json(json!({ "drafts": [{ "id": "d1" }] })).into_response(),
        ("POST", [.., "drafts", "send"]) => {
            Json(json!({ "id": "sent-d1", "threadId": "t3" })).into_response()
        }
        ("GET", [.., "drafts", id]) => Json(json!({
            "id": id,
            "message": {
                "id": "dm1",
                "internalDate": "1700000000000",
                "payload": {
                    "mimeType": "text/plain",
                    "headers": [
                        { "name": "Subject", "value": "Brouillon" },
                        { "name": "To", "value": "client@example.com" }
                    ],
                    "body": { "size": 3, "data": "w6ljbw" }
                }
            }
        }))
        .into_response(),
        ("POST", [.., "drafts"]) => {
            Json(json!({ "id": "d2", "message": { "id": "dm2" } })).into_response()
        }
        ("DELETE", [.., "drafts", _]) => StatusCode::NO_CONTENT.into_response(),

        ("GET", [.., "events"]) => Json(json!({
            "items": [{
                "id": "ev1",
                "summary": "Visite chantier",
                "start": { "dateTime": "2026-03-02T09:00:00+01:00" },
                "end": { "dateTime": "2026-03-02T10:00:00+01:00" }
            }],
            "nextPageToken": "cal-2"
        }))
        .into_response(),
        ("POST", [.., "events"]) => Json(event_echo("ev-new", body)).into_response(),
        ("PATCH", [.., "events", id]) => Json(event_echo(id, body)).into_response(),
        ("DELETE", [.., "events", _]) => StatusCode::NO_CONTENT.into_response(),

        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": 404, "message": "Not Found" } })),
        )
            .into_response(),
    }
}

/// Inbox has one message; TRASH spans two pages.
fn message_list(req: &Recorded) -> Value {
    if req.param("labelIds") == Some("TRASH") {
        return match req.param("pageToken") {
            None => json!({
                "messages": [{ "id": "t1", "threadId": "x" }, { "id": "t2", "threadId": "x" }],
                "nextPageToken": "trash-2"
            }),
            Some(_) => json!({ "messages": [{ "id": "t3", "threadId": "x" }] }),
        };
    }
    json!({
        "messages": [{ "id": "m1", "threadId": "t1" }],
        "nextPageToken": "page-2",
        "resultSizeEstimate": 1
    })
}

fn message(id: &str) -> Value {
    if id == "m-att" {
        return json!({
            "id": id,
            "threadId": "t2",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [{ "name": "Subject", "value": "Offre" }],
                "parts": [
                    { "mimeType": "text/plain", "body": { "size": 2, "data": "aGk" } },
                    {
                        "mimeType": "application/pdf",
                        "filename": "offre \"2026\".pdf",
                        "body": { "attachmentId": "att-1", "size": 14 }
                    }
                ]
            }
        });
    }
    json!({
        "id": id,
        "threadId": "t1",
        "labelIds": ["INBOX", "STARRED"],
        "snippet": "Votre devis",
        "payload": {
            "mimeType": "text/html",
            "headers": [
                { "name": "Subject", "value": "Devis 2026" },
                { "name": "From", "value": "client@example.com" },
                { "name": "To", "value": ADMIN_EMAIL }
            ],
            "body": { "size": 11, "data": "PGI-aGk8L2I-" }
        }
    })
}

fn event_echo(id: &str, body: Option<Value>) -> Value {
    let mut event = body.unwrap_or_else(|| json!({}));
    event["id"] = json!(id);
    event["htmlLink"] = json!(format!("https://calendar.google.com/event?eid={id}"));
    event
}

/// A router wired to the mock Google server over a throwaway SQLite file.
pub struct Harness {
    pub mock: MockServer,
    pub config: Arc<Config>,
    pub manager: GoogleAuthManager,
    pub app: Router,
    db_path: PathBuf,
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
    }
}

pub fn test_config(mock: &MockServer) -> Config {
    let mut cfg = Config::default();
    cfg.basic.crm_key = API_KEY.to_string();
    cfg.basic.frontend_url = Url::parse("http://crm.test/").unwrap();
    cfg.basic.insecure_cookie = true;
    cfg.basic.body_limit_bytes = 64 * 1024;
    cfg.google.auth_url = mock.url("auth");
    cfg.google.token_url = mock.url("token");
    cfg.google.revoke_url = mock.url("revoke");
    cfg.google.userinfo_url = mock.url("userinfo");
    cfg.google.gmail_api_base = mock.url("gmail/v1/");
    cfg.google.calendar_api_base = mock.url("calendar/v3/");
    cfg.google.redirect_uri = Some(Url::parse("http://localhost:4000/api/google-auth/callback").unwrap());
    cfg.maintenance.enabled = false;
    cfg
}

fn temp_db_path() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();
    std::env::temp_dir().join(format!(
        "gworkspace-nexus-{}-{}.sqlite",
        std::process::id(),
        nanos
    ))
}

impl Harness {
    pub async fn start() -> Self {
        let mock = MockServer::start().await;
        let config = Arc::new(test_config(&mock));

        let db_path = temp_db_path();
        let pool = db::connect(&format!("sqlite:{}", db_path.display()))
            .await
            .expect("failed to open test database");
        let http = build_http_client(&config.basic, &config.google).expect("http client");
        let manager = GoogleAuthManager::new(
            TokenStorage::new(pool.clone()),
            WorkspaceStorage::new(pool),
            config.google.clone(),
            http,
        );
        let maintenance = maintenance::spawn(manager.clone(), config.maintenance.clone())
            .await
            .expect("maintenance actor");
        let app = nexus_router(NexusState::new(config.clone(), manager.clone(), maintenance));

        Self {
            mock,
            config,
            manager,
            app,
            db_path,
        }
    }

    pub fn google(&self) -> &MockGoogle {
        &self.mock.google
    }

    pub async fn configure_workspace(&self, organization_id: &str) {
        self.manager
            .workspaces()
            .upsert(
                organization_id,
                &WorkspaceConfigInput {
                    domain: "acme.be".to_string(),
                    admin_email: ADMIN_EMAIL.to_string(),
                    client_id: "cid.apps.googleusercontent.com".to_string(),
                    client_secret: Some("client-secret".to_string()),
                },
            )
            .await
            .expect("failed to store workspace config");
    }

    /// Store a credential expiring `expires_in` from now (negative = already expired).
    pub async fn store_credential(
        &self,
        organization_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in: ChronoDuration,
    ) {
        self.manager
            .tokens()
            .upsert_from_consent(
                organization_id,
                &TokenGrant {
                    access_token: access_token.to_string(),
                    refresh_token: refresh_token.map(str::to_string),
                    token_type: "Bearer".to_string(),
                    expires_at: Some(Utc::now() + expires_in),
                    scope: Some("https://www.googleapis.com/auth/gmail.modify".to_string()),
                },
                Some(ADMIN_EMAIL),
                None,
            )
            .await
            .expect("failed to store credential");
    }
}
