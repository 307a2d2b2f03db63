//! In-process fake of the SnapWeather backend.
//!
//! Implements every endpoint the client uses with in-memory accounts, tokens
//! and pictures, and records each request so tests can assert on what was (or
//! was not) sent.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use snapweather_core::auth::{MemoryTokenStore, TokenStore};
use snapweather_core::{Config, SessionManager};
use tokio::net::TcpListener;

/// Code the fake backend "mails" for every temporary-code request
pub const TEMP_CODE: &str = "123456";

#[derive(Debug, Clone, Default)]
pub struct Account {
    pub password: Option<String>,
    pub code: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub email: String,
    pub picture: Vec<u8>,
    pub media_type: String,
    pub filename: String,
    pub latitude: String,
    pub longitude: String,
}

#[derive(Default)]
pub struct Backend {
    pub accounts: HashMap<String, Account>,
    pub tokens: HashMap<String, String>,
    pub expired: HashSet<String>,
    pub pictures: Vec<Value>,
    pub blobs: HashMap<String, Vec<u8>>,
    pub uploads: Vec<Upload>,
    pub requests: Vec<Recorded>,
    /// Added before answering `GET /account` and `GET /pictures`
    pub delay: Duration,
    next_token: u32,
}

impl Backend {
    fn issue_token(&mut self, email: &str) -> String {
        self.next_token += 1;
        let token = format!("tok-{}", self.next_token);
        self.tokens.insert(token.clone(), email.to_string());
        token
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<String, StatusCode> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;
        if self.expired.contains(token) {
            return Err(StatusCode::FORBIDDEN);
        }
        self.tokens.get(token).cloned().ok_or(StatusCode::UNAUTHORIZED)
    }
}

pub type Shared = Arc<Mutex<Backend>>;

fn lock(state: &Shared) -> MutexGuard<'_, Backend> {
    state.lock().unwrap()
}

fn ok(datas: Value) -> Response {
    (StatusCode::OK, Json(json!({"success": true, "datas": datas}))).into_response()
}

fn fail(status: StatusCode) -> Response {
    (status, Json(json!({"success": false, "datas": null}))).into_response()
}

fn field<'a>(body: &'a Value, name: &str) -> Option<&'a str> {
    body.get(name).and_then(Value::as_str)
}

fn looks_like_email(email: &str) -> bool {
    matches!(email.split_once('@'), Some((l, d)) if !l.is_empty() && d.contains('.'))
}

fn describe(request: &Request) -> Recorded {
    let header_str = |name: header::HeaderName| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Recorded {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        authorization: header_str(header::AUTHORIZATION),
        content_type: header_str(header::CONTENT_TYPE),
    }
}

/// Sleep for the configured delay without holding the backend lock
async fn pause(state: &Shared) {
    let delay = lock(state).delay;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

async fn record(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let recorded = describe(&request);
    lock(&state).requests.push(recorded);
    next.run(request).await
}

async fn create_account(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut backend = lock(&state);
    let email = field(&body, "email_address").unwrap_or_default();
    if !looks_like_email(email) {
        return fail(StatusCode::BAD_REQUEST);
    }
    if backend.accounts.contains_key(email) {
        return fail(StatusCode::CONFLICT);
    }
    backend.accounts.insert(email.to_string(), Account::default());
    ok(json!({}))
}

async fn temporary_code(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut backend = lock(&state);
    let email = field(&body, "email_address").unwrap_or_default();
    if !looks_like_email(email) {
        return fail(StatusCode::BAD_REQUEST);
    }
    match backend.accounts.get_mut(email) {
        Some(account) => {
            account.code = Some(TEMP_CODE.to_string());
            ok(json!({}))
        }
        None => fail(StatusCode::UNAUTHORIZED),
    }
}

async fn set_password(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut backend = lock(&state);
    let email = field(&body, "email_address").unwrap_or_default();
    let code = field(&body, "temporary_code").unwrap_or_default();
    let password = field(&body, "password").unwrap_or_default();
    if password.chars().count() < 8 || code.is_empty() {
        return fail(StatusCode::BAD_REQUEST);
    }
    let Some(account) = backend.accounts.get_mut(email) else {
        return fail(StatusCode::UNAUTHORIZED);
    };
    if account.code.as_deref() != Some(code) {
        return fail(StatusCode::FORBIDDEN);
    }
    account.password = Some(password.to_string());
    account.code = None;
    ok(json!({}))
}

async fn login(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut backend = lock(&state);
    let (Some(email), Some(password)) = (field(&body, "email_address"), field(&body, "password"))
    else {
        return fail(StatusCode::BAD_REQUEST);
    };
    let Some(account) = backend.accounts.get(email) else {
        return fail(StatusCode::UNAUTHORIZED);
    };
    if account.password.as_deref() != Some(password) {
        return fail(StatusCode::FORBIDDEN);
    }
    let token = backend.issue_token(email);
    ok(json!({"value": token}))
}

async fn delete_token(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut backend = lock(&state);
    if let Err(status) = backend.authorize(&headers) {
        return fail(status);
    }
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();
    backend.tokens.remove(&token);
    ok(json!({}))
}

async fn get_account(State(state): State<Shared>, headers: HeaderMap) -> Response {
    pause(&state).await;
    let backend = lock(&state);
    let email = match backend.authorize(&headers) {
        Ok(email) => email,
        Err(status) => return fail(status),
    };
    let username = backend.accounts.get(&email).and_then(|a| a.username.clone());
    ok(json!({"email_address": email, "user_name": username}))
}

async fn post_account(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut backend = lock(&state);
    let email = match backend.authorize(&headers) {
        Ok(email) => email,
        Err(status) => return fail(status),
    };
    let name = field(&body, "user_name").unwrap_or_default().to_string();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return fail(StatusCode::BAD_REQUEST);
    }
    let taken = backend
        .accounts
        .iter()
        .any(|(other, a)| other != &email && a.username.as_deref() == Some(name.as_str()));
    if taken {
        return fail(StatusCode::CONFLICT);
    }
    if let Some(account) = backend.accounts.get_mut(&email) {
        account.username = Some(name);
    }
    ok(json!({}))
}

async fn list_pictures(State(state): State<Shared>, headers: HeaderMap) -> Response {
    pause(&state).await;
    let backend = lock(&state);
    if let Err(status) = backend.authorize(&headers) {
        return fail(status);
    }
    ok(Value::Array(backend.pictures.clone()))
}

async fn get_picture(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> Response {
    let backend = lock(&state);
    if let Err(status) = backend.authorize(&headers) {
        return fail(status);
    }
    match backend.blobs.get(&filename) {
        Some(bytes) => (StatusCode::OK, bytes.clone()).into_response(),
        None => fail(StatusCode::NOT_FOUND),
    }
}

async fn put_picture(
    State(state): State<Shared>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let email = match lock(&state).authorize(&headers) {
        Ok(email) => email,
        Err(status) => return fail(status),
    };

    let mut picture = None;
    let mut latitude = None;
    let mut longitude = None;
    while let Ok(Some(part)) = multipart.next_field().await {
        let name = part.name().unwrap_or_default().to_string();
        let media_type = part.content_type().unwrap_or_default().to_string();
        let filename = part.file_name().unwrap_or_default().to_string();
        match name.as_str() {
            "picture" => {
                let bytes = part.bytes().await.unwrap_or_default();
                picture = Some((bytes.to_vec(), media_type, filename));
            }
            "latitude" => latitude = part.text().await.ok(),
            "longitude" => longitude = part.text().await.ok(),
            _ => {}
        }
    }

    let (Some((bytes, media_type, filename)), Some(latitude), Some(longitude)) =
        (picture, latitude, longitude)
    else {
        return fail(StatusCode::BAD_REQUEST);
    };
    if !matches!(media_type.as_str(), "image/heic" | "image/jpeg" | "image/png") {
        return fail(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    let mut backend = lock(&state);
    let Some(username) = backend.accounts.get(&email).and_then(|a| a.username.clone()) else {
        return fail(StatusCode::UNPROCESSABLE_ENTITY);
    };

    let stored_name = format!("upload-{}.heic", backend.uploads.len() + 1);
    backend.blobs.insert(stored_name.clone(), bytes.clone());
    backend.pictures.push(picture_json(&stored_name, &username, &latitude, &longitude));
    backend.uploads.push(Upload {
        email,
        picture: bytes,
        media_type,
        filename,
        latitude,
        longitude,
    });
    ok(json!({}))
}

/// Picture metadata in the server's wire format
pub fn picture_json(filename: &str, username: &str, latitude: &str, longitude: &str) -> Value {
    json!({
        "datetime": "2025-01-05T14:30:00Z",
        "fileName": filename,
        "latitude": latitude,
        "longitude": longitude,
        "user": {"user_name": username},
        "weatherDetails": {
            "city": "Paris",
            "description": "light rain",
            "icon_url": "https://openweathermap.org/img/wn/10d.png",
            "large_icon_url": "https://openweathermap.org/img/wn/10d@4x.png",
            "feltTemperature": "3.71"
        }
    })
}

async fn serve(router: Router) -> String {
    // Bind to port 0 to let the OS assign a random available port.
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://127.0.0.1:{}", port)
}

pub struct TestApp {
    pub address: String,
    pub backend: Shared,
}

pub async fn spawn_app() -> TestApp {
    let backend: Shared = Arc::default();

    let router = Router::new()
        .route("/account/create", post(create_account))
        .route("/account/security/temporary-code", post(temporary_code))
        .route("/account/security/password", post(set_password))
        .route("/account/security/token", post(login).delete(delete_token))
        .route("/account", get(get_account).post(post_account).delete(delete_token))
        .route("/pictures", get(list_pictures).put(put_picture))
        .route("/pictures/:filename", get(get_picture))
        .layer(middleware::from_fn_with_state(backend.clone(), record))
        .with_state(backend.clone());

    let address = serve(router).await;
    TestApp { address, backend }
}

impl TestApp {
    pub fn config(&self) -> Config {
        Config::with_base_url(&self.address)
    }

    /// A session backed by `store`
    pub fn session_with(&self, store: Arc<dyn TokenStore>) -> SessionManager {
        SessionManager::new(&self.config(), store).expect("Failed to create session")
    }

    /// A session with an empty in-memory token store
    pub fn session(&self) -> (SessionManager, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::default());
        (self.session_with(store.clone()), store)
    }

    /// Add a fully registered account
    pub fn seed_account(&self, email: &str, password: &str, username: Option<&str>) {
        lock(&self.backend).accounts.insert(
            email.to_string(),
            Account {
                password: Some(password.to_string()),
                code: None,
                username: username.map(str::to_string),
            },
        );
    }

    /// Add a picture with its image bytes
    pub fn seed_picture(&self, filename: &str, bytes: &[u8]) {
        let mut backend = lock(&self.backend);
        backend
            .pictures
            .push(picture_json(filename, "alice", "48.8566", "2.3522"));
        backend.blobs.insert(filename.to_string(), bytes.to_vec());
    }

    /// Revoke a token server-side, as if it had been deleted elsewhere
    pub fn revoke(&self, token: &str) {
        lock(&self.backend).tokens.remove(token);
    }

    /// Mark a token as expired: the server answers 403 for it
    pub fn expire(&self, token: &str) {
        lock(&self.backend).expired.insert(token.to_string());
    }

    /// Hold `GET /account` and `GET /pictures` for `delay` before answering
    pub fn slow_responses(&self, delay: Duration) {
        lock(&self.backend).delay = delay;
    }

    /// Wait until the backend has seen a request matching `method` and `path`
    pub async fn wait_for_request(&self, method: &str, path: &str) {
        for _ in 0..200 {
            let seen = lock(&self.backend)
                .requests
                .iter()
                .any(|r| r.method == method && r.path == path);
            if seen {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("No {} {} request within a second", method, path);
    }

    pub fn backend(&self) -> MutexGuard<'_, Backend> {
        lock(&self.backend)
    }

    pub fn request_count(&self) -> usize {
        lock(&self.backend).requests.len()
    }

    pub fn last_request(&self) -> Option<Recorded> {
        lock(&self.backend).requests.last().cloned()
    }
}

/// A server answering every request with the same status and body
pub struct FixedServer {
    pub address: String,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
}

pub async fn spawn_fixed(status: StatusCode, body: impl Into<Vec<u8>>) -> FixedServer {
    let body = Bytes::from(body.into());
    let requests: Arc<Mutex<Vec<Recorded>>> = Arc::default();
    let recorded = requests.clone();

    let router = Router::new().fallback(move |request: Request| {
        let body = body.clone();
        let recorded = recorded.clone();
        async move {
            recorded.lock().unwrap().push(describe(&request));
            (status, body)
        }
    });

    FixedServer {
        address: serve(router).await,
        requests,
    }
}

impl FixedServer {
    pub fn config(&self) -> Config {
        Config::with_base_url(&self.address)
    }

    pub fn session(&self) -> (SessionManager, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::default());
        let session =
            SessionManager::new(&self.config(), store.clone()).expect("Failed to create session");
        (session, store)
    }

    pub fn session_with_token(&self, token: &str) -> (SessionManager, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::with_token(token));
        let session =
            SessionManager::new(&self.config(), store.clone()).expect("Failed to create session");
        (session, store)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

/// An address nothing listens on
pub async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

/// Server-side username lookup, for assertions
pub fn username_of(app: &TestApp, email: &str) -> Option<String> {
    app.backend().accounts.get(email).and_then(|a| a.username.clone())
}

/// Shorthand for `PUT` uploads recorded by the fake
pub fn uploads(app: &TestApp) -> Vec<Upload> {
    app.backend().uploads.clone()
}
