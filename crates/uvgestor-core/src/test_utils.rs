//! Test utilities for uvgestor-core
//!
//! This module provides testing infrastructure including a mock remote
//! document server and a mock identity server, speaking the same JSON APIs
//! as the HTTP remote store and the HTTP identity provider.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    extract::{Json, Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

#[derive(Default)]
struct ServerState {
    collections: Mutex<HashMap<String, Vec<Value>>>,
    next_id: AtomicU64,
    failing: AtomicBool,
    api_key: Option<String>,
}

type Shared = Arc<ServerState>;

/// Mock remote document server for testing and development
pub struct MockRemoteServer {
    addr: SocketAddr,
    state: Shared,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockRemoteServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::start_inner(None).await
    }

    /// Start a server that requires `Authorization: Bearer <api_key>`
    pub async fn start_with_api_key(api_key: &str) -> Self {
        Self::start_inner(Some(api_key.to_string())).await
    }

    async fn start_inner(api_key: Option<String>) -> Self {
        let state: Shared = Arc::new(ServerState {
            api_key,
            ..Default::default()
        });

        let app = Router::new()
            .route("/health", get(handle_health))
            .route("/:collection", get(handle_list).post(handle_create))
            .route(
                "/:collection/:id",
                axum::routing::patch(handle_update).delete(handle_delete),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer every request with 503 while set
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    /// Insert a raw document, bypassing validation (it may be malformed)
    pub fn seed(&self, collection: &str, document: Value) {
        lock(&self.state)
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    /// Raw documents currently stored in a collection
    pub fn documents(&self, collection: &str) -> Vec<Value> {
        lock(&self.state)
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockRemoteServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(state: &ServerState) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Value>>> {
    state
        .collections
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Reject the request when failing or when the bearer token does not match
fn guard(state: &ServerState, headers: &HeaderMap) -> Result<(), StatusCode> {
    if state.failing.load(Ordering::SeqCst) {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    if let Some(key) = &state.api_key {
        let expected = format!("Bearer {}", key);
        let given = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }
    Ok(())
}

async fn handle_health(State(state): State<Shared>) -> StatusCode {
    if state.failing.load(Ordering::SeqCst) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn handle_list(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if let Err(status) = guard(&state, &headers) {
        return status.into_response();
    }

    let user_id = params.get("userId");
    let docs: Vec<Value> = lock(&state)
        .get(&collection)
        .map(|docs| {
            docs.iter()
                .filter(|doc| match user_id {
                    Some(id) => doc.get("userId").and_then(Value::as_str) == Some(id.as_str()),
                    None => true,
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    Json(docs).into_response()
}

async fn handle_create(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(collection): Path<String>,
    Json(mut document): Json<Value>,
) -> impl IntoResponse {
    if let Err(status) = guard(&state, &headers) {
        return status.into_response();
    }

    let id = format!("doc-{}", state.next_id.fetch_add(1, Ordering::SeqCst) + 1);
    if let Some(obj) = document.as_object_mut() {
        obj.insert("id".to_string(), Value::String(id.clone()));
    }
    lock(&state).entry(collection).or_default().push(document);

    (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
}

async fn handle_update(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((collection, id)): Path<(String, String)>,
    Json(patch): Json<Value>,
) -> impl IntoResponse {
    if let Err(status) = guard(&state, &headers) {
        return status.into_response();
    }

    let mut collections = lock(&state);
    let existing = collections.get_mut(&collection).and_then(|docs| {
        docs.iter_mut()
            .find(|doc| doc.get("id").and_then(Value::as_str) == Some(id.as_str()))
    });

    match (existing.and_then(Value::as_object_mut), patch.as_object()) {
        (Some(doc), Some(fields)) => {
            for (key, value) in fields {
                if key != "id" {
                    doc.insert(key.clone(), value.clone());
                }
            }
            StatusCode::NO_CONTENT.into_response()
        }
        (None, _) => StatusCode::NOT_FOUND.into_response(),
        (_, None) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn handle_delete(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((collection, id)): Path<(String, String)>,
) -> impl IntoResponse {
    if let Err(status) = guard(&state, &headers) {
        return status.into_response();
    }

    let mut collections = lock(&state);
    let Some(docs) = collections.get_mut(&collection) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let before = docs.len();
    docs.retain(|doc| doc.get("id").and_then(Value::as_str) != Some(id.as_str()));

    if docs.len() < before {
        StatusCode::NO_CONTENT.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

#[derive(Default)]
struct IdentityState {
    /// email -> (password, identity document)
    accounts: Mutex<HashMap<String, (String, Value)>>,
    /// token -> email
    tokens: Mutex<HashMap<String, String>>,
    next_id: AtomicU64,
    failing: AtomicBool,
}

type SharedIdentity = Arc<IdentityState>;

/// Mock identity provider server for testing the HTTP account API
pub struct MockIdentityServer {
    addr: SocketAddr,
    state: SharedIdentity,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockIdentityServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let state: SharedIdentity = Arc::new(IdentityState::default());

        let app = Router::new()
            .route("/accounts/signUp", post(handle_sign_up))
            .route("/accounts/signIn", post(handle_sign_in))
            .route("/accounts/signOut", post(handle_sign_out))
            .route("/accounts/me", get(handle_me))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer every request with 503 while set
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockIdentityServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn unavailable() -> axum::response::Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "Service unavailable" })),
    )
        .into_response()
}

fn rejected(status: StatusCode, message: &str) -> axum::response::Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn issue_token(state: &IdentityState, email: &str, identity: &Value) -> Value {
    let token = format!("token-{}", state.next_id.fetch_add(1, Ordering::SeqCst) + 1);
    state
        .tokens
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(token.clone(), email.to_string());

    let mut session = identity.clone();
    if let Some(obj) = session.as_object_mut() {
        obj.insert("token".to_string(), Value::String(token));
    }
    session
}

async fn handle_sign_up(
    State(state): State<SharedIdentity>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    if state.failing.load(Ordering::SeqCst) {
        return unavailable();
    }

    let email = body["email"].as_str().unwrap_or_default().to_lowercase();
    let password = body["password"].as_str().unwrap_or_default().to_string();
    let display_name = body["displayName"].clone();

    let identity = {
        let mut accounts = state
            .accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if accounts.contains_key(&email) {
            return rejected(StatusCode::CONFLICT, "Email already registered");
        }
        let user_id = format!("user-{}", state.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let identity = json!({ "userId": user_id, "email": email, "displayName": display_name });
        accounts.insert(email.clone(), (password, identity.clone()));
        identity
    };

    Json(issue_token(&state, &email, &identity)).into_response()
}

async fn handle_sign_in(
    State(state): State<SharedIdentity>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    if state.failing.load(Ordering::SeqCst) {
        return unavailable();
    }

    let email = body["email"].as_str().unwrap_or_default().to_lowercase();
    let password = body["password"].as_str().unwrap_or_default();

    let identity = {
        let accounts = state
            .accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match accounts.get(&email) {
            Some((stored, identity)) if stored == password => identity.clone(),
            _ => return rejected(StatusCode::UNAUTHORIZED, "Invalid email or password"),
        }
    };

    Json(issue_token(&state, &email, &identity)).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn handle_sign_out(
    State(state): State<SharedIdentity>,
    headers: HeaderMap,
) -> axum::response::Response {
    if state.failing.load(Ordering::SeqCst) {
        return unavailable();
    }
    if let Some(token) = bearer(&headers) {
        state
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&token);
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn handle_me(
    State(state): State<SharedIdentity>,
    headers: HeaderMap,
) -> axum::response::Response {
    if state.failing.load(Ordering::SeqCst) {
        return unavailable();
    }

    let email = bearer(&headers).and_then(|token| {
        state
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&token)
            .cloned()
    });
    let identity = email.and_then(|email| {
        state
            .accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&email)
            .map(|(_, identity)| identity.clone())
    });

    match identity {
        Some(identity) => Json(identity).into_response(),
        None => rejected(StatusCode::UNAUTHORIZED, "Not signed in"),
    }
}
