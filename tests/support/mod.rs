//! Shared fixtures for the integration tests: in-memory stores and a fake Guacamole REST API
//! served in-process on an ephemeral localhost port.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use deskgate::config::{GatewayConfig, JwtConfig, PasswordConfig, SignupConfig};
use deskgate::error::{AppError, AppResult};
use deskgate::gateway::{
    ConnectionProxy, GatewayClient, GatewayConnectionRecord, TokenExchanger, TOKEN_HEADER,
};
use deskgate::identity::{
    salted_digest_hex, AuthService, CredentialProvisioner, GuacamoleUser, LocalUser, NewUser,
    PasswordHasher, TokenIssuer,
};
use deskgate::server::AppState;
use deskgate::storage::{EntityId, GuacamoleStore, UserStore};

pub mod pg_wire;

pub const JWT_SECRET: &str = "integration-secret";

/// How long a stalled fake gateway sits on a request before answering.
pub const STALL: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------------------------
// primary store
// ---------------------------------------------------------------------------------------------

#[derive(Default)]
pub struct MemUserStore {
    users: Mutex<Vec<LocalUser>>,
    next_id: AtomicI64,
    pub fail_create: AtomicBool,
    pub fail_lookup: AtomicBool,
}

impl MemUserStore {
    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn get(&self, email: &str) -> Option<LocalUser> {
        self.users.lock().iter().find(|u| u.email == email).cloned()
    }
}

#[async_trait]
impl UserStore for MemUserStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<LocalUser>> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(AppError::store("find user by email", "connection reset"));
        }
        Ok(self.get(email))
    }

    async fn create(&self, user: NewUser) -> AppResult<LocalUser> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AppError::store("create user", "disk full"));
        }
        let mut users = self.users.lock();
        if users.iter().any(|u| u.email == user.email) {
            return Err(AppError::already_exists("user with this email already exists"));
        }
        let created = LocalUser {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            name: user.name,
            email: user.email,
            password: user.password_hash,
            created_at: chrono::Utc::now(),
        };
        users.push(created.clone());
        Ok(created)
    }
}

// ---------------------------------------------------------------------------------------------
// Guacamole store
// ---------------------------------------------------------------------------------------------

#[derive(Default)]
pub struct MemGuacStore {
    next_id: AtomicI32,
    entities: Mutex<BTreeMap<EntityId, String>>,
    users: Mutex<Vec<GuacamoleUser>>,
    deleted: Mutex<Vec<EntityId>>,
    pub grant_calls: AtomicUsize,
    pub fail_user: AtomicBool,
    pub fail_permissions: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl MemGuacStore {
    pub fn entity_count(&self) -> usize {
        self.entities.lock().len()
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().len()
    }

    pub fn deleted(&self) -> Vec<EntityId> {
        self.deleted.lock().clone()
    }

    /// Every write this store has accepted, including compensating deletes.
    pub fn mutations(&self) -> usize {
        self.entity_count() + self.user_count() + self.deleted.lock().len()
    }

    pub fn find_user(&self, username: &str) -> Option<GuacamoleUser> {
        self.users.lock().iter().find(|u| u.username == username).cloned()
    }

    /// What Guacamole's JDBC auth does on login: recompute the salted digest and compare.
    pub fn check_password(&self, username: &str, password: &str) -> bool {
        self.find_user(username)
            .map(|u| salted_digest_hex(password, &u.salt_hex) == u.password_hex)
            .unwrap_or(false)
    }
}

#[async_trait]
impl GuacamoleStore for MemGuacStore {
    async fn create_entity(&self, name: &str) -> AppResult<EntityId> {
        let mut entities = self.entities.lock();
        if entities.values().any(|n| n == name) {
            return Err(AppError::already_exists("guacamole user with this name already exists"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        entities.insert(id, name.to_string());
        Ok(id)
    }

    async fn create_user_and_permissions(&self, user: &GuacamoleUser) -> AppResult<()> {
        if self.fail_user.load(Ordering::SeqCst) {
            return Err(AppError::store(
                "create guacamole user",
                "guacamole account was not created",
            ));
        }
        self.users.lock().push(user.clone());
        if self.fail_permissions.load(Ordering::SeqCst) {
            return Err(AppError::permission_grant_failed(
                "granting CREATE_CONNECTION: enum mismatch",
            ));
        }
        Ok(())
    }

    async fn add_permissions(
        &self,
        _entity_id: EntityId,
        _permissions: &[String],
    ) -> AppResult<()> {
        self.grant_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_entity(&self, entity_id: EntityId) -> AppResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AppError::store("delete guacamole entity", "lock timeout"));
        }
        self.entities.lock().remove(&entity_id);
        self.users.lock().retain(|u| u.id != entity_id);
        self.deleted.lock().push(entity_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------------------------
// fake Guacamole REST API
// ---------------------------------------------------------------------------------------------

#[derive(Default)]
pub struct GatewayState {
    accounts: Mutex<HashMap<String, String>>,
    guac: Mutex<Option<Arc<MemGuacStore>>>,
    tokens: Mutex<HashSet<String>>,
    connections: Mutex<BTreeMap<u32, GatewayConnectionRecord>>,
    next_token: AtomicU32,
    next_id: AtomicU32,
    pub hits: AtomicUsize,
    pub fail_parameters: AtomicBool,
    pub malformed_tree: AtomicBool,
    pub empty_create_body: AtomicBool,
    pub token_without_auth_token: AtomicBool,
    /// `/tokens` answers 204 with no body.
    pub token_no_content: AtomicBool,
    /// `/tokens` and the tree endpoint wait `STALL` before answering.
    pub stall: AtomicBool,
}

pub struct FakeGateway {
    pub url: String,
    pub state: Arc<GatewayState>,
    handle: JoinHandle<()>,
}

impl Drop for FakeGateway {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl FakeGateway {
    pub async fn start() -> Self {
        let state = Arc::new(GatewayState::default());
        let app = Router::new()
            .route("/api/tokens", post(issue_token))
            .route("/api/session/data/{ds}/connectionGroups/{group}/tree", get(tree))
            .route("/api/session/data/{ds}/connections", post(create_connection))
            .route(
                "/api/session/data/{ds}/connections/{id}",
                get(get_connection).put(update_connection).delete(delete_connection),
            )
            .route("/api/session/data/{ds}/connections/{id}/parameters", get(get_parameters))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind 127.0.0.1:0");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("fake gateway error: {e:?}");
            }
        });
        Self { url: format!("http://{addr}/api"), state, handle }
    }

    /// Lets `/tokens` authenticate against the shadow accounts written by the provisioner.
    pub fn backed_by(&self, guac: Arc<MemGuacStore>) {
        *self.state.guac.lock() = Some(guac);
    }

    pub fn add_account(&self, username: &str, password: &str) {
        self.state.accounts.lock().insert(username.to_string(), password.to_string());
    }

    /// A session token the connection endpoints accept, without going through `/tokens`.
    pub fn session_token(&self) -> String {
        let token = format!("session-{}", self.state.next_token.fetch_add(1, Ordering::SeqCst));
        self.state.tokens.lock().insert(token.clone());
        token
    }

    pub fn connection(&self, id: &str) -> Option<GatewayConnectionRecord> {
        let id: u32 = id.parse().ok()?;
        self.state.connections.lock().get(&id).cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.state.connections.lock().len()
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }
}

fn denied() -> Response {
    let body = json!({"message": "Permission Denied.", "type": "PERMISSION_DENIED"});
    (StatusCode::FORBIDDEN, Json(body)).into_response()
}

fn not_found() -> Response {
    let body = json!({"message": "No such connection.", "type": "NOT_FOUND"});
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

async fn maybe_stall(state: &GatewayState) {
    if state.stall.load(Ordering::SeqCst) {
        tokio::time::sleep(STALL).await;
    }
}

fn authorized(state: &GatewayState, headers: &HeaderMap) -> bool {
    state.hits.fetch_add(1, Ordering::SeqCst);
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|t| state.tokens.lock().contains(t))
        .unwrap_or(false)
}

async fn issue_token(
    State(state): State<Arc<GatewayState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    maybe_stall(&state).await;
    if state.token_no_content.load(Ordering::SeqCst) {
        return StatusCode::NO_CONTENT.into_response();
    }
    let username = form.get("username").cloned().unwrap_or_default();
    let password = form.get("password").cloned().unwrap_or_default();

    let known = state.accounts.lock().get(&username) == Some(&password);
    let shadow = state
        .guac
        .lock()
        .as_ref()
        .map(|g| g.check_password(&username, &password))
        .unwrap_or(false);
    if !known && !shadow {
        let body = json!({"message": "Invalid login.", "type": "INVALID_CREDENTIALS"});
        return (StatusCode::FORBIDDEN, Json(body)).into_response();
    }
    if state.token_without_auth_token.load(Ordering::SeqCst) {
        return Json(json!({"username": username, "dataSource": "postgresql"})).into_response();
    }
    let token = format!("guac-{}", state.next_token.fetch_add(1, Ordering::SeqCst));
    state.tokens.lock().insert(token.clone());
    Json(json!({
        "authToken": token,
        "username": username,
        "dataSource": "postgresql",
        "availableDataSources": ["postgresql"]
    }))
    .into_response()
}

async fn tree(
    State(state): State<Arc<GatewayState>>,
    Path((ds, group)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return denied();
    }
    if ds != "postgresql" || group != "ROOT" {
        return not_found();
    }
    maybe_stall(&state).await;
    if state.malformed_tree.load(Ordering::SeqCst) {
        return (StatusCode::OK, "<html>maintenance</html>").into_response();
    }
    let children: Vec<_> = state
        .connections
        .lock()
        .iter()
        .map(|(id, rec)| {
            json!({
                "identifier": id.to_string(),
                "name": rec.name,
                "protocol": rec.protocol,
                "parentIdentifier": rec.parent_identifier,
                "activeConnections": 0,
                "attributes": {}
            })
        })
        .collect();
    let mut body = json!({"name": "ROOT", "identifier": "ROOT", "type": "ORGANIZATIONAL"});
    if !children.is_empty() {
        body["childConnections"] = json!(children);
    }
    Json(body).into_response()
}

async fn create_connection(
    State(state): State<Arc<GatewayState>>,
    Path(_ds): Path<String>,
    headers: HeaderMap,
    Json(mut rec): Json<GatewayConnectionRecord>,
) -> Response {
    if !authorized(&state, &headers) {
        return denied();
    }
    let id = state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    rec.identifier = Some(id.to_string());
    state.connections.lock().insert(id, rec.clone());
    if state.empty_create_body.load(Ordering::SeqCst) {
        return StatusCode::OK.into_response();
    }
    Json(rec).into_response()
}

fn parse_id(id: &str) -> Option<u32> {
    id.parse().ok()
}

async fn get_connection(
    State(state): State<Arc<GatewayState>>,
    Path((_ds, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return denied();
    }
    let Some(rec) = parse_id(&id).and_then(|id| state.connections.lock().get(&id).cloned()) else {
        return not_found();
    };
    // metadata only; parameters are a separate resource
    Json(json!({
        "identifier": rec.identifier,
        "name": rec.name,
        "protocol": rec.protocol,
        "parentIdentifier": rec.parent_identifier,
        "activeConnections": 0,
        "attributes": {}
    }))
    .into_response()
}

async fn get_parameters(
    State(state): State<Arc<GatewayState>>,
    Path((_ds, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return denied();
    }
    if state.fail_parameters.load(Ordering::SeqCst) {
        let body = json!({"message": "parameter lookup failed"});
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
    }
    match parse_id(&id).and_then(|id| state.connections.lock().get(&id).cloned()) {
        Some(rec) => Json(rec.parameters).into_response(),
        None => not_found(),
    }
}

async fn update_connection(
    State(state): State<Arc<GatewayState>>,
    Path((_ds, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(rec): Json<GatewayConnectionRecord>,
) -> Response {
    if !authorized(&state, &headers) {
        return denied();
    }
    let Some(key) = parse_id(&id) else { return not_found() };
    let mut connections = state.connections.lock();
    match connections.get_mut(&key) {
        Some(existing) => {
            *existing = GatewayConnectionRecord { identifier: Some(id), ..rec };
            StatusCode::NO_CONTENT.into_response()
        }
        None => not_found(),
    }
}

async fn delete_connection(
    State(state): State<Arc<GatewayState>>,
    Path((_ds, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return denied();
    }
    match parse_id(&id).and_then(|id| state.connections.lock().remove(&id)) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(),
    }
}

// ---------------------------------------------------------------------------------------------
// wiring
// ---------------------------------------------------------------------------------------------

pub fn gateway_client(url: &str) -> GatewayClient {
    gateway_client_with_timeout(url, Duration::from_secs(2))
}

pub fn gateway_client_with_timeout(url: &str, timeout: Duration) -> GatewayClient {
    let mut cfg = GatewayConfig::new(url);
    cfg.timeout = timeout;
    GatewayClient::new(&cfg).expect("gateway client")
}

/// A localhost URL with nothing listening behind it.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}/api")
}

pub fn fast_hasher() -> PasswordHasher {
    PasswordHasher::new(PasswordConfig { cost: 1, memory_kib: 64 }).expect("argon2 params")
}

pub fn token_issuer(ttl: &str) -> TokenIssuer {
    TokenIssuer::new(&JwtConfig { secret: JWT_SECRET.to_string(), ttl: ttl.to_string() })
}

pub struct Harness {
    pub users: Arc<MemUserStore>,
    pub guac: Arc<MemGuacStore>,
    pub gateway: FakeGateway,
    pub provisioner: CredentialProvisioner,
    pub auth: Arc<AuthService>,
    pub proxy: Arc<ConnectionProxy>,
}

impl Harness {
    pub async fn start() -> Self {
        Self::with_signup(SignupConfig::default()).await
    }

    pub async fn with_signup(signup: SignupConfig) -> Self {
        let users = Arc::new(MemUserStore::default());
        let guac = Arc::new(MemGuacStore::default());
        let gateway = FakeGateway::start().await;
        gateway.backed_by(guac.clone());

        let client = gateway_client(&gateway.url);
        let provisioner = CredentialProvisioner::new(guac.clone());
        let auth = AuthService::new(
            users.clone(),
            provisioner.clone(),
            fast_hasher(),
            token_issuer("15m"),
            TokenExchanger::new(client.clone()),
            signup,
        );
        Self {
            users,
            guac,
            gateway,
            provisioner,
            auth: Arc::new(auth),
            proxy: Arc::new(ConnectionProxy::new(client)),
        }
    }

    pub fn state(&self) -> AppState {
        AppState { auth: self.auth.clone(), connections: self.proxy.clone() }
    }
}
