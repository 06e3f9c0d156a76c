//!
//! deskgate HTTP server
//! --------------------
//! Axum router for the auth and connection endpoints.
//!
//! Responsibilities:
//! - Sign-up / sign-in delegating to `AuthService`.
//! - Bearer verification middleware for everything under `/users` and `/sessions`.
//! - Connection CRUD delegating to `ConnectionProxy`, scoped by the caller's `Guacamole-Token`.
//! - Mapping `AppError` onto status codes and the `{data, message, errors}` envelope.

pub mod auth;
pub mod sessions;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::gateway::{ConnectionProxy, GatewayClient, TokenExchanger, TOKEN_HEADER};
use crate::identity::{AuthService, CredentialProvisioner, PasswordHasher, TokenIssuer};
use crate::storage::postgres::{self, PgGuacamoleStore, PgUserStore};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub connections: Arc<ConnectionProxy>,
}

/// Response envelope used by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self { data: Some(data), message: None, errors: None }
    }
}

impl ApiResponse<()> {
    pub fn message<S: Into<String>>(msg: S) -> Self {
        Self { data: None, message: Some(msg.into()), errors: None }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(target: "http", code = self.code_str(), error = %self, "request failed");
        } else {
            warn!(target: "http", code = self.code_str(), error = %self, "request rejected");
        }
        let body = ApiResponse::<()> {
            data: None,
            message: Some(self.message()),
            errors: self.field_errors().cloned(),
        };
        (status, Json(body)).into_response()
    }
}

/// Unwraps a JSON body, reporting undecodable input as a 400 in the envelope.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(v)| v).map_err(|e| AppError::user(format!("invalid JSON: {}", e.body_text())))
}

/// The caller's gateway token; required on every `/sessions` call.
pub fn guacamole_token(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::user(format!("{TOKEN_HEADER} is required")))
}

/// Verifies the local bearer token and attaches its `Claims` to the request.
async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let raw = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if raw.trim().is_empty() {
        return AppError::Invalid.into_response();
    }
    match state.auth.authenticate(&raw) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/users/current", get(auth::current_user))
        .route("/sessions", get(sessions::index).post(sessions::store))
        .route("/sessions/", get(sessions::index).post(sessions::store))
        .route("/sessions/{id}/edit", get(sessions::edit))
        .route("/sessions/{id}", axum::routing::put(sessions::update).delete(sessions::destroy))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api = Router::new()
        .route("/auth/sign-in", post(auth::sign_in))
        .route("/auth/sign-up", post(auth::sign_up))
        .merge(protected);

    Router::new()
        .route("/", get(|| async { "deskgate ok" }))
        .nest("/api/v1", api)
        .with_state(state)
}

/// Wires the stores, the gateway client and the services from `config`.
pub async fn build_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let users_db = postgres::connect(&config.database).await.context("primary database")?;
    let guac_db = postgres::connect(&config.guacamole_database)
        .await
        .context("guacamole database")?;

    let gateway = GatewayClient::new(&config.gateway)?;
    let auth = AuthService::new(
        Arc::new(PgUserStore::new(users_db)),
        CredentialProvisioner::new(Arc::new(PgGuacamoleStore::new(guac_db))),
        PasswordHasher::new(config.password)?,
        TokenIssuer::new(&config.jwt),
        TokenExchanger::new(gateway.clone()),
        config.signup,
    );
    Ok(AppState { auth: Arc::new(auth), connections: Arc::new(ConnectionProxy::new(gateway)) })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => { s.recv().await; }
            Err(e) => error!("failed to listen for SIGTERM: {}", e),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!(target: "startup", "shutdown signal received");
}

/// Start the HTTP server and serve until Ctrl-C / SIGTERM.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let state = build_state(&config).await?;
    let app = router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!(target: "startup", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}
