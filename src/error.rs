//! Unified application error model.
//! Every failure in the auth flow and the connection proxy is returned to the caller as one of
//! these variants; the HTTP edge maps them to status codes with `http_status`.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Error, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    #[error("{message}")]
    UserInput { message: String },
    #[error("validation failed: {}", join_fields(.errors))]
    Validation { errors: BTreeMap<String, String> },
    #[error("{message}")]
    NotFound { message: String },
    #[error("{message}")]
    AlreadyExists { message: String },
    #[error("{message}")]
    InvalidCredential { message: String },
    #[error("token is expired")]
    Expired,
    #[error("token is invalid")]
    Invalid,
    #[error("{op}: gateway unreachable: {message}")]
    Unreachable { op: String, message: String },
    #[error("{op}: gateway request failed with status {status}: {body}")]
    GatewayRejected { op: String, status: u16, body: String },
    #[error("gateway token exchange failed with status {status}")]
    ExchangeFailed { status: u16 },
    #[error("{op}: malformed gateway response: {message}")]
    MalformedResponse { op: String, message: String },
    #[error("{message}")]
    PermissionGrantFailed { message: String },
    #[error("{op}: {message}")]
    Store { op: String, message: String },
    #[error("configuration error: {message}")]
    Config { message: String },
    #[error("{message}")]
    Internal { message: String },
}

fn join_fields(errors: &BTreeMap<String, String>) -> String {
    errors.keys().cloned().collect::<Vec<_>>().join(", ")
}

impl AppError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AppError::UserInput { .. } => "bad_request",
            AppError::Validation { .. } => "validation_failed",
            AppError::NotFound { .. } => "not_found",
            AppError::AlreadyExists { .. } => "already_exists",
            AppError::InvalidCredential { .. } => "invalid_credential",
            AppError::Expired => "token_expired",
            AppError::Invalid => "token_invalid",
            AppError::Unreachable { .. } => "gateway_unreachable",
            AppError::GatewayRejected { .. } => "gateway_rejected",
            AppError::ExchangeFailed { .. } => "exchange_failed",
            AppError::MalformedResponse { .. } => "malformed_response",
            AppError::PermissionGrantFailed { .. } => "permission_grant_failed",
            AppError::Store { .. } => "store_error",
            AppError::Config { .. } => "config_error",
            AppError::Internal { .. } => "internal",
        }
    }

    /// Client-facing message. Diagnostics from the gateway and the stores stay in the logs.
    pub fn message(&self) -> String {
        match self {
            AppError::GatewayRejected { op, status, .. } => {
                format!("{op}: gateway rejected the request with status {status}")
            }
            AppError::Store { .. } | AppError::Config { .. } | AppError::Internal { .. } => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn user<S: Into<String>>(msg: S) -> Self {
        AppError::UserInput { message: msg.into() }
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        AppError::NotFound { message: msg.into() }
    }

    pub fn already_exists<S: Into<String>>(msg: S) -> Self {
        AppError::AlreadyExists { message: msg.into() }
    }

    pub fn invalid_credential<S: Into<String>>(msg: S) -> Self {
        AppError::InvalidCredential { message: msg.into() }
    }

    pub fn permission_grant_failed<S: Into<String>>(msg: S) -> Self {
        AppError::PermissionGrantFailed { message: msg.into() }
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        AppError::Config { message: msg.into() }
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        AppError::Internal { message: msg.into() }
    }

    pub fn unreachable<S: Into<String>>(op: &str, msg: S) -> Self {
        AppError::Unreachable { op: op.to_string(), message: msg.into() }
    }

    pub fn malformed<S: Into<String>>(op: &str, msg: S) -> Self {
        AppError::MalformedResponse { op: op.to_string(), message: msg.into() }
    }

    pub fn store<S: Into<String>>(op: &str, msg: S) -> Self {
        AppError::Store { op: op.to_string(), message: msg.into() }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Validation { .. } => 422,
            AppError::NotFound { .. } => 404,
            AppError::AlreadyExists { .. } => 409,
            AppError::InvalidCredential { .. } | AppError::Expired | AppError::Invalid => 401,
            AppError::Unreachable { .. } => 503,
            AppError::GatewayRejected { .. }
            | AppError::ExchangeFailed { .. }
            | AppError::MalformedResponse { .. } => 502,
            AppError::PermissionGrantFailed { .. }
            | AppError::Store { .. }
            | AppError::Config { .. }
            | AppError::Internal { .. } => 500,
        }
    }

    pub fn field_errors(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            AppError::Validation { errors } => Some(errors),
            _ => None,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
