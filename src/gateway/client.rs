use reqwest::{Method, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::error::{AppError, AppResult};

pub const TOKEN_HEADER: &str = "Guacamole-Token";

/// Shared HTTP client for the Guacamole REST API.
///
/// Cheap to clone; every request carries the configured timeout. The client never caches or
/// refreshes gateway tokens, callers pass one per request.
#[derive(Clone, Debug)]
pub struct GatewayClient {
    base: String,
    data_source: String,
    http: reqwest::Client,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> AppResult<Self> {
        Url::parse(&config.api_url).map_err(|e| {
            AppError::config(format!("invalid gateway url '{}': {e}", config.api_url))
        })?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::config(format!("http client: {e}")))?;
        Ok(Self {
            base: config.api_url.trim_end_matches('/').to_string(),
            data_source: config.data_source.clone(),
            http,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// `session/data/{data_source}/{rest}`
    pub fn data_path(&self, rest: &str) -> String {
        format!("session/data/{}/{}", urlencoding::encode(&self.data_source), rest)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Sends one token-scoped request. Status >= 400 becomes `GatewayRejected` with the body.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        op: &str,
        method: Method,
        path: &str,
        token: &str,
        body: Option<&B>,
    ) -> AppResult<Response> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::user(format!("{TOKEN_HEADER} is required")));
        }
        let url = self.url(path);
        debug!(target: "gateway", %method, %url, op, "gateway request");

        let mut req = self.http.request(method, &url).header(TOKEN_HEADER, token);
        if let Some(b) = body {
            req = req.json(b);
        }
        let resp = req.send().await.map_err(|e| transport_error(op, e))?;

        let status = resp.status();
        if status.as_u16() >= 400 {
            let body = resp.text().await.unwrap_or_default();
            warn!(target: "gateway", op, status = status.as_u16(), "gateway rejected request");
            return Err(AppError::GatewayRejected {
                op: op.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    /// Sends and decodes a JSON success body.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        op: &str,
        path: &str,
        token: &str,
    ) -> AppResult<T> {
        let resp = self.send::<()>(op, Method::GET, path, token, None).await?;
        decode_json(op, resp).await
    }
}

pub(crate) fn transport_error(op: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::unreachable(op, "request timed out")
    } else {
        AppError::unreachable(op, e.to_string())
    }
}

pub(crate) async fn decode_json<T: DeserializeOwned>(op: &str, resp: Response) -> AppResult<T> {
    let bytes = resp.bytes().await.map_err(|e| transport_error(op, e))?;
    serde_json::from_slice(&bytes).map_err(|e| AppError::malformed(op, e.to_string()))
}

/// Like `decode_json`, but an empty body is `None` rather than an error.
pub(crate) async fn decode_optional_json<T: DeserializeOwned>(
    op: &str,
    resp: Response,
) -> AppResult<Option<T>> {
    let bytes = resp.bytes().await.map_err(|e| transport_error(op, e))?;
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }
    serde_json::from_slice(&bytes).map(Some).map_err(|e| AppError::malformed(op, e.to_string()))
}
