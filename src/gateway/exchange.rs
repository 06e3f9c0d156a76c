use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use super::client::{decode_json, transport_error, GatewayClient};
use crate::error::{AppError, AppResult};

const OP: &str = "token exchange";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    auth_token: String,
}

/// Trades account credentials for a Guacamole session token. One attempt per call, no retry.
#[derive(Clone, Debug)]
pub struct TokenExchanger {
    client: GatewayClient,
}

impl TokenExchanger {
    pub fn new(client: GatewayClient) -> Self {
        Self { client }
    }

    pub async fn exchange(&self, username: &str, password: &str) -> AppResult<String> {
        let url = self.client.url("tokens");
        debug!(target: "gateway", %url, "requesting gateway token");
        let resp = self
            .client
            .http()
            .post(&url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| transport_error(OP, e))?;

        let status = resp.status();
        if status != StatusCode::OK {
            warn!(target: "gateway", status = status.as_u16(), "gateway refused token exchange");
            return Err(AppError::ExchangeFailed { status: status.as_u16() });
        }
        let body: TokenResponse = decode_json(OP, resp).await?;
        if body.auth_token.is_empty() {
            return Err(AppError::malformed(OP, "empty authToken"));
        }
        Ok(body.auth_token)
    }
}
