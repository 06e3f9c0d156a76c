//! Caller-facing connection DTOs and the nested shape the Guacamole REST API expects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppResult;
use crate::validation::{FieldErrors, Validatable};

/// Parent group for every connection created through the proxy.
pub const ROOT_GROUP: &str = "ROOT";
pub const RDP: &str = "rdp";
pub const SSH: &str = "ssh";
/// Protocol filter that disables filtering.
pub const ALL_PROTOCOLS: &str = "all";

/// Flattened connection as the client sends and receives it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub hostname: String,
    pub username: String,
    pub password: String,
    pub port: String,
    pub protocol: String,
}

impl Validatable for ConnectionRequest {
    fn validate(&self) -> AppResult<()> {
        FieldErrors::new()
            .length("name", &self.name, 4, 255)
            .length("hostname", &self.hostname, 4, 255)
            .length("username", &self.username, 4, 255)
            .length("password", &self.password, 4, 255)
            .length("port", &self.port, 2, 255)
            .length("protocol", &self.protocol, 2, 255)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "ignore-cert", default)]
    pub ignore_cert: String,
    #[serde(default)]
    pub port: String,
}

/// Connection resource as Guacamole stores it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConnectionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub parent_identifier: String,
    #[serde(default)]
    pub parameters: ConnectionParameters,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// `"true"` for RDP, `"false"` for everything else.
pub fn ignore_cert_for(protocol: &str) -> &'static str {
    if protocol == RDP { "true" } else { "false" }
}

impl GatewayConnectionRecord {
    /// Builds the wire record under the root group. `IgnoreCert` is derived from the protocol.
    pub fn from_request(identifier: Option<String>, req: &ConnectionRequest) -> Self {
        Self {
            identifier,
            name: req.name.clone(),
            protocol: req.protocol.clone(),
            parent_identifier: ROOT_GROUP.to_string(),
            parameters: ConnectionParameters {
                hostname: req.hostname.clone(),
                username: req.username.clone(),
                password: req.password.clone(),
                ignore_cert: ignore_cert_for(&req.protocol).to_string(),
                port: req.port.clone(),
            },
            attributes: Map::new(),
        }
    }

    /// Flattens connection metadata plus its separately fetched parameter block.
    pub fn into_request(self, parameters: ConnectionParameters) -> ConnectionRequest {
        ConnectionRequest {
            id: self.identifier,
            name: self.name,
            hostname: parameters.hostname,
            username: parameters.username,
            password: parameters.password,
            port: parameters.port,
            protocol: self.protocol,
        }
    }
}

/// Entry of the connection tree under the root group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub identifier: String,
    pub name: String,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_connections: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConnectionTree {
    #[serde(default)]
    pub child_connections: Vec<ConnectionSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCreated {
    pub identifier: Option<String>,
}
