//! Connection CRUD against the gateway, on behalf of the token holder.

use reqwest::Method;
use tracing::{info, instrument};

use super::client::{decode_optional_json, GatewayClient};
use super::model::{
    ConnectionCreated, ConnectionParameters, ConnectionRequest, ConnectionSummary, ConnectionTree,
    GatewayConnectionRecord, ALL_PROTOCOLS, ROOT_GROUP,
};
use crate::error::{AppError, AppResult};
use crate::validation::Validatable;

#[derive(Clone, Debug)]
pub struct ConnectionProxy {
    client: GatewayClient,
}

impl ConnectionProxy {
    pub fn new(client: GatewayClient) -> Self {
        Self { client }
    }

    fn tree_path(&self) -> String {
        self.client.data_path(&format!("connectionGroups/{ROOT_GROUP}/tree"))
    }

    fn collection_path(&self) -> String {
        self.client.data_path("connections")
    }

    fn item_path(&self, id: &str) -> AppResult<String> {
        let id = id.trim();
        if id.is_empty() {
            return Err(AppError::user("connection id is required"));
        }
        Ok(self.client.data_path(&format!("connections/{}", urlencoding::encode(id))))
    }

    /// Every connection under the root group, filtered by exact protocol unless `"all"`.
    #[instrument(skip_all, fields(protocol = %protocol))]
    pub async fn list(&self, token: &str, protocol: &str) -> AppResult<Vec<ConnectionSummary>> {
        let tree: ConnectionTree =
            self.client.fetch("list connections", &self.tree_path(), token).await?;
        if protocol == ALL_PROTOCOLS {
            return Ok(tree.child_connections);
        }
        Ok(tree.child_connections.into_iter().filter(|c| c.protocol == protocol).collect())
    }

    /// Metadata and parameters are separate resources; both must load.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn get(&self, token: &str, id: &str) -> AppResult<ConnectionRequest> {
        let path = self.item_path(id)?;
        let record: GatewayConnectionRecord =
            self.client.fetch("get connection", &path, token).await?;
        let params_path = format!("{path}/parameters");
        let params: ConnectionParameters =
            self.client.fetch("get connection parameters", &params_path, token).await?;
        Ok(record.into_request(params))
    }

    #[instrument(skip_all)]
    pub async fn create(
        &self,
        token: &str,
        req: &ConnectionRequest,
    ) -> AppResult<ConnectionCreated> {
        req.validate()?;
        let record = GatewayConnectionRecord::from_request(None, req);
        let resp = self
            .client
            .send("create connection", Method::POST, &self.collection_path(), token, Some(&record))
            .await?;
        let identifier = decode_optional_json::<GatewayConnectionRecord>("create connection", resp)
            .await?
            .and_then(|created| created.identifier);
        info!(
            target: "gateway",
            identifier = ?identifier,
            protocol = %req.protocol,
            "connection created"
        );
        Ok(ConnectionCreated { identifier })
    }

    #[instrument(skip_all, fields(id = %id))]
    pub async fn update(&self, token: &str, id: &str, req: &ConnectionRequest) -> AppResult<()> {
        req.validate()?;
        let path = self.item_path(id)?;
        let record = GatewayConnectionRecord::from_request(Some(id.trim().to_string()), req);
        self.client.send("update connection", Method::PUT, &path, token, Some(&record)).await?;
        info!(target: "gateway", id, "connection updated");
        Ok(())
    }

    #[instrument(skip_all, fields(id = %id))]
    pub async fn delete(&self, token: &str, id: &str) -> AppResult<()> {
        let path = self.item_path(id)?;
        self.client.send::<()>("delete connection", Method::DELETE, &path, token, None).await?;
        info!(target: "gateway", id, "connection deleted");
        Ok(())
    }
}
