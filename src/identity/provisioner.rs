use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::storage::{EntityId, GuacamoleStore};

/// Baseline system permission granted to every shadow identity.
pub const CREATE_CONNECTION: &str = "CREATE_CONNECTION";

const SALT_LEN: usize = 32;

/// Shadow record inside Guacamole's own user model. Only the salted digest is stored there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuacamoleUser {
    pub id: EntityId,
    pub username: String,
    pub password_hex: String,
    pub salt_hex: String,
    pub permissions: Vec<String>,
}

impl GuacamoleUser {
    /// Builds the record with a fresh salt and the digest Guacamole's JDBC auth expects.
    pub fn with_password(
        id: EntityId,
        username: &str,
        password: &str,
        permissions: Vec<String>,
    ) -> AppResult<Self> {
        let salt_hex = generate_salt_hex()?;
        let password_hex = salted_digest_hex(password, &salt_hex);
        Ok(Self { id, username: username.to_string(), password_hex, salt_hex, permissions })
    }
}

/// 32 random bytes, upper-case hex.
pub fn generate_salt_hex() -> AppResult<String> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt)
        .map_err(|e| AppError::internal(format!("salt generation failed: {e}")))?;
    Ok(hex::encode_upper(salt))
}

/// `SHA-256(password || salt_hex)`, upper-case hex.
pub fn salted_digest_hex(password: &str, salt_hex: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt_hex.as_bytes());
    hex::encode_upper(hasher.finalize())
}

/// Registers shadow identities in the Guacamole database.
#[derive(Clone)]
pub struct CredentialProvisioner {
    store: Arc<dyn GuacamoleStore>,
}

impl CredentialProvisioner {
    pub fn new(store: Arc<dyn GuacamoleStore>) -> Self {
        Self { store }
    }

    pub async fn provision(&self, email: &str) -> AppResult<EntityId> {
        let id = self.store.create_entity(email).await?;
        debug!(target: "provisioner", entity_id = id, "guacamole entity created");
        Ok(id)
    }

    pub async fn register(
        &self,
        entity_id: EntityId,
        email: &str,
        password: &str,
    ) -> AppResult<GuacamoleUser> {
        let permissions = vec![CREATE_CONNECTION.to_string()];
        let user = GuacamoleUser::with_password(entity_id, email, password, permissions)?;
        self.store.create_user_and_permissions(&user).await?;
        debug!(target: "provisioner", entity_id, "guacamole user and permissions written");
        Ok(user)
    }

    pub async fn grant(&self, entity_id: EntityId, permissions: &[String]) -> AppResult<()> {
        self.store.add_permissions(entity_id, permissions).await
    }

    /// Best effort: a failed cleanup is logged, the original error is what the caller reports.
    pub async fn revoke(&self, entity_id: EntityId) {
        if let Err(e) = self.store.delete_entity(entity_id).await {
            warn!(
                target: "provisioner",
                entity_id,
                error = %e,
                "orphaned guacamole entity could not be removed"
            );
        }
    }
}
