//! Store capabilities consumed by the auth flow.
//!
//! The primary store owns local accounts; the Guacamole store is the gateway's own user and
//! permission tables. Both are injected as trait objects so handles can be pooled and shared
//! across concurrent requests, and swapped for doubles in tests.

pub mod postgres;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::identity::{GuacamoleUser, LocalUser, NewUser};

/// Numeric id issued by `guacamole_entity`.
pub type EntityId = i32;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// `Ok(None)` on a lookup miss; `Err` only when the store itself failed.
    async fn find_by_email(&self, email: &str) -> AppResult<Option<LocalUser>>;

    async fn create(&self, user: NewUser) -> AppResult<LocalUser>;
}

#[async_trait]
pub trait GuacamoleStore: Send + Sync {
    /// Inserts a `USER` entity. A rejected row is `AppError::AlreadyExists`.
    async fn create_entity(&self, name: &str) -> AppResult<EntityId>;

    /// Writes the user row, then one system-permission row per permission. The two writes are
    /// not atomic; a failed permission write leaves the user row in place.
    async fn create_user_and_permissions(&self, user: &GuacamoleUser) -> AppResult<()>;

    /// Permission escalation after sign-up is not supported; implementations accept and ignore it.
    async fn add_permissions(&self, entity_id: EntityId, permissions: &[String]) -> AppResult<()>;

    /// Compensating action for a sign-up that failed after the entity was provisioned.
    async fn delete_entity(&self, entity_id: EntityId) -> AppResult<()>;
}
