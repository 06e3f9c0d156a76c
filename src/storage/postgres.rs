//! tokio-postgres backed stores.
//!
//! One `Client` per database, shared behind an `Arc`; tokio-postgres pipelines concurrent
//! queries over it so handlers never wait on each other for a connection.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::FromSql;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{error, info};

use super::{EntityId, GuacamoleStore, UserStore};
use crate::config::DbConfig;
use crate::error::{AppError, AppResult};
use crate::identity::{GuacamoleUser, LocalUser, NewUser};

pub async fn connect(config: &DbConfig) -> Result<Arc<Client>> {
    let (client, conn) = config
        .pg_config()?
        .connect(NoTls)
        .await
        .with_context(|| {
            format!("connecting to postgres at {}:{}/{}", config.host, config.port, config.name)
        })?;
    let target = format!("{}/{}", config.host, config.name);
    // drive the connection in background
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            error!(target: "storage", db = %target, error = %e, "postgres connection closed");
        }
    });
    info!(target: "storage", host = %config.host, db = %config.name, "postgres connected");
    Ok(Arc::new(client))
}

fn is_unique_violation(e: &tokio_postgres::Error) -> bool {
    e.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

fn db_error(op: &str, e: tokio_postgres::Error) -> AppError {
    AppError::store(op, e.to_string())
}

const USER_COLUMNS: &str = "id, name, email, password, created_at";

/// Typed column read; a missing column or a type mismatch is a store error, not a panic.
fn column<'a, T>(row: &'a Row, op: &str, name: &str) -> AppResult<T>
where
    T: FromSql<'a>,
{
    row.try_get(name).map_err(|e| AppError::store(op, format!("column {name}: {e}")))
}

fn user_from_row(row: &Row) -> AppResult<LocalUser> {
    const OP: &str = "decode user row";
    Ok(LocalUser {
        id: column(row, OP, "id")?,
        name: column(row, OP, "name")?,
        email: column(row, OP, "email")?,
        password: column(row, OP, "password")?,
        created_at: column(row, OP, "created_at")?,
    })
}

pub struct PgUserStore {
    client: Arc<Client>,
}

impl PgUserStore {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<LocalUser>> {
        let q = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 LIMIT 1");
        let row = self
            .client
            .query_opt(q.as_str(), &[&email])
            .await
            .map_err(|e| db_error("find user by email", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn create(&self, user: NewUser) -> AppResult<LocalUser> {
        let q = format!(
            "INSERT INTO users (name, email, password, created_at) \
             VALUES ($1, $2, $3, CURRENT_TIMESTAMP) RETURNING {USER_COLUMNS}"
        );
        let row = self
            .client
            .query_one(q.as_str(), &[&user.name, &user.email, &user.password_hash])
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::already_exists("user with this email already exists")
                } else {
                    db_error("create user", e)
                }
            })?;
        user_from_row(&row)
    }
}

pub struct PgGuacamoleStore {
    client: Arc<Client>,
}

impl PgGuacamoleStore {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

const INSERT_ENTITY: &str =
    "INSERT INTO guacamole_entity (name, type) VALUES ($1, 'USER') RETURNING entity_id";

const INSERT_USER: &str = "INSERT INTO guacamole_user \
     (entity_id, password_hash, password_salt, password_date, disabled, expired) \
     VALUES ($1, decode($2, 'hex'), decode($3, 'hex'), CURRENT_TIMESTAMP, false, false)";

const INSERT_SYSTEM_PERMISSION: &str = "INSERT INTO guacamole_system_permission \
     (entity_id, permission) \
     VALUES ($1, $2::text::guacamole_system_permission_type)";

const DELETE_ENTITY: &str = "DELETE FROM guacamole_entity WHERE entity_id = $1";

#[async_trait]
impl GuacamoleStore for PgGuacamoleStore {
    async fn create_entity(&self, name: &str) -> AppResult<EntityId> {
        let row = self.client.query_one(INSERT_ENTITY, &[&name]).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::already_exists("guacamole user with this name already exists")
            } else {
                db_error("create guacamole entity", e)
            }
        })?;
        column(&row, "create guacamole entity", "entity_id")
    }

    async fn create_user_and_permissions(&self, user: &GuacamoleUser) -> AppResult<()> {
        let n = self
            .client
            .execute(INSERT_USER, &[&user.id, &user.password_hex, &user.salt_hex])
            .await
            .map_err(|e| db_error("create guacamole user", e))?;
        if n == 0 {
            return Err(AppError::store(
                "create guacamole user",
                "guacamole account was not created",
            ));
        }

        for permission in &user.permissions {
            let n = self
                .client
                .execute(INSERT_SYSTEM_PERMISSION, &[&user.id, permission])
                .await
                .map_err(|e| {
                    AppError::permission_grant_failed(format!("granting {permission}: {e}"))
                })?;
            if n == 0 {
                return Err(AppError::permission_grant_failed(format!(
                    "permission {permission} for guacamole account was not created"
                )));
            }
        }
        Ok(())
    }

    async fn add_permissions(
        &self,
        _entity_id: EntityId,
        _permissions: &[String],
    ) -> AppResult<()> {
        Ok(())
    }

    async fn delete_entity(&self, entity_id: EntityId) -> AppResult<()> {
        self.client
            .execute(DELETE_ENTITY, &[&entity_id])
            .await
            .map_err(|e| db_error("delete guacamole entity", e))?;
        Ok(())
    }
}
