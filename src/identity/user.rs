use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::validation::{FieldErrors, Validatable};

/// Account of record in the primary store. `password` holds the Argon2 PHC string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for the primary store; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

impl Validatable for SignInRequest {
    fn validate(&self) -> AppResult<()> {
        FieldErrors::new()
            .email("email", &self.email)
            .required("password", &self.password)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Validatable for SignUpRequest {
    fn validate(&self) -> AppResult<()> {
        FieldErrors::new()
            .length("name", self.name.trim(), 2, 255)
            .email("email", &self.email)
            .length("password", self.password.trim(), 6, 255)
            .finish()
    }
}

/// Both bearer values handed back by a successful sign-in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub token: String,
    pub guac_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<&LocalUser> for UserProfile {
    fn from(user: &LocalUser) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            created_at: user.created_at,
        }
    }
}
