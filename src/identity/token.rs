//! Local access tokens: HMAC-signed JWTs binding an email to an expiry.
//!
//! Verification reads the claims before checking the signature so that an expired token is
//! reported as `Expired` even when its signature is also wrong. A token whose claims cannot be
//! read at all is `Invalid`.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::JwtConfig;
use crate::error::{AppError, AppResult};
use crate::identity::LocalUser;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subject {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Subject,
    #[serde(default)]
    pub iat: u64,
    pub exp: u64,
}

pub struct TokenIssuer {
    ttl: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Strips an optional `Bearer ` prefix and surrounding whitespace.
pub fn strip_bearer(raw: &str) -> &str {
    let raw = raw.trim();
    raw.strip_prefix(BEARER_PREFIX).unwrap_or(raw).trim()
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            ttl: config.ttl.clone(),
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
        }
    }

    pub fn issue(&self, user: &LocalUser) -> AppResult<String> {
        let ttl = humantime::parse_duration(self.ttl.trim())
            .map_err(|e| {
                AppError::config(format!("invalid access token ttl '{}': {e}", self.ttl))
            })?;
        let iat = now_secs();
        let claims = Claims {
            sub: Subject { email: user.email.clone() },
            iat,
            exp: iat + ttl.as_secs(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::internal(format!("token signing failed: {e}")))
    }

    pub fn verify(&self, raw: &str) -> AppResult<Claims> {
        let token = strip_bearer(raw);

        let unverified = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &claims_only())
            .map_err(|_| AppError::Invalid)?;
        if unverified.claims.exp < now_secs() {
            return Err(AppError::Expired);
        }

        let verified =
            decode::<Claims>(token, &self.decoding, &strict()).map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::Expired,
                _ => AppError::Invalid,
            })?;
        Ok(verified.claims)
    }
}

/// Reads the payload without looking at the signature or the expiry.
fn claims_only() -> Validation {
    let mut v = Validation::new(Algorithm::HS256);
    v.insecure_disable_signature_validation();
    v.validate_exp = false;
    v.required_spec_claims.clear();
    v
}

/// Any HMAC variant signed with our secret, expiry enforced with no leeway.
fn strict() -> Validation {
    let mut v = Validation::new(Algorithm::HS256);
    v.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
    v.leeway = 0;
    v.set_required_spec_claims(&["exp"]);
    v
}
