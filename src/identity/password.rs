use argon2::{Algorithm, Argon2, Params, PasswordHasher as _, PasswordVerifier, Version};
use password_hash::{PasswordHash, SaltString};

use crate::config::PasswordConfig;
use crate::error::{AppError, AppResult};

/// Adaptive hashing for the local account store (Argon2id, PHC string output).
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(config: PasswordConfig) -> AppResult<Self> {
        let params = Params::new(config.memory_kib, config.cost, Params::DEFAULT_P_COST, None)
            .map_err(|e| AppError::config(format!("invalid password hashing parameters: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, password: &str) -> AppResult<String> {
        let mut salt_bytes = [0u8; 16];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| AppError::internal(e.to_string()))?;
        let salt =
            SaltString::encode_b64(&salt_bytes).map_err(|e| AppError::internal(e.to_string()))?;
        let phc = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::internal(e.to_string()))?
            .to_string();
        Ok(phc)
    }

    /// Verification reads the parameters embedded in the stored hash, so hashes written under an
    /// older cost still verify.
    pub fn verify(&self, hash: &str, password: &str) -> bool {
        if let Ok(parsed) = PasswordHash::new(hash) {
            self.argon2().verify_password(password.as_bytes(), &parsed).is_ok()
        } else {
            false
        }
    }
}
