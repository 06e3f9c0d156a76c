//! Sign-up and sign-in across the two identity stores.
//!
//! Sign-up:  check email unique -> provision entity -> register shadow user -> hash -> persist.
//! Sign-in:  lookup -> verify password -> issue local token -> exchange for gateway token.
//!
//! Nothing here is atomic across stores. With `compensate_on_failure` off (the default) a
//! sign-up that fails after provisioning leaves the Guacamole entity behind.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::SignupConfig;
use crate::error::{AppError, AppResult};
use crate::gateway::TokenExchanger;
use crate::storage::{EntityId, UserStore};
use crate::validation::Validatable;

use super::password::PasswordHasher;
use super::provisioner::CredentialProvisioner;
use super::token::{Claims, TokenIssuer};
use super::user::{LocalUser, NewUser, SignInRequest, SignUpRequest, TokenPair, UserProfile};

pub struct AuthService {
    users: Arc<dyn UserStore>,
    provisioner: CredentialProvisioner,
    hasher: PasswordHasher,
    tokens: TokenIssuer,
    exchanger: TokenExchanger,
    signup: SignupConfig,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        provisioner: CredentialProvisioner,
        hasher: PasswordHasher,
        tokens: TokenIssuer,
        exchanger: TokenExchanger,
        signup: SignupConfig,
    ) -> Self {
        Self { users, provisioner, hasher, tokens, exchanger, signup }
    }

    #[instrument(skip_all, fields(email = %req.email))]
    pub async fn sign_in(&self, req: &SignInRequest) -> AppResult<TokenPair> {
        req.validate()?;
        let user = self
            .users
            .find_by_email(&req.email)
            .await?
            .ok_or_else(|| AppError::not_found("user not found"))?;

        if !self.hasher.verify(&user.password, req.password.trim()) {
            return Err(AppError::invalid_credential("password is not valid"));
        }

        let token = self.tokens.issue(&user)?;
        let guac_token = self.exchanger.exchange(&req.email, &req.password).await?;
        info!(target: "auth", user_id = user.id, "signed in");
        Ok(TokenPair { token, guac_token })
    }

    #[instrument(skip_all, fields(email = %req.email))]
    pub async fn sign_up(&self, req: &SignUpRequest) -> AppResult<LocalUser> {
        req.validate()?;
        // Checked before touching the Guacamole database so the common rejection leaves no orphan.
        if self.users.find_by_email(&req.email).await?.is_some() {
            return Err(AppError::already_exists("user with this email already exists"));
        }

        let entity_id = self.provisioner.provision(&req.email).await?;
        match self.finish_sign_up(entity_id, req).await {
            Ok(user) => {
                info!(target: "auth", user_id = user.id, entity_id, "signed up");
                Ok(user)
            }
            Err(e) => {
                if self.signup.compensate_on_failure {
                    warn!(
                        target: "auth",
                        entity_id,
                        error = %e,
                        "sign-up failed, removing guacamole entity"
                    );
                    self.provisioner.revoke(entity_id).await;
                } else {
                    warn!(
                        target: "auth",
                        entity_id,
                        error = %e,
                        "sign-up failed after guacamole entity was provisioned"
                    );
                }
                Err(e)
            }
        }
    }

    async fn finish_sign_up(
        &self,
        entity_id: EntityId,
        req: &SignUpRequest,
    ) -> AppResult<LocalUser> {
        self.provisioner.register(entity_id, &req.email, &req.password).await?;
        let password_hash = self.hasher.hash(req.password.trim())?;
        self.users
            .create(NewUser {
                name: req.name.trim().to_string(),
                email: req.email.clone(),
                password_hash,
            })
            .await
    }

    pub async fn current_user(&self, email: &str) -> AppResult<UserProfile> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::not_found("user not found"))?;
        Ok(UserProfile::from(&user))
    }

    pub fn authenticate(&self, raw_bearer: &str) -> AppResult<Claims> {
        self.tokens.verify(raw_bearer)
    }
}
