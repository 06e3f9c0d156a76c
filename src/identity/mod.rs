//! Local accounts, their Guacamole shadow identities and local access tokens.
//! Keep the public surface thin and split implementation across sub-modules.

mod auth;
mod password;
mod provisioner;
mod token;
mod user;

pub use auth::AuthService;
pub use password::PasswordHasher;
pub use provisioner::{
    generate_salt_hex, salted_digest_hex, CredentialProvisioner, GuacamoleUser, CREATE_CONNECTION,
};
pub use token::{strip_bearer, Claims, Subject, TokenIssuer};
pub use user::{LocalUser, NewUser, SignInRequest, SignUpRequest, TokenPair, UserProfile};
