//! Server configuration.
//!
//! Everything is read once at startup into an explicit `ServerConfig`; components receive the
//! sub-config they need through their constructors. A missing secret, an unparsable TTL or a
//! bad gateway URL aborts startup.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use tokio_postgres::config::SslMode;

/// Fixed timeout for every outbound call to the gateway.
pub const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub log_filter: String,
    pub password: PasswordConfig,
    pub jwt: JwtConfig,
    pub gateway: GatewayConfig,
    pub signup: SignupConfig,
    pub database: DbConfig,
    pub guacamole_database: DbConfig,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    /// Duration string such as `15m` or `24h`.
    pub ttl: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordConfig {
    /// Argon2 iteration count.
    pub cost: u32,
    pub memory_kib: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self { cost: 2, memory_kib: argon2::Params::DEFAULT_M_COST }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_url: String,
    /// Guacamole auth backend used in `session/data/{data_source}/...` paths.
    pub data_source: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new<S: Into<String>>(api_url: S) -> Self {
        Self {
            api_url: api_url.into(),
            data_source: "postgresql".to_string(),
            timeout: GATEWAY_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SignupConfig {
    /// Delete the freshly provisioned Guacamole entity when a later sign-up step fails.
    pub compensate_on_failure: bool,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub name: String,
    /// `disable` or `prefer`; connections are made without TLS.
    pub ssl_mode: String,
}

impl DbConfig {
    /// Typed connection settings. Values go through the builder setters, so passwords or
    /// names containing spaces, quotes or backslashes are passed through untouched.
    pub fn pg_config(&self) -> Result<tokio_postgres::Config> {
        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&self.host)
            .port(self.port)
            .user(&self.username)
            .password(&self.password)
            .dbname(&self.name)
            .ssl_mode(parse_ssl_mode(&self.ssl_mode)?);
        Ok(cfg)
    }

    fn from_lookup<F>(prefix: &str, lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(&format!("{prefix}_{key}")).unwrap_or_else(|| default.to_string())
        };
        let port = get("PORT", "5432");
        let port = port
            .trim()
            .parse::<u16>()
            .with_context(|| format!("invalid {prefix}_PORT '{port}'"))?;
        let ssl_mode = get("SSLMODE", "disable").trim().to_lowercase();
        parse_ssl_mode(&ssl_mode).with_context(|| format!("invalid {prefix}_SSLMODE"))?;
        Ok(Self {
            host: get("HOST", "localhost"),
            port,
            username: get("USERNAME", "postgres"),
            password: get("PASSWORD", ""),
            name: get("NAME", "postgres"),
            ssl_mode,
        })
    }
}

/// Only modes that can be honoured over a plain socket are accepted. `require` and the
/// `verify-*` modes need a TLS connector, and silently downgrading them is not allowed.
fn parse_ssl_mode(mode: &str) -> Result<SslMode> {
    match mode {
        "disable" => Ok(SslMode::Disable),
        "prefer" => Ok(SslMode::Prefer),
        "require" | "verify-ca" | "verify-full" => Err(anyhow!(
            "sslmode '{mode}' needs TLS, which is not configured for postgres; \
             use disable or prefer"
        )),
        other => Err(anyhow!("unknown sslmode '{other}'; expected disable or prefer")),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(anyhow!("{key} must be set")),
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("SERVER_PORT") {
            Some(v) => v.parse::<u16>().with_context(|| format!("invalid SERVER_PORT '{v}'"))?,
            None => 8000,
        };
        let log_filter = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let mut password = PasswordConfig::default();
        if let Some(v) = lookup("PASSWORD_HASH_COST") {
            password.cost = v
                .parse::<u32>()
                .with_context(|| format!("invalid PASSWORD_HASH_COST '{v}'"))?;
            if password.cost == 0 {
                return Err(anyhow!("PASSWORD_HASH_COST must be at least 1"));
            }
        }
        if let Some(v) = lookup("PASSWORD_HASH_MEMORY_KIB") {
            password.memory_kib = v
                .parse::<u32>()
                .with_context(|| format!("invalid PASSWORD_HASH_MEMORY_KIB '{v}'"))?;
        }

        let jwt = JwtConfig {
            secret: required(&lookup, "JWT_ACCESS_TOKEN_SECRET")?,
            ttl: required(&lookup, "JWT_ACCESS_TOKEN_TTL")?,
        };
        humantime::parse_duration(jwt.ttl.trim())
            .with_context(|| format!("invalid JWT_ACCESS_TOKEN_TTL '{}'", jwt.ttl))?;

        let mut gateway = GatewayConfig::new(required(&lookup, "GUAC_API_URL")?);
        reqwest::Url::parse(&gateway.api_url)
            .with_context(|| format!("invalid GUAC_API_URL '{}'", gateway.api_url))?;
        if let Some(ds) = lookup("GUAC_DATA_SOURCE") {
            gateway.data_source = ds;
        }

        let signup = SignupConfig {
            compensate_on_failure: lookup("SIGNUP_COMPENSATE_ON_FAILURE")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(false),
        };

        Ok(Self {
            port,
            log_filter,
            password,
            jwt,
            gateway,
            signup,
            database: DbConfig::from_lookup("DB", &lookup)?,
            guacamole_database: DbConfig::from_lookup("DB_GUAC", &lookup)?,
        })
    }
}
