use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use deskgate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;

    // RUST_LOG wins over LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    info!(
        target: "startup",
        "deskgate starting: port={}, gateway='{}', data_source='{}', db={}:{}/{}, guac_db={}:{}/{}",
        config.port,
        config.gateway.api_url,
        config.gateway.data_source,
        config.database.host,
        config.database.port,
        config.database.name,
        config.guacamole_database.host,
        config.guacamole_database.port,
        config.guacamole_database.name,
    );

    deskgate::server::run(config).await
}
