//! CLI command implementations.

pub mod migrate;
pub mod seed;
pub mod tracking;

use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

use threadline_storefront::config::{ConfigError, StorageBackend, StorefrontConfig};
use threadline_storefront::db;

/// Errors shared by the commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("This command needs PostgreSQL storage (STOREFRONT_STORAGE=postgres)")]
    NotPostgres,

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Load the storefront configuration and its database URL.
pub(crate) fn load_config() -> Result<(StorefrontConfig, SecretString), CommandError> {
    let config = StorefrontConfig::from_env()?;
    match &config.storage {
        StorageBackend::Postgres(url) => {
            let url = url.clone();
            Ok((config, url))
        }
        StorageBackend::Memory => Err(CommandError::NotPostgres),
    }
}

/// Connect to the storefront database.
pub(crate) async fn connect() -> Result<(StorefrontConfig, PgPool), CommandError> {
    let (config, url) = load_config()?;
    tracing::info!("Connecting to storefront database...");
    let pool = db::create_pool(&url).await?;
    Ok((config, pool))
}
