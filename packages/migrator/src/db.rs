use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use tracing::info;

use crate::config::{Config, DatabaseSettings};

/// Open a small pool for one database role and verify the connection.
pub async fn connect(settings: &DatabaseSettings) -> Result<PgPool> {
    let options = PgConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .database(&settings.name)
        .username(&settings.user)
        .password(&settings.password)
        .ssl_mode(PgSslMode::Disable);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| {
            format!(
                "failed to connect to database {} at {}:{}",
                settings.name, settings.host, settings.port
            )
        })?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .with_context(|| format!("failed to ping database {}", settings.name))?;

    Ok(pool)
}

/// One pool per database role a transfer job may touch.
pub struct Databases {
    /// Legacy production schema (read-only source).
    pub legacy: PgPool,
    pub identity: PgPool,
    pub umrah: PgPool,
    pub general: PgPool,
}

impl Databases {
    pub async fn connect(config: &Config) -> Result<Self> {
        let legacy = connect(&config.legacy)
            .await
            .context("legacy source database")?;
        let identity = connect(&config.identity)
            .await
            .context("identity target database")?;
        let umrah = connect(&config.umrah)
            .await
            .context("umrah target database")?;
        let general = connect(&config.general)
            .await
            .context("general target database")?;

        info!(
            environment = %config.environment,
            "connected to source and target databases"
        );
        println!("Successfully connected to source and target databases");

        Ok(Self {
            legacy,
            identity,
            umrah,
            general,
        })
    }
}
