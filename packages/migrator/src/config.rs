use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Target environment for the service databases.
///
/// The legacy source database is the same regardless of environment; only
/// the identity/umrah/general targets move between local, dev, and prod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Dev,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }

    /// Env-var prefix for this environment's database roles.
    fn prefix(&self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Dev => "DEV",
            Self::Prod => "PROD",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            other => Err(format!(
                "unknown environment '{other}' (expected local, dev, or prod)"
            )),
        }
    }
}

/// Connection settings for one database role, loaded from a
/// `<PREFIX>_DB_HOST/PORT/NAME/USER/PASSWORD` quintuple.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl DatabaseSettings {
    fn from_env(prefix: &str) -> Result<Self> {
        let require = |suffix: &str| -> Result<String> {
            let key = format!("{prefix}_DB_{suffix}");
            env::var(&key).with_context(|| format!("{key} must be set"))
        };

        Ok(Self {
            host: require("HOST")?,
            port: require("PORT")?
                .parse()
                .with_context(|| format!("{prefix}_DB_PORT must be a valid port number"))?,
            name: require("NAME")?,
            user: require("USER")?,
            password: require("PASSWORD")?,
        })
    }
}

/// Business constants the transfer jobs substitute for missing data.
///
/// These were originally scattered through the job code as literals; they
/// are env-overridable here so a rerun against a different target does not
/// require a rebuild.
#[derive(Debug, Clone)]
pub struct TransferDefaults {
    /// `created_by` marker stamped on every migrated row.
    pub actor: String,
    /// Substituted when a legacy organization id has no target row.
    pub fallback_organization_id: Uuid,
    /// Sentinel organization-instance id when the lookup misses.
    pub missing_org_instance_id: i32,
    pub country_id: String,
    pub province_id: String,
    pub city_id: String,
}

const FALLBACK_ORGANIZATION_ID: &str = "d0ac7aad-54ac-41f1-ba1a-a9070c3f464c";

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl TransferDefaults {
    fn from_env() -> Result<Self> {
        Ok(Self {
            actor: env_or("MIGRATION_ACTOR", "migration"),
            fallback_organization_id: env_or(
                "MIGRATION_FALLBACK_ORGANIZATION_ID",
                FALLBACK_ORGANIZATION_ID,
            )
            .parse()
            .context("MIGRATION_FALLBACK_ORGANIZATION_ID must be a valid UUID")?,
            missing_org_instance_id: env_or("MIGRATION_MISSING_ORG_INSTANCE_ID", "9999")
                .parse()
                .context("MIGRATION_MISSING_ORG_INSTANCE_ID must be an integer")?,
            country_id: env_or("MIGRATION_DEFAULT_COUNTRY_ID", "360"),
            province_id: env_or("MIGRATION_DEFAULT_PROVINCE_ID", "31"),
            city_id: env_or("MIGRATION_DEFAULT_CITY_ID", "3173"),
        })
    }
}

/// Settings for the identity API used to enrich package rows with the
/// organization-instance document. Optional: when absent, jobs store a
/// pending envelope instead of calling out.
#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    pub base_url: String,
    pub token: String,
}

impl EnrichmentSettings {
    fn from_env() -> Result<Option<Self>> {
        let base_url = env::var("ENRICHMENT_API_BASE_URL").ok();
        let token = env::var("ENRICHMENT_API_TOKEN").ok();
        match (base_url, token) {
            (Some(base_url), Some(token)) => Ok(Some(Self { base_url, token })),
            (None, None) => Ok(None),
            _ => bail!("ENRICHMENT_API_BASE_URL and ENRICHMENT_API_TOKEN must be set together"),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    /// The legacy production schema, the only source all jobs read from.
    pub legacy: DatabaseSettings,
    pub identity: DatabaseSettings,
    pub umrah: DatabaseSettings,
    pub general: DatabaseSettings,
    pub defaults: TransferDefaults,
    pub enrichment: Option<EnrichmentSettings>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env(environment: Environment) -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let prefix = environment.prefix();

        Ok(Self {
            environment,
            legacy: DatabaseSettings::from_env("LEGACY_UMRAH")?,
            identity: DatabaseSettings::from_env(&format!("{prefix}_IDENTITY"))?,
            umrah: DatabaseSettings::from_env(&format!("{prefix}_UMRAH"))?,
            general: DatabaseSettings::from_env(&format!("{prefix}_GENERAL"))?,
            defaults: TransferDefaults::from_env()?,
            enrichment: EnrichmentSettings::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_round_trips_through_from_str() {
        for env in [Environment::Local, Environment::Dev, Environment::Prod] {
            assert_eq!(env.as_str().parse::<Environment>().unwrap(), env);
        }
    }

    #[test]
    fn environment_rejects_unknown_names() {
        let err = "staging".parse::<Environment>().unwrap_err();
        assert!(err.contains("staging"));
    }

    #[test]
    fn fallback_organization_id_is_a_valid_uuid() {
        assert!(FALLBACK_ORGANIZATION_ID.parse::<Uuid>().is_ok());
    }
}
