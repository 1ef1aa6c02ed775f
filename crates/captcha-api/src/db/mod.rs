//! Datastore setup: connection string resolution, schema creation, migrations.

use anyhow::{Context, Result};
use sqlx::ConnectOptions;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use captcha_common::constants::{DEFAULT_DATABASE_URI, env};

mod captchas;

pub use captchas::CaptchaStore;

/// Embedded from `migrations/` next to this crate's manifest
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Resolved connection descriptor; immutable once startup has read it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub url: String,
}

impl DatabaseSettings {
    /// Read `SQLALCHEMY_DATABASE_URI`, falling back to the local file store
    pub fn from_env() -> Self {
        Self::resolve(std::env::var(env::DATABASE_URI).ok())
    }

    pub fn resolve(value: Option<String>) -> Self {
        let url = value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URI.to_string());
        Self { url }
    }

    /// In-memory SQLite lives and dies with its connection
    fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// Create the store if absent, apply migrations, and hand back a pool.
///
/// Any failure is logged and returned; callers treat it as fatal.
pub async fn setup(settings: &DatabaseSettings) -> Result<SqlitePool> {
    tracing::info!(uri = %settings.url, "Creating database...");

    match connect_and_migrate(settings).await {
        Ok(pool) => {
            tracing::info!("Database setup completed");
            Ok(pool)
        }
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Error during database setup");
            Err(e)
        }
    }
}

async fn connect_and_migrate(settings: &DatabaseSettings) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&settings.url)
        .with_context(|| format!("Invalid database URI {}", settings.url))?
        .create_if_missing(true)
        .disable_statement_logging();

    let pool_options = if settings.is_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(10)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .context("Failed to open database")?;
    tracing::info!("Database created successfully");

    MIGRATOR
        .run(&pool)
        .await
        .context("Failed to apply migrations")?;
    tracing::info!("Migrations applied successfully");

    Ok(pool)
}

/// Cheap connectivity probe used by the readiness check
pub async fn ping(pool: &SqlitePool) -> bool {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await
        .is_ok()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) async fn memory_pool() -> SqlitePool {
        setup(&DatabaseSettings::resolve(Some("sqlite::memory:".to_string())))
            .await
            .unwrap()
    }

    #[test]
    fn test_resolve_defaults_to_local_file() {
        assert_eq!(DatabaseSettings::resolve(None).url, DEFAULT_DATABASE_URI);
        assert_eq!(
            DatabaseSettings::resolve(Some("  ".to_string())).url,
            DEFAULT_DATABASE_URI
        );
        assert_eq!(
            DatabaseSettings::resolve(Some("sqlite://other.db".to_string())).url,
            "sqlite://other.db"
        );
    }

    #[tokio::test]
    async fn test_setup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("captcha.db").display());
        let settings = DatabaseSettings::resolve(Some(url));

        let first = setup(&settings).await.unwrap();
        first.close().await;

        let second = setup(&settings).await.unwrap();
        assert!(ping(&second).await);
    }

    #[tokio::test]
    async fn test_setup_failure_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("missing/child/db.sqlite").display());
        let settings = DatabaseSettings::resolve(Some(url));
        assert!(setup(&settings).await.is_err());
    }
}
