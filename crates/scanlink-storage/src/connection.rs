//! SQLite pool for the employee database.

use crate::error::{StorageError, StorageResult};
use scanlink_core::ServiceConfig;
use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// How to open the employee database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub database_path: String,

    /// Pool size. Lifecycle writes are single-row, so a handful is plenty.
    pub max_connections: u32,

    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,

    pub create_if_missing: bool,

    /// Apply `migrations/` when the pool opens.
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new(ServiceConfig::default().database_path)
    }
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
            auto_migrate: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn auto_migrate(mut self, migrate: bool) -> Self {
        self.auto_migrate = migrate;
        self
    }

    /// `sqlite://` URL for the configured path.
    #[must_use]
    pub fn url(&self) -> String {
        format!("sqlite://{}", self.database_path)
    }

    fn connect_options(&self) -> StorageResult<SqliteConnectOptions> {
        let options = SqliteConnectOptions::from_str(&self.url())
            .map_err(|e| {
                StorageError::Configuration(format!(
                    "invalid database path {:?}: {e}",
                    self.database_path
                ))
            })?
            .create_if_missing(self.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.busy_timeout)
            .disable_statement_logging();
        Ok(options)
    }
}

impl From<&ServiceConfig> for DatabaseConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self::new(config.database_path.clone())
    }
}

/// Shared handle to the employee database pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the database, creating its parent directory when needed.
    ///
    /// ```no_run
    /// use scanlink_storage::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::new(DatabaseConfig::new("/var/lib/scanlink/employees.db")).await?;
    /// db.health_check().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// `Configuration` for an unusable path, `Database` if SQLite refuses the
    /// connection, `Migration` if the schema cannot be applied.
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        ensure_parent_dir(Path::new(&config.database_path))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(config.connect_options()?)
            .await?;
        let db = Self { pool };

        if config.auto_migrate {
            db.migrate().await?;
        }

        info!(path = %config.database_path, "Opened employee database");
        Ok(db)
    }

    /// Fresh migrated database that lives as long as the pool.
    pub async fn in_memory() -> StorageResult<Self> {
        // Each connection to :memory: sees its own database, so keep one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Apply `migrations/`; already-applied migrations are skipped.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        debug!("Employee schema up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn ensure_parent_dir(path: &Path) -> StorageResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Configuration(format!(
                    "cannot create {}: {e}",
                    parent.display()
                ))
            })
        }
        _ => Ok(()),
    }
}
