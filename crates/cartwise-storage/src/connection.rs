use crate::error::{StorageError, StorageResult};
use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default location of the rental database.
pub const DEFAULT_DATABASE_PATH: &str = "data/rentals.db";

/// Where the rental database lives and how the pool is sized.
///
/// The station writes from two places at once (monitor and request path), so
/// the file is opened in WAL mode with a busy timeout rather than failing
/// fast on `SQLITE_BUSY`.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    /// How long a writer waits on a locked database file.
    pub busy_timeout: Duration,
    /// Also creates the parent directory.
    pub create_if_missing: bool,
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASE_PATH)
    }
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: 4,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(10),
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
            auto_migrate: true,
        }
    }

    pub fn max_connections(self, max_connections: u32) -> Self {
        Self {
            max_connections,
            ..self
        }
    }

    pub fn min_connections(self, min_connections: u32) -> Self {
        Self {
            min_connections,
            ..self
        }
    }

    pub fn create_if_missing(self, create_if_missing: bool) -> Self {
        Self {
            create_if_missing,
            ..self
        }
    }

    pub fn auto_migrate(self, auto_migrate: bool) -> Self {
        Self {
            auto_migrate,
            ..self
        }
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(self.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.busy_timeout)
            .disable_statement_logging()
    }
}

fn ensure_parent_dir(path: &Path) -> StorageResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Configuration(format!(
                    "Cannot create database directory {}: {e}",
                    parent.display()
                ))
            })
        }
        _ => Ok(()),
    }
}

/// Rental database connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (and by default migrate) the database described by `config`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use cartwise_storage::connection::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::new(DatabaseConfig::new("data/rentals.db")).await?;
    /// db.health_check().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        if config.create_if_missing {
            ensure_parent_dir(&config.path)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(config.connect_options())
            .await?;

        let db = Self { pool };
        if config.auto_migrate {
            db.migrate().await?;
        }

        info!(path = %config.path.display(), "Rental database opened");
        Ok(db)
    }

    /// Migrated single-connection in-memory database, for tests.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);

        // Every connection to :memory: is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Apply the embedded migrations from the workspace `migrations/` directory.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        debug!("Migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for checked-out connections, then close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_points_at_rentals_db() {
        let config = DatabaseConfig::default();

        assert_eq!(config.path, Path::new("data/rentals.db"));
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
        assert!(config.create_if_missing);
        assert!(config.auto_migrate);
    }

    #[test]
    fn test_builder_keeps_other_fields() {
        let config = DatabaseConfig::new("/var/lib/cartwise/rentals.db")
            .max_connections(8)
            .min_connections(0)
            .create_if_missing(false)
            .auto_migrate(false);

        assert_eq!(config.path, Path::new("/var/lib/cartwise/rentals.db"));
        assert_eq!((config.max_connections, config.min_connections), (8, 0));
        assert_eq!(config.acquire_timeout, Duration::from_secs(10));
        assert!(!config.create_if_missing);
        assert!(!config.auto_migrate);
    }

    #[test]
    fn test_parent_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("rentals.db");

        ensure_parent_dir(&path).unwrap();
        assert!(path.parent().unwrap().is_dir());
        ensure_parent_dir(Path::new("rentals.db")).unwrap();
    }
}
