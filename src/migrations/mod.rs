//! Database Migrations
//!
//! File-based schema migrations for the Postgres store. Versioned `.sql`
//! files are applied in filename order, each inside its own transaction,
//! and recorded with a content checksum in a tracking table.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

const TRACKING_TABLE: &str = "tenfold_migrations";

/// Migration error types
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid migration name: {0}")]
    InvalidName(String),

    #[error("migration {name} failed: {message}")]
    Failed { name: String, message: String },

    #[error("checksum mismatch for applied migration {0}")]
    ChecksumMismatch(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One migration as parsed from disk.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub sql: String,
    pub checksum: String,
}

/// Status of one migration file relative to the tracking table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    Applied,
    Pending,
}

/// Applies versioned `.sql` files from a directory.
#[derive(Debug)]
pub struct MigrationRunner {
    migrations_dir: PathBuf,
}

impl MigrationRunner {
    pub fn new(migrations_dir: PathBuf) -> Self {
        Self { migrations_dir }
    }

    /// Load and order all migrations from the directory. Missing directory
    /// means no migrations, not an error.
    pub fn load_migrations(&self) -> Result<Vec<Migration>, MigrationError> {
        if !self.migrations_dir.exists() {
            return Ok(Vec::new());
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.migrations_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map(|e| e == "sql").unwrap_or(false))
            .collect();
        files.sort();

        let mut migrations = Vec::with_capacity(files.len());
        for file in files {
            let (version, name) = parse_migration_filename(&file)?;
            let sql = std::fs::read_to_string(&file)?;
            let checksum = checksum(&sql);
            migrations.push(Migration {
                version,
                name,
                sql,
                checksum,
            });
        }
        Ok(migrations)
    }

    async fn init_tracking_table(&self, pool: &PgPool) -> Result<(), MigrationError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {TRACKING_TABLE} (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                checksum TEXT NOT NULL,
                applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#
        ))
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn applied_checksums(&self, pool: &PgPool) -> Result<Vec<(i64, String)>, MigrationError> {
        let rows: Vec<(i64, String)> = sqlx::query_as(&format!(
            "SELECT version, checksum FROM {TRACKING_TABLE} ORDER BY version ASC"
        ))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Apply all pending migrations. Each runs in its own transaction; an
    /// already-applied migration whose file content changed is an error.
    pub async fn run(&self, pool: &PgPool) -> Result<usize, MigrationError> {
        self.init_tracking_table(pool).await?;

        let applied = self.applied_checksums(pool).await?;
        let migrations = self.load_migrations()?;

        let mut count = 0;
        for migration in migrations {
            if let Some((_, recorded)) = applied.iter().find(|(v, _)| *v == migration.version) {
                if recorded != &migration.checksum {
                    return Err(MigrationError::ChecksumMismatch(migration.name));
                }
                continue;
            }

            let mut tx = pool.begin().await?;
            for statement in migration.sql.split(';') {
                let statement = statement.trim();
                if statement.is_empty() {
                    continue;
                }
                sqlx::query(statement).execute(&mut *tx).await.map_err(|e| {
                    MigrationError::Failed {
                        name: migration.name.clone(),
                        message: e.to_string(),
                    }
                })?;
            }

            sqlx::query(&format!(
                "INSERT INTO {TRACKING_TABLE} (version, name, checksum) VALUES ($1, $2, $3)"
            ))
            .bind(migration.version)
            .bind(&migration.name)
            .bind(&migration.checksum)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            info!(name = %migration.name, version = migration.version, "applied migration");
            count += 1;
        }

        if count == 0 {
            info!("no pending migrations");
        } else {
            info!(count, "migrations applied");
        }
        Ok(count)
    }

    /// Per-file applied/pending states, in version order.
    pub async fn status(
        &self,
        pool: &PgPool,
    ) -> Result<Vec<(Migration, MigrationState)>, MigrationError> {
        self.init_tracking_table(pool).await?;
        let applied = self.applied_checksums(pool).await?;

        let mut states = Vec::new();
        for migration in self.load_migrations()? {
            let state = if applied.iter().any(|(v, _)| *v == migration.version) {
                MigrationState::Applied
            } else {
                MigrationState::Pending
            };
            if state == MigrationState::Pending {
                warn!(name = %migration.name, "migration pending");
            }
            states.push((migration, state));
        }
        Ok(states)
    }
}

/// Default migrations directory, relative to the working directory.
pub fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

/// Parse `YYYYMMDDHHMMSS_description.sql` into (version, description).
fn parse_migration_filename(path: &Path) -> Result<(i64, String), MigrationError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| MigrationError::InvalidName(path.display().to_string()))?;

    let (version_part, name) = stem.split_once('_').ok_or_else(|| {
        MigrationError::InvalidName(format!(
            "{} (expected YYYYMMDDHHMMSS_description.sql)",
            path.display()
        ))
    })?;

    if version_part.len() != 14 {
        return Err(MigrationError::InvalidName(format!(
            "{} (version must be a 14-digit timestamp)",
            path.display()
        )));
    }

    let version: i64 = version_part
        .parse()
        .map_err(|_| MigrationError::InvalidName(path.display().to_string()))?;

    Ok((version, name.to_string()))
}

fn checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_migration_filename() {
        let (version, name) =
            parse_migration_filename(Path::new("20250101120000_create_coach_memories.sql"))
                .unwrap();
        assert_eq!(version, 20250101120000);
        assert_eq!(name, "create_coach_memories");
    }

    #[test]
    fn test_invalid_migration_filenames() {
        assert!(parse_migration_filename(Path::new("invalid.sql")).is_err());
        assert!(parse_migration_filename(Path::new("123_short_version.sql")).is_err());
        assert!(parse_migration_filename(Path::new("notanumber12345_x.sql")).is_err());
    }

    #[test]
    fn test_checksum_is_stable_and_distinct() {
        let a = "CREATE TABLE a (id BIGSERIAL PRIMARY KEY);";
        let b = "CREATE TABLE b (id BIGSERIAL PRIMARY KEY);";
        assert_eq!(checksum(a), checksum(a));
        assert_ne!(checksum(a), checksum(b));
    }

    #[test]
    fn test_load_migrations_orders_by_filename() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("20250102000000_second.sql"),
            "SELECT 2;",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("20250101000000_first.sql"),
            "SELECT 1;",
        )
        .unwrap();
        std::fs::write(dir.path().join("README.md"), "not sql").unwrap();

        let runner = MigrationRunner::new(dir.path().to_path_buf());
        let migrations = runner.load_migrations().unwrap();

        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].name, "first");
        assert_eq!(migrations[1].name, "second");
        assert!(!migrations[0].checksum.is_empty());
    }

    #[test]
    fn test_missing_directory_is_empty_not_error() {
        let runner = MigrationRunner::new(PathBuf::from("/nonexistent/migrations"));
        assert!(runner.load_migrations().unwrap().is_empty());
    }
}
