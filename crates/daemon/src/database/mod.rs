pub mod directory;
pub mod models;
mod sqlite;
pub mod types;

use std::ops::Deref;
use std::path::Path;

use sqlx::SqlitePool;
use url::Url;

#[derive(Clone, Debug)]
pub struct Database(SqlitePool);

impl Database {
    pub async fn connect(database_url: &Url) -> Result<Self, DatabaseSetupError> {
        if database_url.scheme() == "sqlite" {
            let db = sqlite::connect_sqlite(database_url).await?;
            sqlite::migrate_sqlite(&db).await?;
            return Ok(Database::new(db));
        }

        Err(DatabaseSetupError::UnknownDbType(
            database_url.scheme().to_string(),
        ))
    }

    /// In-memory database, mostly useful for tests
    pub async fn in_memory() -> Result<Self, DatabaseSetupError> {
        let url = Url::parse("sqlite::memory:").map_err(DatabaseSetupError::InvalidUrl)?;
        Self::connect(&url).await
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self(pool)
    }

    /// Build the connection URL for an on-disk database file
    pub fn sqlite_url(path: &Path) -> Result<Url, DatabaseSetupError> {
        Url::parse(&format!("sqlite://{}", path.display())).map_err(DatabaseSetupError::InvalidUrl)
    }

    /// Round-trip a trivial query to prove the pool can hand out a connection
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.0).await?;
        Ok(())
    }
}

impl Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The message of a UNIQUE constraint failure, if `err` is one.
///
/// SQLite names the violated columns in the message
/// (`UNIQUE constraint failed: envelopes.nonce`), which is how callers tell
/// one constraint from another.
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
            Some(db_error.message())
        }
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseSetupError {
    #[error("error occurred while attempting database migration: {0}")]
    MigrationFailed(sqlx::migrate::MigrateError),

    #[error("unable to perform initial connection and check of the database: {0}")]
    Unavailable(sqlx::Error),

    #[error("requested database type was not recognized: {0}")]
    UnknownDbType(String),

    #[error("invalid database url: {0}")]
    InvalidUrl(url::ParseError),
}
