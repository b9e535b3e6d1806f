//! Database connection management.

use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{ConnectOptions, Connection, SqliteConnection};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// A single, exclusively owned connection to the registry database.
///
/// There is deliberately no pool: the registry is a single-writer store and
/// each [`Registry`](crate::Registry) owns exactly one of these.
#[derive(Debug)]
pub(crate) struct Database {
    conn: SqliteConnection,
}

impl Database {
    async fn new(options: SqliteConnectOptions) -> Result<Self> {
        let conn = options.connect().await.or_raise(|| ErrorKind::Database)?;
        let mut db = Self { conn };
        db.migrate().await?;
        Ok(db)
    }

    /// Connect to the registry database at the given path.
    ///
    /// Creates the database file if it doesn't exist and makes sure the
    /// `download` table exists.
    pub(crate) async fn connect(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let options = Self::base_options(busy_timeout)
            .filename(path.as_ref())
            .create_if_missing(true);
        Self::new(options).await
    }

    /// Connect to an in-memory database.
    ///
    /// Everything is lost when the connection closes.
    pub(crate) async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options(Duration::ZERO).filename(":memory:");
        Self::new(options).await
    }

    fn base_options(busy_timeout: Duration) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            // PRAGMA synchronous = NORMAL (balance between safety and speed)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(busy_timeout)
            // Statement-level logging is far too chatty for a tiny table.
            .disable_statement_logging()
    }

    #[instrument("ensuring download table exists", skip(self))]
    async fn migrate(&mut self) -> Result<()> {
        MIGRATOR.run(&mut self.conn).await.or_raise(|| ErrorKind::Migration)
    }

    pub(crate) fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    /// Close the connection, letting SQLite update its planner statistics first.
    pub(crate) async fn close(mut self) {
        _ = sqlx::query("PRAGMA optimize").execute(&mut self.conn).await;
        if let Err(err) = self.conn.close().await {
            tracing::warn!(error = %err, "Download registry did not close cleanly");
        }
    }
}
