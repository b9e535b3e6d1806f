//! Statement-level access to the `download` table.
//!
//! Everything here is a single statement against one borrowed connection. The
//! merge and dedup semantics are layered on top in [`crate::registry`].

use crate::db::Database;
use crate::error::{ErrorKind, Result};
use crate::models::RecordRow;
use exn::ResultExt;
use fetchlog_record::DownloadRecord;
use sqlx::SqliteConnection;
use tracing::instrument;

pub(crate) struct Repository<'c> {
    pub(crate) conn: &'c mut SqliteConnection,
}
impl<'c> From<&'c mut Database> for Repository<'c> {
    fn from(db: &'c mut Database) -> Self {
        Self { conn: db.connection() }
    }
}
impl Repository<'_> {
    /// Every stored record, in table order.
    pub(crate) async fn scan(&mut self) -> Result<Vec<DownloadRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(include_str!("../queries/scan.sql"))
            .fetch_all(&mut *self.conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(|r| r.try_into()).collect::<Result<Vec<_>>>()
    }

    /// The stored record for `url`, if any.
    pub(crate) async fn get(&mut self, url: impl AsRef<str>) -> Result<Option<DownloadRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(include_str!("../queries/get_by_url.sql"))
            .bind(url.as_ref())
            .fetch_optional(&mut *self.conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(|r| r.try_into()).transpose()
    }

    /// Insert the record, replacing any existing row with the same URL.
    #[instrument(skip_all, fields(url = record.url()))]
    pub(crate) async fn upsert(&mut self, record: &DownloadRecord) -> Result<()> {
        let row = RecordRow::try_from(record)?;
        sqlx::query(include_str!("../queries/upsert.sql"))
            .bind(row.url)
            .bind(row.value)
            .execute(&mut *self.conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub(crate) async fn count(&mut self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count.sql"))
            .fetch_one(&mut *self.conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("row count"))
    }
}
