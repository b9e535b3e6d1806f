//! The download registry.

use exn::{OptionExt, ResultExt};
use fetchlog_config::Config;
use fetchlog_record::{DownloadRecord, DownloadState};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::instrument;

use crate::db::Database;
use crate::error::{ErrorKind, Result};
use crate::repo::Repository;

/// Where the registry keeps its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A SQLite file, created on first open.
    File(PathBuf),
    /// A private in-memory database, discarded on close.
    Memory,
}

/// Persisted registry of download records, keyed by source URL.
///
/// Every operation blocks the calling thread until the storage engine has
/// finished. The registry owns its connection exclusively; two registries
/// pointed at the same file are not coordinated with each other, and
/// [`update_state`](Self::update_state) is a read followed by a separate write.
///
/// The registry opens itself on construction and closes itself when dropped.
/// If that first open fails the registry is still returned, and operations
/// report [`ErrorKind::NotOpen`] until a later [`open`](Self::open) succeeds.
///
/// The registry drives its own single-threaded runtime, so it must not be
/// created, used or dropped from within an async task.
#[derive(Debug)]
pub struct Registry {
    location: Location,
    busy_timeout: Duration,
    runtime: Runtime,
    db: Option<Database>,
}
impl Registry {
    /// Registry stored in `name` under the user's home directory.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let config = Config { database: name.into(), ..Config::default() };
        Self::from_config(&config)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        let path = config.database_path().or_raise(|| ErrorKind::Config)?;
        Self::with_location(Location::File(path), config.busy_timeout())
    }

    /// Registry stored at an explicit file path.
    pub fn at(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_location(Location::File(path.as_ref().to_path_buf()), Config::default().busy_timeout())
    }

    /// Registry backed by a private in-memory database (useful for testing).
    ///
    /// Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
    pub fn in_memory() -> Result<Self> {
        Self::with_location(Location::Memory, Duration::ZERO)
    }

    fn with_location(location: Location, busy_timeout: Duration) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build().or_raise(|| ErrorKind::Runtime)?;
        let mut registry = Self { location, busy_timeout, runtime, db: None };
        // Failure is already logged by open(); the caller can retry it.
        _ = registry.open();
        Ok(registry)
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn is_open(&self) -> bool {
        self.db.is_some()
    }

    /// Open the connection and make sure the `download` table exists.
    ///
    /// Does nothing if the registry is already open.
    #[instrument(skip(self), fields(location = ?self.location))]
    pub fn open(&mut self) -> Result<()> {
        if self.db.is_some() {
            return Ok(());
        }
        let connected = match &self.location {
            Location::File(path) => self.runtime.block_on(Database::connect(path, self.busy_timeout)),
            Location::Memory => self.runtime.block_on(Database::connect_in_memory()),
        };
        match connected {
            Ok(db) => {
                tracing::debug!("Download registry opened");
                self.db = Some(db);
                Ok(())
            },
            Err(err) => {
                tracing::warn!(error = ?err, "Unable to open download registry");
                Err(err)
            },
        }
    }

    /// Close the connection.
    ///
    /// Returns `false` if there was nothing to close.
    pub fn close(&mut self) -> bool {
        match self.db.take() {
            Some(db) => {
                self.runtime.block_on(db.close());
                tracing::debug!(location = ?self.location, "Download registry closed");
                true
            },
            None => false,
        }
    }

    fn repository(&mut self) -> Result<(&Runtime, Repository<'_>)> {
        let db = self.db.as_mut().ok_or_raise(|| ErrorKind::NotOpen)?;
        Ok((&self.runtime, Repository::from(db)))
    }

    /// Every stored record regardless of state, newest first.
    pub fn list(&mut self) -> Result<Vec<DownloadRecord>> {
        self.list_pending(&[], true, true)
    }

    /// Stored records merged with records the caller knows about but which
    /// may not have been persisted yet.
    ///
    /// - Finished records are left out unless `include_finished` is set.
    /// - Each URL appears once. Stored records are scanned first, so they win
    ///   over an `external` record with the same URL.
    /// - With `sort`, the result is ordered by timestamp, newest first; ties
    ///   keep their relative order.
    pub fn list_pending(
        &mut self,
        external: &[DownloadRecord],
        include_finished: bool,
        sort: bool,
    ) -> Result<Vec<DownloadRecord>> {
        let (runtime, mut repo) = self.repository()?;
        let stored = runtime.block_on(repo.scan())?;
        Ok(merge_pending(stored, external, include_finished, sort))
    }

    /// Store the record, replacing whatever was stored under its URL.
    pub fn update(&mut self, record: &DownloadRecord) -> Result<()> {
        let (runtime, mut repo) = self.repository()?;
        runtime.block_on(repo.upsert(record))
    }

    /// Change the state of the record stored under `url`.
    ///
    /// Returns `Ok(false)` without writing anything if no record is stored
    /// under that URL.
    #[instrument(skip(self))]
    pub fn update_state(&mut self, url: &str, state: DownloadState) -> Result<bool> {
        let (runtime, mut repo) = self.repository()?;
        let Some(mut record) = runtime.block_on(repo.get(url))? else {
            tracing::debug!("No stored download to update");
            return Ok(false);
        };
        record.set_url(url);
        record.set_state(state);
        runtime.block_on(repo.upsert(&record))?;
        Ok(true)
    }

    /// Number of stored records.
    pub fn count(&mut self) -> Result<u64> {
        let (runtime, mut repo) = self.repository()?;
        runtime.block_on(repo.count())
    }
}
impl Drop for Registry {
    fn drop(&mut self) {
        self.close();
    }
}

fn merge_pending(
    stored: Vec<DownloadRecord>,
    external: &[DownloadRecord],
    include_finished: bool,
    sort: bool,
) -> Vec<DownloadRecord> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(stored.len() + external.len());
    let stored = stored.into_iter().filter(|r| include_finished || !r.state().is_finished());
    for record in stored.chain(external.iter().cloned()) {
        if seen.insert(record.url().to_string()) {
            merged.push(record);
        }
    }
    if sort {
        // Stable, so equal timestamps keep scan order then external order.
        merged.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use time::UtcDateTime;
    use time::macros::datetime;

    fn at(hour: u8) -> UtcDateTime {
        datetime!(2012-05-01 00:00:00).replace_hour(hour).unwrap().as_utc()
    }

    fn record(url: &str, state: DownloadState, hour: u8) -> DownloadRecord {
        DownloadRecord::new(url)
            .with_path(format!("/media/{url}"))
            .with_size(u64::from(hour) * 100)
            .with_state(state)
            .with_timestamp(at(hour))
    }

    fn urls(records: &[DownloadRecord]) -> Vec<&str> {
        records.iter().map(|r| r.url()).collect()
    }

    fn seeded() -> Registry {
        let mut registry = Registry::in_memory().unwrap();
        registry.update(&record("u1", DownloadState::Pending, 3)).unwrap();
        registry.update(&record("u2", DownloadState::Finished, 5)).unwrap();
        registry.update(&record("u3", DownloadState::Downloading, 1)).unwrap();
        registry
    }

    #[fixture]
    fn registry() -> Registry {
        seeded()
    }

    // =========================================================================
    // Merge
    // =========================================================================

    #[test]
    fn test_merge_dedups_first_seen_wins() {
        let stored = vec![record("a", DownloadState::Pending, 1), record("a", DownloadState::Paused, 2)];
        let external = [record("a", DownloadState::Failed, 3), record("b", DownloadState::Pending, 4)];
        let merged = merge_pending(stored, &external, false, false);
        assert_eq!(urls(&merged), ["a", "b"]);
        assert_eq!(merged[0].state(), DownloadState::Pending);
    }

    #[test]
    fn test_merge_sort_is_stable() {
        let stored = vec![record("a", DownloadState::Pending, 2), record("b", DownloadState::Pending, 7)];
        let external = [record("c", DownloadState::Pending, 2), record("d", DownloadState::Pending, 9)];
        let merged = merge_pending(stored, &external, false, true);
        assert_eq!(urls(&merged), ["d", "b", "a", "c"]);
    }

    #[test]
    fn test_merge_keeps_external_finished() {
        // Only stored records are filtered by state.
        let external = [record("a", DownloadState::Finished, 1)];
        let merged = merge_pending(vec![], &external, false, false);
        assert_eq!(urls(&merged), ["a"]);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[test]
    fn test_opens_on_construction() {
        let registry = Registry::in_memory().unwrap();
        assert!(registry.is_open());
    }

    #[test]
    fn test_open_is_idempotent() {
        let mut registry = seeded();
        registry.open().unwrap();
        assert_eq!(registry.count().unwrap(), 3);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut registry = Registry::in_memory().unwrap();
        assert!(registry.close());
        assert!(!registry.close());
        assert!(!registry.is_open());
    }

    #[test]
    fn test_closed_registry_reports_not_open() {
        let mut registry = Registry::in_memory().unwrap();
        registry.close();
        let err = registry.list().unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotOpen));
        let err = registry.update(&record("u", DownloadState::Pending, 1)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotOpen));
    }

    #[test]
    fn test_failed_open_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("not-yet");
        let mut registry = Registry::at(nested.join("downloads.db")).unwrap();
        assert!(!registry.is_open());
        assert!(!registry.close());
        assert!(matches!(&*registry.open().unwrap_err(), ErrorKind::Database));
        std::fs::create_dir(&nested).unwrap();
        registry.open().unwrap();
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("downloads.db");
        {
            let mut registry = Registry::at(&path).unwrap();
            registry.update(&record("u1", DownloadState::Paused, 4)).unwrap();
        }
        let mut registry = Registry::at(&path).unwrap();
        let listed = registry.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].same_contents(&record("u1", DownloadState::Paused, 4)));
    }

    #[test]
    fn test_from_config_uses_home() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database: "queue.db".to_string(),
            home: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let registry = Registry::from_config(&config).unwrap();
        assert!(registry.is_open());
        assert_eq!(registry.location(), &Location::File(dir.path().join("queue.db")));
        assert!(dir.path().join("queue.db").exists());
    }

    #[test]
    fn test_from_config_rejects_bad_name() {
        let config = Config { database: String::new(), ..Config::default() };
        let err = Registry::from_config(&config).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Config));
    }

    // =========================================================================
    // Update
    // =========================================================================

    #[test]
    fn test_update_round_trips() {
        let mut registry = Registry::in_memory().unwrap();
        let original = record("http://example.com/a.epub", DownloadState::Downloading, 8);
        registry.update(&original).unwrap();
        let (runtime, mut repo) = registry.repository().unwrap();
        let rows = runtime.block_on(repo.scan()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].same_contents(&original));
    }

    #[test]
    fn test_update_replaces_same_url() {
        let mut registry = seeded();
        registry.update(&record("u1", DownloadState::Failed, 9)).unwrap();
        assert_eq!(registry.count().unwrap(), 3);
        let listed = registry.list_pending(&[], true, false).unwrap();
        let u1 = listed.iter().find(|r| r.url() == "u1").unwrap();
        assert_eq!(u1.state(), DownloadState::Failed);
        assert_eq!(u1.timestamp(), at(9));
    }

    #[test]
    fn test_update_state_missing_url() {
        let mut registry = seeded();
        let before = registry.list_pending(&[], true, false).unwrap();
        assert!(!registry.update_state("missing-url", DownloadState::Finished).unwrap());
        let after = registry.list_pending(&[], true, false).unwrap();
        assert_eq!(before.len(), after.len());
        assert!(before.iter().zip(&after).all(|(a, b)| a.same_contents(b)));
    }

    #[test]
    fn test_update_state_only_touches_state() {
        let mut registry = seeded();
        assert!(registry.update_state("u3", DownloadState::Paused).unwrap());
        let listed = registry.list_pending(&[], true, false).unwrap();
        let u3 = listed.iter().find(|r| r.url() == "u3").unwrap();
        assert!(u3.same_contents(&record("u3", DownloadState::Paused, 1)));
    }

    #[test]
    fn test_update_state_finished_hides_from_pending() {
        let mut registry = seeded();
        assert!(registry.update_state("u1", DownloadState::Finished).unwrap());
        let pending = registry.list_pending(&[], false, false).unwrap();
        assert_eq!(urls(&pending), ["u3"]);
        let all = registry.list_pending(&[], true, false).unwrap();
        let u1 = all.iter().find(|r| r.url() == "u1").unwrap();
        assert_eq!(u1.state(), DownloadState::Finished);
    }

    #[test]
    fn test_update_state_repairs_missing_url() {
        let mut registry = Registry::in_memory().unwrap();
        let (runtime, repo) = registry.repository().unwrap();
        runtime
            .block_on(
                sqlx::query("INSERT INTO download (url, value) VALUES (?, ?)")
                    .bind("http://example.com/legacy")
                    .bind(br#"{"path":"/media/legacy","timestamp":"2008-01-01 12:00:00"}"#.to_vec())
                    .execute(&mut *repo.conn),
            )
            .unwrap();
        assert!(registry.update_state("http://example.com/legacy", DownloadState::Pending).unwrap());
        let (runtime, repo) = registry.repository().unwrap();
        let (value,): (Vec<u8>,) = runtime
            .block_on(sqlx::query_as("SELECT value FROM download").fetch_one(&mut *repo.conn))
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&value).unwrap();
        assert_eq!(json["url"], "http://example.com/legacy");
        assert_eq!(json["state"], 1);
        assert_eq!(json["path"], "/media/legacy");
    }

    // =========================================================================
    // Listing
    // =========================================================================

    #[rstest]
    fn test_pending_excludes_finished(mut registry: Registry) {
        let pending = registry.list_pending(&[], false, false).unwrap();
        assert_eq!(urls(&pending), ["u1", "u3"]);
        assert!(pending.iter().all(|r| !r.state().is_finished()));
    }

    #[rstest]
    fn test_pending_with_finished_returns_everything_once(mut registry: Registry) {
        let all = registry.list_pending(&[], true, false).unwrap();
        assert_eq!(urls(&all), ["u1", "u2", "u3"]);
    }

    #[rstest]
    fn test_list_is_sorted_newest_first(mut registry: Registry) {
        let all = registry.list().unwrap();
        assert_eq!(urls(&all), ["u2", "u1", "u3"]);
        assert!(all.windows(2).all(|w| w[0].timestamp() >= w[1].timestamp()));
    }

    #[rstest]
    fn test_pending_merges_external(mut registry: Registry) {
        let external = [
            record("u1", DownloadState::Failed, 12),
            record("u4", DownloadState::Pending, 2),
            record("u5", DownloadState::Pending, 23),
        ];
        let merged = registry.list_pending(&external, true, true).unwrap();
        assert_eq!(urls(&merged), ["u5", "u2", "u1", "u4", "u3"]);
        assert!(merged.windows(2).all(|w| w[0].timestamp() >= w[1].timestamp()));
        // Stored u1 wins over the external one.
        let u1 = merged.iter().find(|r| r.url() == "u1").unwrap();
        assert_eq!(u1.state(), DownloadState::Pending);
        assert_eq!(u1.timestamp(), at(3));
    }

    #[rstest]
    fn test_pending_does_not_persist_external(mut registry: Registry) {
        let external = [record("u9", DownloadState::Pending, 1)];
        registry.list_pending(&external, false, false).unwrap();
        assert_eq!(registry.count().unwrap(), 3);
    }

    #[rstest]
    fn test_list_tolerates_null_keys(mut registry: Registry) {
        let (runtime, repo) = registry.repository().unwrap();
        runtime
            .block_on(
                sqlx::query("INSERT INTO download (url, value) VALUES (?, ?)")
                    .bind("n")
                    .bind(br#"{"url":"n","path":null}"#.to_vec())
                    .execute(&mut *repo.conn),
            )
            .unwrap();
        let all = registry.list().unwrap();
        assert_eq!(urls(&all), ["u2", "u1", "u3", "n"]);
        assert_eq!(all[3].path(), "");
        assert_eq!(all[3].state(), DownloadState::Invalid);
    }

    #[rstest]
    fn test_list_fails_on_undecodable_row(mut registry: Registry) {
        let (runtime, repo) = registry.repository().unwrap();
        runtime
            .block_on(
                sqlx::query("INSERT INTO download (url, value) VALUES ('broken', x'00ff')").execute(&mut *repo.conn),
            )
            .unwrap();
        let err = registry.list().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("record")));
    }
}
