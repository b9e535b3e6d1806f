use std::hash::{Hash, Hasher};
use time::UtcDateTime;

use crate::{DownloadState, timestamp};

/// Metadata for a single download task.
///
/// Identity is the source URL alone: two records with the same URL are equal
/// no matter what their path, size, state or timestamp say. The registry
/// relies on this when merging stored and caller-supplied records.
#[derive(Debug, Clone)]
pub struct DownloadRecord {
    url: String,
    path: String,
    size: u64,
    state: DownloadState,
    timestamp: UtcDateTime,
}
impl Default for DownloadRecord {
    fn default() -> Self {
        Self {
            url: String::new(),
            path: String::new(),
            size: 0,
            state: DownloadState::Invalid,
            timestamp: timestamp::now(),
        }
    }
}
impl DownloadRecord {
    /// Create a record for `url`, in the [`Invalid`](DownloadState::Invalid)
    /// state and stamped with the current time.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Self::default() }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_state(mut self, state: DownloadState) -> Self {
        self.state = state;
        self
    }

    pub fn with_timestamp(mut self, at: UtcDateTime) -> Self {
        self.set_timestamp(at);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    /// Destination path on the local filesystem.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    pub fn set_state(&mut self, state: DownloadState) {
        self.state = state;
    }

    /// Last time this record was updated.
    pub fn timestamp(&self) -> UtcDateTime {
        self.timestamp
    }

    /// Sub-second precision is dropped to match what storage can hold.
    pub fn set_timestamp(&mut self, at: UtcDateTime) {
        self.timestamp = timestamp::truncate(at);
    }

    /// Stamp the record with the current time.
    pub fn touch(&mut self) {
        self.timestamp = timestamp::now();
    }

    /// Compare every field, not just identity.
    pub fn same_contents(&self, other: &Self) -> bool {
        self.url == other.url
            && self.path == other.path
            && self.size == other.size
            && self.state == other.state
            && self.timestamp == other.timestamp
    }
}
impl PartialEq for DownloadRecord {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}
impl Eq for DownloadRecord {}
impl Hash for DownloadRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}
