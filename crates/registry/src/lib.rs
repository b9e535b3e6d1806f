//! SQLite-backed registry of download records.
//!
//! The registry remembers what a downloader was doing across process
//! restarts. It is not the downloader: it never transfers anything, it only
//! stores the last state each download reported.
//!
//! # Storage
//! One table, `download`, keyed by source URL. Each row's `value` holds the
//! record serialized as a JSON object with the keys `url`, `path`, `size`,
//! `state` (integer) and `timestamp` (`YYYY-MM-DD hh:mm:ss`, UTC).
//!
//! # Listing
//! [`Registry::list_pending`] merges what is stored with what the caller
//! already holds in memory, so a "resume downloads" view can include tasks
//! that were queued but never persisted. Stored records take precedence.

mod db;
pub mod error;
mod models;
mod registry;
mod repo;

pub use crate::registry::{Location, Registry};
pub use fetchlog_record::{DownloadRecord, DownloadState};
