//! Download record model.
//!
//! A [`DownloadRecord`] is the metadata of one download task: where it comes
//! from, where it goes, how big it is, what state it is in and when it was
//! last touched. Records are plain values; persistence lives in
//! `fetchlog-registry`.

pub mod error;
mod record;
mod state;
pub mod timestamp;

pub use crate::record::DownloadRecord;
pub use crate::state::DownloadState;
