//! Persisted registry of download tasks.
//!
//! This crate bundles the workspace into one dependency:
//!
//! - [`DownloadRecord`] / [`DownloadState`] from `fetchlog-record`,
//! - [`Registry`] from `fetchlog-registry`,
//! - [`Config`] from `fetchlog-config`.
//!
//! ```no_run
//! use fetchlog::{DownloadRecord, DownloadState};
//!
//! let mut registry = fetchlog::open_default()?;
//! let record = DownloadRecord::new("http://example.com/book.epub")
//!     .with_path("/media/books/book.epub")
//!     .with_size(1_048_576)
//!     .with_state(DownloadState::Pending);
//! registry.update(&record)?;
//! registry.update_state(record.url(), DownloadState::Finished)?;
//! let pending = registry.list_pending(&[], false, true)?;
//! assert!(pending.iter().all(|r| !r.state().is_finished()));
//! # Ok::<(), fetchlog::registry::error::Error>(())
//! ```

use exn::ResultExt;
use tracing::instrument;

pub use fetchlog_config::{self as config, Config};
pub use fetchlog_record::{self as record, DownloadRecord, DownloadState};
pub use fetchlog_registry::{self as registry, Location, Registry};

use fetchlog_registry::error::{ErrorKind, Result};

/// Load configuration from the usual places and open the registry it
/// describes.
#[instrument]
pub fn open_default() -> Result<Registry> {
    let config = Config::load().or_raise(|| ErrorKind::Config)?;
    Registry::from_config(&config)
}
