//! Fixed on-disk timestamp format.
//!
//! Timestamps are kept as [`UtcDateTime`] in memory and only turned into
//! strings at the storage boundary. Reads and writes share [`FORMAT`].

use exn::ResultExt;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{PrimitiveDateTime, UtcDateTime};

use crate::error::{ErrorKind, Result};

/// `YYYY-MM-DD hh:mm:ss`, always UTC, second precision.
pub const FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Current time truncated to the precision of [`FORMAT`].
pub fn now() -> UtcDateTime {
    truncate(UtcDateTime::now())
}

/// Strip the sub-second component, which the storage format cannot carry.
pub fn truncate(at: UtcDateTime) -> UtcDateTime {
    at.replace_nanosecond(0).unwrap_or(at)
}

pub fn format(at: UtcDateTime) -> Result<String> {
    PrimitiveDateTime::new(at.date(), at.time()).format(FORMAT).or_raise(|| ErrorKind::Format)
}

pub fn parse(value: impl AsRef<str>) -> Result<UtcDateTime> {
    let value = value.as_ref();
    let parsed = PrimitiveDateTime::parse(value, FORMAT).or_raise(|| ErrorKind::ParseError {
        field: "timestamp",
        value: value.to_string(),
    })?;
    Ok(parsed.as_utc())
}
