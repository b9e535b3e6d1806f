use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use fetchlog_record::{DownloadRecord, DownloadState, timestamp};
use serde::{Deserialize, Serialize};
use time::UtcDateTime;

/// A raw row of the `download` table.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RecordRow {
    pub(crate) url: String,
    pub(crate) value: Vec<u8>,
}

/// The serialized form of a record stored in `download.value`.
///
/// Every key is optional on read, whether absent or `null`, so that partial
/// rows still load with default values.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RecordValue {
    url: Option<String>,
    path: Option<String>,
    size: Option<i64>,
    state: Option<i64>,
    timestamp: Option<String>,
}

impl TryFrom<&DownloadRecord> for RecordRow {
    type Error = Error;
    fn try_from(record: &DownloadRecord) -> Result<Self, Self::Error> {
        let value = RecordValue {
            url: Some(record.url().to_string()),
            path: Some(record.path().to_string()),
            size: Some(i64::try_from(record.size()).or_raise(|| ErrorKind::InvalidData("size"))?),
            state: Some(record.state().code()),
            timestamp: Some(timestamp::format(record.timestamp()).or_raise(|| ErrorKind::InvalidData("timestamp"))?),
        };
        Ok(Self {
            url: record.url().to_string(),
            value: serde_json::to_vec(&value).or_raise(|| ErrorKind::InvalidData("record"))?,
        })
    }
}

impl TryFrom<RecordRow> for DownloadRecord {
    type Error = Error;
    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let value: RecordValue = serde_json::from_slice(&row.value).or_raise(|| ErrorKind::InvalidData("record"))?;
        let at = match timestamp::parse(value.timestamp.unwrap_or_default()) {
            Ok(at) => at,
            Err(err) => {
                // Sort unreadable timestamps last instead of failing the whole listing.
                tracing::warn!(url = %row.url, error = ?err, "Stored download has an unreadable timestamp");
                UtcDateTime::UNIX_EPOCH
            },
        };
        // Rows written without a URL in the value are still keyed by one.
        let url = match value.url {
            Some(url) if !url.is_empty() => url,
            _ => row.url,
        };
        Ok(DownloadRecord::new(url)
            .with_path(value.path.unwrap_or_default())
            .with_size(u64::try_from(value.size.unwrap_or_default()).unwrap_or_default())
            .with_state(DownloadState::from_code(value.state.unwrap_or_default()))
            .with_timestamp(at))
    }
}
