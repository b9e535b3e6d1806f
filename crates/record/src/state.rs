use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use crate::error::{Error, ErrorKind};

/// Lifecycle tag of a download.
///
/// The registry only tracks the last reported value; it never drives
/// transitions itself. [`Finished`](DownloadState::Finished) is the only state
/// with semantics of its own: finished downloads are left out of pending
/// listings unless explicitly requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DownloadState {
    /// Freshly created, nothing reported yet.
    #[default]
    Invalid,
    /// Queued, waiting for a transfer slot.
    Pending,
    /// Transfer in progress.
    Downloading,
    /// Transfer suspended by the user.
    Paused,
    /// Transfer gave up with an error.
    Failed,
    /// Transfer completed.
    Finished,
}
impl DownloadState {
    /// Integer code used in the serialized record.
    pub fn code(&self) -> i64 {
        match self {
            DownloadState::Invalid => 0,
            DownloadState::Pending => 1,
            DownloadState::Downloading => 2,
            DownloadState::Paused => 3,
            DownloadState::Failed => 4,
            DownloadState::Finished => 5,
        }
    }

    /// Decode a state from its integer code.
    ///
    /// Codes this version doesn't know about decode as
    /// [`Invalid`](DownloadState::Invalid) rather than failing, so that rows
    /// written by a newer writer still load.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => DownloadState::Pending,
            2 => DownloadState::Downloading,
            3 => DownloadState::Paused,
            4 => DownloadState::Failed,
            5 => DownloadState::Finished,
            _ => DownloadState::Invalid,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, DownloadState::Finished)
    }

    /// Returns the short name (for displaying to user).
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadState::Invalid => "invalid",
            DownloadState::Pending => "pending",
            DownloadState::Downloading => "downloading",
            DownloadState::Paused => "paused",
            DownloadState::Failed => "failed",
            DownloadState::Finished => "finished",
        }
    }
}
impl From<i64> for DownloadState {
    fn from(code: i64) -> Self {
        Self::from_code(code)
    }
}
impl From<DownloadState> for i64 {
    fn from(state: DownloadState) -> Self {
        state.code()
    }
}
impl FromStr for DownloadState {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "invalid" => Self::Invalid,
            "pending" => Self::Pending,
            "downloading" => Self::Downloading,
            "paused" => Self::Paused,
            "failed" => Self::Failed,
            "finished" => Self::Finished,
            _ => exn::bail!(ErrorKind::ParseError {
                field: "state",
                value: format!("unknown download state: {}", s)
            }),
        })
    }
}

impl Display for DownloadState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}
