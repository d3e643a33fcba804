//! Run lifecycle definitions
//!
//! A run moves `pending -> running -> {completed, failed}`; the two right-hand
//! states are terminal.

use chrono::{DateTime, Utc};
use std::fmt;

/// Represents the status of one crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunStatus {
    /// Run has been registered but no worker has started
    #[default]
    Pending,

    /// Engine is crawling
    Running,

    /// Engine finished cleanly and crawled at least one page
    Completed,

    /// Engine errored, crashed, timed out, was cancelled, or crawled nothing
    Failed,
}

impl RunStatus {
    /// Returns true for `Completed` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the state machine allows moving from `self` to `next`
    ///
    /// A launch failure moves a pending run straight to `Failed`.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Point-in-time statistics for one run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunStats {
    pub pages_crawled: u64,
    pub pages_failed: u64,
    pub assets_uploaded: u64,
    pub status: RunStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl RunStats {
    /// Wall-clock duration of the run, if it has both ends stamped
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
