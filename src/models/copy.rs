//! Server-side copy state.

use chrono::{DateTime, Utc};
use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::context::parse_http_date;

/// Copy status for file and blob copy operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyStatus {
    Pending,
    Success,
    Aborted,
    Failed,
}

impl CopyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Pending => "pending",
            CopyStatus::Success => "success",
            CopyStatus::Aborted => "aborted",
            CopyStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(CopyStatus::Pending),
            "success" => Some(CopyStatus::Success),
            "aborted" => Some(CopyStatus::Aborted),
            "failed" => Some(CopyStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CopyStatus::Pending)
    }
}

/// Bytes copied out of the source length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyProgress {
    pub copied: u64,
    pub total: u64,
}

impl CopyProgress {
    /// Parses `copied/total`.
    pub fn parse(s: &str) -> Option<Self> {
        let (copied, total) = s.split_once('/')?;
        Some(Self {
            copied: copied.trim().parse().ok()?,
            total: total.trim().parse().ok()?,
        })
    }
}

/// The last copy operation recorded on a destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyState {
    pub copy_id: String,
    pub status: CopyStatus,
    pub source: Option<String>,
    pub progress: Option<CopyProgress>,
    pub completion_time: Option<DateTime<Utc>>,
    pub status_description: Option<String>,
}

impl CopyState {
    /// Reads the `x-ms-copy-*` response headers. Returns `None` when the
    /// destination carries no copy record.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        let copy_id = header("x-ms-copy-id")?.to_string();
        let status = CopyStatus::from_str(header("x-ms-copy-status")?)?;

        Some(Self {
            copy_id,
            status,
            source: header("x-ms-copy-source").map(String::from),
            progress: header("x-ms-copy-progress").and_then(CopyProgress::parse),
            completion_time: header("x-ms-copy-completion-time").and_then(parse_http_date),
            status_description: header("x-ms-copy-status-description").map(String::from),
        })
    }
}
