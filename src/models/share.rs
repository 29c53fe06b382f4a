//! Share data models.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{ErrorKind, StorageError, StorageResult};

const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Share quota in GiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Quota {
    /// No cap beyond the service limit.
    #[default]
    Unset,
    /// Cap in GiB.
    Limit(u32),
}

impl Quota {
    /// Value of the `x-ms-share-quota` header; `0` removes the cap.
    pub fn header_value(&self) -> String {
        match self {
            Quota::Unset => "0".to_string(),
            Quota::Limit(gib) => gib.to_string(),
        }
    }

    /// A cap of `0` GiB means no cap.
    pub fn from_gib(gib: u32) -> Self {
        match gib {
            0 => Quota::Unset,
            gib => Quota::Limit(gib),
        }
    }

    /// Reads the `x-ms-share-quota` header; absent or `0` means no cap.
    pub fn from_header(value: Option<&str>) -> StorageResult<Self> {
        let Some(value) = value else {
            return Ok(Quota::Unset);
        };
        let gib = value.trim().parse::<u32>().map_err(|_| {
            StorageError::with_message(
                ErrorKind::Transport,
                format!("malformed x-ms-share-quota header '{}'", value),
            )
        })?;
        Ok(Quota::from_gib(gib))
    }

    pub fn as_gib(&self) -> Option<u32> {
        match self {
            Quota::Unset => None,
            Quota::Limit(gib) => Some(*gib),
        }
    }
}

/// Share properties as of one `fetch_properties` call.
///
/// A snapshot is exact at `fetched_at` and stale from then on; nothing
/// refreshes it implicitly. Local edits reach the service only through
/// `ShareHandle::set_properties`, and concurrent pushes from different
/// snapshots are last-write-wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharePropertiesSnapshot {
    pub(crate) quota: Quota,
    pub(crate) etag: String,
    pub(crate) last_modified: Option<DateTime<Utc>>,
    pub(crate) fetched_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) fetched_quota: Quota,
}

impl SharePropertiesSnapshot {
    pub(crate) fn fetched(
        quota: Quota,
        etag: String,
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            quota,
            etag,
            last_modified,
            fetched_at: Utc::now(),
            fetched_quota: quota,
        }
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }

    /// Changes the quota locally. Call `ShareHandle::set_properties` to push it.
    pub fn set_quota(&mut self, quota: Quota) {
        self.quota = quota;
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Returns true if the snapshot was edited locally since it was fetched.
    pub fn is_modified(&self) -> bool {
        self.quota != self.fetched_quota
    }
}

/// Share usage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareStats {
    pub usage_bytes: u64,
}

impl ShareStats {
    /// Usage in GiB, rounded up.
    pub fn usage_gib(&self) -> u64 {
        self.usage_bytes.div_ceil(BYTES_PER_GIB)
    }
}

/// Converts a quota in GiB to bytes.
pub fn gib_to_bytes(gib: u32) -> u64 {
    u64::from(gib) * BYTES_PER_GIB
}

fn name_regex() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^[a-z0-9](-?[a-z0-9])*$").expect("valid name regex"))
}

/// Validates a share or container name: 3-63 characters, lowercase letters,
/// digits and single hyphens, starting and ending alphanumerically.
pub fn validate_resource_name(kind: &str, name: &str) -> StorageResult<()> {
    if !(3..=63).contains(&name.len()) || !name_regex().is_match(name) {
        return Err(StorageError::with_message(
            ErrorKind::InvalidConfiguration,
            format!("invalid {} name '{}'", kind, name),
        ));
    }
    Ok(())
}

/// Validates one file or directory name component.
pub fn validate_path_component(name: &str) -> StorageResult<()> {
    const FORBIDDEN: &[char] = &['"', '\\', '/', ':', '|', '<', '>', '*', '?'];
    if name.is_empty() || name.len() > 255 || name.contains(FORBIDDEN) {
        return Err(StorageError::with_message(
            ErrorKind::InvalidConfiguration,
            format!("invalid file or directory name '{}'", name),
        ));
    }
    Ok(())
}
