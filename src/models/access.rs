//! Shared access permissions and stored access policies.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ErrorKind, StorageError, StorageResult};

/// Maximum number of stored access policies on a share or container.
pub const MAX_SIGNED_IDENTIFIERS: usize = 5;

/// A single SAS permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SasPermission {
    Read,
    Create,
    Write,
    Delete,
    List,
}

impl SasPermission {
    pub fn as_char(&self) -> char {
        match self {
            SasPermission::Read => 'r',
            SasPermission::Create => 'c',
            SasPermission::Write => 'w',
            SasPermission::Delete => 'd',
            SasPermission::List => 'l',
        }
    }
}

/// A set of SAS permissions.
///
/// Rendered in the canonical `rcwdl` order the service expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SasPermissions {
    pub read: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
    pub list: bool,
}

impl SasPermissions {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Self::default()
        }
    }

    pub fn all() -> Self {
        Self {
            read: true,
            create: true,
            write: true,
            delete: true,
            list: true,
        }
    }

    /// Returns the set with `permission` added.
    pub fn with(mut self, permission: SasPermission) -> Self {
        match permission {
            SasPermission::Read => self.read = true,
            SasPermission::Create => self.create = true,
            SasPermission::Write => self.write = true,
            SasPermission::Delete => self.delete = true,
            SasPermission::List => self.list = true,
        }
        self
    }

    pub fn contains(&self, permission: SasPermission) -> bool {
        match permission {
            SasPermission::Read => self.read,
            SasPermission::Create => self.create,
            SasPermission::Write => self.write,
            SasPermission::Delete => self.delete,
            SasPermission::List => self.list,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parses permissions in `rcwdl` notation, in any order.
    pub fn parse(s: &str) -> StorageResult<Self> {
        let mut permissions = Self::default();
        for c in s.chars() {
            let permission = match c {
                'r' => SasPermission::Read,
                'c' => SasPermission::Create,
                'w' => SasPermission::Write,
                'd' => SasPermission::Delete,
                'l' => SasPermission::List,
                other => {
                    return Err(StorageError::with_message(
                        ErrorKind::InvalidConfiguration,
                        format!("unknown SAS permission '{}'", other),
                    ))
                }
            };
            permissions = permissions.with(permission);
        }
        Ok(permissions)
    }
}

impl fmt::Display for SasPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for permission in [
            SasPermission::Read,
            SasPermission::Create,
            SasPermission::Write,
            SasPermission::Delete,
            SasPermission::List,
        ] {
            if self.contains(permission) {
                write!(f, "{}", permission.as_char())?;
            }
        }
        Ok(())
    }
}

/// A time-bounded permission grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedAccessPolicy {
    pub permissions: SasPermissions,
    pub start: Option<DateTime<Utc>>,
    pub expiry: DateTime<Utc>,
}

impl SharedAccessPolicy {
    pub fn new(permissions: SasPermissions, expiry: DateTime<Utc>) -> Self {
        Self {
            permissions,
            start: None,
            expiry,
        }
    }

    /// Grants `permissions` from now until now + `lifetime`.
    pub fn valid_for(permissions: SasPermissions, lifetime: Duration) -> Self {
        Self::new(permissions, Utc::now() + lifetime)
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Returns true when `now` falls inside the start/expiry window.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expiry && self.start.map_or(true, |start| now >= start)
    }
}

/// A named access policy stored on a share or container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedIdentifier {
    pub id: String,
    pub policy: SharedAccessPolicy,
}

impl SignedIdentifier {
    pub fn new(id: impl Into<String>, policy: SharedAccessPolicy) -> Self {
        Self {
            id: id.into(),
            policy,
        }
    }
}

/// Checks a policy set before it is pushed to the service.
pub fn validate_signed_identifiers(identifiers: &[SignedIdentifier]) -> StorageResult<()> {
    if identifiers.len() > MAX_SIGNED_IDENTIFIERS {
        return Err(StorageError::with_message(
            ErrorKind::InvalidConfiguration,
            format!(
                "at most {} stored access policies are allowed, got {}",
                MAX_SIGNED_IDENTIFIERS,
                identifiers.len()
            ),
        ));
    }
    for identifier in identifiers {
        if identifier.id.is_empty() || identifier.id.len() > 64 {
            return Err(StorageError::with_message(
                ErrorKind::InvalidConfiguration,
                "stored access policy ids must be 1 to 64 characters",
            ));
        }
    }
    for (i, identifier) in identifiers.iter().enumerate() {
        if identifiers[..i].iter().any(|other| other.id == identifier.id) {
            return Err(StorageError::with_message(
                ErrorKind::InvalidConfiguration,
                format!("duplicate stored access policy id '{}'", identifier.id),
            ));
        }
    }
    Ok(())
}
