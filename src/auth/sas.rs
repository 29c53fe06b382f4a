//! Service SAS minting and validation for the file and blob services.
//!
//! Minting is a local HMAC-SHA256 over the documented string-to-sign; no
//! round trip is needed. A token minted against a stored access policy only
//! carries the policy id (`si`), so the service resolves permissions and
//! expiry when the token is checked and deleting the policy revokes the
//! token. Ad hoc tokens carry everything and stay valid until they expire.

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashMap;
use std::fmt;
use url::Url;

use super::shared_key::{compute_signature, verify_signature};
use crate::config::DEFAULT_API_VERSION;
use crate::error::{ErrorKind, ServiceErrorCode, StorageError, StorageResult};
use crate::models::{
    SasPermission, SasPermissions, ServiceKind, SharedAccessPolicy, SignedIdentifier,
};

/// Signed version used for every token this crate mints.
pub const SAS_VERSION: &str = DEFAULT_API_VERSION;

/// Characters left unescaped in query values.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Signed resource (`sr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasResource {
    Share,
    File,
    Container,
    Blob,
}

impl SasResource {
    pub fn as_code(&self) -> &'static str {
        match self {
            SasResource::Share => "s",
            SasResource::File => "f",
            SasResource::Container => "c",
            SasResource::Blob => "b",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "s" => Some(SasResource::Share),
            "f" => Some(SasResource::File),
            "c" => Some(SasResource::Container),
            "b" => Some(SasResource::Blob),
            _ => None,
        }
    }

    pub fn service(&self) -> ServiceKind {
        match self {
            SasResource::Share | SasResource::File => ServiceKind::File,
            SasResource::Container | SasResource::Blob => ServiceKind::Blob,
        }
    }

    /// True for single-object resources (file, blob).
    fn is_object(&self) -> bool {
        matches!(self, SasResource::File | SasResource::Blob)
    }
}

/// What a token grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SasGrant {
    /// Everything embedded in the token; cannot be revoked before expiry.
    AdHoc(SharedAccessPolicy),
    /// Refers to a stored access policy by id; revoked by removing the policy.
    Stored { identifier: String },
}

impl SasGrant {
    pub fn stored(identifier: impl Into<String>) -> Self {
        SasGrant::Stored {
            identifier: identifier.into(),
        }
    }
}

/// The resource a token is signed for or checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasTarget {
    pub account: String,
    pub service: ServiceKind,
    /// Share or container name.
    pub root: String,
    /// File path or blob name, unescaped, `/`-separated.
    pub path: Option<String>,
}

impl SasTarget {
    /// Canonicalized resource, e.g. `/file/account/share/dir/file.txt`.
    fn canonical_resource(&self, resource: SasResource) -> String {
        let mut canonical = format!("/{}/{}/{}", self.service.as_str(), self.account, self.root);
        if resource.is_object() {
            if let Some(ref path) = self.path {
                canonical.push('/');
                canonical.push_str(path);
            }
        }
        canonical
    }
}

/// A service shared access signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasToken {
    /// Signed version (sv).
    pub version: String,
    /// Signed resource (sr).
    pub resource: SasResource,
    /// Signed permissions (sp); absent when taken from a stored policy.
    pub permissions: Option<SasPermissions>,
    /// Signed start (st).
    pub start: Option<DateTime<Utc>>,
    /// Signed expiry (se); absent when taken from a stored policy.
    pub expiry: Option<DateTime<Utc>>,
    /// Signed identifier (si) naming a stored access policy.
    pub identifier: Option<String>,
    /// Signed protocol (spr).
    pub protocol: Option<String>,
    /// Signature (sig).
    pub signature: String,
}

impl SasToken {
    /// Mints a token for `target` under the account key.
    pub fn sign(
        target: &SasTarget,
        resource: SasResource,
        grant: &SasGrant,
        account_key: &str,
    ) -> StorageResult<Self> {
        if resource.service() != target.service {
            return Err(StorageError::with_message(
                ErrorKind::InvalidConfiguration,
                format!(
                    "signed resource '{}' does not belong to the {} service",
                    resource.as_code(),
                    target.service.as_str()
                ),
            ));
        }
        if resource.is_object() && target.path.is_none() {
            return Err(StorageError::with_message(
                ErrorKind::InvalidConfiguration,
                "an object SAS needs a file path or blob name",
            ));
        }

        let mut token = Self {
            version: SAS_VERSION.to_string(),
            resource,
            permissions: None,
            start: None,
            expiry: None,
            identifier: None,
            protocol: None,
            signature: String::new(),
        };

        match grant {
            SasGrant::AdHoc(policy) => {
                if policy.permissions.is_empty() {
                    return Err(StorageError::with_message(
                        ErrorKind::InvalidConfiguration,
                        "a SAS needs at least one permission",
                    ));
                }
                if let Some(start) = policy.start {
                    if start >= policy.expiry {
                        return Err(StorageError::with_message(
                            ErrorKind::InvalidConfiguration,
                            "SAS start time must precede its expiry",
                        ));
                    }
                }
                token.permissions = Some(policy.permissions);
                token.start = policy.start.map(truncate_to_seconds);
                token.expiry = Some(truncate_to_seconds(policy.expiry));
            }
            SasGrant::Stored { identifier } => {
                if identifier.is_empty() {
                    return Err(StorageError::with_message(
                        ErrorKind::InvalidConfiguration,
                        "stored access policy id must not be empty",
                    ));
                }
                token.identifier = Some(identifier.clone());
            }
        }

        let string_to_sign = token.string_to_sign(target);
        token.signature = compute_signature(&string_to_sign, account_key)?;
        Ok(token)
    }

    /// Reads a token from decoded query parameters. Returns `Ok(None)` when
    /// the query carries no signature.
    pub fn from_query(params: &HashMap<String, String>) -> StorageResult<Option<Self>> {
        let Some(signature) = params.get("sig") else {
            return Ok(None);
        };

        let malformed = |what: &str| {
            StorageError::service_with_message(
                ServiceErrorCode::AuthenticationFailed,
                format!("malformed SAS: {}", what),
            )
        };

        let version = params.get("sv").ok_or_else(|| malformed("missing sv"))?.clone();
        let resource = params
            .get("sr")
            .and_then(|sr| SasResource::from_code(sr))
            .ok_or_else(|| malformed("missing or unknown sr"))?;
        let permissions = match params.get("sp") {
            Some(sp) => Some(SasPermissions::parse(sp).map_err(|_| malformed("bad sp"))?),
            None => None,
        };
        let start = match params.get("st") {
            Some(st) => Some(parse_sas_datetime(st).ok_or_else(|| malformed("bad st"))?),
            None => None,
        };
        let expiry = match params.get("se") {
            Some(se) => Some(parse_sas_datetime(se).ok_or_else(|| malformed("bad se"))?),
            None => None,
        };

        Ok(Some(Self {
            version,
            resource,
            permissions,
            start,
            expiry,
            identifier: params.get("si").cloned(),
            protocol: params.get("spr").cloned(),
            signature: signature.clone(),
        }))
    }

    /// Parses a query string such as `sv=...&sr=f&...&sig=...`.
    pub fn parse(query: &str) -> StorageResult<Self> {
        let params: HashMap<String, String> = url::form_urlencoded::parse(
            query.trim_start_matches('?').as_bytes(),
        )
        .into_owned()
        .collect();
        Self::from_query(&params)
            .map_err(|e| StorageError::with_message(ErrorKind::InvalidConfiguration, e.message))?
            .ok_or_else(|| {
                StorageError::with_message(ErrorKind::InvalidConfiguration, "query carries no SAS")
            })
    }

    /// Query parameters in the order the service documents them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("sv", self.version.clone()),
            ("sr", self.resource.as_code().to_string()),
        ];
        if let Some(ref si) = self.identifier {
            pairs.push(("si", si.clone()));
        }
        if let Some(sp) = self.permissions {
            pairs.push(("sp", sp.to_string()));
        }
        if let Some(st) = self.start {
            pairs.push(("st", format_sas_datetime(&st)));
        }
        if let Some(se) = self.expiry {
            pairs.push(("se", format_sas_datetime(&se)));
        }
        if let Some(ref spr) = self.protocol {
            pairs.push(("spr", spr.clone()));
        }
        pairs.push(("sig", self.signature.clone()));
        pairs
    }

    /// Appends the token to a resource URL.
    pub fn apply_to(&self, url: &mut Url) {
        let mut query = url.query_pairs_mut();
        for (key, value) in self.query_pairs() {
            query.append_pair(key, &value);
        }
    }

    /// Checks the token against a request for `target`.
    ///
    /// `required` lists alternative permissions, any one of which suffices;
    /// `stored` is the stored policy set of the share or container as it is
    /// right now.
    pub fn validate(
        &self,
        target: &SasTarget,
        account_key: &str,
        required: &[SasPermission],
        stored: &[SignedIdentifier],
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        if self.resource.service() != target.service {
            return Err(StorageError::service(
                ServiceErrorCode::AuthorizationResourceTypeMismatch,
            ));
        }
        if self.resource.is_object() && target.path.is_none() {
            return Err(StorageError::service(
                ServiceErrorCode::AuthorizationResourceTypeMismatch,
            ));
        }

        let string_to_sign = self.string_to_sign(target);
        if !verify_signature(&string_to_sign, account_key, &self.signature)? {
            tracing::debug!(string_to_sign = ?string_to_sign, "SAS signature mismatch");
            return Err(StorageError::service_with_message(
                ServiceErrorCode::AuthenticationFailed,
                "Signature did not match.",
            ));
        }

        let (permissions, start, expiry) = self.effective_policy(stored)?;

        if now > expiry {
            return Err(StorageError::service_with_message(
                ServiceErrorCode::AuthenticationFailed,
                "Signed expiry time has passed.",
            ));
        }
        if let Some(start) = start {
            if now < start {
                return Err(StorageError::service_with_message(
                    ServiceErrorCode::AuthenticationFailed,
                    "Signed start time is in the future.",
                ));
            }
        }

        if !required.is_empty() && !required.iter().any(|p| permissions.contains(*p)) {
            return Err(StorageError::service(
                ServiceErrorCode::AuthorizationPermissionMismatch,
            ));
        }

        Ok(())
    }

    /// Merges token fields with the referenced stored policy, if any.
    fn effective_policy(
        &self,
        stored: &[SignedIdentifier],
    ) -> StorageResult<(SasPermissions, Option<DateTime<Utc>>, DateTime<Utc>)> {
        let Some(ref id) = self.identifier else {
            let permissions = self.permissions.ok_or_else(|| {
                StorageError::service_with_message(
                    ServiceErrorCode::AuthenticationFailed,
                    "SAS carries no permissions.",
                )
            })?;
            let expiry = self.expiry.ok_or_else(|| {
                StorageError::service_with_message(
                    ServiceErrorCode::AuthenticationFailed,
                    "SAS carries no expiry.",
                )
            })?;
            return Ok((permissions, self.start, expiry));
        };

        let policy = stored
            .iter()
            .find(|identifier| &identifier.id == id)
            .map(|identifier| &identifier.policy)
            .ok_or_else(|| {
                StorageError::service_with_message(
                    ServiceErrorCode::AuthenticationFailed,
                    format!("Stored access policy '{}' does not exist.", id),
                )
            })?;

        if self.permissions.is_some() || self.expiry.is_some() || self.start.is_some() {
            return Err(StorageError::service_with_message(
                ServiceErrorCode::AuthenticationFailed,
                "Access policy fields are specified both in the SAS and in the stored policy.",
            ));
        }

        Ok((policy.permissions, policy.start, policy.expiry))
    }

    /// Builds the string-to-sign for this token and target.
    fn string_to_sign(&self, target: &SasTarget) -> String {
        let mut parts = vec![
            self.permissions.map(|p| p.to_string()).unwrap_or_default(),
            self.start.map(|dt| format_sas_datetime(&dt)).unwrap_or_default(),
            self.expiry.map(|dt| format_sas_datetime(&dt)).unwrap_or_default(),
            target.canonical_resource(self.resource),
            self.identifier.clone().unwrap_or_default(),
            // Signed IP
            String::new(),
            self.protocol.clone().unwrap_or_default(),
            self.version.clone(),
        ];

        if self.resource.service() == ServiceKind::Blob {
            parts.push(self.resource.as_code().to_string());
            // Snapshot time
            parts.push(String::new());
            // Encryption scope
            parts.push(String::new());
        }

        // Response header overrides: rscc, rscd, rsce, rscl, rsct
        parts.extend(std::iter::repeat(String::new()).take(5));

        parts.join("\n")
    }
}

impl fmt::Display for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded: Vec<String> = self
            .query_pairs()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, utf8_percent_encode(&v, QUERY_VALUE)))
            .collect();
        f.write_str(&encoded.join("&"))
    }
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(dt.timestamp(), 0).unwrap_or(dt)
}

/// Parses a SAS datetime string.
fn parse_sas_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ")
                .ok()
                .map(|dt| dt.and_utc())
        })
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}

/// Formats a datetime for a SAS token.
fn format_sas_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
