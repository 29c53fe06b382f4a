//! XML body parsing for the file and blob REST APIs.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{ServiceErrorCode, StorageError, StorageResult};
use crate::models::{
    CorsRule, DirectoryEntry, EntryKind, FileServiceProperties, MetricsConfig, MetricsLevel,
    SasPermissions, ShareStats, SharedAccessPolicy, SignedIdentifier,
};

fn invalid_xml() -> StorageError {
    StorageError::service(ServiceErrorCode::InvalidXmlDocument)
}

/// Flags collected while reading one metrics element.
#[derive(Default)]
struct MetricsFlags {
    version: Option<String>,
    enabled: bool,
    include_apis: bool,
    retention_enabled: bool,
    retention_days: Option<u32>,
}

impl MetricsFlags {
    fn into_config(self) -> MetricsConfig {
        let mut config = MetricsConfig::new(
            MetricsLevel::from_flags(self.enabled, self.include_apis),
            if self.retention_enabled {
                self.retention_days
            } else {
                None
            },
        );
        if let Some(version) = self.version {
            config.version = version;
        }
        config
    }
}

/// Parses file service properties.
pub fn parse_service_properties(xml: &str) -> StorageResult<FileServiceProperties> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut props = FileServiceProperties::default();
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current_text = String::new();

    let mut metrics = MetricsFlags::default();
    let mut current_cors_rule = CorsRule::default();

    let split_list = |s: &str| -> Vec<String> {
        s.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect()
    };

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).to_string());
                current_text.clear();
            }
            Ok(Event::End(_)) => {
                let path_str: Vec<&str> = path.iter().map(|s| s.as_str()).collect();

                match path_str.as_slice() {
                    [_, "HourMetrics" | "MinuteMetrics", "Version"] => {
                        metrics.version = Some(current_text.clone());
                    }
                    [_, "HourMetrics" | "MinuteMetrics", "Enabled"] => {
                        metrics.enabled = current_text == "true";
                    }
                    [_, "HourMetrics" | "MinuteMetrics", "IncludeAPIs"] => {
                        metrics.include_apis = current_text == "true";
                    }
                    [_, "HourMetrics" | "MinuteMetrics", "RetentionPolicy", "Enabled"] => {
                        metrics.retention_enabled = current_text == "true";
                    }
                    [_, "HourMetrics" | "MinuteMetrics", "RetentionPolicy", "Days"] => {
                        metrics.retention_days =
                            Some(current_text.parse().map_err(|_| invalid_xml())?);
                    }
                    [_, "HourMetrics"] => {
                        props.hour_metrics = std::mem::take(&mut metrics).into_config();
                    }
                    [_, "MinuteMetrics"] => {
                        props.minute_metrics = std::mem::take(&mut metrics).into_config();
                    }
                    [_, "Cors", "CorsRule", "AllowedOrigins"] => {
                        current_cors_rule.allowed_origins = split_list(&current_text);
                    }
                    [_, "Cors", "CorsRule", "AllowedMethods"] => {
                        current_cors_rule.allowed_methods = split_list(&current_text);
                    }
                    [_, "Cors", "CorsRule", "AllowedHeaders"] => {
                        current_cors_rule.allowed_headers = split_list(&current_text);
                    }
                    [_, "Cors", "CorsRule", "ExposedHeaders"] => {
                        current_cors_rule.exposed_headers = split_list(&current_text);
                    }
                    [_, "Cors", "CorsRule", "MaxAgeInSeconds"] => {
                        current_cors_rule.max_age_in_seconds = current_text.parse().unwrap_or(0);
                    }
                    [_, "Cors", "CorsRule"] => {
                        props.cors.push(std::mem::take(&mut current_cors_rule));
                    }
                    _ => {}
                }

                path.pop();
                current_text.clear();
            }
            Ok(Event::Text(e)) => {
                current_text = e.unescape().map_err(|_| invalid_xml())?.to_string();
            }
            Ok(Event::Eof) => break,
            Err(_) => return Err(invalid_xml()),
            _ => {}
        }
        buf.clear();
    }

    Ok(props)
}

fn parse_policy_time(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| invalid_xml())
}

/// Parses a stored access policy set.
pub fn parse_signed_identifiers(xml: &str) -> StorageResult<Vec<SignedIdentifier>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut identifiers = Vec::new();
    let mut buf = Vec::new();
    let mut current_text = String::new();

    let mut current_id = String::new();
    let mut current_start: Option<DateTime<Utc>> = None;
    let mut current_expiry: Option<DateTime<Utc>> = None;
    let mut current_permissions = SasPermissions::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => {
                current_text.clear();
            }
            Ok(Event::End(e)) => {
                match e.name().as_ref() {
                    b"Id" => current_id = current_text.clone(),
                    b"Start" => current_start = Some(parse_policy_time(&current_text)?),
                    b"Expiry" => current_expiry = Some(parse_policy_time(&current_text)?),
                    b"Permission" => {
                        current_permissions =
                            SasPermissions::parse(&current_text).map_err(|_| invalid_xml())?
                    }
                    b"SignedIdentifier" => {
                        let expiry = current_expiry.take().ok_or_else(invalid_xml)?;
                        let mut policy = SharedAccessPolicy::new(current_permissions, expiry);
                        policy.start = current_start.take();
                        identifiers.push(SignedIdentifier::new(
                            std::mem::take(&mut current_id),
                            policy,
                        ));
                        current_permissions = SasPermissions::default();
                    }
                    _ => {}
                }
                current_text.clear();
            }
            Ok(Event::Text(e)) => {
                current_text = e.unescape().map_err(|_| invalid_xml())?.to_string();
            }
            Ok(Event::Eof) => break,
            Err(_) => return Err(invalid_xml()),
            _ => {}
        }
        buf.clear();
    }

    Ok(identifiers)
}

/// Parses share usage statistics.
pub fn parse_share_stats(xml: &str) -> StorageResult<ShareStats> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut current_text = String::new();
    let mut usage_bytes = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => current_text.clear(),
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"ShareUsageBytes" {
                    usage_bytes = Some(current_text.parse().map_err(|_| invalid_xml())?);
                }
            }
            Ok(Event::Text(e)) => {
                current_text = e.unescape().map_err(|_| invalid_xml())?.to_string();
            }
            Ok(Event::Eof) => break,
            Err(_) => return Err(invalid_xml()),
            _ => {}
        }
        buf.clear();
    }

    Ok(ShareStats {
        usage_bytes: usage_bytes.ok_or_else(invalid_xml)?,
    })
}

/// One page of a directory listing.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    pub entries: Vec<DirectoryEntry>,
    /// Continuation token for the next page, if any.
    pub next_marker: Option<String>,
}

/// Parses a directory listing.
pub fn parse_directory_listing(xml: &str) -> StorageResult<DirectoryListing> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut listing = DirectoryListing::default();
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current_text = String::new();
    let mut name = String::new();
    let mut content_length = 0u64;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).to_string());
                current_text.clear();
            }
            // Self-closing elements like <Properties /> carry nothing
            Ok(Event::Empty(_)) => {}
            Ok(Event::End(_)) => {
                let path_str: Vec<&str> = path.iter().map(|s| s.as_str()).collect();
                match path_str.as_slice() {
                    [_, "Entries", _, "Name"] => name = current_text.clone(),
                    [_, "Entries", "File", "Properties", "Content-Length"] => {
                        content_length = current_text.parse().map_err(|_| invalid_xml())?;
                    }
                    [_, "NextMarker"] if !current_text.is_empty() => {
                        listing.next_marker = Some(current_text.clone());
                    }
                    [_, "Entries", "File"] => {
                        listing.entries.push(DirectoryEntry {
                            name: std::mem::take(&mut name),
                            kind: EntryKind::File { content_length },
                        });
                        content_length = 0;
                    }
                    [_, "Entries", "Directory"] => {
                        listing.entries.push(DirectoryEntry {
                            name: std::mem::take(&mut name),
                            kind: EntryKind::Directory,
                        });
                    }
                    _ => {}
                }
                path.pop();
                current_text.clear();
            }
            Ok(Event::Text(e)) => {
                current_text = e.unescape().map_err(|_| invalid_xml())?.to_string();
            }
            Ok(Event::Eof) => break,
            Err(_) => return Err(invalid_xml()),
            _ => {}
        }
        buf.clear();
    }

    Ok(listing)
}

/// Error details carried in a response body.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
}

/// Parses an `<Error>` body. Never fails; unreadable bodies yield nothing.
pub fn parse_error_body(xml: &str) -> ErrorBody {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut body = ErrorBody::default();
    let mut buf = Vec::new();
    let mut current_text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => current_text.clear(),
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"Code" => body.code = Some(current_text.clone()),
                b"Message" => body.message = Some(current_text.clone()),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if let Ok(text) = e.unescape() {
                    current_text = text.to_string();
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    body
}
