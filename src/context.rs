//! Request context shared by request signing and the in-memory backend.

use chrono::{DateTime, Utc};
use http::Method;
use std::collections::HashMap;
use url::Url;

use crate::transport::StorageRequest;

/// Signing-relevant view of a request.
///
/// Both the client (when signing with SharedKey) and the in-memory backend
/// (when verifying) build the same context from the same request, so the
/// string-to-sign is computed by one code path.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// HTTP method.
    pub method: &'a Method,
    /// Request URL.
    pub url: &'a Url,
    /// Account the request is addressed to.
    pub account: &'a str,
    /// Decoded query parameters.
    pub query_params: HashMap<String, String>,
    request: &'a StorageRequest,
}

impl<'a> RequestContext<'a> {
    /// Creates a context for a request addressed to `account`.
    pub fn new(request: &'a StorageRequest, account: &'a str) -> Self {
        let query_params = request
            .url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self {
            method: &request.method,
            url: &request.url,
            account,
            query_params,
            request,
        }
    }

    /// Returns the value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(|s| s.as_str())
    }

    /// Returns the value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header_value(name)
    }

    /// Returns the x-ms-* headers sorted alphabetically.
    pub fn ms_headers(&self) -> Vec<(&str, &str)> {
        let mut headers: Vec<_> = self
            .request
            .headers
            .iter()
            .filter_map(|(name, value)| {
                let name_str = name.as_str();
                if name_str.starts_with("x-ms-") {
                    value.to_str().ok().map(|v| (name_str, v))
                } else {
                    None
                }
            })
            .collect();
        headers.sort_by(|a, b| a.0.cmp(b.0));
        headers
    }

    /// Returns the body length, which is what goes out as Content-Length.
    pub fn content_length(&self) -> u64 {
        self.request.body.len() as u64
    }

    /// Returns the restype query parameter.
    pub fn restype(&self) -> Option<&str> {
        self.query_param("restype")
    }

    /// Returns the comp query parameter.
    pub fn comp(&self) -> Option<&str> {
        self.query_param("comp")
    }

    /// Returns the x-ms-copy-source header value.
    pub fn copy_source(&self) -> Option<&str> {
        self.header("x-ms-copy-source")
    }

    /// Returns the x-ms-range (or Range) header parsed as (start, end).
    pub fn range(&self) -> Option<(u64, Option<u64>)> {
        self.header("x-ms-range")
            .or_else(|| self.header("range"))
            .and_then(parse_range_header)
    }
}

/// Parses a Range header value like "bytes=0-1023" or "bytes=0-".
pub fn parse_range_header(value: &str) -> Option<(u64, Option<u64>)> {
    let value = value.strip_prefix("bytes=")?;
    let (start, end) = value.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end: Option<u64> = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    Some((start, end))
}

/// Parses an HTTP date in RFC 1123 format.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(value, "%a, %d %b %Y %H:%M:%S GMT")
                .ok()
                .map(|dt| dt.and_utc())
        })
}

/// Formats a DateTime as RFC 1123 format for HTTP headers.
pub fn format_http_date(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
