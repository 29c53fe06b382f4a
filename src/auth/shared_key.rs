//! SharedKey request signing and verification.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::context::RequestContext;
use crate::error::{ErrorKind, StorageError, StorageResult};

type HmacSha256 = Hmac<Sha256>;

/// Returns the `Authorization` header value for a request.
pub fn authorization_header(ctx: &RequestContext, account_key: &str) -> StorageResult<String> {
    let string_to_sign = build_string_to_sign(ctx);
    let signature = compute_signature(&string_to_sign, account_key)?;
    Ok(format!("SharedKey {}:{}", ctx.account, signature))
}

/// Verifies the SharedKey `Authorization` header of a request.
pub fn validate_shared_key(ctx: &RequestContext, account_key: &str) -> StorageResult<()> {
    let auth_header = ctx
        .header("authorization")
        .ok_or_else(|| StorageError::new(ErrorKind::AuthorizationFailed))?;

    let credentials = auth_header
        .strip_prefix("SharedKey ")
        .ok_or_else(|| StorageError::new(ErrorKind::AuthorizationFailed))?;

    let (account, provided_signature) = credentials
        .split_once(':')
        .ok_or_else(|| StorageError::new(ErrorKind::AuthorizationFailed))?;

    if account != ctx.account {
        return Err(StorageError::with_message(
            ErrorKind::AuthorizationFailed,
            "account in Authorization header does not match the request",
        ));
    }

    let string_to_sign = build_string_to_sign(ctx);
    if !verify_signature(&string_to_sign, account_key, provided_signature)? {
        tracing::debug!(string_to_sign = ?string_to_sign, "SharedKey signature mismatch");
        return Err(StorageError::with_message(
            ErrorKind::AuthorizationFailed,
            "Server failed to authenticate the request.",
        ));
    }

    Ok(())
}

/// Builds the string-to-sign for SharedKey authentication.
fn build_string_to_sign(ctx: &RequestContext) -> String {
    let mut parts = Vec::with_capacity(12);

    // VERB
    parts.push(ctx.method.as_str().to_uppercase());

    // Content headers (must be in this exact order)
    for header in [
        "content-encoding",
        "content-language",
        "content-length",
        "content-md5",
        "content-type",
    ] {
        let value = if header == "content-length" {
            // Empty when the body is empty
            match ctx.content_length() {
                0 => String::new(),
                len => len.to_string(),
            }
        } else {
            ctx.header(header).unwrap_or("").to_string()
        };
        parts.push(value);
    }

    // Date is empty when x-ms-date is present; x-ms-date is a canonicalized header
    let date = if ctx.header("x-ms-date").is_some() {
        ""
    } else {
        ctx.header("date").unwrap_or("")
    };
    parts.push(date.to_string());

    // Conditional headers
    for header in [
        "if-modified-since",
        "if-match",
        "if-none-match",
        "if-unmodified-since",
        "range",
    ] {
        parts.push(ctx.header(header).unwrap_or("").to_string());
    }

    format!(
        "{}\n{}{}",
        parts.join("\n"),
        build_canonicalized_headers(ctx),
        build_canonicalized_resource(ctx)
    )
}

/// Builds the canonicalized headers, each line terminated by `\n`.
fn build_canonicalized_headers(ctx: &RequestContext) -> String {
    let mut result = String::new();
    for (name, value) in ctx.ms_headers() {
        let normalized_value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        result.push_str(name);
        result.push(':');
        result.push_str(&normalized_value);
        result.push('\n');
    }
    result
}

/// Builds the canonicalized resource: `/{account}{path}` followed by the
/// query parameters sorted by lowercase name.
fn build_canonicalized_resource(ctx: &RequestContext) -> String {
    let mut resource = format!("/{}{}", ctx.account, ctx.url.path());

    let mut sorted_params: Vec<_> = ctx
        .query_params
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.as_str()))
        .collect();
    sorted_params.sort_by(|a, b| a.0.cmp(&b.0));

    for (key, value) in sorted_params {
        resource.push('\n');
        resource.push_str(&key);
        resource.push(':');
        resource.push_str(value);
    }

    resource
}

fn keyed_mac(account_key: &str) -> StorageResult<HmacSha256> {
    let key_bytes = BASE64.decode(account_key).map_err(|_| {
        StorageError::with_message(
            ErrorKind::InvalidConfiguration,
            "account key is not valid base64",
        )
    })?;

    HmacSha256::new_from_slice(&key_bytes).map_err(|_| {
        StorageError::with_message(ErrorKind::InvalidConfiguration, "failed to create HMAC")
    })
}

/// Computes the base64 HMAC-SHA256 of `string_to_sign` under the account key.
pub fn compute_signature(string_to_sign: &str, account_key: &str) -> StorageResult<String> {
    let mut mac = keyed_mac(account_key)?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Checks a base64 signature in constant time.
pub fn verify_signature(
    string_to_sign: &str,
    account_key: &str,
    provided_signature: &str,
) -> StorageResult<bool> {
    let Ok(provided) = BASE64.decode(provided_signature) else {
        return Ok(false);
    };
    let mut mac = keyed_mac(account_key)?;
    mac.update(string_to_sign.as_bytes());
    Ok(mac.verify_slice(&provided).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEV_ACCOUNT_KEY;
    use crate::transport::StorageRequest;
    use http::Method;
    use url::Url;

    fn request() -> StorageRequest {
        StorageRequest::new(
            Method::PUT,
            Url::parse("https://acct.file.core.windows.net/logs/log.txt?comp=range").unwrap(),
        )
        .header("x-ms-version", "2021-10-04")
        .unwrap()
        .header("x-ms-date", "Mon, 01 Jan 2024 00:00:00 GMT")
        .unwrap()
        .header("x-ms-range", "bytes=0-4")
        .unwrap()
        .body("hello")
    }

    #[test]
    fn test_string_to_sign_layout() {
        let request = request();
        let ctx = RequestContext::new(&request, "acct");
        let sts = build_string_to_sign(&ctx);
        assert_eq!(
            sts,
            "PUT\n\n\n5\n\n\n\n\n\n\n\n\n\
             x-ms-date:Mon, 01 Jan 2024 00:00:00 GMT\n\
             x-ms-range:bytes=0-4\n\
             x-ms-version:2021-10-04\n\
             /acct/logs/log.txt\ncomp:range"
        );
    }

    #[test]
    fn test_sign_then_validate() {
        let request = request();
        let ctx = RequestContext::new(&request, "acct");
        let header = authorization_header(&ctx, DEV_ACCOUNT_KEY).unwrap();

        let signed = request.clone().header("authorization", &header).unwrap();
        let ctx = RequestContext::new(&signed, "acct");
        assert!(validate_shared_key(&ctx, DEV_ACCOUNT_KEY).is_ok());

        let other_key = BASE64.encode(b"some other key");
        let err = validate_shared_key(&ctx, &other_key).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthorizationFailed);
    }

    #[test]
    fn test_tampered_request_fails() {
        let request = request();
        let ctx = RequestContext::new(&request, "acct");
        let header = authorization_header(&ctx, DEV_ACCOUNT_KEY).unwrap();

        let tampered = request.body("HELLO!").header("authorization", &header).unwrap();
        let ctx = RequestContext::new(&tampered, "acct");
        assert!(validate_shared_key(&ctx, DEV_ACCOUNT_KEY).is_err());
    }

    #[test]
    fn test_invalid_key_encoding() {
        let err = compute_signature("x", "not base64!").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidConfiguration);
    }
}
