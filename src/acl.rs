//! Stored access policy round trips shared by shares and containers.

use http::Method;
use url::Url;

use crate::error::StorageResult;
use crate::models::{validate_signed_identifiers, SharedAccessPolicy, SignedIdentifier};
use crate::pipeline::Pipeline;
use crate::transport::StorageRequest;
use crate::xml::{parse_signed_identifiers, serialize_signed_identifiers};

fn acl_request(method: Method, url: &Url, restype: &str) -> StorageRequest {
    StorageRequest::new(method, url.clone())
        .query("restype", restype)
        .query("comp", "acl")
}

pub(crate) async fn get_access_policies(
    pipeline: &Pipeline,
    url: &Url,
    restype: &str,
) -> StorageResult<Vec<SignedIdentifier>> {
    let response = pipeline.send(acl_request(Method::GET, url, restype)).await?;
    parse_signed_identifiers(&response.text().await?)
}

pub(crate) async fn set_access_policies(
    pipeline: &Pipeline,
    url: &Url,
    restype: &str,
    identifiers: &[SignedIdentifier],
) -> StorageResult<()> {
    validate_signed_identifiers(identifiers)?;
    let request = acl_request(Method::PUT, url, restype)
        .header("content-type", "application/xml")?
        .body(serialize_signed_identifiers(identifiers));
    pipeline.send(request).await?;
    Ok(())
}

/// Replaces the policy named `id`, or appends it.
pub(crate) fn upsert_policy(
    identifiers: &mut Vec<SignedIdentifier>,
    id: &str,
    policy: SharedAccessPolicy,
) {
    match identifiers.iter_mut().find(|identifier| identifier.id == id) {
        Some(existing) => existing.policy = policy,
        None => identifiers.push(SignedIdentifier::new(id, policy)),
    }
}
