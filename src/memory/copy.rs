//! Server-side copy into files and blobs.

use http::StatusCode;
use std::collections::HashMap;
use url::Url;
use uuid::Uuid;

use super::store::{ObjectModel, Snapshot};
use super::{blob, file, path_segments, resolve_host, Call, MemoryTransport, Reply};
use crate::auth::{SasTarget, SasToken};
use crate::error::{ServiceErrorCode, StorageError, StorageResult};
use crate::models::{SasPermission, ServiceKind};
use crate::transport::StorageResponse;

/// A copy source the destination account was allowed to read.
struct SourceContent {
    url: String,
    content: Snapshot,
    content_type: Option<String>,
}

fn cannot_verify(message: impl Into<String>) -> StorageError {
    StorageError::service_with_message(ServiceErrorCode::CannotVerifyCopySource, message)
}

/// Resolves and reads `x-ms-copy-source`.
///
/// A source carrying a SAS must grant read on itself, whatever account or
/// service it lives in. Without one it must sit in the destination's own
/// account and service.
fn read_source(backend: &MemoryTransport, call: &Call) -> StorageResult<SourceContent> {
    let raw = call.require_header("x-ms-copy-source")?;
    let url = Url::parse(raw).map_err(|_| {
        StorageError::service_with_message(
            ServiceErrorCode::InvalidHeaderValue,
            "x-ms-copy-source is not a URL",
        )
    })?;
    let (account, service) =
        resolve_host(&url).map_err(|_| cannot_verify("copy source is not an account URL"))?;
    let mut segments = path_segments(&url);
    if segments.len() < 2 {
        return Err(cannot_verify("copy source does not name a file or blob"));
    }
    let root = segments.remove(0);
    let path = segments.join("/");

    let query: HashMap<String, String> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    match SasToken::from_query(&query) {
        Ok(Some(token)) => {
            let key = backend
                .account_key(&account)
                .map_err(|e| cannot_verify(e.message))?;
            let policies = match service {
                ServiceKind::File => backend.store.share_policies(&account, &root),
                ServiceKind::Blob => backend.store.container_policies(&account, &root),
            };
            let target = SasTarget {
                account: account.clone(),
                service,
                root: root.clone(),
                path: Some(path.clone()),
            };
            token
                .validate(&target, &key, &[SasPermission::Read], &policies, call.now)
                .map_err(|e| cannot_verify(e.message))?;
        }
        Ok(None) => {
            if account != call.account || service != call.service {
                return Err(cannot_verify(
                    "a source in another account or service must carry a SAS",
                ));
            }
        }
        Err(e) => return Err(cannot_verify(e.message)),
    }

    let (content, content_type) = match service {
        ServiceKind::File => backend.store.with_share(&account, &root, |s| {
            s.files
                .get(&path)
                .map(|f| (f.snapshot(), f.content_type.clone()))
                .ok_or_else(|| StorageError::service(ServiceErrorCode::ResourceNotFound))
        })?,
        ServiceKind::Blob => backend.store.with_container(&account, &root, |c| {
            c.blobs
                .get(&path)
                .map(|b| (b.snapshot(), b.content_type.clone()))
                .ok_or_else(|| StorageError::service(ServiceErrorCode::BlobNotFound))
        })?,
    };

    Ok(SourceContent {
        url: url.to_string(),
        content,
        content_type,
    })
}

fn copy_reply(object: &ObjectModel) -> StorageResponse {
    let mut reply = Reply::new(StatusCode::ACCEPTED).etag(&object.etag, &object.last_modified);
    if let Some(ref record) = object.copy {
        reply = reply
            .header("x-ms-copy-id", &record.id)
            .header("x-ms-copy-status", record.status.as_str());
    }
    reply.finish()
}

fn start(
    backend: &MemoryTransport,
    call: &Call,
    destination: &mut ObjectModel,
    source: SourceContent,
) -> StorageResponse {
    let id = Uuid::new_v4().to_string();
    destination.content_type = source.content_type;
    destination.begin_copy(
        id.clone(),
        source.url,
        source.content,
        backend.pending_copy_polls,
        call.now,
    );
    tracing::debug!(copy_id = %id, polls = backend.pending_copy_polls, "copy accepted");
    copy_reply(destination)
}

pub(super) fn copy_into_file(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    file::authorize_object(backend, call, share, &[SasPermission::Create, SasPermission::Write])?;
    file::validate_components(call)?;
    // Read the source before locking the destination share: both may be
    // the same share.
    let source = read_source(backend, call)?;
    let path = call.path_str();
    backend.store.with_share_mut(call.account, share, |s| {
        s.ensure_parent(&path)?;
        if s.directories.contains(&path) {
            return Err(StorageError::service(ServiceErrorCode::ResourceTypeMismatch));
        }
        let old_len = match s.files.get(&path) {
            Some(existing) => {
                existing.ensure_no_pending_copy()?;
                existing.content_length
            }
            None => 0,
        };
        s.check_growth(old_len, source.content.length)?;
        let destination = s
            .files
            .entry(path.clone())
            .or_insert_with(|| ObjectModel::sparse(0, None, call.now));
        Ok(start(backend, call, destination, source))
    })
}

pub(super) fn copy_into_blob(
    backend: &MemoryTransport,
    call: &Call,
    container: &str,
) -> StorageResult<StorageResponse> {
    blob::authorize_blob(backend, call, container, &[SasPermission::Create, SasPermission::Write])?;
    let source = read_source(backend, call)?;
    let name = call.path_str();
    backend.store.with_container_mut(call.account, container, |c| {
        if let Some(existing) = c.blobs.get(&name) {
            existing.ensure_no_pending_copy()?;
        }
        let destination = c
            .blobs
            .entry(name.clone())
            .or_insert_with(|| ObjectModel::sparse(0, None, call.now));
        Ok(start(backend, call, destination, source))
    })
}

/// Copy id of an abort request.
pub(super) fn abort_request_id<'c>(call: &'c Call<'_>) -> StorageResult<&'c str> {
    let action = call.require_header("x-ms-copy-action")?;
    if action != "abort" {
        return Err(StorageError::service_with_message(
            ServiceErrorCode::InvalidHeaderValue,
            format!("unknown x-ms-copy-action '{}'", action),
        ));
    }
    call.ctx.query_param("copyid").ok_or_else(|| {
        StorageError::service_with_message(
            ServiceErrorCode::MissingRequiredQueryParameter,
            "query parameter 'copyid' is required",
        )
    })
}
