//! File service handlers: service properties, shares, directories, files.

use http::StatusCode;

use super::store::ObjectModel;
use super::{copy, unsupported, Call, MemoryTransport, Reply};
use crate::auth::{AccessRequirement, SasTarget};
use crate::error::{ServiceErrorCode, StorageError, StorageResult};
use crate::models::{
    validate_path_component, validate_resource_name, validate_signed_identifiers, Quota,
    SasPermission, ServiceKind, ShareStats,
};
use crate::transport::StorageResponse;
use crate::xml::{
    parse_service_properties, parse_signed_identifiers, serialize_directory_listing,
    serialize_service_properties, serialize_share_stats, serialize_signed_identifiers,
};

/// Largest share quota the service accepts, in GiB.
pub(crate) const MAX_SHARE_QUOTA_GIB: u32 = 102_400;

/// Largest file the service accepts.
const MAX_FILE_BYTES: u64 = 4 * 1024 * 1024 * 1024 * 1024;

pub(super) fn route(backend: &MemoryTransport, call: &Call) -> StorageResult<StorageResponse> {
    let restype = call.ctx.restype();
    let comp = call.ctx.comp();

    let Some(share) = call.root.as_deref() else {
        return match (call.method(), restype, comp) {
            ("GET", Some("service"), Some("properties")) => get_service_properties(backend, call),
            ("PUT", Some("service"), Some("properties")) => set_service_properties(backend, call),
            _ => Err(unsupported()),
        };
    };

    if restype == Some("directory") {
        return match (call.method(), comp) {
            ("PUT", None) => create_directory(backend, call, share),
            ("GET" | "HEAD", None) => get_directory_properties(backend, call, share),
            ("DELETE", None) => delete_directory(backend, call, share),
            ("GET", Some("list")) => list_directory(backend, call, share),
            _ => Err(unsupported()),
        };
    }

    if call.path.is_empty() {
        return match (call.method(), restype, comp) {
            ("PUT", Some("share"), None) => create_share(backend, call, share),
            ("PUT", Some("share"), Some("properties")) => {
                set_share_properties(backend, call, share)
            }
            ("GET" | "HEAD", Some("share"), None) => get_share_properties(backend, call, share),
            ("DELETE", Some("share"), None) => delete_share(backend, call, share),
            ("GET", Some("share"), Some("stats")) => get_share_stats(backend, call, share),
            ("GET", Some("share"), Some("acl")) => get_share_acl(backend, call, share),
            ("PUT", Some("share"), Some("acl")) => set_share_acl(backend, call, share),
            _ => Err(unsupported()),
        };
    }

    match (call.method(), comp) {
        ("PUT", None) if call.ctx.copy_source().is_some() => {
            copy::copy_into_file(backend, call, share)
        }
        ("PUT", None) => create_file(backend, call, share),
        ("PUT", Some("range")) => put_range(backend, call, share),
        ("PUT", Some("copy")) => abort_file_copy(backend, call, share),
        ("GET", None) => get_file(backend, call, share),
        ("HEAD", None) => get_file_properties(backend, call, share),
        ("DELETE", None) => delete_file(backend, call, share),
        _ => Err(unsupported()),
    }
}

fn target(call: &Call, share: &str, path: Option<String>) -> SasTarget {
    SasTarget {
        account: call.account.to_string(),
        service: ServiceKind::File,
        root: share.to_string(),
        path,
    }
}

/// SAS requirement for the file or directory the call addresses.
fn object_access(call: &Call, share: &str, permissions: &[SasPermission]) -> AccessRequirement {
    let path = if call.path.is_empty() {
        None
    } else {
        Some(call.path_str())
    };
    AccessRequirement::sas(target(call, share, path), permissions)
}

fn authorize_key_only(backend: &MemoryTransport, call: &Call) -> StorageResult<()> {
    call.authorize(AccessRequirement::key_only(), |root| {
        backend.store.share_policies(call.account, root)
    })?;
    Ok(())
}

pub(super) fn authorize_object(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
    permissions: &[SasPermission],
) -> StorageResult<()> {
    call.authorize(object_access(call, share, permissions), |root| {
        backend.store.share_policies(call.account, root)
    })?;
    Ok(())
}

fn invalid_input(code: ServiceErrorCode, err: StorageError) -> StorageError {
    StorageError::service_with_message(code, err.message)
}

// Service

fn get_service_properties(
    backend: &MemoryTransport,
    call: &Call,
) -> StorageResult<StorageResponse> {
    authorize_key_only(backend, call)?;
    let properties = backend.store.file_service_properties(call.account);
    Ok(Reply::new(StatusCode::OK)
        .xml(serialize_service_properties(&properties))
        .finish())
}

fn set_service_properties(
    backend: &MemoryTransport,
    call: &Call,
) -> StorageResult<StorageResponse> {
    authorize_key_only(backend, call)?;
    let properties = parse_service_properties(call.body_text()?)?;
    properties
        .validate()
        .map_err(|e| invalid_input(ServiceErrorCode::InvalidXmlNodeValue, e))?;
    backend
        .store
        .set_file_service_properties(call.account, properties);
    Ok(Reply::new(StatusCode::ACCEPTED).finish())
}

// Shares

fn requested_quota(call: &Call) -> StorageResult<Option<Quota>> {
    let Some(value) = call.ctx.header("x-ms-share-quota") else {
        return Ok(None);
    };
    let gib: u32 = value.trim().parse().map_err(|_| {
        StorageError::service_with_message(
            ServiceErrorCode::InvalidHeaderValue,
            format!("'{}' is not a valid share quota", value),
        )
    })?;
    if gib > MAX_SHARE_QUOTA_GIB {
        return Err(StorageError::service_with_message(
            ServiceErrorCode::InvalidHeaderValue,
            format!("share quota must be at most {} GiB", MAX_SHARE_QUOTA_GIB),
        ));
    }
    Ok(Some(Quota::from_gib(gib)))
}

fn create_share(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_key_only(backend, call)?;
    validate_resource_name("share", share)
        .map_err(|e| invalid_input(ServiceErrorCode::InvalidResourceName, e))?;
    let quota = requested_quota(call)?.unwrap_or_default();
    backend.store.create_share(call.account, share, quota, call.now)?;
    let (etag, last_modified) = backend
        .store
        .with_share(call.account, share, |s| Ok((s.etag.clone(), s.last_modified)))?;
    Ok(Reply::new(StatusCode::CREATED)
        .etag(&etag, &last_modified)
        .finish())
}

fn set_share_properties(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_key_only(backend, call)?;
    let quota = requested_quota(call)?.ok_or_else(|| {
        StorageError::service_with_message(
            ServiceErrorCode::MissingRequiredHeader,
            "header 'x-ms-share-quota' is required",
        )
    })?;
    // A quota below current usage is accepted; it only blocks growth.
    let (etag, last_modified) = backend.store.with_share_mut(call.account, share, |s| {
        s.quota = quota;
        s.touch(call.now);
        Ok((s.etag.clone(), s.last_modified))
    })?;
    Ok(Reply::new(StatusCode::OK)
        .etag(&etag, &last_modified)
        .finish())
}

fn get_share_properties(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_key_only(backend, call)?;
    backend.store.with_share(call.account, share, |s| {
        let mut reply = Reply::new(StatusCode::OK).etag(&s.etag, &s.last_modified);
        if let Quota::Limit(gib) = s.quota {
            reply = reply.header("x-ms-share-quota", gib.to_string());
        }
        Ok(reply.finish())
    })
}

fn delete_share(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_key_only(backend, call)?;
    backend.store.delete_share(call.account, share)?;
    Ok(Reply::new(StatusCode::ACCEPTED).finish())
}

fn get_share_stats(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_key_only(backend, call)?;
    let stats = backend.store.with_share(call.account, share, |s| {
        Ok(ShareStats {
            usage_bytes: s.usage_bytes(),
        })
    })?;
    Ok(Reply::new(StatusCode::OK)
        .xml(serialize_share_stats(&stats))
        .finish())
}

fn get_share_acl(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_key_only(backend, call)?;
    backend.store.with_share(call.account, share, |s| {
        Ok(Reply::new(StatusCode::OK)
            .etag(&s.etag, &s.last_modified)
            .xml(serialize_signed_identifiers(&s.policies))
            .finish())
    })
}

fn set_share_acl(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_key_only(backend, call)?;
    let policies = parse_signed_identifiers(call.body_text()?)?;
    validate_signed_identifiers(&policies)
        .map_err(|e| invalid_input(ServiceErrorCode::InvalidXmlDocument, e))?;
    let count = policies.len();
    let (etag, last_modified) = backend.store.with_share_mut(call.account, share, |s| {
        s.policies = policies;
        s.touch(call.now);
        Ok((s.etag.clone(), s.last_modified))
    })?;
    tracing::debug!(share, policies = count, "stored access policies replaced");
    Ok(Reply::new(StatusCode::OK)
        .etag(&etag, &last_modified)
        .finish())
}

// Directories

pub(super) fn validate_components(call: &Call) -> StorageResult<()> {
    for component in &call.path {
        validate_path_component(component)
            .map_err(|e| invalid_input(ServiceErrorCode::InvalidFileOrDirectoryPathName, e))?;
    }
    Ok(())
}

fn create_directory(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_object(backend, call, share, &[SasPermission::Create, SasPermission::Write])?;
    if call.path.is_empty() {
        return Err(StorageError::service(ServiceErrorCode::ResourceAlreadyExists));
    }
    validate_components(call)?;
    let path = call.path_str();
    backend.store.with_share_mut(call.account, share, |s| {
        s.ensure_parent(&path)?;
        if s.directories.contains(&path) {
            return Err(StorageError::service(ServiceErrorCode::ResourceAlreadyExists));
        }
        if s.files.contains_key(&path) {
            return Err(StorageError::service(ServiceErrorCode::ResourceTypeMismatch));
        }
        s.directories.insert(path);
        Ok(())
    })?;
    Ok(Reply::new(StatusCode::CREATED).finish())
}

fn get_directory_properties(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_object(backend, call, share, &[SasPermission::Read])?;
    let path = call.path_str();
    backend.store.with_share(call.account, share, |s| {
        if !s.directory_exists(&path) {
            return Err(StorageError::service(ServiceErrorCode::ResourceNotFound));
        }
        Ok(Reply::new(StatusCode::OK).finish())
    })
}

fn delete_directory(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_object(backend, call, share, &[SasPermission::Delete])?;
    if call.path.is_empty() {
        return Err(StorageError::service_with_message(
            ServiceErrorCode::InvalidUri,
            "the root directory cannot be deleted",
        ));
    }
    let path = call.path_str();
    backend.store.with_share_mut(call.account, share, |s| {
        if !s.directories.contains(&path) {
            return Err(StorageError::service(ServiceErrorCode::ResourceNotFound));
        }
        if !s.directory_is_empty(&path) {
            return Err(StorageError::service(ServiceErrorCode::DirectoryNotEmpty));
        }
        s.directories.remove(&path);
        Ok(())
    })?;
    Ok(Reply::new(StatusCode::ACCEPTED).finish())
}

fn list_directory(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_object(backend, call, share, &[SasPermission::List])?;
    let path = call.path_str();
    let entries = backend.store.with_share(call.account, share, |s| {
        if !s.directory_exists(&path) {
            return Err(StorageError::service(ServiceErrorCode::ResourceNotFound));
        }
        Ok(s.list(&path))
    })?;
    let xml = serialize_directory_listing(&call.service_endpoint(), share, &path, &entries);
    Ok(Reply::new(StatusCode::OK).xml(xml).finish())
}

// Files

fn file_not_found() -> StorageError {
    StorageError::service(ServiceErrorCode::ResourceNotFound)
}

fn create_file(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_object(backend, call, share, &[SasPermission::Create, SasPermission::Write])?;
    let file_type = call.require_header("x-ms-type")?;
    if !file_type.eq_ignore_ascii_case("file") {
        return Err(StorageError::service_with_message(
            ServiceErrorCode::InvalidHeaderValue,
            format!("x-ms-type must be 'file', got '{}'", file_type),
        ));
    }
    let length: u64 = call
        .require_header("x-ms-content-length")?
        .parse()
        .map_err(|_| StorageError::service(ServiceErrorCode::InvalidHeaderValue))?;
    if length > MAX_FILE_BYTES {
        return Err(StorageError::service(ServiceErrorCode::OutOfRangeInput));
    }
    validate_components(call)?;

    let path = call.path_str();
    let content_type = call.ctx.header("x-ms-content-type").map(String::from);
    let (etag, last_modified) = backend.store.with_share_mut(call.account, share, |s| {
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
        s.check_growth(old_len, length)?;
        let file = ObjectModel::sparse(length, content_type, call.now);
        let tags = (file.etag.clone(), file.last_modified);
        s.files.insert(path.clone(), file);
        Ok(tags)
    })?;
    Ok(Reply::new(StatusCode::CREATED)
        .etag(&etag, &last_modified)
        .finish())
}

fn put_range(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_object(backend, call, share, &[SasPermission::Write])?;
    let (start, end) = match call.ctx.range() {
        Some((start, Some(end))) if end >= start => (start, end),
        _ => {
            return Err(StorageError::service_with_message(
                ServiceErrorCode::InvalidHeaderValue,
                "x-ms-range must be 'bytes=start-end'",
            ))
        }
    };
    let clear = match call.require_header("x-ms-write")? {
        "update" => false,
        "clear" => true,
        other => {
            return Err(StorageError::service_with_message(
                ServiceErrorCode::InvalidHeaderValue,
                format!("unknown x-ms-write value '{}'", other),
            ))
        }
    };
    let len = (end - start)
        .checked_add(1)
        .ok_or_else(|| StorageError::service(ServiceErrorCode::InvalidRange))?;
    if clear {
        if !call.body.is_empty() {
            return Err(StorageError::service(ServiceErrorCode::InvalidHeaderValue));
        }
    } else {
        if call.body.len() as u64 != len {
            return Err(StorageError::service_with_message(
                ServiceErrorCode::InvalidHeaderValue,
                "body length does not match x-ms-range",
            ));
        }
        call.check_content_md5()?;
    }

    let path = call.path_str();
    let (etag, last_modified) = backend.store.with_share_mut(call.account, share, |s| {
        let file = s.files.get_mut(&path).ok_or_else(file_not_found)?;
        file.ensure_no_pending_copy()?;
        if clear {
            file.clear_range(start, len, call.now)?;
        } else {
            file.write_at(start, call.body, call.now)?;
        }
        Ok((file.etag.clone(), file.last_modified))
    })?;

    let mut reply = Reply::new(StatusCode::CREATED).etag(&etag, &last_modified);
    if let Some(md5) = call.ctx.header("content-md5") {
        reply = reply.header("content-md5", md5);
    }
    Ok(reply.finish())
}

fn get_file(backend: &MemoryTransport, call: &Call, share: &str) -> StorageResult<StorageResponse> {
    authorize_object(backend, call, share, &[SasPermission::Read])?;
    let path = call.path_str();
    let range = call.ctx.range();
    backend.store.with_share_mut(call.account, share, |s| {
        let file = s.files.get_mut(&path).ok_or_else(file_not_found)?;
        file.poll_copy(call.now);
        object_body(file, range)
    })
}

/// GET reply for a file or blob, honouring an optional byte range.
pub(super) fn object_body(
    object: &ObjectModel,
    range: Option<(u64, Option<u64>)>,
) -> StorageResult<StorageResponse> {
    let Some((start, end)) = range else {
        return Ok(Reply::new(StatusCode::OK)
            .object(object)
            .finish_streaming(object.stream()));
    };
    if start >= object.content_length || matches!(end, Some(end) if end < start) {
        return Err(StorageError::service(ServiceErrorCode::InvalidRange));
    }
    let end = end
        .unwrap_or(u64::MAX)
        .min(object.content_length - 1);
    Ok(Reply::new(StatusCode::PARTIAL_CONTENT)
        .object(object)
        .header("content-length", (end - start + 1).to_string())
        .header(
            "content-range",
            format!("bytes {}-{}/{}", start, end, object.content_length),
        )
        .finish_streaming(object.stream_range(start, end)))
}

fn get_file_properties(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_object(backend, call, share, &[SasPermission::Read])?;
    let path = call.path_str();
    backend.store.with_share_mut(call.account, share, |s| {
        let file = s.files.get_mut(&path).ok_or_else(file_not_found)?;
        file.poll_copy(call.now);
        Ok(Reply::new(StatusCode::OK)
            .object(file)
            .header("x-ms-type", "File")
            .finish())
    })
}

fn delete_file(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_object(backend, call, share, &[SasPermission::Delete])?;
    let path = call.path_str();
    backend.store.with_share_mut(call.account, share, |s| {
        s.files.remove(&path).map(|_| ()).ok_or_else(file_not_found)
    })?;
    Ok(Reply::new(StatusCode::ACCEPTED).finish())
}

fn abort_file_copy(
    backend: &MemoryTransport,
    call: &Call,
    share: &str,
) -> StorageResult<StorageResponse> {
    authorize_object(backend, call, share, &[SasPermission::Write])?;
    let copy_id = copy::abort_request_id(call)?;
    let path = call.path_str();
    backend.store.with_share_mut(call.account, share, |s| {
        let file = s.files.get_mut(&path).ok_or_else(file_not_found)?;
        file.abort_copy(copy_id, call.now)
    })?;
    Ok(Reply::new(StatusCode::NO_CONTENT).finish())
}
