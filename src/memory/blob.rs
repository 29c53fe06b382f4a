//! Blob service handlers: containers and block blobs.

use http::StatusCode;

use super::file::object_body;
use super::store::ObjectModel;
use super::{copy, unsupported, Call, MemoryTransport, Reply};
use crate::auth::{AccessRequirement, SasTarget};
use crate::error::{ServiceErrorCode, StorageError, StorageResult};
use crate::models::{
    validate_resource_name, validate_signed_identifiers, SasPermission, ServiceKind,
};
use crate::transport::StorageResponse;
use crate::xml::{parse_signed_identifiers, serialize_signed_identifiers};

pub(super) fn route(backend: &MemoryTransport, call: &Call) -> StorageResult<StorageResponse> {
    let restype = call.ctx.restype();
    let comp = call.ctx.comp();

    let Some(container) = call.root.as_deref() else {
        return Err(unsupported());
    };

    if call.path.is_empty() {
        return match (call.method(), restype, comp) {
            ("PUT", Some("container"), None) => create_container(backend, call, container),
            ("GET" | "HEAD", Some("container"), None) => {
                get_container_properties(backend, call, container)
            }
            ("DELETE", Some("container"), None) => delete_container(backend, call, container),
            ("GET", Some("container"), Some("acl")) => get_container_acl(backend, call, container),
            ("PUT", Some("container"), Some("acl")) => set_container_acl(backend, call, container),
            _ => Err(unsupported()),
        };
    }

    match (call.method(), comp) {
        ("PUT", None) if call.ctx.copy_source().is_some() => {
            copy::copy_into_blob(backend, call, container)
        }
        ("PUT", None) => put_blob(backend, call, container),
        ("PUT", Some("copy")) => abort_blob_copy(backend, call, container),
        ("GET", None) => get_blob(backend, call, container),
        ("HEAD", None) => get_blob_properties(backend, call, container),
        ("DELETE", None) => delete_blob(backend, call, container),
        _ => Err(unsupported()),
    }
}

fn authorize_key_only(backend: &MemoryTransport, call: &Call) -> StorageResult<()> {
    call.authorize(AccessRequirement::key_only(), |root| {
        backend.store.container_policies(call.account, root)
    })?;
    Ok(())
}

pub(super) fn authorize_blob(
    backend: &MemoryTransport,
    call: &Call,
    container: &str,
    permissions: &[SasPermission],
) -> StorageResult<()> {
    let target = SasTarget {
        account: call.account.to_string(),
        service: ServiceKind::Blob,
        root: container.to_string(),
        path: Some(call.path_str()),
    };
    call.authorize(AccessRequirement::sas(target, permissions), |root| {
        backend.store.container_policies(call.account, root)
    })?;
    Ok(())
}

fn blob_not_found() -> StorageError {
    StorageError::service(ServiceErrorCode::BlobNotFound)
}

// Containers

fn create_container(
    backend: &MemoryTransport,
    call: &Call,
    container: &str,
) -> StorageResult<StorageResponse> {
    authorize_key_only(backend, call)?;
    validate_resource_name("container", container).map_err(|e| {
        StorageError::service_with_message(ServiceErrorCode::InvalidResourceName, e.message)
    })?;
    backend
        .store
        .create_container(call.account, container, call.now)?;
    backend.store.with_container(call.account, container, |c| {
        Ok(Reply::new(StatusCode::CREATED)
            .etag(&c.etag, &c.last_modified)
            .finish())
    })
}

fn get_container_properties(
    backend: &MemoryTransport,
    call: &Call,
    container: &str,
) -> StorageResult<StorageResponse> {
    authorize_key_only(backend, call)?;
    backend.store.with_container(call.account, container, |c| {
        Ok(Reply::new(StatusCode::OK)
            .etag(&c.etag, &c.last_modified)
            .finish())
    })
}

fn delete_container(
    backend: &MemoryTransport,
    call: &Call,
    container: &str,
) -> StorageResult<StorageResponse> {
    authorize_key_only(backend, call)?;
    backend.store.delete_container(call.account, container)?;
    Ok(Reply::new(StatusCode::ACCEPTED).finish())
}

fn get_container_acl(
    backend: &MemoryTransport,
    call: &Call,
    container: &str,
) -> StorageResult<StorageResponse> {
    authorize_key_only(backend, call)?;
    backend.store.with_container(call.account, container, |c| {
        Ok(Reply::new(StatusCode::OK)
            .etag(&c.etag, &c.last_modified)
            .xml(serialize_signed_identifiers(&c.policies))
            .finish())
    })
}

fn set_container_acl(
    backend: &MemoryTransport,
    call: &Call,
    container: &str,
) -> StorageResult<StorageResponse> {
    authorize_key_only(backend, call)?;
    let policies = parse_signed_identifiers(call.body_text()?)?;
    validate_signed_identifiers(&policies).map_err(|e| {
        StorageError::service_with_message(ServiceErrorCode::InvalidXmlDocument, e.message)
    })?;
    backend.store.with_container_mut(call.account, container, |c| {
        c.policies = policies;
        c.touch(call.now);
        Ok(Reply::new(StatusCode::OK)
            .etag(&c.etag, &c.last_modified)
            .finish())
    })
}

// Blobs

fn put_blob(
    backend: &MemoryTransport,
    call: &Call,
    container: &str,
) -> StorageResult<StorageResponse> {
    authorize_blob(backend, call, container, &[SasPermission::Create, SasPermission::Write])?;
    let blob_type = call.require_header("x-ms-blob-type")?;
    if blob_type != "BlockBlob" {
        return Err(StorageError::service_with_message(
            ServiceErrorCode::InvalidHeaderValue,
            format!("only BlockBlob is supported, got '{}'", blob_type),
        ));
    }
    call.check_content_md5()?;
    let name = call.path_str();
    let content_type = call.ctx.header("content-type").map(String::from);
    backend.store.with_container_mut(call.account, container, |c| {
        if let Some(existing) = c.blobs.get(&name) {
            existing.ensure_no_pending_copy()?;
        }
        let blob = ObjectModel::with_content(call.body, content_type, call.now);
        let reply = Reply::new(StatusCode::CREATED)
            .etag(&blob.etag, &blob.last_modified)
            .header("content-md5", blob.content_md5.as_deref().unwrap_or_default());
        c.blobs.insert(name.clone(), blob);
        Ok(reply.finish())
    })
}

fn get_blob(
    backend: &MemoryTransport,
    call: &Call,
    container: &str,
) -> StorageResult<StorageResponse> {
    authorize_blob(backend, call, container, &[SasPermission::Read])?;
    let name = call.path_str();
    let range = call.ctx.range();
    backend.store.with_container_mut(call.account, container, |c| {
        let blob = c.blobs.get_mut(&name).ok_or_else(blob_not_found)?;
        blob.poll_copy(call.now);
        object_body(blob, range)
    })
}

fn get_blob_properties(
    backend: &MemoryTransport,
    call: &Call,
    container: &str,
) -> StorageResult<StorageResponse> {
    authorize_blob(backend, call, container, &[SasPermission::Read])?;
    let name = call.path_str();
    backend.store.with_container_mut(call.account, container, |c| {
        let blob = c.blobs.get_mut(&name).ok_or_else(blob_not_found)?;
        blob.poll_copy(call.now);
        Ok(Reply::new(StatusCode::OK)
            .object(blob)
            .header("x-ms-blob-type", "BlockBlob")
            .finish())
    })
}

fn delete_blob(
    backend: &MemoryTransport,
    call: &Call,
    container: &str,
) -> StorageResult<StorageResponse> {
    authorize_blob(backend, call, container, &[SasPermission::Delete])?;
    let name = call.path_str();
    backend.store.with_container_mut(call.account, container, |c| {
        c.blobs.remove(&name).map(|_| ()).ok_or_else(blob_not_found)
    })?;
    Ok(Reply::new(StatusCode::ACCEPTED).finish())
}

fn abort_blob_copy(
    backend: &MemoryTransport,
    call: &Call,
    container: &str,
) -> StorageResult<StorageResponse> {
    authorize_blob(backend, call, container, &[SasPermission::Write])?;
    let copy_id = copy::abort_request_id(call)?;
    let name = call.path_str();
    backend.store.with_container_mut(call.account, container, |c| {
        let blob = c.blobs.get_mut(&name).ok_or_else(blob_not_found)?;
        blob.abort_copy(copy_id, call.now)
    })?;
    Ok(Reply::new(StatusCode::NO_CONTENT).finish())
}
