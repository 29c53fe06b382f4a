//! Request authentication for the in-memory backend.

use chrono::{DateTime, Utc};

use crate::context::RequestContext;
use crate::error::{ServiceErrorCode, StorageError, StorageResult};
use crate::models::{SasPermission, SignedIdentifier};

use super::sas::{SasTarget, SasToken};
use super::shared_key::validate_shared_key;

/// How a request proved its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    SharedKey,
    Sas,
}

/// What a request needs to be allowed to do.
#[derive(Debug, Clone)]
pub struct AccessRequirement {
    /// Resource a SAS must cover. `None` for operations a service SAS can
    /// never authorize (share, container and service management).
    pub target: Option<SasTarget>,
    /// Alternative permissions, any one of which suffices.
    pub permissions: Vec<SasPermission>,
}

impl AccessRequirement {
    pub fn key_only() -> Self {
        Self {
            target: None,
            permissions: Vec::new(),
        }
    }

    pub fn sas(target: SasTarget, permissions: &[SasPermission]) -> Self {
        Self {
            target: Some(target),
            permissions: permissions.to_vec(),
        }
    }
}

/// Authenticates a request with a SharedKey header or a service SAS.
///
/// `stored_policies` is called with the share or container name and must
/// return its policy set as it stands now, so removing a policy revokes
/// every token that names it.
pub fn authenticate<F>(
    ctx: &RequestContext,
    account_key: &str,
    requirement: &AccessRequirement,
    now: DateTime<Utc>,
    stored_policies: F,
) -> StorageResult<AuthMethod>
where
    F: FnOnce(&str) -> Vec<SignedIdentifier>,
{
    if ctx.header("authorization").is_some() {
        validate_shared_key(ctx, account_key)?;
        return Ok(AuthMethod::SharedKey);
    }

    if let Some(token) = SasToken::from_query(&ctx.query_params)? {
        let target = requirement.target.as_ref().ok_or_else(|| {
            StorageError::service(ServiceErrorCode::AuthorizationResourceTypeMismatch)
        })?;
        let policies = stored_policies(&target.root);
        token.validate(target, account_key, &requirement.permissions, &policies, now)?;
        return Ok(AuthMethod::Sas);
    }

    Err(StorageError::service_with_message(
        ServiceErrorCode::AuthenticationFailed,
        "The request carries neither an Authorization header nor a SAS.",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::sas::{SasGrant, SasResource};
    use crate::config::DEV_ACCOUNT_KEY;
    use crate::error::ErrorKind;
    use crate::models::{SasPermissions, ServiceKind, SharedAccessPolicy};
    use crate::transport::StorageRequest;
    use http::Method;
    use url::Url;

    fn target() -> SasTarget {
        SasTarget {
            account: "acct".to_string(),
            service: ServiceKind::File,
            root: "logs".to_string(),
            path: Some("log.txt".to_string()),
        }
    }

    #[test]
    fn test_anonymous_rejected() {
        let request = StorageRequest::new(
            Method::GET,
            Url::parse("https://acct.file.core.windows.net/logs/log.txt").unwrap(),
        );
        let ctx = RequestContext::new(&request, "acct");
        let err = authenticate(
            &ctx,
            DEV_ACCOUNT_KEY,
            &AccessRequirement::sas(target(), &[SasPermission::Read]),
            Utc::now(),
            |_| Vec::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthorizationFailed);
    }

    #[test]
    fn test_sas_refused_for_management_operations() {
        let grant = SasGrant::AdHoc(SharedAccessPolicy::valid_for(
            SasPermissions::all(),
            chrono::Duration::hours(1),
        ));
        let token = SasToken::sign(&target(), SasResource::File, &grant, DEV_ACCOUNT_KEY).unwrap();
        let mut url = Url::parse("https://acct.file.core.windows.net/logs?restype=share").unwrap();
        token.apply_to(&mut url);

        let request = StorageRequest::new(Method::DELETE, url);
        let ctx = RequestContext::new(&request, "acct");
        let err = authenticate(
            &ctx,
            DEV_ACCOUNT_KEY,
            &AccessRequirement::key_only(),
            Utc::now(),
            |_| Vec::new(),
        )
        .unwrap_err();
        assert!(err.has_service_code(ServiceErrorCode::AuthorizationResourceTypeMismatch));
    }

    #[test]
    fn test_sas_accepted_for_covered_file() {
        let grant = SasGrant::AdHoc(SharedAccessPolicy::valid_for(
            SasPermissions::read_only(),
            chrono::Duration::hours(1),
        ));
        let token = SasToken::sign(&target(), SasResource::File, &grant, DEV_ACCOUNT_KEY).unwrap();
        let mut url = Url::parse("https://acct.file.core.windows.net/logs/log.txt").unwrap();
        token.apply_to(&mut url);

        let request = StorageRequest::new(Method::GET, url);
        let ctx = RequestContext::new(&request, "acct");
        let method = authenticate(
            &ctx,
            DEV_ACCOUNT_KEY,
            &AccessRequirement::sas(target(), &[SasPermission::Read]),
            Utc::now(),
            |_| Vec::new(),
        )
        .unwrap();
        assert_eq!(method, AuthMethod::Sas);
    }
}
