//! Request pipeline shared by every handle of an account.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::account::AccountKey;
use crate::auth::{authorization_header, SasToken};
use crate::config::ClientOptions;
use crate::context::{format_http_date, RequestContext};
use crate::error::{ErrorKind, StorageError, StorageResult};
use crate::transport::{redact_url, StorageRequest, StorageResponse, Transport};
use crate::xml::parse_error_body;

/// Account name and key used for SharedKey signing and SAS minting.
#[derive(Debug, Clone)]
pub struct SharedKeyCredential {
    pub account: String,
    pub key: AccountKey,
}

/// How requests are authorized.
#[derive(Debug, Clone)]
pub enum Credential {
    SharedKey(Arc<SharedKeyCredential>),
    Sas(Arc<SasToken>),
}

/// Stamps, authorizes and sends requests, and turns failed responses into
/// [`StorageError`]s.
///
/// Cloning is cheap; every handle carries its own clone.
#[derive(Clone)]
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    credential: Credential,
    options: Arc<ClientOptions>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("credential", &self.credential)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        credential: Credential,
        options: ClientOptions,
    ) -> Self {
        Self {
            transport,
            credential,
            options: Arc::new(options),
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Returns the account key credential, or an error for SAS pipelines.
    pub fn shared_key(&self) -> StorageResult<&SharedKeyCredential> {
        match self.credential {
            Credential::SharedKey(ref credential) => Ok(credential),
            Credential::Sas(_) => Err(StorageError::with_message(
                ErrorKind::InvalidConfiguration,
                "this operation needs the account key; the handle only holds a SAS",
            )),
        }
    }

    /// Same transport and options under another credential.
    pub fn with_credential(&self, credential: Credential) -> Self {
        Self {
            transport: self.transport.clone(),
            credential,
            options: self.options.clone(),
        }
    }

    /// Sends a request. Non-success statuses come back as errors.
    pub async fn send(&self, request: StorageRequest) -> StorageResult<StorageResponse> {
        let request = self.authorize(request)?;
        let method = request.method.clone();
        let url = redact_url(&request.url);
        let client_request_id = request
            .header_value("x-ms-client-request-id")
            .unwrap_or_default()
            .to_string();

        tracing::debug!(%method, %url, %client_request_id, "sending request");

        let response = self.transport.send(request).await?;
        let status = response.status;

        if status.is_success() {
            tracing::debug!(%method, %url, status = status.as_u16(), "request succeeded");
            return Ok(response);
        }

        let request_id = response.request_id().map(String::from);
        let header_code = response.header("x-ms-error-code").map(String::from);
        let body = response.text().await.unwrap_or_default();
        let parsed = parse_error_body(&body);
        let code = header_code.or(parsed.code);

        tracing::debug!(
            %method,
            %url,
            status = status.as_u16(),
            code = code.as_deref().unwrap_or(""),
            "request failed"
        );

        Err(StorageError::from_service(
            status,
            code.as_deref(),
            parsed.message,
            request_id,
        ))
    }

    fn authorize(&self, mut request: StorageRequest) -> StorageResult<StorageRequest> {
        if let Credential::Sas(ref token) = self.credential {
            token.apply_to(&mut request.url);
        }

        let request = request
            .header("x-ms-version", &self.options.api_version)?
            .header("x-ms-date", format_http_date(&Utc::now()))?
            .header("x-ms-client-request-id", Uuid::new_v4().to_string())?;

        match self.credential {
            Credential::SharedKey(ref credential) => {
                let authorization = {
                    let ctx = RequestContext::new(&request, &credential.account);
                    authorization_header(&ctx, credential.key.secret())?
                };
                request.header("authorization", authorization)
            }
            Credential::Sas(_) => Ok(request),
        }
    }
}
