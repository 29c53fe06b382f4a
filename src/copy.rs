//! Server-side copies into files and blobs.

use http::Method;
use std::future::Future;
use std::time::Duration;
use url::Url;

use crate::blob::BlobHandle;
use crate::error::{ErrorKind, ServiceErrorCode, StorageError, StorageResult};
use crate::file::FileHandle;
use crate::models::{CopyState, CopyStatus, ServiceKind};
use crate::pipeline::Pipeline;
use crate::transport::StorageRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CopyOrigin {
    /// Referenced by plain URL; the service authorizes it with the
    /// destination's account key.
    SharedKey { account: String, service: ServiceKind },
    /// Authorized by the SAS embedded in the URL.
    Sas,
}

/// Where a server-side copy reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    url: Url,
    origin: CopyOrigin,
}

impl CopySource {
    /// A file in the destination's own account.
    pub fn from_file(file: &FileHandle) -> Self {
        Self {
            url: file.url().clone(),
            origin: CopyOrigin::SharedKey {
                account: file.account_name().to_string(),
                service: ServiceKind::File,
            },
        }
    }

    /// A blob in the destination's own account.
    pub fn from_blob(blob: &BlobHandle) -> Self {
        Self {
            url: blob.url().clone(),
            origin: CopyOrigin::SharedKey {
                account: blob.account_name().to_string(),
                service: ServiceKind::Blob,
            },
        }
    }

    /// Any source readable through the SAS in its URL.
    pub fn from_sas_url(url: Url) -> StorageResult<Self> {
        if !url.query_pairs().any(|(key, _)| key == "sig") {
            return Err(StorageError::with_message(
                ErrorKind::InvalidConfiguration,
                "copy source URL carries no SAS signature",
            ));
        }
        Ok(Self {
            url,
            origin: CopyOrigin::Sas,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_sas(&self) -> bool {
        self.origin == CopyOrigin::Sas
    }

    /// A shared-key source is only readable by a destination in the same
    /// account and service.
    fn check_destination(&self, account: &str, service: ServiceKind) -> StorageResult<()> {
        match self.origin {
            CopyOrigin::Sas => Ok(()),
            CopyOrigin::SharedKey {
                account: ref source_account,
                service: source_service,
            } => {
                if source_account == account && source_service == service {
                    Ok(())
                } else {
                    Err(StorageError::with_message(
                        ErrorKind::InvalidConfiguration,
                        format!(
                            "copying from {} '{}' into {} '{}' needs a SAS source",
                            source_service.as_str(),
                            source_account,
                            service.as_str(),
                            account
                        ),
                    ))
                }
            }
        }
    }
}

/// Starts a copy into `destination`.
pub(crate) async fn start_copy(
    pipeline: &Pipeline,
    destination: &Url,
    account: &str,
    service: ServiceKind,
    source: &CopySource,
) -> StorageResult<CopyState> {
    source.check_destination(account, service)?;

    let request = StorageRequest::new(Method::PUT, destination.clone())
        .header("x-ms-copy-source", source.url.as_str())?;
    let response = pipeline.send(request).await?;

    let copy_id = response
        .header("x-ms-copy-id")
        .map(String::from)
        .ok_or_else(|| {
            StorageError::with_message(ErrorKind::Transport, "copy response carries no copy id")
        })?;
    let status = response
        .header("x-ms-copy-status")
        .and_then(CopyStatus::from_str)
        .unwrap_or(CopyStatus::Pending);

    tracing::debug!(%copy_id, status = status.as_str(), "copy started");

    Ok(CopyState {
        copy_id,
        status,
        source: Some(source.url.to_string()),
        progress: None,
        completion_time: None,
        status_description: None,
    })
}

/// Aborts a pending copy.
pub(crate) async fn abort_copy(
    pipeline: &Pipeline,
    destination: &Url,
    copy_id: &str,
) -> StorageResult<()> {
    let request = StorageRequest::new(Method::PUT, destination.clone())
        .query("comp", "copy")
        .query("copyid", copy_id)
        .header("x-ms-copy-action", "abort")?;
    pipeline.send(request).await?;
    Ok(())
}

/// Polls `status` until the copy leaves `Pending`.
pub(crate) async fn wait_until_terminal<F, Fut>(
    poll_interval: Duration,
    mut status: F,
) -> StorageResult<CopyState>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<Option<CopyState>>>,
{
    loop {
        let state = status()
            .await?
            .ok_or_else(|| StorageError::service(ServiceErrorCode::NoPendingCopyOperation))?;
        if state.status.is_terminal() {
            return Ok(state);
        }
        tracing::debug!(copy_id = %state.copy_id, progress = ?state.progress, "copy pending");
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared_key(account: &str, service: ServiceKind) -> CopySource {
        CopySource {
            url: Url::parse("https://a.file.core.windows.net/s/f").unwrap(),
            origin: CopyOrigin::SharedKey {
                account: account.to_string(),
                service,
            },
        }
    }

    #[test]
    fn test_shared_key_source_stays_in_account_and_service() {
        let source = shared_key("a", ServiceKind::File);
        assert!(source.check_destination("a", ServiceKind::File).is_ok());
        assert_eq!(
            source.check_destination("a", ServiceKind::Blob).unwrap_err().kind,
            ErrorKind::InvalidConfiguration
        );
        assert!(source.check_destination("b", ServiceKind::File).is_err());
    }

    #[test]
    fn test_sas_source_needs_signature() {
        let unsigned = Url::parse("https://a.file.core.windows.net/s/f?sv=2021-10-04").unwrap();
        assert!(CopySource::from_sas_url(unsigned).is_err());

        let signed =
            Url::parse("https://a.file.core.windows.net/s/f?sv=2021-10-04&sig=abc").unwrap();
        let source = CopySource::from_sas_url(signed).unwrap();
        assert!(source.is_sas());
        assert!(source.check_destination("b", ServiceKind::Blob).is_ok());
    }

    #[tokio::test]
    async fn test_wait_stops_on_terminal_state() {
        let mut polls = 0;
        let state = wait_until_terminal(Duration::from_millis(1), || {
            polls += 1;
            let status = if polls < 3 {
                CopyStatus::Pending
            } else {
                CopyStatus::Success
            };
            async move {
                Ok(Some(CopyState {
                    copy_id: "c1".into(),
                    status,
                    source: None,
                    progress: None,
                    completion_time: None,
                    status_description: None,
                }))
            }
        })
        .await
        .unwrap();
        assert_eq!(state.status, CopyStatus::Success);
        assert_eq!(polls, 3);
    }
}
