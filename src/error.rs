//! Storage client error types and service error code mapping.

use http::StatusCode;
use thiserror::Error;

/// Coarse classification of every failure the client can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed connection string, detected before any network call.
    InvalidConnectionString,
    /// The share, directory, file, container, or blob does not exist.
    NotFound,
    /// Bad account key, or an expired, revoked, or insufficient SAS.
    AuthorizationFailed,
    /// A write would grow a share beyond its quota.
    QuotaExceeded,
    /// A parameter was rejected locally or by the backend.
    InvalidConfiguration,
    /// The resource already exists.
    AlreadyExists,
    /// Local filesystem failure.
    Io,
    /// Network failure or a backend error outside the categories above.
    Transport,
}

impl ErrorKind {
    /// Returns the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidConnectionString => "InvalidConnectionString",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AuthorizationFailed => "AuthorizationFailed",
            ErrorKind::QuotaExceeded => "QuotaExceeded",
            ErrorKind::InvalidConfiguration => "InvalidConfiguration",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::Io => "Io",
            ErrorKind::Transport => "Transport",
        }
    }

    /// Returns the default message for this kind.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidConnectionString => "The connection string is malformed.",
            ErrorKind::NotFound => "The specified resource does not exist.",
            ErrorKind::AuthorizationFailed => {
                "This request is not authorized to perform this operation."
            }
            ErrorKind::QuotaExceeded => "The share quota has been reached.",
            ErrorKind::InvalidConfiguration => "A parameter value is not valid.",
            ErrorKind::AlreadyExists => "The specified resource already exists.",
            ErrorKind::Io => "A local I/O operation failed.",
            ErrorKind::Transport => "The request to the storage service failed.",
        }
    }
}

/// Error codes reported by the storage service in `x-ms-error-code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorCode {
    // General errors
    AuthenticationFailed,
    AuthorizationFailure,
    AuthorizationPermissionMismatch,
    AuthorizationResourceTypeMismatch,
    CannotVerifyCopySource,
    InternalError,
    InvalidAuthenticationInfo,
    InvalidHeaderValue,
    InvalidQueryParameterValue,
    InvalidRange,
    InvalidResourceName,
    InvalidUri,
    InvalidXmlDocument,
    InvalidXmlNodeValue,
    Md5Mismatch,
    MissingRequiredHeader,
    MissingRequiredQueryParameter,
    OperationTimedOut,
    OutOfRangeInput,
    ResourceAlreadyExists,
    ResourceNotFound,
    ResourceTypeMismatch,
    ServerBusy,
    UnsupportedHttpVerb,

    // File-specific errors
    DirectoryNotEmpty,
    InvalidFileOrDirectoryPathName,
    NoPendingCopyOperation,
    ParentNotFound,
    PendingCopyOperation,
    CopyIdMismatch,
    ShareAlreadyExists,
    ShareNotFound,
    ShareSizeLimitReached,

    // Blob-specific errors
    BlobNotFound,
    ContainerAlreadyExists,
    ContainerNotFound,
}

impl ServiceErrorCode {
    /// Returns the wire representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceErrorCode::AuthenticationFailed => "AuthenticationFailed",
            ServiceErrorCode::AuthorizationFailure => "AuthorizationFailure",
            ServiceErrorCode::AuthorizationPermissionMismatch => "AuthorizationPermissionMismatch",
            ServiceErrorCode::AuthorizationResourceTypeMismatch => {
                "AuthorizationResourceTypeMismatch"
            }
            ServiceErrorCode::CannotVerifyCopySource => "CannotVerifyCopySource",
            ServiceErrorCode::InternalError => "InternalError",
            ServiceErrorCode::InvalidAuthenticationInfo => "InvalidAuthenticationInfo",
            ServiceErrorCode::InvalidHeaderValue => "InvalidHeaderValue",
            ServiceErrorCode::InvalidQueryParameterValue => "InvalidQueryParameterValue",
            ServiceErrorCode::InvalidRange => "InvalidRange",
            ServiceErrorCode::InvalidResourceName => "InvalidResourceName",
            ServiceErrorCode::InvalidUri => "InvalidUri",
            ServiceErrorCode::InvalidXmlDocument => "InvalidXmlDocument",
            ServiceErrorCode::InvalidXmlNodeValue => "InvalidXmlNodeValue",
            ServiceErrorCode::Md5Mismatch => "Md5Mismatch",
            ServiceErrorCode::MissingRequiredHeader => "MissingRequiredHeader",
            ServiceErrorCode::MissingRequiredQueryParameter => "MissingRequiredQueryParameter",
            ServiceErrorCode::OperationTimedOut => "OperationTimedOut",
            ServiceErrorCode::OutOfRangeInput => "OutOfRangeInput",
            ServiceErrorCode::ResourceAlreadyExists => "ResourceAlreadyExists",
            ServiceErrorCode::ResourceNotFound => "ResourceNotFound",
            ServiceErrorCode::ResourceTypeMismatch => "ResourceTypeMismatch",
            ServiceErrorCode::ServerBusy => "ServerBusy",
            ServiceErrorCode::UnsupportedHttpVerb => "UnsupportedHttpVerb",
            ServiceErrorCode::DirectoryNotEmpty => "DirectoryNotEmpty",
            ServiceErrorCode::InvalidFileOrDirectoryPathName => "InvalidFileOrDirectoryPathName",
            ServiceErrorCode::NoPendingCopyOperation => "NoPendingCopyOperation",
            ServiceErrorCode::ParentNotFound => "ParentNotFound",
            ServiceErrorCode::PendingCopyOperation => "PendingCopyOperation",
            ServiceErrorCode::CopyIdMismatch => "CopyIdMismatch",
            ServiceErrorCode::ShareAlreadyExists => "ShareAlreadyExists",
            ServiceErrorCode::ShareNotFound => "ShareNotFound",
            ServiceErrorCode::ShareSizeLimitReached => "ShareSizeLimitReached",
            ServiceErrorCode::BlobNotFound => "BlobNotFound",
            ServiceErrorCode::ContainerAlreadyExists => "ContainerAlreadyExists",
            ServiceErrorCode::ContainerNotFound => "ContainerNotFound",
        }
    }

    /// Parses a wire error code. Unknown codes yield `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        let parsed = match code {
            "AuthenticationFailed" => ServiceErrorCode::AuthenticationFailed,
            "AuthorizationFailure" => ServiceErrorCode::AuthorizationFailure,
            "AuthorizationPermissionMismatch" => ServiceErrorCode::AuthorizationPermissionMismatch,
            "AuthorizationResourceTypeMismatch" => {
                ServiceErrorCode::AuthorizationResourceTypeMismatch
            }
            "CannotVerifyCopySource" => ServiceErrorCode::CannotVerifyCopySource,
            "InternalError" => ServiceErrorCode::InternalError,
            "InvalidAuthenticationInfo" => ServiceErrorCode::InvalidAuthenticationInfo,
            "InvalidHeaderValue" => ServiceErrorCode::InvalidHeaderValue,
            "InvalidQueryParameterValue" => ServiceErrorCode::InvalidQueryParameterValue,
            "InvalidRange" => ServiceErrorCode::InvalidRange,
            "InvalidResourceName" => ServiceErrorCode::InvalidResourceName,
            "InvalidUri" => ServiceErrorCode::InvalidUri,
            "InvalidXmlDocument" => ServiceErrorCode::InvalidXmlDocument,
            "InvalidXmlNodeValue" => ServiceErrorCode::InvalidXmlNodeValue,
            "Md5Mismatch" => ServiceErrorCode::Md5Mismatch,
            "MissingRequiredHeader" => ServiceErrorCode::MissingRequiredHeader,
            "MissingRequiredQueryParameter" => ServiceErrorCode::MissingRequiredQueryParameter,
            "OperationTimedOut" => ServiceErrorCode::OperationTimedOut,
            "OutOfRangeInput" => ServiceErrorCode::OutOfRangeInput,
            "ResourceAlreadyExists" => ServiceErrorCode::ResourceAlreadyExists,
            "ResourceNotFound" => ServiceErrorCode::ResourceNotFound,
            "ResourceTypeMismatch" => ServiceErrorCode::ResourceTypeMismatch,
            "ServerBusy" => ServiceErrorCode::ServerBusy,
            "UnsupportedHttpVerb" => ServiceErrorCode::UnsupportedHttpVerb,
            "DirectoryNotEmpty" => ServiceErrorCode::DirectoryNotEmpty,
            "InvalidFileOrDirectoryPathName" => ServiceErrorCode::InvalidFileOrDirectoryPathName,
            "NoPendingCopyOperation" => ServiceErrorCode::NoPendingCopyOperation,
            "ParentNotFound" => ServiceErrorCode::ParentNotFound,
            "PendingCopyOperation" => ServiceErrorCode::PendingCopyOperation,
            "CopyIdMismatch" => ServiceErrorCode::CopyIdMismatch,
            "ShareAlreadyExists" => ServiceErrorCode::ShareAlreadyExists,
            "ShareNotFound" => ServiceErrorCode::ShareNotFound,
            "ShareSizeLimitReached" => ServiceErrorCode::ShareSizeLimitReached,
            "BlobNotFound" => ServiceErrorCode::BlobNotFound,
            "ContainerAlreadyExists" => ServiceErrorCode::ContainerAlreadyExists,
            "ContainerNotFound" => ServiceErrorCode::ContainerNotFound,
            _ => return None,
        };
        Some(parsed)
    }

    /// Returns the HTTP status code the service answers with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            ServiceErrorCode::InvalidAuthenticationInfo
            | ServiceErrorCode::InvalidHeaderValue
            | ServiceErrorCode::InvalidQueryParameterValue
            | ServiceErrorCode::InvalidResourceName
            | ServiceErrorCode::InvalidUri
            | ServiceErrorCode::InvalidXmlDocument
            | ServiceErrorCode::InvalidXmlNodeValue
            | ServiceErrorCode::Md5Mismatch
            | ServiceErrorCode::MissingRequiredHeader
            | ServiceErrorCode::MissingRequiredQueryParameter
            | ServiceErrorCode::OutOfRangeInput
            | ServiceErrorCode::InvalidFileOrDirectoryPathName => StatusCode::BAD_REQUEST,

            // 403 Forbidden
            ServiceErrorCode::AuthenticationFailed
            | ServiceErrorCode::AuthorizationFailure
            | ServiceErrorCode::AuthorizationPermissionMismatch
            | ServiceErrorCode::AuthorizationResourceTypeMismatch
            | ServiceErrorCode::CannotVerifyCopySource => StatusCode::FORBIDDEN,

            // 404 Not Found
            ServiceErrorCode::ResourceNotFound
            | ServiceErrorCode::ParentNotFound
            | ServiceErrorCode::ShareNotFound
            | ServiceErrorCode::BlobNotFound
            | ServiceErrorCode::ContainerNotFound => StatusCode::NOT_FOUND,

            // 405 Method Not Allowed
            ServiceErrorCode::UnsupportedHttpVerb => StatusCode::METHOD_NOT_ALLOWED,

            // 409 Conflict
            ServiceErrorCode::ResourceAlreadyExists
            | ServiceErrorCode::ResourceTypeMismatch
            | ServiceErrorCode::DirectoryNotEmpty
            | ServiceErrorCode::NoPendingCopyOperation
            | ServiceErrorCode::PendingCopyOperation
            | ServiceErrorCode::CopyIdMismatch
            | ServiceErrorCode::ShareAlreadyExists
            | ServiceErrorCode::ContainerAlreadyExists => StatusCode::CONFLICT,

            // 413 Payload Too Large
            ServiceErrorCode::ShareSizeLimitReached => StatusCode::PAYLOAD_TOO_LARGE,

            // 416 Range Not Satisfiable
            ServiceErrorCode::InvalidRange => StatusCode::RANGE_NOT_SATISFIABLE,

            // 500 Internal Server Error
            ServiceErrorCode::InternalError | ServiceErrorCode::OperationTimedOut => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            // 503 Service Unavailable
            ServiceErrorCode::ServerBusy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns the default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ServiceErrorCode::AuthenticationFailed => {
                "Server failed to authenticate the request. Make sure the value of the \
                 Authorization header is formed correctly including the signature."
            }
            ServiceErrorCode::AuthorizationFailure => {
                "This request is not authorized to perform this operation."
            }
            ServiceErrorCode::AuthorizationPermissionMismatch => {
                "This request is not authorized to perform this operation using this permission."
            }
            ServiceErrorCode::CannotVerifyCopySource => {
                "This request is not authorized to read the copy source."
            }
            ServiceErrorCode::ShareAlreadyExists => "The specified share already exists.",
            ServiceErrorCode::ShareNotFound => "The specified share does not exist.",
            ServiceErrorCode::ShareSizeLimitReached => {
                "The specified share is full or the write would exceed its quota."
            }
            ServiceErrorCode::ParentNotFound => "The specified parent path does not exist.",
            ServiceErrorCode::ResourceNotFound => "The specified resource does not exist.",
            ServiceErrorCode::ResourceAlreadyExists => "The specified resource already exists.",
            ServiceErrorCode::ContainerAlreadyExists => "The specified container already exists.",
            ServiceErrorCode::ContainerNotFound => "The specified container does not exist.",
            ServiceErrorCode::BlobNotFound => "The specified blob does not exist.",
            ServiceErrorCode::DirectoryNotEmpty => "The specified directory is not empty.",
            ServiceErrorCode::NoPendingCopyOperation => {
                "There is currently no pending copy operation."
            }
            ServiceErrorCode::InvalidXmlDocument => "The XML request body is invalid.",
            ServiceErrorCode::InvalidResourceName => {
                "The specified resource name contains invalid characters."
            }
            ServiceErrorCode::MissingRequiredHeader => "A required header was not specified.",
            ServiceErrorCode::InternalError => {
                "The server encountered an internal error. Please retry the request."
            }
            _ => "An error occurred while processing the request.",
        }
    }

    /// Maps the service code onto the client error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceErrorCode::ResourceNotFound
            | ServiceErrorCode::ParentNotFound
            | ServiceErrorCode::ShareNotFound
            | ServiceErrorCode::BlobNotFound
            | ServiceErrorCode::ContainerNotFound => ErrorKind::NotFound,

            ServiceErrorCode::AuthenticationFailed
            | ServiceErrorCode::AuthorizationFailure
            | ServiceErrorCode::AuthorizationPermissionMismatch
            | ServiceErrorCode::AuthorizationResourceTypeMismatch
            | ServiceErrorCode::InvalidAuthenticationInfo
            | ServiceErrorCode::CannotVerifyCopySource => ErrorKind::AuthorizationFailed,

            ServiceErrorCode::ShareSizeLimitReached => ErrorKind::QuotaExceeded,

            ServiceErrorCode::ResourceAlreadyExists
            | ServiceErrorCode::ShareAlreadyExists
            | ServiceErrorCode::ContainerAlreadyExists => ErrorKind::AlreadyExists,

            ServiceErrorCode::InvalidHeaderValue
            | ServiceErrorCode::InvalidQueryParameterValue
            | ServiceErrorCode::InvalidRange
            | ServiceErrorCode::InvalidResourceName
            | ServiceErrorCode::InvalidUri
            | ServiceErrorCode::InvalidXmlDocument
            | ServiceErrorCode::InvalidXmlNodeValue
            | ServiceErrorCode::Md5Mismatch
            | ServiceErrorCode::MissingRequiredHeader
            | ServiceErrorCode::MissingRequiredQueryParameter
            | ServiceErrorCode::OutOfRangeInput
            | ServiceErrorCode::InvalidFileOrDirectoryPathName => ErrorKind::InvalidConfiguration,

            _ => ErrorKind::Transport,
        }
    }
}

/// Storage client error.
#[derive(Debug, Error)]
#[error("{}: {message}", kind.as_str())]
pub struct StorageError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status of the response that produced the error, if any.
    pub status: Option<StatusCode>,
    /// Raw `x-ms-error-code` reported by the backend, if any.
    pub service_code: Option<String>,
    pub request_id: Option<String>,
}

impl StorageError {
    /// Creates a new error with the given kind and its default message.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            message: kind.default_message().to_string(),
            kind,
            status: None,
            service_code: None,
            request_id: None,
        }
    }

    /// Creates a new error with a custom message.
    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            service_code: None,
            request_id: None,
        }
    }

    /// Creates an error carrying a service error code and its default message.
    pub fn service(code: ServiceErrorCode) -> Self {
        Self::service_with_message(code, code.default_message())
    }

    /// Creates an error carrying a service error code and a custom message.
    pub fn service_with_message(code: ServiceErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind: code.kind(),
            message: message.into(),
            status: Some(code.status_code()),
            service_code: Some(code.as_str().to_string()),
            request_id: None,
        }
    }

    /// Builds an error from a non-success service response.
    ///
    /// Unknown codes fall back on the status class: 404 is `NotFound`,
    /// 401/403 is `AuthorizationFailed`, anything else is `Transport`.
    pub fn from_service(
        status: StatusCode,
        code: Option<&str>,
        message: Option<String>,
        request_id: Option<String>,
    ) -> Self {
        let known = code.and_then(ServiceErrorCode::from_code);
        let kind = match known {
            Some(code) => code.kind(),
            None => match status {
                StatusCode::NOT_FOUND => ErrorKind::NotFound,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::AuthorizationFailed,
                _ => ErrorKind::Transport,
            },
        };
        let message = message
            .filter(|m| !m.is_empty())
            .or_else(|| known.map(|c| c.default_message().to_string()))
            .unwrap_or_else(|| format!("request failed with status {}", status));

        Self {
            kind,
            message,
            status: Some(status),
            service_code: code.map(String::from),
            request_id,
        }
    }

    /// Sets the request ID for this error.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Returns true if the backend reported the given service code.
    pub fn has_service_code(&self, code: ServiceErrorCode) -> bool {
        self.service_code.as_deref() == Some(code.as_str())
    }

    /// Returns the service code, falling back on a code matching the kind.
    pub fn effective_service_code(&self) -> ServiceErrorCode {
        if let Some(code) = self.service_code.as_deref().and_then(ServiceErrorCode::from_code) {
            return code;
        }
        match self.kind {
            ErrorKind::NotFound => ServiceErrorCode::ResourceNotFound,
            ErrorKind::AuthorizationFailed => ServiceErrorCode::AuthenticationFailed,
            ErrorKind::QuotaExceeded => ServiceErrorCode::ShareSizeLimitReached,
            ErrorKind::AlreadyExists => ServiceErrorCode::ResourceAlreadyExists,
            ErrorKind::InvalidConfiguration | ErrorKind::InvalidConnectionString => {
                ServiceErrorCode::InvalidHeaderValue
            }
            ErrorKind::Io | ErrorKind::Transport => ServiceErrorCode::InternalError,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::with_message(ErrorKind::Io, err.to_string())
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        let mut error = StorageError::with_message(ErrorKind::Transport, err.to_string());
        error.status = err.status();
        error
    }
}

impl From<url::ParseError> for StorageError {
    fn from(err: url::ParseError) -> Self {
        StorageError::with_message(ErrorKind::InvalidConfiguration, format!("invalid URL: {}", err))
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// `Ok(true)` on success, `Ok(false)` when the failure is of `kind`.
pub(crate) fn true_unless(result: StorageResult<()>, kind: ErrorKind) -> StorageResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind == kind => Ok(false),
        Err(e) => Err(e),
    }
}
