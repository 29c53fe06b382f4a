//! Connection strings and the storage account entry point.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::{Host, Url};

use crate::blob::BlobServiceClient;
use crate::config::{
    ClientOptions, DEFAULT_ENDPOINT_SUFFIX, DEV_ACCOUNT, DEV_ACCOUNT_KEY, DEV_BLOB_ENDPOINT,
    DEV_FILE_ENDPOINT,
};
use crate::error::{ErrorKind, StorageError, StorageResult};
use crate::file::FileServiceClient;
use crate::models::ServiceKind;
use crate::pipeline::{Credential, Pipeline, SharedKeyCredential};
use crate::transport::{HttpTransport, Transport};

/// Base64 account key. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountKey(String);

impl AccountKey {
    /// Wraps a key, checking that it is valid base64.
    pub fn new(key: impl Into<String>) -> StorageResult<Self> {
        let key = key.into();
        match BASE64.decode(&key) {
            Ok(bytes) if !bytes.is_empty() => Ok(Self(key)),
            _ => Err(StorageError::with_message(
                ErrorKind::InvalidConfiguration,
                "account key is not valid base64",
            )),
        }
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccountKey(<redacted>)")
    }
}

/// Scheme used to reach the default endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Protocol::Http),
            "https" => Some(Protocol::Https),
            _ => None,
        }
    }
}

/// Parsed storage account connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub protocol: Protocol,
    pub account_name: String,
    pub account_key: AccountKey,
    pub endpoint_suffix: String,
    pub file_endpoint: Option<Url>,
    pub blob_endpoint: Option<Url>,
    /// Set by `UseDevelopmentStorage=true`.
    pub development_storage: bool,
}

fn invalid(message: impl Into<String>) -> StorageError {
    StorageError::with_message(ErrorKind::InvalidConnectionString, message)
}

impl ConnectionConfig {
    /// Parses `key=value;` pairs. Never touches the network.
    pub fn parse(connection_string: &str) -> StorageResult<Self> {
        let mut settings: HashMap<&str, &str> = HashMap::new();
        for segment in connection_string.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            // Keys are base64 and may end in '='; split on the first one only
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| invalid(format!("segment '{}' is not key=value", segment)))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(invalid("empty setting name"));
            }
            if settings.insert(key, value.trim()).is_some() {
                return Err(invalid(format!("setting '{}' appears twice", key)));
            }
        }

        if let Some(value) = settings.get("UseDevelopmentStorage") {
            if *value != "true" {
                return Err(invalid("UseDevelopmentStorage only accepts 'true'"));
            }
            return Ok(Self::development());
        }

        let account_name = settings
            .get("AccountName")
            .ok_or_else(|| invalid("AccountName is missing"))?
            .to_string();
        if !(3..=24).contains(&account_name.len())
            || !account_name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(invalid(format!("invalid account name '{}'", account_name)));
        }

        let account_key = settings
            .get("AccountKey")
            .ok_or_else(|| invalid("AccountKey is missing"))
            .and_then(|key| {
                AccountKey::new(*key).map_err(|_| invalid("AccountKey is not valid base64"))
            })?;

        let file_endpoint = settings
            .get("FileEndpoint")
            .map(|v| parse_endpoint("FileEndpoint", v))
            .transpose()?;
        let blob_endpoint = settings
            .get("BlobEndpoint")
            .map(|v| parse_endpoint("BlobEndpoint", v))
            .transpose()?;

        let protocol = match settings.get("DefaultEndpointsProtocol") {
            Some(value) => Protocol::parse(value)
                .ok_or_else(|| invalid(format!("unknown protocol '{}'", value)))?,
            None => match (&file_endpoint, &blob_endpoint) {
                (Some(file), Some(_)) => Protocol::parse(file.scheme())
                    .ok_or_else(|| invalid("FileEndpoint must be http or https"))?,
                _ => return Err(invalid("DefaultEndpointsProtocol is missing")),
            },
        };

        let endpoint_suffix = settings
            .get("EndpointSuffix")
            .map(|s| s.trim_matches('.').to_string())
            .unwrap_or_else(|| DEFAULT_ENDPOINT_SUFFIX.to_string());
        if endpoint_suffix.is_empty() {
            return Err(invalid("EndpointSuffix is empty"));
        }

        Ok(Self {
            protocol,
            account_name,
            account_key,
            endpoint_suffix,
            file_endpoint,
            blob_endpoint,
            development_storage: false,
        })
    }

    /// The well-known local development account.
    pub fn development() -> Self {
        Self {
            protocol: Protocol::Http,
            account_name: DEV_ACCOUNT.to_string(),
            account_key: AccountKey(DEV_ACCOUNT_KEY.to_string()),
            endpoint_suffix: DEFAULT_ENDPOINT_SUFFIX.to_string(),
            file_endpoint: Url::parse(DEV_FILE_ENDPOINT).ok(),
            blob_endpoint: Url::parse(DEV_BLOB_ENDPOINT).ok(),
            development_storage: true,
        }
    }

    /// Serializes back into a connection string that parses to `self`.
    pub fn to_connection_string(&self) -> String {
        if self.development_storage {
            return "UseDevelopmentStorage=true".to_string();
        }
        let mut parts = vec![
            format!("DefaultEndpointsProtocol={}", self.protocol.as_str()),
            format!("AccountName={}", self.account_name),
            format!("AccountKey={}", self.account_key.secret()),
            format!("EndpointSuffix={}", self.endpoint_suffix),
        ];
        if let Some(ref endpoint) = self.file_endpoint {
            parts.push(format!("FileEndpoint={}", endpoint));
        }
        if let Some(ref endpoint) = self.blob_endpoint {
            parts.push(format!("BlobEndpoint={}", endpoint));
        }
        parts.join(";")
    }

    /// Resolves the endpoint of one service.
    pub fn endpoint(&self, service: ServiceKind) -> StorageResult<Url> {
        let configured = match service {
            ServiceKind::File => &self.file_endpoint,
            ServiceKind::Blob => &self.blob_endpoint,
        };
        if let Some(endpoint) = configured {
            return Ok(endpoint.clone());
        }
        Ok(Url::parse(&format!(
            "{}://{}.{}.{}",
            self.protocol.as_str(),
            self.account_name,
            service.as_str(),
            self.endpoint_suffix
        ))?)
    }
}

fn parse_endpoint(name: &str, value: &str) -> StorageResult<Url> {
    let url = Url::parse(value).map_err(|_| invalid(format!("{} is not a URL", name)))?;
    if Protocol::parse(url.scheme()).is_none() || url.cannot_be_a_base() {
        return Err(invalid(format!("{} must be an http or https URL", name)));
    }
    Ok(url)
}

/// Appends path segments to a service endpoint, escaping each one.
pub(crate) fn resource_url(endpoint: &Url, segments: &[&str]) -> Url {
    let mut url = endpoint.clone();
    url.set_query(None);
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// A resource URL taken apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedResourceUrl {
    pub account: String,
    /// Service endpoint, without the resource path or query.
    pub endpoint: Url,
    /// Share or container name.
    pub root: String,
    /// Decoded path below the root.
    pub segments: Vec<String>,
}

/// Splits a resource URL into account, endpoint, root and path.
///
/// Hosts of the form `{account}.{file|blob}.{suffix}` carry the account in
/// the host; anything else (IP addresses, local emulators) carries it as the
/// first path segment.
pub(crate) fn parse_resource_url(
    url: &Url,
    service: ServiceKind,
) -> StorageResult<ParsedResourceUrl> {
    let bad = || {
        StorageError::with_message(
            ErrorKind::InvalidConfiguration,
            format!("'{}' is not a {} resource URL", url.path(), service.as_str()),
        )
    };

    let mut segments: Vec<String> = url
        .path_segments()
        .ok_or_else(bad)?
        .filter(|s| !s.is_empty())
        .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
        .collect();

    let mut endpoint = url.clone();
    endpoint.set_query(None);
    endpoint.set_fragment(None);

    let host_account = match url.host() {
        Some(Host::Domain(domain)) => {
            let mut labels = domain.split('.');
            match (labels.next(), labels.next()) {
                (Some(account), Some(label)) if label == service.as_str() => {
                    Some(account.to_string())
                }
                _ => None,
            }
        }
        _ => None,
    };

    let account = match host_account {
        Some(account) => {
            endpoint.set_path("/");
            account
        }
        None => {
            if segments.is_empty() {
                return Err(bad());
            }
            let account = segments.remove(0);
            endpoint.set_path(&format!("/{}", account));
            account
        }
    };

    if segments.is_empty() {
        return Err(bad());
    }
    let root = segments.remove(0);

    Ok(ParsedResourceUrl {
        account,
        endpoint,
        root,
        segments,
    })
}

/// A storage account: resolved endpoints plus the request pipeline.
#[derive(Debug, Clone)]
pub struct StorageAccount {
    config: Arc<ConnectionConfig>,
    file_endpoint: Url,
    blob_endpoint: Url,
    pipeline: Pipeline,
}

impl StorageAccount {
    /// Builds an account that talks HTTP(S) to the configured endpoints.
    pub fn new(config: ConnectionConfig, options: ClientOptions) -> StorageResult<Self> {
        let transport = Arc::new(HttpTransport::new(&options)?);
        Self::with_transport(config, options, transport)
    }

    /// Builds an account over any transport.
    pub fn with_transport(
        config: ConnectionConfig,
        options: ClientOptions,
        transport: Arc<dyn Transport>,
    ) -> StorageResult<Self> {
        let file_endpoint = config.endpoint(ServiceKind::File)?;
        let blob_endpoint = config.endpoint(ServiceKind::Blob)?;
        let credential = Credential::SharedKey(Arc::new(SharedKeyCredential {
            account: config.account_name.clone(),
            key: config.account_key.clone(),
        }));
        Ok(Self {
            config: Arc::new(config),
            file_endpoint,
            blob_endpoint,
            pipeline: Pipeline::new(transport, credential, options),
        })
    }

    pub fn from_connection_string(connection_string: &str) -> StorageResult<Self> {
        Self::new(
            ConnectionConfig::parse(connection_string)?,
            ClientOptions::default(),
        )
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn account_name(&self) -> &str {
        &self.config.account_name
    }

    pub fn file_endpoint(&self) -> &Url {
        &self.file_endpoint
    }

    pub fn blob_endpoint(&self) -> &Url {
        &self.blob_endpoint
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn file_service_client(&self) -> FileServiceClient {
        FileServiceClient::new(
            self.account_name(),
            self.file_endpoint.clone(),
            self.pipeline.clone(),
        )
    }

    pub fn blob_service_client(&self) -> BlobServiceClient {
        BlobServiceClient::new(
            self.account_name(),
            self.blob_endpoint.clone(),
            self.pipeline.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONN: &str = "DefaultEndpointsProtocol=https;AccountName=acct;\
        AccountKey=Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==;\
        EndpointSuffix=core.windows.net";

    #[test]
    fn test_parse_and_round_trip() {
        let config = ConnectionConfig::parse(CONN).unwrap();
        assert_eq!(config.protocol, Protocol::Https);
        assert_eq!(config.account_name, "acct");
        assert_eq!(config.account_key.secret(), DEV_ACCOUNT_KEY);
        assert_eq!(
            config.endpoint(ServiceKind::File).unwrap().as_str(),
            "https://acct.file.core.windows.net/"
        );

        let again = ConnectionConfig::parse(&config.to_connection_string()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_endpoint_overrides_imply_protocol() {
        let conn = format!(
            "AccountName=acct;AccountKey={};FileEndpoint=http://127.0.0.1:9000/acct;BlobEndpoint=http://127.0.0.1:9001/acct;",
            DEV_ACCOUNT_KEY
        );
        let config = ConnectionConfig::parse(&conn).unwrap();
        assert_eq!(config.protocol, Protocol::Http);
        assert_eq!(
            config.endpoint(ServiceKind::Blob).unwrap().as_str(),
            "http://127.0.0.1:9001/acct"
        );
        assert_eq!(ConnectionConfig::parse(&config.to_connection_string()).unwrap(), config);
    }

    #[test]
    fn test_malformed_strings_fail_fast() {
        for bad in [
            "",
            "AccountName=acct",
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=!!!",
            "DefaultEndpointsProtocol=ftp;AccountName=acct;AccountKey=a2V5",
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey",
            "DefaultEndpointsProtocol=https;AccountName=Acct;AccountKey=a2V5",
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountName=b;AccountKey=a2V5",
            "UseDevelopmentStorage=yes",
        ] {
            let err = ConnectionConfig::parse(bad).unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidConnectionString, "{}", bad);
        }
    }

    #[test]
    fn test_development_storage() {
        let config = ConnectionConfig::parse("UseDevelopmentStorage=true").unwrap();
        assert_eq!(config.account_name, DEV_ACCOUNT);
        assert_eq!(config.endpoint(ServiceKind::File).unwrap().as_str(), DEV_FILE_ENDPOINT);
        assert_eq!(config.to_connection_string(), "UseDevelopmentStorage=true");
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ConnectionConfig::parse(CONN).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains(DEV_ACCOUNT_KEY));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn test_resource_urls() {
        let endpoint = Url::parse("http://127.0.0.1:10004/devstoreaccount1").unwrap();
        let url = resource_url(&endpoint, &["logs", "my dir", "a.txt"]);
        assert_eq!(url.as_str(), "http://127.0.0.1:10004/devstoreaccount1/logs/my%20dir/a.txt");

        let parsed = parse_resource_url(&url, ServiceKind::File).unwrap();
        assert_eq!(parsed.account, "devstoreaccount1");
        assert_eq!(parsed.root, "logs");
        assert_eq!(parsed.segments, vec!["my dir", "a.txt"]);
        assert_eq!(parsed.endpoint, endpoint);

        let url =
            Url::parse("https://acct.blob.core.windows.net/backup/log.txt?sv=x&sig=y").unwrap();
        let parsed = parse_resource_url(&url, ServiceKind::Blob).unwrap();
        assert_eq!(parsed.account, "acct");
        assert_eq!(parsed.root, "backup");
        assert_eq!(parsed.endpoint.as_str(), "https://acct.blob.core.windows.net/");
    }
}
