//! Client configuration and command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Account name of the local development storage account.
pub const DEV_ACCOUNT: &str = "devstoreaccount1";

/// Account key of the local development storage account (base64 encoded).
pub const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Default blob endpoint of the local development storage.
pub const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// Default file endpoint of the local development storage.
pub const DEV_FILE_ENDPOINT: &str = "http://127.0.0.1:10004/devstoreaccount1";

/// Default endpoint suffix for public cloud accounts.
pub const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Default REST API version sent in `x-ms-version` and signed into SAS tokens.
pub const DEFAULT_API_VERSION: &str = "2021-10-04";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Options shared by every request issued through a storage account.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// REST API version.
    pub api_version: String,
    /// Per-request timeout enforced by the HTTP transport.
    pub timeout: Duration,
    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: format!("azfiles-rs/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl From<&Args> for ClientOptions {
    fn from(args: &Args) -> Self {
        Self {
            api_version: args.api_version.clone(),
            timeout: Duration::from_secs(args.timeout_secs),
            ..ClientOptions::default()
        }
    }
}

/// Command-line arguments for the `azfiles` tool.
#[derive(Parser, Debug, Clone)]
#[command(name = "azfiles")]
#[command(about = "Work with file shares and blobs in a storage account")]
#[command(version)]
pub struct Args {
    /// Storage account connection string.
    #[arg(long, env = "AZURE_STORAGE_CONNECTION_STRING", hide_env_values = true)]
    pub connection_string: String,

    /// REST API version to request.
    #[arg(long, default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Enable debug logging.
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Enable silent mode (errors only).
    #[arg(long, short = 's')]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Operations exposed by the command-line tool.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a share unless it already exists.
    CreateShare { share: String },

    /// Print share usage.
    Stats { share: String },

    /// Set or remove the share quota (omit the value to remove it).
    Quota {
        share: String,
        #[arg(long)]
        gib: Option<u32>,
    },

    /// Upload text to a file, overwriting it.
    Upload {
        share: String,
        /// Path of the file inside the share, e.g. `logs/log.txt`.
        path: String,
        text: String,
    },

    /// Download a file to a local path.
    Download {
        share: String,
        path: String,
        destination: PathBuf,
        /// Append to the destination instead of overwriting it.
        #[arg(long)]
        append: bool,
    },

    /// Check whether a file exists.
    Exists { share: String, path: String },

    /// Mint a SAS URL for a file.
    Sas {
        share: String,
        path: String,
        /// Permissions in `rcwdl` notation (ignored with --policy).
        #[arg(long, default_value = "r")]
        permissions: String,
        /// Lifetime of the token in hours (ignored with --policy).
        #[arg(long, default_value_t = 24)]
        hours: i64,
        /// Name of a stored access policy on the share.
        #[arg(long)]
        policy: Option<String>,
    },

    /// Store a named access policy on a share.
    AddPolicy {
        share: String,
        id: String,
        #[arg(long, default_value = "r")]
        permissions: String,
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },

    /// Remove a named access policy from a share, revoking its tokens.
    RemovePolicy { share: String, id: String },

    /// Copy a file to another file, or to a blob with --to-container.
    Copy {
        share: String,
        source: String,
        destination: String,
        /// Copy into this blob container instead of the share.
        #[arg(long)]
        to_container: Option<String>,
    },

    /// Configure hour and minute metrics for the file service.
    Metrics {
        /// One of `none`, `service`, `service-and-api`.
        #[arg(long, default_value = "service-and-api")]
        level: String,
        #[arg(long)]
        retention_days: Option<u32>,
    },
}
