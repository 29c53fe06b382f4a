//! azfiles-rs: a thin client for Azure Files and Blob storage.
//!
//! A [`StorageAccount`] is built from a connection string and hands out
//! service clients. Shares, directories, files, containers and blobs are
//! addressed through cheap handles that hold no remote state; every
//! operation on a handle is one or more REST round trips through the
//! account's [`Pipeline`], which signs requests with SharedKey or a SAS.
//!
//! # Example
//!
//! ```no_run
//! use azfiles_rs::{StorageAccount, StorageResult};
//!
//! # async fn run() -> StorageResult<()> {
//! let account = StorageAccount::from_connection_string(
//!     "DefaultEndpointsProtocol=https;AccountName=myaccount;AccountKey=a2V5",
//! )?;
//! let share = account.file_service_client().share("logs");
//! share.create_if_not_exists().await?;
//! share.file("log.txt").upload_text("hello").await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`MemoryTransport`] is an in-process backend speaking the same wire
//! protocol, for tests and offline use.

pub mod account;
mod acl;
pub mod auth;
pub mod blob;
pub mod config;
pub mod context;
pub mod copy;
pub mod download;
pub mod error;
pub mod file;
pub mod memory;
pub mod models;
pub mod pipeline;
pub mod transport;
pub mod xml;

// Re-exports for convenience
pub use account::{AccountKey, ConnectionConfig, Protocol, StorageAccount};
pub use auth::{SasGrant, SasResource, SasToken};
pub use blob::{BlobHandle, BlobServiceClient, ContainerHandle};
pub use config::{Args, ClientOptions, Command, DEV_ACCOUNT, DEV_ACCOUNT_KEY};
pub use copy::CopySource;
pub use download::DownloadMode;
pub use error::{ErrorKind, ServiceErrorCode, StorageError, StorageResult};
pub use file::{DirectoryHandle, FileHandle, FileServiceClient, ShareHandle};
pub use memory::MemoryTransport;
pub use pipeline::{Credential, Pipeline};
pub use transport::{HttpTransport, StorageRequest, StorageResponse, Transport};
