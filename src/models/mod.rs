//! Data models for file shares, blobs and service settings.

mod access;
mod copy;
mod file;
mod service;
mod share;

pub use access::*;
pub use copy::*;
pub use file::*;
pub use service::*;
pub use share::*;
