//! SharedKey signing, service SAS, and request authentication.

mod middleware;
mod sas;
mod shared_key;

pub use middleware::*;
pub use sas::*;
pub use shared_key::*;
