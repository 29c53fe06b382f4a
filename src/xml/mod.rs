//! XML bodies of the file and blob REST APIs.

pub mod deserialize;
pub mod serialize;

pub use deserialize::*;
pub use serialize::*;
