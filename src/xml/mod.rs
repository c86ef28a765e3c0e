//! XML handling for the Azure Blob REST API.

pub mod deserialize;
pub mod serialize;

pub use deserialize::*;
pub use serialize::*;
