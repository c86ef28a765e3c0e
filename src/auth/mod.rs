//! Credentials for the Azure Blob REST API: request signing and SAS generation.

mod blob_sas;
mod shared_key;

pub use blob_sas::*;
pub use shared_key::*;
