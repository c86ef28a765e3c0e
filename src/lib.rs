//! blob-gateway: an HTTP gateway over Azure Blob Storage.
//!
//! Exposes containers and blobs through a small REST surface where each
//! resource level (service, container, blob) selects its operation with the
//! `op` query parameter. Storage is reached through a [`BlobBackend`], either
//! Azure Blob Storage over REST or a process-local memory store.
//!
//! # Example
//!
//! ```no_run
//! use blob_gateway::{Config, GatewayServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = GatewayServer::new(Config::default()).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod auth;
pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod models;
pub mod operation;
pub mod router;
pub mod server;
pub mod validate;
pub mod xml;

// Re-exports for convenience
pub use backend::{AzureBackend, BackendError, BlobBackend, MemoryBackend};
pub use config::{Args, BackendKind, Config, StorageAccount, DEFAULT_ACCOUNT, DEFAULT_ACCOUNT_KEY};
pub use error::{ErrorCode, GatewayError, GatewayResult};
pub use server::{GatewayServer, GatewayServerBuilder};
