//! JSON data models returned by the gateway.

mod blob;
mod container;

pub use blob::*;
pub use container::*;

use std::collections::BTreeMap;

/// User-defined key/value metadata of a container or blob.
pub type Metadata = BTreeMap<String, String>;

/// Index tags of a blob.
pub type Tags = BTreeMap<String, String>;
