//! # conductor-registry
//!
//! A read-through view of the tool-descriptor tree.
//!
//! The registry is laid out as `/<category>/<service>/`, each service holding
//! a `config.json` and an `mcp/` directory of server manifests or tool
//! descriptors. [`RegistryStore`] lists directories, reads and classifies
//! files, and memoizes every successful read by normalized path.

mod error;
mod store;

pub use error::{RegistryError, Result};
pub use store::RegistryStore;
