//! Stratus - Two-tier build artifact cache
//!
//! Layers a fast local staging directory in front of a remote object store
//! (S3- or GCS-compatible) to speed up toolchain build caching and module
//! fetches. Reads fault in from the remote store on a local miss; writes
//! land locally, reply immediately, and upload in the background.

pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod module;
pub mod remote;
pub mod stage;
pub mod tasks;

pub use build::{ActionHit, BuildCache};
pub use error::{StratusError, StratusResult};
pub use module::ModuleCache;
pub use remote::{MemoryStore, ObjectStore};
pub use stage::{Object, Stage};
