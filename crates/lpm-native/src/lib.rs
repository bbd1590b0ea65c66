//! Native capability layer for the lpm package manager.
//!
//! Everything the package manager does to the outside world goes through one
//! of the components below: filesystem metadata, content hashing, archive
//! extraction, Git synchronization and HTTP retrieval. Each call is blocking
//! and releases every native handle it opened before returning.
//!
//! The [`Registry`] exposes the components as a flat table of named
//! capabilities taking and returning dynamic [`Value`]s, which is the shape
//! the orchestrating script consumes. The typed functions in each module are
//! the same operations for Rust callers.
//!
//! # Example
//!
//! ```no_run
//! use lpm_native::{Registry, TransferConfig, Value};
//!
//! # fn example() -> lpm_native::Result<()> {
//! let mut registry = Registry::install(TransferConfig::default())?;
//! let digest = registry.invoke("hash", &[Value::from("hello lpm!")])?;
//! println!("{:?}", digest);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod error;
pub mod fs;
pub mod git;
pub mod hash;
pub mod http;
pub mod platform;
pub mod registry;
pub mod trust;

pub use error::{Error, ErrorKind, Result};
pub use fs::{FileEntry, FileKind, StatOutcome};
pub use git::ResetMode;
pub use hash::{Digest, HashInput, HashMode};
pub use http::{ResponseMetadata, Retrieved, TransferConfig, TransferHandle};
pub use registry::{Registry, Value};
pub use trust::{TrustStore, TrustStoreKind};
