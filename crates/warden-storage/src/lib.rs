//! Warden Storage - namespaced key-value persistence.
//!
//! The registry and the permission broker keep their state behind the
//! [`KvStore`] trait so the backend can be swapped:
//!
//! - [`MemoryKvStore`]: in-process map, for tests and ephemeral use
//! - [`FileKvStore`]: one file per key under `{root}/{namespace}/`, written
//!   atomically (temp file + rename) under an advisory lock
//!
//! [`ScopedKvStore`] pre-binds a namespace and adds typed JSON helpers.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod file;
pub mod kv;

pub use error::{StorageError, StorageResult};
pub use file::FileKvStore;
pub use kv::{KvStore, MemoryKvStore, ScopedKvStore};
