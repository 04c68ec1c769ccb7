//! Warden Storage — embedded persistence layer.
//!
//! A deliberately small surface: byte-level namespaced key-value access via
//! the [`KvStore`] trait. Two backends:
//!
//! - [`MemoryKvStore`] — in-memory, for tests and explicitly ephemeral runs
//! - [`SledKvStore`] — embedded durable KV (one sled tree per namespace)
//!
//! Tokens, role assignments, and webhook targets all persist through this
//! trait; the append-only event journal has its own file-based format and
//! does not go through here.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod kv;

pub use error::{StorageError, StorageResult};
pub use kv::{KvStore, MemoryKvStore, SledKvStore};
