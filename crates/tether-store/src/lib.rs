//! `tether-store`: the durable key-value storage collaborator.
//!
//! All offline state is persisted through [`DurableStore`]: string keys,
//! string (JSON) values, batched reads and atomic batched writes.
//! [`SqliteStore`] is the on-device backend; [`MemoryStore`] backs tests and
//! ephemeral sessions.

pub mod db;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::{Result, StorageError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{get_one, DurableStore};
