//! Adapters for the ports declared in `domain::ports`.

pub mod banking;
pub mod callback;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
