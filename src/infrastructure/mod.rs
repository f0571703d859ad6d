//! Adapters behind the domain ports: in-memory and RocksDB storage, the
//! TTL session store, the queued notifier and the sandbox gateway.

pub mod in_memory;
pub mod notifications;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod sandbox_gateway;
pub mod session_store;
