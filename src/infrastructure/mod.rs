pub mod fedex;
pub mod http;
pub mod in_memory;
pub mod notifier;
pub mod paypal;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
