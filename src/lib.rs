//! Pluggable file access over interchangeable storage backends.
//!
//! Callers build a [`DataStoreConfig`], turn it into a `Box<dyn DataStore>`
//! with [`new_data_store`] (or their own [`DataStoreRegistry`]) and only ever
//! talk to the [`DataStore`] trait afterwards.

pub mod config;
pub mod error;
pub mod utils;
pub mod storage;

// Driver modules (point to project root drivers via path attribute) / 驱动模块
#[path = "../drivers/mod.rs"]
pub mod drivers;

pub use config::DataStoreConfig;
pub use error::{DataStoreError, ErrorKind, Result};
pub use storage::{
    new_data_store, ByteSource, Capability, DataStore, DataStoreFactory, DataStoreRegistry,
    FileMetadata, FileReader, ListFileOptions,
};
pub use tokio_util::sync::CancellationToken;

/// Register all built-in backends (call unified registration function from drivers module) / 注册所有内置后端
pub fn register_data_stores(registry: &DataStoreRegistry) -> anyhow::Result<()> {
    drivers::register_all(registry)
}
