//! Local filesystem storage driver / 本地存储驱动
//!
//! Writable backend: atomic replace through rename, atomic create-if-absent
//! through `persist_noclobber`, recursive listing.

mod driver;

pub use driver::{LocalDataStore, STORE_TYPE};
