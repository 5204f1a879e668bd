//! HTTP(S) 只读存储驱动

mod driver;

pub use driver::{HttpDataStore, DEFAULT_TIMEOUT, HEADER_PREFIX, STORE_TYPE};

use crate::config::DataStoreConfig;
use crate::error::Result;
use crate::storage::{ConfigItem, DataStoreBox, DataStoreFactory};

/// HTTP 驱动工厂
pub struct HttpDataStoreFactory;

impl DataStoreFactory for HttpDataStoreFactory {
    fn store_type(&self) -> &'static str {
        STORE_TYPE
    }

    fn param_items(&self) -> Vec<ConfigItem> {
        vec![
            ConfigItem::new("base_url", "string")
                .title("Base URL")
                .help("http:// or https:// address, e.g. https://example.com/data/")
                .required(),
            ConfigItem::new("timeout", "string")
                .title("Timeout")
                .help("Request timeout as a duration string, e.g. 30s or 1m")
                .default("30s"),
            ConfigItem::new(HEADER_PREFIX, "string")
                .title("Extra headers")
                .help("header_<Name> adds the literal header <Name> to every request")
                .prefix(),
        ]
    }

    fn create(&self, config: DataStoreConfig) -> Result<DataStoreBox> {
        let store = HttpDataStore::new(&config)?;
        tracing::info!(
            "HTTP datastore initialized, base_url: {}, timeout: {:?}, headers: {}",
            store.base_url(),
            store.timeout(),
            store.headers().len()
        );
        Ok(Box::new(store))
    }
}
