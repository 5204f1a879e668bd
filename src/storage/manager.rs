use std::collections::HashMap;
use std::sync::Arc;
use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::{ConfigItem, DataStore, DataStoreInfo};
use crate::config::DataStoreConfig;
use crate::error::DataStoreError;

pub type DataStoreBox = Box<dyn DataStore>;

/// Backend factory trait / 后端工厂 trait
pub trait DataStoreFactory: Send + Sync {
    /// Backend type name, as written in `DataStoreConfig::store_type` / 后端类型名称
    fn store_type(&self) -> &'static str;

    /// Parameters the backend recognizes / 后端配置项
    fn param_items(&self) -> Vec<ConfigItem>;

    /// Create backend instance; no I/O beyond what the backend needs to validate config
    fn create(&self, config: DataStoreConfig) -> crate::Result<DataStoreBox>;

    /// Generate complete backend info / 生成完整的后端信息
    fn info(&self) -> DataStoreInfo {
        DataStoreInfo {
            store_type: self.store_type().to_string(),
            params: self.param_items(),
        }
    }
}

/// Registry of backend factories, dispatching on the configured type / 后端注册表
#[derive(Clone, Default)]
pub struct DataStoreRegistry {
    factories: Arc<RwLock<HashMap<String, Arc<dyn DataStoreFactory>>>>,
}

// Registration into a fresh registry only fails if two built-in drivers share
// a type name, which is a bug rather than a runtime condition
static BUILTIN: Lazy<DataStoreRegistry> = Lazy::new(|| {
    let registry = DataStoreRegistry::new();
    crate::drivers::register_all(&registry).expect("built-in datastore types must be unique");
    registry
});

impl DataStoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in backend registered / 包含所有内置后端的注册表
    pub fn builtin() -> &'static DataStoreRegistry {
        &BUILTIN
    }

    /// Register backend factory / 注册后端工厂
    pub fn register_factory(&self, factory: Box<dyn DataStoreFactory>) -> Result<()> {
        let store_type = factory.store_type();
        let key = store_type.to_ascii_lowercase();
        let mut factories = self.factories.write();
        if factories.contains_key(&key) {
            return Err(anyhow!("Datastore type already registered: {}", store_type));
        }
        factories.insert(key, Arc::from(factory));

        tracing::info!("Datastore factory registered: {}", store_type);
        Ok(())
    }

    /// Create a backend for `config`, consuming it / 创建后端实例
    ///
    /// Required parameters are checked here before the factory runs.
    pub fn create(&self, config: DataStoreConfig) -> crate::Result<DataStoreBox> {
        let factory = self
            .factories
            .read()
            .get(&config.store_type.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| DataStoreError::UnknownType(config.store_type.clone()))?;

        for item in factory.param_items().iter().filter(|i| i.required && !i.prefix) {
            config.require(&item.name)?;
        }

        let store_type = config.store_type.clone();
        match factory.create(config) {
            Ok(store) => {
                tracing::info!("Datastore created: {}", store_type);
                Ok(store)
            }
            Err(e) => {
                tracing::error!("Datastore creation failed: {} - {}", store_type, e);
                Err(e)
            }
        }
    }

    /// List all available backend types / 列出所有可用的后端类型
    pub fn list_store_types(&self) -> Vec<String> {
        let factories = self.factories.read();
        let mut types: Vec<String> = factories
            .values()
            .map(|f| f.store_type().to_string())
            .collect();
        types.sort();
        types
    }

    /// Describe every registered backend / 所有后端信息
    pub fn describe(&self) -> Vec<DataStoreInfo> {
        let factories = self.factories.read();
        let mut infos: Vec<DataStoreInfo> = factories.values().map(|f| f.info()).collect();
        infos.sort_by(|a, b| a.store_type.cmp(&b.store_type));
        infos
    }
}

/// Construct a backend through the built-in registry / 通过内置注册表创建后端
pub fn new_data_store(config: DataStoreConfig) -> crate::Result<DataStoreBox> {
    DataStoreRegistry::builtin().create(config)
}
