use std::path::PathBuf;

use super::{ConfigItem, DataStoreBox, DataStoreFactory};
use crate::config::DataStoreConfig;
use crate::drivers::local;
use crate::error::{DataStoreError, Result};

pub struct LocalDataStoreFactory;

impl DataStoreFactory for LocalDataStoreFactory {
    fn store_type(&self) -> &'static str {
        local::STORE_TYPE
    }

    fn param_items(&self) -> Vec<ConfigItem> {
        vec![
            ConfigItem::new("root", "string")
                .title("Root directory")
                .required()
                .help("Directory every file path is resolved against"),
            ConfigItem::new("create_root", "bool")
                .title("Create root")
                .default("true")
                .help("Create the root directory when it does not exist"),
        ]
    }

    fn create(&self, config: DataStoreConfig) -> Result<DataStoreBox> {
        let root = PathBuf::from(config.require("root")?);
        let create_root = config.get_bool("create_root", true)?;

        // 同步初始化（工厂方法是同步的）
        if !root.exists() {
            if !create_root {
                return Err(DataStoreError::config(
                    local::STORE_TYPE,
                    format!("root does not exist: {}", root.display()),
                ));
            }
            std::fs::create_dir_all(&root).map_err(|e| {
                DataStoreError::config(local::STORE_TYPE, format!("cannot create root {}: {}", root.display(), e))
            })?;
        }
        let canonical_root = root.canonicalize().map_err(|e| {
            DataStoreError::config(local::STORE_TYPE, format!("cannot resolve root {}: {}", root.display(), e))
        })?;
        if !canonical_root.is_dir() {
            return Err(DataStoreError::config(
                local::STORE_TYPE,
                format!("root is not a directory: {}", canonical_root.display()),
            ));
        }

        tracing::info!("Filesystem datastore initialized, root: {:?}", canonical_root);

        Ok(Box::new(local::LocalDataStore::new(canonical_root)))
    }
}
