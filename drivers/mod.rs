// Driver package / 驱动包
pub mod http;
pub mod local;

use crate::storage::DataStoreRegistry;

/// Register all drivers to DataStoreRegistry / 注册所有驱动
pub fn register_all(registry: &DataStoreRegistry) -> anyhow::Result<()> {
    // Register HTTP(S) read-only driver / 注册HTTP只读驱动
    registry.register_factory(Box::new(http::HttpDataStoreFactory))?;
    // Register local filesystem driver (factory lives in the storage module) / 注册本地驱动
    registry.register_factory(Box::new(crate::storage::LocalDataStoreFactory))?;
    Ok(())
}
