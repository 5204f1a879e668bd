mod common;

use async_trait::async_trait;
use yaolist_datastore::storage::ConfigItem;
use yaolist_datastore::{
    new_data_store, register_data_stores, ByteSource, CancellationToken, Capability, DataStore,
    DataStoreConfig, DataStoreError, DataStoreFactory, DataStoreRegistry, ErrorKind, FileMetadata,
    FileReader, ListFileOptions, Result,
};

/// Backend that answers metadata from a fixed table, to exercise the
/// trait's derived operations.
struct FixedMetadataStore {
    metadata: FileMetadata,
}

#[async_trait]
impl DataStore for FixedMetadataStore {
    fn store_type(&self) -> &str {
        "Fixed"
    }

    fn capabilities(&self) -> Capability {
        Capability {
            can_metadata_probe: true,
            ..Default::default()
        }
    }

    async fn get_file(&self, _cancel: &CancellationToken, path: &str) -> Result<FileReader> {
        Err(DataStoreError::not_found(path))
    }

    async fn get_file_metadata(&self, _cancel: &CancellationToken, path: &str) -> Result<FileMetadata> {
        if path == "present" {
            Ok(self.metadata.clone())
        } else {
            Err(DataStoreError::not_found(path))
        }
    }

    async fn put_file(
        &self,
        _cancel: &CancellationToken,
        _path: &str,
        _data: ByteSource,
        _metadata: FileMetadata,
    ) -> Result<()> {
        Err(DataStoreError::Unsupported {
            store_type: "Fixed",
            operation: "PutFile",
            reason: "is read-only".to_string(),
        })
    }

    async fn put_file_if_not_exists(
        &self,
        _cancel: &CancellationToken,
        _path: &str,
        _data: ByteSource,
        _metadata: FileMetadata,
    ) -> Result<bool> {
        Err(DataStoreError::Unsupported {
            store_type: "Fixed",
            operation: "PutFileIfNotExists",
            reason: "is read-only".to_string(),
        })
    }

    async fn list_file_paths(
        &self,
        _cancel: &CancellationToken,
        _options: ListFileOptions,
    ) -> Result<Vec<String>> {
        Ok(vec!["present".to_string()])
    }
}

struct FixedFactory;

impl DataStoreFactory for FixedFactory {
    fn store_type(&self) -> &'static str {
        "Fixed"
    }

    fn param_items(&self) -> Vec<ConfigItem> {
        vec![ConfigItem::new("meta_", "string").prefix()]
    }

    fn create(&self, config: DataStoreConfig) -> Result<Box<dyn DataStore>> {
        let metadata = config
            .with_prefix("meta_")
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Ok(Box::new(FixedMetadataStore { metadata }))
    }
}

fn fixed_store(pairs: &[(&str, &str)]) -> Box<dyn DataStore> {
    let registry = DataStoreRegistry::new();
    registry.register_factory(Box::new(FixedFactory)).unwrap();
    let mut config = DataStoreConfig::new("Fixed");
    for (k, v) in pairs {
        config = config.param(&format!("meta_{}", k), v);
    }
    registry.create(config).unwrap()
}

#[test]
fn test_builtin_types() {
    common::init_tracing();
    assert_eq!(
        DataStoreRegistry::builtin().list_store_types(),
        vec!["Filesystem".to_string(), "HTTP".to_string()]
    );
}

#[test]
fn test_type_match_is_case_insensitive() {
    let store = new_data_store(
        DataStoreConfig::new("http").param("base_url", "https://example.com/data/"),
    )
    .unwrap();
    assert_eq!(store.store_type(), "HTTP");
}

#[test]
fn test_unknown_type() {
    let err = new_data_store(DataStoreConfig::new("GCS")).err().expect("operation should fail");
    assert!(matches!(err, DataStoreError::UnknownType(ref t) if t == "GCS"));
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_missing_required_param() {
    let err = new_data_store(DataStoreConfig::new("HTTP")).err().expect("operation should fail");
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains("no base_url"));

    let err = new_data_store(DataStoreConfig::new("Filesystem")).err().expect("operation should fail");
    assert!(err.to_string().contains("no root"));
}

#[test]
fn test_invalid_http_config() {
    for (key, value) in [
        ("base_url", "ftp://example.com/"),
        ("base_url", "not a url"),
        ("timeout", "soon"),
        ("timeout", "-5s"),
        ("header_Bad Name", "x"),
    ] {
        let mut config = DataStoreConfig::new("HTTP").param(key, value);
        if key != "base_url" {
            config = config.param("base_url", "https://example.com/");
        }
        let err = new_data_store(config).err().expect("operation should fail");
        assert_eq!(err.kind(), ErrorKind::Config, "{}={} should be rejected", key, value);
    }

    let err = new_data_store(DataStoreConfig::new("HTTP").param("base_url", "ftp://example.com/"))
        .err()
        .expect("operation should fail");
    assert!(err.to_string().contains("base_url must use http or https scheme"));
}

#[test]
fn test_config_from_json() {
    let config = DataStoreConfig::from_json_str(
        r#"{"type": "HTTP", "params": {"base_url": "https://example.com/", "timeout": "0"}}"#,
    )
    .unwrap();
    let store = new_data_store(config).unwrap();
    assert!(!store.capabilities().can_write);
}

#[test]
fn test_duplicate_registration() {
    let registry = DataStoreRegistry::new();
    register_data_stores(&registry).unwrap();
    assert!(register_data_stores(&registry).is_err());

    registry.register_factory(Box::new(FixedFactory)).unwrap();
    assert_eq!(registry.list_store_types(), vec!["Filesystem", "Fixed", "HTTP"]);
}

#[test]
fn test_describe() {
    let infos = DataStoreRegistry::builtin().describe();
    let http = infos.iter().find(|i| i.store_type == "HTTP").unwrap();
    let base_url = http.params.iter().find(|p| p.name == "base_url").unwrap();
    assert!(base_url.required);
    let headers = http.params.iter().find(|p| p.name == "header_").unwrap();
    assert!(headers.prefix);

    let json = serde_json::to_value(&infos).unwrap();
    assert_eq!(json[0]["store_type"], "Filesystem");
}

#[tokio::test]
async fn test_derived_operations() {
    let cancel = CancellationToken::new();
    let store = fixed_store(&[
        ("content-length", "42"),
        ("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
    ]);

    assert_eq!(store.size(&cancel, "present").await.unwrap(), 42);
    let modified = store.get_file_last_modified(&cancel, "present").await.unwrap();
    assert_eq!(modified.to_rfc3339(), "2015-10-21T07:28:00+00:00");
    assert!(store.exists(&cancel, "present").await.unwrap());
    assert!(!store.exists(&cancel, "absent").await.unwrap());
    assert!(store.size(&cancel, "absent").await.err().expect("operation should fail").is_not_found());
}

#[tokio::test]
async fn test_missing_attributes_are_metadata_incomplete() {
    let cancel = CancellationToken::new();
    let store = fixed_store(&[]);

    let err = store.size(&cancel, "present").await.err().expect("operation should fail");
    assert_eq!(err.kind(), ErrorKind::MetadataIncomplete);
    assert!(err.to_string().contains("content-length"));

    let err = store.get_file_last_modified(&cancel, "present").await.err().expect("operation should fail");
    assert_eq!(err.kind(), ErrorKind::MetadataIncomplete);
}

#[tokio::test]
async fn test_malformed_attributes_are_backend_errors() {
    let cancel = CancellationToken::new();
    let store = fixed_store(&[("content-length", "lots"), ("last-modified", "yesterday")]);

    let err = store.size(&cancel, "present").await.err().expect("operation should fail");
    assert!(matches!(err, DataStoreError::MalformedMetadata { .. }));
    assert_eq!(err.kind(), ErrorKind::Backend);

    let err = store.get_file_last_modified(&cancel, "present").await.err().expect("operation should fail");
    assert!(matches!(err, DataStoreError::MalformedMetadata { .. }));
}
