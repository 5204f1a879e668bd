//! HTTP 驱动实现
//!
//! Read-only access to files served over HTTP(S). Metadata comes from HEAD,
//! content from GET; both carry the configured extra headers.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::config::DataStoreConfig;
use crate::error::{DataStoreError, Result};
use crate::storage::{
    ByteSource, Capability, DataStore, FileMetadata, FileReader, ListFileOptions,
};
use crate::utils::{run_cancellable, CancellableReader};

pub const STORE_TYPE: &str = "HTTP";
pub const HEADER_PREFIX: &str = "header_";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP 驱动
#[derive(Debug)]
pub struct HttpDataStore {
    client: Client,
    base_url: String,
    timeout: Duration,
    headers: HeaderMap,
}

impl HttpDataStore {
    /// Validate `config` and build the client; performs no network I/O.
    ///
    /// Recognized params:
    /// - `base_url` (required): `http://` or `https://` address, a trailing
    ///   `/` is enforced
    /// - `timeout` (optional): duration string such as `"60s"`, default 30s,
    ///   `"0"` disables the timeout
    /// - `header_<Name>` (optional, repeatable): literal header `<Name>` sent
    ///   with every request
    pub fn new(config: &DataStoreConfig) -> Result<Self> {
        let raw_base = config
            .get("base_url")
            .ok_or_else(|| DataStoreError::config(STORE_TYPE, "no base_url"))?;
        let base_url = normalize_base_url(raw_base)?;

        let timeout = config.get_duration("timeout", DEFAULT_TIMEOUT)?;
        let headers = collect_headers(config)?;

        let mut builder = Client::builder();
        if !timeout.is_zero() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| DataStoreError::config(STORE_TYPE, format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, base_url, timeout, headers })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 构建完整URL
    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and classify the response status.
    ///
    /// Configured headers are inserted last so they override anything the
    /// builder would set, `Host` included.
    async fn send(&self, method: Method, path: &str) -> Result<Response> {
        let url = self.build_url(path);
        tracing::debug!("HTTP {}: {}", method, url);

        let mut request = self.client.request(method.clone(), &url).build().map_err(|e| {
            DataStoreError::Transport { path: path.to_string(), source: e }
        })?;
        for (name, value) in self.headers.iter() {
            request.headers_mut().insert(name.clone(), value.clone());
        }

        let response = self.client.execute(request).await.map_err(|e| {
            tracing::debug!("HTTP {} failed for '{}': {}", method, path, e);
            DataStoreError::Transport { path: path.to_string(), source: e }
        })?;

        check_status(response, path)
    }
}

fn check_status(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status == StatusCode::NOT_FOUND {
        Err(DataStoreError::not_found(path))
    } else {
        tracing::debug!("HTTP error {} for '{}'", status, path);
        Err(DataStoreError::Status { path: path.to_string(), status: status.as_u16() })
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| DataStoreError::config(STORE_TYPE, format!("invalid base_url: {}", e)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(DataStoreError::config(STORE_TYPE, "base_url must use http or https scheme"));
    }
    Ok(format!("{}/", raw.trim_end_matches('/')))
}

fn collect_headers(config: &DataStoreConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in config.with_prefix(HEADER_PREFIX) {
        let header_name = HeaderName::from_str(name).map_err(|_| {
            DataStoreError::config(STORE_TYPE, format!("invalid header name: {:?}", name))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            DataStoreError::config(STORE_TYPE, format!("invalid value for header {}", name))
        })?;
        // Names are case-insensitive, so `header_Accept` and `header_accept` collide
        if headers.contains_key(&header_name) {
            return Err(DataStoreError::config(
                STORE_TYPE,
                format!("duplicate header: {}", header_name.as_str()),
            ));
        }
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

/// Lower-cased header names, first value wins for repeated headers.
fn headers_to_metadata(headers: &HeaderMap) -> FileMetadata {
    let mut metadata = FileMetadata::new();
    for (name, value) in headers.iter() {
        metadata
            .entry(name.as_str().to_ascii_lowercase())
            .or_insert_with(|| String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    metadata
}

fn read_only(operation: &'static str) -> DataStoreError {
    DataStoreError::Unsupported {
        store_type: STORE_TYPE,
        operation,
        reason: format!("is read-only, {} not supported", operation),
    }
}

#[async_trait]
impl DataStore for HttpDataStore {
    fn store_type(&self) -> &str {
        STORE_TYPE
    }

    fn capabilities(&self) -> Capability {
        Capability {
            can_write: false,
            can_conditional_write: false,
            can_list: false,
            can_metadata_probe: true,
        }
    }

    async fn get_file(&self, cancel: &CancellationToken, path: &str) -> Result<FileReader> {
        let response = run_cancellable(cancel, path, self.send(Method::GET, path)).await?;
        tracing::debug!("File retrieved successfully: {}", path);

        // 流式返回响应体
        let stream = response
            .bytes_stream()
            .map(|result| result.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)));
        let reader = tokio_util::io::StreamReader::new(stream);

        Ok(Box::new(CancellableReader::new(reader, cancel.clone())))
    }

    async fn get_file_metadata(&self, cancel: &CancellationToken, path: &str) -> Result<FileMetadata> {
        let response = run_cancellable(cancel, path, self.send(Method::HEAD, path)).await?;
        Ok(headers_to_metadata(response.headers()))
    }

    async fn put_file(
        &self,
        _cancel: &CancellationToken,
        _path: &str,
        _data: ByteSource,
        _metadata: FileMetadata,
    ) -> Result<()> {
        Err(read_only("PutFile"))
    }

    async fn put_file_if_not_exists(
        &self,
        _cancel: &CancellationToken,
        _path: &str,
        _data: ByteSource,
        _metadata: FileMetadata,
    ) -> Result<bool> {
        Err(read_only("PutFileIfNotExists"))
    }

    async fn list_file_paths(
        &self,
        _cancel: &CancellationToken,
        _options: ListFileOptions,
    ) -> Result<Vec<String>> {
        Err(DataStoreError::Unsupported {
            store_type: STORE_TYPE,
            operation: "ListFilePaths",
            reason: "does not support listing files".to_string(),
        })
    }

    /// No persistent connection state is held, nothing to release.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
