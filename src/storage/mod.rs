use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::error::{DataStoreError, Result};
use crate::utils::parse_http_date;

/// File attributes keyed by lower-case name / 文件元数据
pub type FileMetadata = HashMap<String, String>;

/// Readable byte stream returned by `get_file`; closing means dropping it / 文件读取流
pub type FileReader = Box<dyn AsyncRead + Unpin + Send>;

/// Byte source consumed by `put_file` / 写入数据源
pub type ByteSource = Box<dyn AsyncRead + Unpin + Send>;

pub const CONTENT_LENGTH: &str = "content-length";
pub const LAST_MODIFIED: &str = "last-modified";
pub const CONTENT_TYPE: &str = "content-type";

/// Configuration item definition / 配置项定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigItem {
    pub name: String,
    /// Display title (friendly name) / 显示标题
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub required: bool,
    /// Key is a prefix, e.g. `header_` / 键为前缀
    #[serde(default)]
    pub prefix: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl ConfigItem {
    pub fn new(name: &str, item_type: &str) -> Self {
        Self {
            name: name.to_string(),
            title: None,
            item_type: item_type.to_string(),
            default: None,
            required: false,
            prefix: false,
            help: None,
        }
    }

    pub fn title(mut self, val: &str) -> Self {
        self.title = Some(val.to_string());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn prefix(mut self) -> Self {
        self.prefix = true;
        self
    }

    pub fn default(mut self, val: &str) -> Self {
        self.default = Some(val.to_string());
        self
    }

    pub fn help(mut self, val: &str) -> Self {
        self.help = Some(val.to_string());
        self
    }
}

/// Complete backend information / 后端完整信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataStoreInfo {
    pub store_type: String,
    pub params: Vec<ConfigItem>,
}

/// Backend capability declaration / 后端能力声明
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Support put_file / 支持写入
    pub can_write: bool,
    /// Support atomic put_file_if_not_exists / 支持原子条件写入
    pub can_conditional_write: bool,
    /// Support list_file_paths / 支持列举
    pub can_list: bool,
    /// Metadata can be read without transferring the body / 支持仅元数据探测
    pub can_metadata_probe: bool,
}

/// Options for `list_file_paths` / 列举选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFileOptions {
    /// Only paths starting with this prefix / 路径前缀
    #[serde(default)]
    pub prefix: String,
    /// Only paths sorting strictly after this one / 起始位置（不含）
    #[serde(default)]
    pub start_after: Option<String>,
    /// Maximum number of paths, 0 means unlimited / 最大数量
    #[serde(default)]
    pub limit: usize,
}

impl ListFileOptions {
    pub fn with_prefix(prefix: &str, limit: usize) -> Self {
        Self {
            prefix: prefix.to_string(),
            start_after: None,
            limit,
        }
    }

    /// Apply prefix, start_after and limit to an already sorted list.
    pub fn apply(&self, sorted: impl IntoIterator<Item = String>) -> Vec<String> {
        let iter = sorted
            .into_iter()
            .filter(|p| p.starts_with(&self.prefix))
            .filter(|p| self.start_after.as_deref().map_or(true, |after| p.as_str() > after));
        if self.limit == 0 {
            iter.collect()
        } else {
            iter.take(self.limit).collect()
        }
    }
}

/// DataStore interface, implemented once per storage technology / 数据存储接口
///
/// Every operation takes the caller's cancellation token; when it fires the
/// operation aborts its I/O and returns [`DataStoreError::Cancelled`].
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Backend type name / 后端类型名称
    fn store_type(&self) -> &str;

    /// Backend capabilities / 后端能力
    fn capabilities(&self) -> Capability;

    /// Open the file for reading / 打开文件读取流
    async fn get_file(&self, cancel: &CancellationToken, path: &str) -> Result<FileReader>;

    /// File attributes, probing metadata only where the backend can / 获取文件元数据
    async fn get_file_metadata(&self, cancel: &CancellationToken, path: &str) -> Result<FileMetadata>;

    /// Last modification time, derived from `last-modified` by default / 最后修改时间
    async fn get_file_last_modified(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<DateTime<Utc>> {
        let metadata = self.get_file_metadata(cancel, path).await?;
        let value = metadata
            .get(LAST_MODIFIED)
            .ok_or_else(|| DataStoreError::MetadataIncomplete {
                path: path.to_string(),
                attribute: LAST_MODIFIED,
            })?;
        parse_http_date(value).ok_or_else(|| DataStoreError::MalformedMetadata {
            path: path.to_string(),
            attribute: LAST_MODIFIED,
            value: value.clone(),
        })
    }

    /// Whether the file exists; absence is `Ok(false)`, never an error / 文件是否存在
    async fn exists(&self, cancel: &CancellationToken, path: &str) -> Result<bool> {
        match self.get_file_metadata(cancel, path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// File size in bytes, derived from `content-length` by default / 文件大小
    async fn size(&self, cancel: &CancellationToken, path: &str) -> Result<u64> {
        let metadata = self.get_file_metadata(cancel, path).await?;
        let value = metadata
            .get(CONTENT_LENGTH)
            .ok_or_else(|| DataStoreError::MetadataIncomplete {
                path: path.to_string(),
                attribute: CONTENT_LENGTH,
            })?;
        value
            .trim()
            .parse::<u64>()
            .map_err(|_| DataStoreError::MalformedMetadata {
                path: path.to_string(),
                attribute: CONTENT_LENGTH,
                value: value.clone(),
            })
    }

    /// Write the file, replacing any existing one / 写入文件
    async fn put_file(
        &self,
        cancel: &CancellationToken,
        path: &str,
        data: ByteSource,
        metadata: FileMetadata,
    ) -> Result<()>;

    /// Atomically write the file only if nothing exists at `path`.
    /// Returns `false` when an object was already there / 原子条件写入
    async fn put_file_if_not_exists(
        &self,
        cancel: &CancellationToken,
        path: &str,
        data: ByteSource,
        metadata: FileMetadata,
    ) -> Result<bool>;

    /// List file paths / 列举文件路径
    async fn list_file_paths(
        &self,
        cancel: &CancellationToken,
        options: ListFileOptions,
    ) -> Result<Vec<String>>;

    /// Release held resources; safe to call more than once / 释放资源
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub mod manager;
pub mod local_factory;

pub use manager::{DataStoreRegistry, DataStoreFactory, DataStoreBox, new_data_store};
pub use local_factory::LocalDataStoreFactory;
