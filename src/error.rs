//! DataStore error vocabulary / 数据存储错误类型
//!
//! Every backend reports failures through [`DataStoreError`] so callers can
//! branch on [`ErrorKind`] without knowing which backend produced the error.

use thiserror::Error;

pub type Result<T, E = DataStoreError> = std::result::Result<T, E>;

/// Coarse classification callers branch on / 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed configuration / 配置错误
    Config,
    /// The addressed object does not exist / 文件不存在
    NotFound,
    /// The backend cannot perform this operation at all / 不支持的操作
    Unsupported,
    /// The backend never reported a required attribute / 元数据缺失
    MetadataIncomplete,
    /// Transport failure, unexpected status or malformed response / 后端错误
    Backend,
    /// The caller's cancellation token fired / 已取消
    Cancelled,
}

#[derive(Debug, Error)]
pub enum DataStoreError {
    #[error("invalid {store_type} config, {message}")]
    Config { store_type: String, message: String },

    #[error("unknown datastore type: {0}")]
    UnknownType(String),

    #[error("file not found: {path}")]
    NotFound { path: String },

    #[error("{store_type} datastore {reason}")]
    Unsupported {
        store_type: &'static str,
        operation: &'static str,
        reason: String,
    },

    #[error("{attribute} not found for {path}")]
    MetadataIncomplete {
        path: String,
        attribute: &'static str,
    },

    #[error("invalid {attribute} for {path}: {value}")]
    MalformedMetadata {
        path: String,
        attribute: &'static str,
        value: String,
    },

    #[error("HTTP error {status} for file {path}")]
    Status { path: String, status: u16 },

    #[error("request failed for {path}: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("io error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("operation cancelled for {path}")]
    Cancelled { path: String },
}

impl DataStoreError {
    pub fn config(store_type: &str, message: impl Into<String>) -> Self {
        Self::Config {
            store_type: store_type.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(path: &str) -> Self {
        Self::NotFound {
            path: path.to_string(),
        }
    }

    /// Map an io error, folding `NotFound` into the canonical not-found error.
    pub fn io(path: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::not_found(path);
        }
        Self::Io {
            path: path.to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::UnknownType(_) => ErrorKind::Config,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::MetadataIncomplete { .. } => ErrorKind::MetadataIncomplete,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::MalformedMetadata { .. }
            | Self::Status { .. }
            | Self::Transport { .. }
            | Self::Io { .. }
            | Self::InvalidPath { .. } => ErrorKind::Backend,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_unsupported(&self) -> bool {
        self.kind() == ErrorKind::Unsupported
    }

    /// File path the error refers to, if any / 相关文件路径
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotFound { path }
            | Self::MetadataIncomplete { path, .. }
            | Self::MalformedMetadata { path, .. }
            | Self::Status { path, .. }
            | Self::Transport { path, .. }
            | Self::Io { path, .. }
            | Self::InvalidPath { path, .. }
            | Self::Cancelled { path } => Some(path),
            Self::Config { .. } | Self::UnknownType(_) | Self::Unsupported { .. } => None,
        }
    }
}
