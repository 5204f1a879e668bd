use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{DataStoreError, Result};
use crate::storage::{
    ByteSource, Capability, DataStore, FileMetadata, FileReader, ListFileOptions,
    CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED,
};
use crate::utils::{format_http_date, run_cancellable, CancellableReader};

pub const STORE_TYPE: &str = "Filesystem";

/// Caller metadata lives here, mirroring the file tree / 元数据目录
const META_DIR: &str = ".datastore-meta";
/// In-flight uploads; never listed / 上传临时文件前缀
const UPLOAD_PREFIX: &str = ".datastore-upload-";

pub struct LocalDataStore {
    root: PathBuf,
}

fn join_error(path: &str, e: tokio::task::JoinError) -> DataStoreError {
    DataStoreError::Io {
        path: path.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e),
    }
}

fn outside_root(path: &str) -> DataStoreError {
    DataStoreError::InvalidPath {
        path: path.to_string(),
        reason: "resolves outside root directory".to_string(),
    }
}

/// Whether `dir`, or its nearest existing ancestor, resolves inside `root`.
/// Symlinks are followed, so a link pointing elsewhere counts as outside.
fn resolves_within(root: &Path, dir: &Path) -> std::io::Result<bool> {
    let mut current = dir;
    loop {
        match std::fs::canonicalize(current) {
            Ok(resolved) => return Ok(resolved.starts_with(root)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => match current.parent() {
                Some(parent) => current = parent,
                None => return Ok(false),
            },
            Err(e) => return Err(e),
        }
    }
}

/// Sidecar content written next to the staged file, published together with it.
struct StagedSidecar {
    target: PathBuf,
    /// `None` clears any sidecar left by an earlier write.
    temp: Option<NamedTempFile>,
}

impl StagedSidecar {
    /// Move the sidecar into place. On failure any sidecar from an earlier
    /// write is removed, so it never describes content it did not come with.
    fn publish(self) -> std::io::Result<()> {
        let StagedSidecar { target, temp } = self;
        let published = match temp {
            Some(temp) => temp.persist(&target).map(|_| ()).map_err(|e| e.error),
            None if target.exists() => std::fs::remove_file(&target),
            None => Ok(()),
        };
        if published.is_err() {
            if let Err(e) = std::fs::remove_file(&target) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove stale metadata {:?}: {}", target, e);
                }
            }
        }
        published
    }
}

/// How a staged write is published / 提交方式
#[derive(Clone, Copy, PartialEq, Eq)]
enum Commit {
    Replace,
    CreateNew,
}

impl LocalDataStore {
    /// `root` must already exist and be canonical (the factory takes care of it).
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get root directory / 获取根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Split a relative path into components, rejecting anything that would
    /// leave the root or touch the metadata directory / 规范化路径
    fn components<'a>(&self, path: &'a str) -> Result<Vec<&'a str>> {
        let normalized: Vec<&str> = path
            .split(['/', '\\'])
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();

        let invalid = |reason: &str| DataStoreError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        if normalized.is_empty() {
            return Err(invalid("empty path"));
        }
        if normalized.iter().any(|c| *c == "..") {
            return Err(invalid("access path exceeds root directory scope"));
        }
        if normalized[0] == META_DIR {
            return Err(invalid("reserved metadata directory"));
        }
        Ok(normalized)
    }

    fn normalize_path(&self, path: &str) -> Result<PathBuf> {
        Ok(self.root.join(self.components(path)?.join("/")))
    }

    fn sidecar_path(&self, path: &str) -> Result<PathBuf> {
        let rel = self.components(path)?.join("/");
        Ok(self.root.join(META_DIR).join(format!("{}.json", rel)))
    }

    /// Resolve an existing entry, following symlinks only while they stay
    /// under the root / 解析实际路径
    async fn resolve(&self, path: &str, full_path: &Path) -> Result<PathBuf> {
        let resolved = tokio::fs::canonicalize(full_path)
            .await
            .map_err(|e| DataStoreError::io(path, e))?;
        if !resolved.starts_with(&self.root) {
            return Err(outside_root(path));
        }
        Ok(resolved)
    }

    /// Regular-file metadata of `path`; directories count as absent.
    async fn file_metadata(&self, path: &str, full_path: &Path) -> Result<std::fs::Metadata> {
        let resolved = self.resolve(path, full_path).await?;
        let fs_meta = tokio::fs::metadata(&resolved)
            .await
            .map_err(|e| DataStoreError::io(path, e))?;
        if !fs_meta.is_file() {
            return Err(DataStoreError::not_found(path));
        }
        Ok(fs_meta)
    }

    async fn read_sidecar(&self, path: &str) -> Result<FileMetadata> {
        let sidecar = self.sidecar_path(path)?;
        match tokio::fs::read(&sidecar).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| DataStoreError::Io {
                path: path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileMetadata::new()),
            Err(e) => Err(DataStoreError::Io { path: path.to_string(), source: e }),
        }
    }

    /// Serialize caller metadata into a temp file under the metadata
    /// directory; nothing is visible until the write is committed.
    async fn stage_sidecar(&self, path: &str, metadata: FileMetadata) -> Result<StagedSidecar> {
        let target = self.sidecar_path(path)?;
        if metadata.is_empty() {
            return Ok(StagedSidecar { target, temp: None });
        }

        let lowered: FileMetadata = metadata
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        let bytes = serde_json::to_vec(&lowered).map_err(|e| DataStoreError::Io {
            path: path.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        tokio::task::spawn_blocking(move || -> std::io::Result<StagedSidecar> {
            let dir = target.parent().unwrap_or(Path::new(".")).to_path_buf();
            std::fs::create_dir_all(&dir)?;
            let mut temp = tempfile::Builder::new().prefix(UPLOAD_PREFIX).tempfile_in(&dir)?;
            temp.write_all(&bytes)?;
            temp.as_file().sync_all()?;
            Ok(StagedSidecar { target, temp: Some(temp) })
        })
        .await
        .map_err(|e| join_error(path, e))?
        .map_err(|e| DataStoreError::Io { path: path.to_string(), source: e })
    }

    /// Stream `data` into a temp file next to the target and fsync it, so the
    /// final rename publishes complete content only.
    async fn write_temp(&self, path: &str, full_path: &Path, mut data: ByteSource) -> Result<NamedTempFile> {
        let parent = full_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        let root = self.root.clone();
        let owned_path = path.to_string();

        let (temp, std_file) = tokio::task::spawn_blocking(move || -> Result<(NamedTempFile, std::fs::File)> {
            let io_err = |e: std::io::Error| DataStoreError::Io { path: owned_path.clone(), source: e };
            // Checked before and after creation: a symlinked directory must
            // not lead the write out of the root
            if !resolves_within(&root, &parent).map_err(io_err)? {
                return Err(outside_root(&owned_path));
            }
            std::fs::create_dir_all(&parent).map_err(io_err)?;
            if !resolves_within(&root, &parent).map_err(io_err)? {
                return Err(outside_root(&owned_path));
            }
            let temp = tempfile::Builder::new()
                .prefix(UPLOAD_PREFIX)
                .tempfile_in(&parent)
                .map_err(io_err)?;
            let file = temp.reopen().map_err(io_err)?;
            Ok((temp, file))
        })
        .await
        .map_err(|e| join_error(path, e))??;

        let mut file = tokio::fs::File::from_std(std_file);
        let written = tokio::io::copy(&mut data, &mut file)
            .await
            .map_err(|e| DataStoreError::io(path, e))?;
        file.flush().await.map_err(|e| DataStoreError::io(path, e))?;
        file.sync_all().await.map_err(|e| DataStoreError::io(path, e))?;

        tracing::debug!("Staged {} bytes for '{}'", written, path);
        Ok(temp)
    }

    /// Stage content and metadata, then publish both.
    ///
    /// The token is honored up to the commit point only. Publishing runs as a
    /// single blocking task that always finishes, so a write either lands
    /// with its metadata or leaves nothing behind.
    async fn write(
        &self,
        cancel: &CancellationToken,
        path: &str,
        data: ByteSource,
        metadata: FileMetadata,
        mode: Commit,
    ) -> Result<bool> {
        let full_path = self.normalize_path(path)?;
        let (temp, sidecar) = run_cancellable(cancel, path, async {
            let temp = self.write_temp(path, &full_path, data).await?;
            let sidecar = self.stage_sidecar(path, metadata).await?;
            Ok((temp, sidecar))
        })
        .await?;
        if cancel.is_cancelled() {
            return Err(DataStoreError::Cancelled { path: path.to_string() });
        }

        let owned_path = path.to_string();
        tokio::task::spawn_blocking(move || commit(&owned_path, temp, &full_path, sidecar, mode))
            .await
            .map_err(|e| join_error(path, e))?
    }

    async fn list_all(&self, label: &str) -> Result<Vec<String>> {
        let root = self.root.clone();
        let mut paths = tokio::task::spawn_blocking(move || walk_files(&root))
            .await
            .map_err(|e| join_error(label, e))?
            .map_err(|e| DataStoreError::Io { path: label.to_string(), source: e })?;
        paths.sort();
        Ok(paths)
    }
}

/// Publish a staged write. Returns `false` when `CreateNew` finds an
/// existing object; the staged files are then dropped and removed.
fn commit(
    path: &str,
    temp: NamedTempFile,
    target: &Path,
    sidecar: StagedSidecar,
    mode: Commit,
) -> Result<bool> {
    let persisted = match mode {
        Commit::Replace => temp.persist(target),
        // persist_noclobber is an atomic link/rename that refuses to replace
        Commit::CreateNew => temp.persist_noclobber(target),
    };
    match persisted {
        Ok(_) => {}
        Err(e) if mode == Commit::CreateNew && e.error.kind() == std::io::ErrorKind::AlreadyExists => {
            tracing::debug!("File already exists, not written: {}", path);
            return Ok(false);
        }
        Err(e) => return Err(DataStoreError::Io { path: path.to_string(), source: e.error }),
    }

    if let Err(e) = sidecar.publish() {
        // A created object is removed again so a retry starts clean
        if mode == Commit::CreateNew {
            if let Err(remove_err) = std::fs::remove_file(target) {
                tracing::warn!("Failed to roll back '{}': {}", path, remove_err);
            }
        }
        return Err(DataStoreError::Io { path: path.to_string(), source: e });
    }

    tracing::debug!("File written: {}", path);
    Ok(true)
}

/// Every regular file under `root` as a `/`-separated relative path.
///
/// Symlinks to files are listed when their target stays under the root;
/// symlinked directories are never descended into.
fn walk_files(root: &Path) -> std::io::Result<Vec<String>> {
    let mut result = Vec::new();
    let mut pending = vec![(root.to_path_buf(), String::new())];

    while let Some((dir, rel)) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            // Removed while walking
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !rel.is_empty() => continue,
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(UPLOAD_PREFIX) || (rel.is_empty() && name == META_DIR) {
                continue;
            }
            let child_rel = if rel.is_empty() { name } else { format!("{}/{}", rel, name) };

            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if file_type.is_dir() {
                pending.push((entry.path(), child_rel));
            } else if file_type.is_file() {
                result.push(child_rel);
            } else if file_type.is_symlink() && symlinked_file_within(root, &entry.path()) {
                result.push(child_rel);
            }
        }
    }

    Ok(result)
}

fn symlinked_file_within(root: &Path, link: &Path) -> bool {
    match std::fs::canonicalize(link) {
        Ok(target) => target.starts_with(root) && target.is_file(),
        // Dangling or looping links are skipped
        Err(_) => false,
    }
}

#[async_trait]
impl DataStore for LocalDataStore {
    fn store_type(&self) -> &str {
        STORE_TYPE
    }

    fn capabilities(&self) -> Capability {
        Capability {
            can_write: true,
            can_conditional_write: true,
            can_list: true,
            can_metadata_probe: true,
        }
    }

    async fn get_file(&self, cancel: &CancellationToken, path: &str) -> Result<FileReader> {
        let full_path = self.normalize_path(path)?;
        run_cancellable(cancel, path, async {
            let resolved = self.resolve(path, &full_path).await?;
            let file = tokio::fs::File::open(&resolved)
                .await
                .map_err(|e| DataStoreError::io(path, e))?;
            let metadata = file.metadata().await.map_err(|e| DataStoreError::io(path, e))?;
            if !metadata.is_file() {
                return Err(DataStoreError::not_found(path));
            }
            tracing::debug!("File opened: {}", path);
            Ok(Box::new(CancellableReader::new(file, cancel.clone())) as FileReader)
        })
        .await
    }

    async fn get_file_metadata(&self, cancel: &CancellationToken, path: &str) -> Result<FileMetadata> {
        let full_path = self.normalize_path(path)?;
        run_cancellable(cancel, path, async {
            let fs_meta = self.file_metadata(path, &full_path).await?;

            let mut metadata = FileMetadata::new();
            metadata.insert(CONTENT_LENGTH.to_string(), fs_meta.len().to_string());
            if let Ok(modified) = fs_meta.modified() {
                metadata.insert(LAST_MODIFIED.to_string(), format_http_date(DateTime::<Utc>::from(modified)));
            }
            let mime = mime_guess::from_path(&full_path).first_or_octet_stream();
            metadata.insert(CONTENT_TYPE.to_string(), mime.essence_str().to_string());

            for (key, value) in self.read_sidecar(path).await? {
                metadata.entry(key.to_ascii_lowercase()).or_insert(value);
            }
            Ok(metadata)
        })
        .await
    }

    async fn get_file_last_modified(&self, cancel: &CancellationToken, path: &str) -> Result<DateTime<Utc>> {
        let full_path = self.normalize_path(path)?;
        run_cancellable(cancel, path, async {
            let fs_meta = self.file_metadata(path, &full_path).await?;
            let modified = fs_meta.modified().map_err(|_| DataStoreError::MetadataIncomplete {
                path: path.to_string(),
                attribute: LAST_MODIFIED,
            })?;
            Ok(DateTime::<Utc>::from(modified))
        })
        .await
    }

    async fn exists(&self, cancel: &CancellationToken, path: &str) -> Result<bool> {
        let full_path = self.normalize_path(path)?;
        run_cancellable(cancel, path, async {
            match self.file_metadata(path, &full_path).await {
                Ok(_) => Ok(true),
                Err(e) if e.is_not_found() => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn size(&self, cancel: &CancellationToken, path: &str) -> Result<u64> {
        let full_path = self.normalize_path(path)?;
        run_cancellable(cancel, path, async {
            Ok(self.file_metadata(path, &full_path).await?.len())
        })
        .await
    }

    async fn put_file(
        &self,
        cancel: &CancellationToken,
        path: &str,
        data: ByteSource,
        metadata: FileMetadata,
    ) -> Result<()> {
        self.write(cancel, path, data, metadata, Commit::Replace).await?;
        Ok(())
    }

    async fn put_file_if_not_exists(
        &self,
        cancel: &CancellationToken,
        path: &str,
        data: ByteSource,
        metadata: FileMetadata,
    ) -> Result<bool> {
        self.write(cancel, path, data, metadata, Commit::CreateNew).await
    }

    async fn list_file_paths(
        &self,
        cancel: &CancellationToken,
        options: ListFileOptions,
    ) -> Result<Vec<String>> {
        let label = options.prefix.clone();
        run_cancellable(cancel, &label, async {
            let all = self.list_all(&label).await?;
            Ok(options.apply(all))
        })
        .await
    }
}
