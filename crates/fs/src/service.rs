//! The filesystem service proper.
//!
//! All host I/O is blocking `std::fs` work dispatched through
//! `tokio::task::spawn_blocking`; the async surface stays cancel-safe and
//! the blocking side re-checks the cancellation token between batch
//! iterations.

use std::cmp::Ordering;
use std::fs::{self, Metadata, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::task;
use tokio_util::sync::CancellationToken;

use crate::error::FsError;
use crate::path::{is_filesystem_root, resolve_absolute};

const DEFAULT_MAX_READ_FILE_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_MAX_WRITE_FILE_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_MAX_LIST_ENTRIES: usize = 2_000;
const DEFAULT_MAX_WORKSPACE_OPEN_PATHS: usize = 128;
const DIR_READ_BATCH_SIZE: usize = 256;

const ATOMIC_WRITE_PREFIX: &str = ".omt-write-";

/// Operation quotas. Zero values fall back to the defaults at service
/// construction.
#[derive(Debug, Clone, Copy)]
pub struct FsConfig {
    pub max_read_file_bytes: u64,
    pub max_write_file_bytes: u64,
    pub max_list_entries: usize,
    pub max_workspace_open_paths: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            max_read_file_bytes: DEFAULT_MAX_READ_FILE_BYTES,
            max_write_file_bytes: DEFAULT_MAX_WRITE_FILE_BYTES,
            max_list_entries: DEFAULT_MAX_LIST_ENTRIES,
            max_workspace_open_paths: DEFAULT_MAX_WORKSPACE_OPEN_PATHS,
        }
    }
}

/// Result of a stat-shaped operation. A missing path is a valid result, not
/// an error: `exists` is false and the remaining fields are zeroed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatResult {
    pub path: PathBuf,
    pub exists: bool,
    pub size: u64,
    pub is_dir: bool,
    pub modified: Option<SystemTime>,
}

impl StatResult {
    fn from_metadata(path: &Path, meta: &Metadata) -> Self {
        Self {
            path: path.to_path_buf(),
            exists: true,
            size: meta.len(),
            is_dir: meta.is_dir(),
            modified: meta.modified().ok(),
        }
    }

    fn missing(path: PathBuf) -> Self {
        Self {
            path,
            exists: false,
            size: 0,
            is_dir: false,
            modified: None,
        }
    }
}

/// One child of a listed directory. `size` is always 0: enumerating a
/// directory does not stat its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub path: PathBuf,
    pub size: u64,
    pub content: String,
}

/// Stateless filesystem façade. Cheap to share behind an `Arc`; concurrent
/// operations rely on the OS filesystem for atomicity.
pub struct FsService {
    cfg: FsConfig,
}

impl FsService {
    pub fn new(cfg: FsConfig) -> Self {
        let defaults = FsConfig::default();
        let cfg = FsConfig {
            max_read_file_bytes: non_zero_or(cfg.max_read_file_bytes, defaults.max_read_file_bytes),
            max_write_file_bytes: non_zero_or(cfg.max_write_file_bytes, defaults.max_write_file_bytes),
            max_list_entries: if cfg.max_list_entries == 0 {
                defaults.max_list_entries
            } else {
                cfg.max_list_entries
            },
            max_workspace_open_paths: if cfg.max_workspace_open_paths == 0 {
                defaults.max_workspace_open_paths
            } else {
                cfg.max_workspace_open_paths
            },
        };
        Self { cfg }
    }

    pub fn config(&self) -> &FsConfig {
        &self.cfg
    }

    /// Stat a path. Nonexistence yields `exists: false` rather than an error.
    pub async fn stat(&self, cancel: &CancellationToken, raw_path: &str) -> Result<StatResult, FsError> {
        check_cancelled(cancel)?;
        let abs = resolve_absolute(raw_path)?;
        run_blocking(move || stat_path(abs)).await
    }

    /// List an existing directory, sorted directories-first then by
    /// lowercased name. Entries beyond the quota are silently dropped.
    pub async fn list(&self, cancel: &CancellationToken, raw_path: &str) -> Result<Vec<ListEntry>, FsError> {
        check_cancelled(cancel)?;
        let abs = resolve_absolute(raw_path)?;
        let max_entries = self.cfg.max_list_entries;
        let cancel = cancel.clone();

        run_blocking(move || {
            match fs::metadata(&abs) {
                Ok(meta) if !meta.is_dir() => return Err(FsError::PathNotDirectory),
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(FsError::PathNotFound),
                Err(err) => return Err(err.into()),
            }

            let mut out = Vec::with_capacity(max_entries.min(DIR_READ_BATCH_SIZE));
            for entry in fs::read_dir(&abs)? {
                if out.len() == max_entries {
                    break;
                }
                if out.len() % DIR_READ_BATCH_SIZE == 0 {
                    check_cancelled(&cancel)?;
                }

                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                out.push(ListEntry {
                    path: abs.join(entry.file_name()),
                    is_dir: entry.file_type()?.is_dir(),
                    size: 0,
                    name,
                });
            }

            out.sort_by(|a, b| match (a.is_dir, b.is_dir) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            });

            Ok(out)
        })
        .await
    }

    /// Read a regular text file, bounded by the read quota. NUL bytes and
    /// invalid UTF-8 are refused as binary content.
    pub async fn read_text(&self, cancel: &CancellationToken, raw_path: &str) -> Result<ReadResult, FsError> {
        check_cancelled(cancel)?;
        let abs = resolve_absolute(raw_path)?;
        let max_bytes = self.cfg.max_read_file_bytes;

        run_blocking(move || {
            let meta = match fs::metadata(&abs) {
                Ok(meta) => meta,
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(FsError::PathNotFound),
                Err(err) => return Err(err.into()),
            };
            if meta.is_dir() {
                return Err(FsError::PathIsDirectory);
            }
            if !meta.is_file() {
                return Err(FsError::UnsupportedFileType);
            }
            if meta.len() > max_bytes {
                return Err(FsError::FileTooLarge);
            }

            // Bounded read of one byte past the quota catches files grown
            // between the stat above and the read.
            let file = fs::File::open(&abs)?;
            let mut content = Vec::with_capacity(meta.len() as usize);
            file.take(max_bytes + 1).read_to_end(&mut content)?;
            if content.len() as u64 > max_bytes {
                return Err(FsError::FileTooLarge);
            }
            if content.contains(&0x00) {
                return Err(FsError::BinaryFile);
            }

            let content = String::from_utf8(content).map_err(|_| FsError::BinaryFile)?;
            Ok(ReadResult {
                size: content.len() as u64,
                path: abs,
                content,
            })
        })
        .await
    }

    /// Atomically replace (or create) a regular file with `content`.
    ///
    /// The target either keeps its old contents or carries the full new
    /// contents; no partial-write window is observable. Symlinked or
    /// otherwise non-regular existing targets are refused.
    pub async fn write_text(
        &self,
        cancel: &CancellationToken,
        raw_path: &str,
        content: String,
    ) -> Result<StatResult, FsError> {
        check_cancelled(cancel)?;
        if content.len() as u64 > self.cfg.max_write_file_bytes {
            return Err(FsError::ContentTooLarge);
        }

        let abs = resolve_absolute(raw_path)?;
        if is_filesystem_root(&abs) {
            return Err(FsError::RefuseFilesystemRoot);
        }

        run_blocking(move || {
            match fs::symlink_metadata(&abs) {
                Ok(existing) => {
                    let file_type = existing.file_type();
                    if file_type.is_symlink() {
                        return Err(FsError::UnsupportedFileType);
                    }
                    if file_type.is_dir() {
                        return Err(FsError::PathIsDirectory);
                    }
                    if !file_type.is_file() {
                        return Err(FsError::UnsupportedFileType);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }

            let parent = abs.parent().ok_or(FsError::InvalidPath)?;
            fs::create_dir_all(parent)?;
            write_file_atomic(&abs, content.as_bytes())?;

            let meta = fs::metadata(&abs)?;
            Ok(StatResult::from_metadata(&abs, &meta))
        })
        .await
    }

    /// Create a directory (recursively, idempotent) or an empty file
    /// (exclusive: an existing file is a conflict).
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        raw_path: &str,
        is_dir: bool,
    ) -> Result<StatResult, FsError> {
        check_cancelled(cancel)?;
        let abs = resolve_absolute(raw_path)?;
        if is_filesystem_root(&abs) {
            return Err(FsError::RefuseFilesystemRoot);
        }

        run_blocking(move || {
            if is_dir {
                fs::create_dir_all(&abs)?;
            } else {
                if let Some(parent) = abs.parent() {
                    fs::create_dir_all(parent)?;
                }
                match OpenOptions::new().write(true).create_new(true).open(&abs) {
                    Ok(_) => {}
                    Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                        return Err(FsError::FileAlreadyExists);
                    }
                    Err(err) => return Err(err.into()),
                }
            }

            let meta = fs::metadata(&abs)?;
            Ok(StatResult::from_metadata(&abs, &meta))
        })
        .await
    }

    /// Delete a file, symlink, or (with `recursive`) a directory subtree.
    /// The existence check does not dereference symlinks.
    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        raw_path: &str,
        recursive: bool,
    ) -> Result<(), FsError> {
        check_cancelled(cancel)?;
        let abs = resolve_absolute(raw_path)?;
        if is_filesystem_root(&abs) {
            return Err(FsError::RefuseFilesystemRoot);
        }

        run_blocking(move || {
            let meta = match fs::symlink_metadata(&abs) {
                Ok(meta) => meta,
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(FsError::PathNotFound),
                Err(err) => return Err(err.into()),
            };

            if meta.file_type().is_dir() {
                if !recursive {
                    return Err(FsError::DirectoryNeedsRecursive);
                }
                fs::remove_dir_all(&abs)?;
            } else {
                fs::remove_file(&abs)?;
            }
            Ok(())
        })
        .await
    }

    /// Stat a batch of paths for workspace restore. Per-entry failures are
    /// not fatal and produce `exists: false` placeholders; only the count
    /// caps and cancellation abort the batch. Output order mirrors input.
    pub async fn workspace_open(
        &self,
        cancel: &CancellationToken,
        paths: Vec<String>,
    ) -> Result<Vec<StatResult>, FsError> {
        check_cancelled(cancel)?;
        if paths.is_empty() {
            return Err(FsError::NoWorkspacePaths);
        }
        if paths.len() > self.cfg.max_workspace_open_paths {
            return Err(FsError::TooManyWorkspacePaths);
        }

        let cancel = cancel.clone();
        run_blocking(move || {
            let mut out = Vec::with_capacity(paths.len());
            for raw in paths {
                check_cancelled(&cancel)?;

                let abs = match resolve_absolute(&raw) {
                    Ok(abs) => abs,
                    Err(_) => {
                        out.push(StatResult::missing(PathBuf::from(raw)));
                        continue;
                    }
                };
                match fs::metadata(&abs) {
                    Ok(meta) => out.push(StatResult::from_metadata(&abs, &meta)),
                    Err(_) => out.push(StatResult::missing(abs)),
                }
            }
            Ok(out)
        })
        .await
    }
}

fn non_zero_or(value: u64, fallback: u64) -> u64 {
    if value == 0 { fallback } else { value }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), FsError> {
    if cancel.is_cancelled() {
        return Err(FsError::Canceled);
    }
    Ok(())
}

async fn run_blocking<T, F>(job: F) -> Result<T, FsError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, FsError> + Send + 'static,
{
    match task::spawn_blocking(job).await {
        Ok(result) => result,
        Err(join_err) => Err(FsError::Io(io::Error::other(join_err))),
    }
}

fn stat_path(abs: PathBuf) -> Result<StatResult, FsError> {
    match fs::metadata(&abs) {
        Ok(meta) => Ok(StatResult::from_metadata(&abs, &meta)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(StatResult::missing(abs)),
        Err(err) => Err(err.into()),
    }
}

/// Temp file in the target's directory, fsync, chmod, rename. The temp file
/// is removed on any failure after creation (drop guard of `NamedTempFile`).
fn write_file_atomic(path: &Path, content: &[u8]) -> Result<(), FsError> {
    let parent = path.parent().ok_or(FsError::InvalidPath)?;
    let mut temp = tempfile::Builder::new()
        .prefix(ATOMIC_WRITE_PREFIX)
        .tempfile_in(parent)?;

    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file().set_permissions(fs::Permissions::from_mode(0o644))?;
    }
    temp.persist(path).map_err(|err| FsError::Io(err.error))?;
    Ok(())
}
