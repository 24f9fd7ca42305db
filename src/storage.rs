use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::ErrorKind;

/// Flat storage directory that receives uploaded files.
#[derive(Clone, Debug)]
pub struct MediaRoot {
    root: PathBuf,
}

/// On-disk state of an upload target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileState {
    Absent,
    Present(u64),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl MediaRoot {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// 媒体目录存在且为目录。
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.root)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
    }

    /// Joins a sanitized file name onto the root. The name must already be a
    /// single path component, see [`sanitize_file_name`].
    pub fn target(&self, file_name: &str) -> Result<PathBuf, StorageError> {
        match sanitize_file_name(file_name) {
            Some(name) if name == file_name => Ok(self.root.join(name)),
            _ => Err(StorageError::InvalidPath),
        }
    }

    /// 检查目标文件状态；符号链接与目录一律拒绝。
    pub async fn file_state(&self, target: &Path) -> Result<FileState, StorageError> {
        match fs::symlink_metadata(target).await {
            Ok(metadata) => {
                if metadata.file_type().is_symlink() || metadata.is_dir() {
                    return Err(StorageError::InvalidPath);
                }
                Ok(FileState::Present(metadata.len()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(FileState::Absent),
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}

/// Reduces a client supplied name to its last normal component.
///
/// Both `/` and `\` count as separators so that names produced on Windows
/// clients cannot smuggle directories either. Returns `None` when nothing
/// usable is left (`""`, `".."`, `"a/.."`).
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let last = raw
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .last()?;
    if last == ".." || last.contains('\0') {
        return None;
    }
    Some(last.to_string())
}
