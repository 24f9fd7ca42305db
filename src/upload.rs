//! 整文件上传处理：不存在则写入，大小一致视为已完成，大小不同则重写。
//!
//! 默认情况下"检查是否存在 → 写入 → 校验大小"不是原子操作，同名文件的
//! 并发上传可能交错，最终内容取决于最后落盘的写入。`--serialize-uploads`
//! 开启后按文件名串行化。

use axum::extract::Extension;
use axum::http::StatusCode;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::PROBE_FILE_NAME;
use crate::error::ApiError;
use crate::form::PhotoForm;
use crate::locking::LockManager;
use crate::storage::{FileState, MediaRoot, StorageError, sanitize_file_name};

#[derive(Debug)]
pub struct UploadConfig {
    pub max_body_bytes: usize,
    pub serialize_uploads: bool,
}

/// 上传成功时的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    Created,
    /// 旧的不完整文件被删除后重新写入。
    Replaced { previous_size: u64 },
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no file in the request!")]
    MissingFile,
    #[error("invalid file name!")]
    InvalidName,
    #[error("missing file size in the request!")]
    MissingSize,
    #[error("file already exists!")]
    AlreadyComplete,
    #[error("file sizes do not match! expected {expected}, wrote {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<UploadError> for ApiError {
    fn from(error: UploadError) -> Self {
        match error {
            UploadError::MissingFile => ApiError::Unauthorized(error.to_string()),
            UploadError::InvalidName | UploadError::MissingSize => {
                ApiError::BadRequest(error.to_string())
            }
            UploadError::AlreadyComplete => ApiError::Conflict(error.to_string()),
            UploadError::SizeMismatch { .. } => ApiError::LengthRequired(error.to_string()),
            UploadError::Storage(err) => err.into(),
        }
    }
}

/// Parses the client declared size. Only plain non-negative integers count.
pub fn parse_declared_size(raw: Option<&str>) -> Result<u64, UploadError> {
    raw.map(str::trim)
        .and_then(|value| value.parse::<u64>().ok())
        .ok_or(UploadError::MissingSize)
}

/// `POST /`：在密码中间件之后处理上传表单。
pub async fn save_upload(
    Extension(media): Extension<Arc<MediaRoot>>,
    Extension(locks): Extension<Arc<LockManager>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    Extension(form): Extension<PhotoForm>,
) -> Result<StatusCode, ApiError> {
    let upfile = form.upfile.ok_or(UploadError::MissingFile)?;
    let file_name = sanitize_file_name(&upfile.file_name).ok_or(UploadError::InvalidName)?;
    let declared = parse_declared_size(form.filesize.as_deref())?;

    let _guard = if upload.serialize_uploads {
        Some(locks.lock_file(&file_name).await)
    } else {
        None
    };
    match store_upload(&media, &file_name, declared, &upfile.data).await? {
        UploadOutcome::Created => info!(file = file_name, size = declared, "upload stored"),
        UploadOutcome::Replaced { previous_size } => info!(
            file = file_name,
            size = declared,
            previous_size,
            "incomplete upload replaced"
        ),
    }
    Ok(StatusCode::OK)
}

/// Applies the write / skip / overwrite decision for one sanitized file name.
///
/// A size mismatch after writing leaves the written file in place so the
/// client's retry finds it incomplete and overwrites it. The probe sentinel
/// name is reserved and never accepted as an upload.
pub async fn store_upload(
    media: &MediaRoot,
    file_name: &str,
    declared: u64,
    content: &[u8],
) -> Result<UploadOutcome, UploadError> {
    if file_name == PROBE_FILE_NAME {
        return Err(UploadError::InvalidName);
    }
    let target = media.target(file_name)?;
    match media.file_state(&target).await? {
        FileState::Absent => {
            write_and_verify(&target, declared, content).await?;
            Ok(UploadOutcome::Created)
        }
        FileState::Present(size) if size == declared => {
            warn!(path = ?target, "file already exists");
            Err(UploadError::AlreadyComplete)
        }
        FileState::Present(previous_size) => {
            info!(
                path = ?target,
                previous_size,
                declared,
                "replacing incomplete file"
            );
            remove_incomplete(&target).await;
            write_and_verify(&target, declared, content).await?;
            Ok(UploadOutcome::Replaced { previous_size })
        }
    }
}

async fn write_and_verify(target: &Path, declared: u64, content: &[u8]) -> Result<(), UploadError> {
    debug!(path = ?target, bytes = content.len(), "writing upload");
    fs::write(target, content).await.map_err(StorageError::from)?;
    let actual = fs::metadata(target)
        .await
        .map_err(StorageError::from)?
        .len();
    if actual != declared {
        return Err(UploadError::SizeMismatch {
            expected: declared,
            actual,
        });
    }
    Ok(())
}

async fn remove_incomplete(target: &Path) {
    match fs::remove_file(target).await {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = ?target, "incomplete file vanished before removal");
        }
        Err(err) => {
            warn!(path = ?target, error = %err, "failed to remove incomplete file");
        }
    }
}
