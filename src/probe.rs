//! 媒体目录写权限自检。

use axum::extract::Extension;
use axum::http::StatusCode;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::config::PROBE_FILE_NAME;
use crate::error::ApiError;
use crate::storage::MediaRoot;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("MEDIA_ROOT does not exist!")]
    MediaRootMissing,
    #[error("Can't write to MEDIA_ROOT! ({0})")]
    MediaRootNotWritable(#[source] io::Error),
}

impl From<ProbeError> for ApiError {
    fn from(error: ProbeError) -> Self {
        ApiError::Internal(error.to_string())
    }
}

/// Sentinel file written by the probe. `cleanup` removes it; `Drop` is the
/// fallback when the probe bails out before that.
struct SentinelFile {
    path: PathBuf,
    cleaned: bool,
}

impl SentinelFile {
    fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(PROBE_FILE_NAME),
            cleaned: false,
        }
    }

    async fn write(&self) -> io::Result<()> {
        fs::write(&self.path, b"").await
    }

    async fn cleanup(mut self) {
        self.cleaned = true;
        if let Err(err) = fs::remove_file(&self.path).await
            && err.kind() != io::ErrorKind::NotFound
        {
            warn!(path = ?self.path, error = %err, "failed to remove sentinel file");
        }
    }
}

impl Drop for SentinelFile {
    fn drop(&mut self) {
        if !self.cleaned {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// 确认媒体目录存在且可写，不触碰任何已上传文件。
pub async fn probe(media: &MediaRoot) -> Result<(), ProbeError> {
    if !media.exists().await {
        return Err(ProbeError::MediaRootMissing);
    }
    let sentinel = SentinelFile::new(media.root_path());
    let written = sentinel.write().await;
    sentinel.cleanup().await;
    written.map_err(ProbeError::MediaRootNotWritable)
}

/// `POST /test`
pub async fn test_media_root(
    Extension(media): Extension<Arc<MediaRoot>>,
) -> Result<StatusCode, ApiError> {
    probe(&media).await?;
    info!(root = ?media.root_path(), "Test succeeded \\o/");
    Ok(StatusCode::OK)
}
