//! 凭据校验与密码中间件。
//!
//! 客户端提交的是原始密码的 SHA-512 十六进制摘要，服务端只保存该摘要的
//! bcrypt 哈希。

use axum::body::{self, Body as AxumBody};
use axum::extract::Extension;
use axum::http::Request;
use axum::middleware;
use axum::response::Response;
use http_body_util::LengthLimitError;
use sha2::{Digest, Sha512};
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::form::PhotoForm;
use crate::tenant::TenantConfig;
use crate::upload::UploadConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("server has no credential configured!")]
    NotConfigured,
    #[error("no password in the request!")]
    Missing,
    #[error("wrong password!")]
    Rejected,
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::NotConfigured => ApiError::Unauthorized(error.to_string()),
            AuthError::Missing | AuthError::Rejected => ApiError::Forbidden(error.to_string()),
        }
    }
}

/// Credentials written by `init`.
#[derive(Clone, Debug)]
pub struct Credentials {
    /// What the client app sends as `password`.
    pub digest: String,
    /// Salted hash of `digest`, the only value used for verification.
    pub hash: String,
}

/// SHA-512 十六进制摘要（小写）。
pub fn client_digest(password: &str) -> String {
    hex::encode(Sha512::digest(password.as_bytes()))
}

/// 由原始密码生成客户端摘要与 bcrypt 哈希。
pub fn derive_credentials(password: &str, cost: u32) -> Result<Credentials, bcrypt::BcryptError> {
    let digest = client_digest(password);
    let hash = bcrypt::hash(&digest, cost)?;
    Ok(Credentials { digest, hash })
}

/// Checks a supplied credential against the tenant's stored hash.
///
/// `ConfigStore::load` refuses an empty `PasswordBcrypt`, so `NotConfigured`
/// only shows up for configurations built elsewhere. It answers 401, which
/// the upload path also uses for a missing file part.
pub fn verify(config: &TenantConfig, supplied: Option<&str>) -> Result<(), AuthError> {
    if config.password_hash.trim().is_empty() {
        return Err(AuthError::NotConfigured);
    }
    let supplied = supplied.ok_or(AuthError::Missing)?;
    match bcrypt::verify(supplied, config.password_hash.trim()) {
        Ok(true) => Ok(()),
        Ok(false) => Err(AuthError::Rejected),
        Err(err) => {
            warn!(error = %err, "stored password hash is unusable");
            Err(AuthError::Rejected)
        }
    }
}

/// 密码中间件：缓冲并解码表单，校验密码后把表单交给后续处理器。
pub async fn require_password(
    Extension(tenant): Extension<Arc<TenantConfig>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, ApiError> {
    let (parts, body) = req.into_parts();
    let bytes = body::to_bytes(body, upload.max_body_bytes)
        .await
        .map_err(body_error)?;
    let form = PhotoForm::decode(&parts.headers, &parts.extensions, bytes).await;

    if let Err(err) = verify(&tenant, form.password.as_deref()) {
        debug!(path = parts.uri.path(), reason = %err, "authentication failed");
        return Err(err.into());
    }

    let mut req = Request::from_parts(parts, AxumBody::empty());
    req.extensions_mut().insert(form);
    Ok(next.run(req).await)
}

/// 只有超出长度上限才是 413，其余读取失败按 400 处理。
fn body_error(err: axum::Error) -> ApiError {
    let inner = err.into_inner();
    let root: &(dyn StdError + 'static) = &*inner;
    let mut source = Some(root);
    while let Some(err) = source {
        if err.is::<LengthLimitError>() {
            return ApiError::PayloadTooLarge("request body too large!".into());
        }
        source = err.source();
    }
    ApiError::BadRequest(format!("failed to read request body: {inner}"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    pub(crate) const TEST_PASSWORD: &str = "correct horse";
    const TEST_COST: u32 = 4;

    pub(crate) fn tenant_with_password(password: &str, media_root: PathBuf) -> TenantConfig {
        let credentials = derive_credentials(password, TEST_COST).expect("hash");
        TenantConfig {
            name: None,
            media_root,
            password_hash: credentials.hash,
            password_digest: Some(credentials.digest),
            bind_address: "127.0.0.1".into(),
            port: 8420,
            path_prefix: None,
        }
    }

    #[test]
    fn client_digest_is_sha512_hex() {
        let digest = client_digest("abc");
        assert_eq!(digest.len(), 128);
        assert!(digest.starts_with("ddaf35a193617aba"));
    }

    #[test]
    fn verify_accepts_digest_and_rejects_others() {
        let tenant = tenant_with_password(TEST_PASSWORD, PathBuf::from("/data"));
        let digest = client_digest(TEST_PASSWORD);
        assert_eq!(verify(&tenant, Some(digest.as_str())), Ok(()));
        assert_eq!(verify(&tenant, Some(TEST_PASSWORD)), Err(AuthError::Rejected));
        assert_eq!(verify(&tenant, Some("")), Err(AuthError::Rejected));
        assert_eq!(verify(&tenant, None), Err(AuthError::Missing));
    }

    #[test]
    fn verify_without_stored_hash_is_not_configured() {
        let mut tenant = tenant_with_password(TEST_PASSWORD, PathBuf::from("/data"));
        tenant.password_hash = String::new();
        assert_eq!(
            verify(&tenant, Some(client_digest(TEST_PASSWORD).as_str())),
            Err(AuthError::NotConfigured)
        );
    }

    #[test]
    fn verify_treats_malformed_hash_as_rejection() {
        let mut tenant = tenant_with_password(TEST_PASSWORD, PathBuf::from("/data"));
        tenant.password_hash = "not-a-bcrypt-hash".into();
        assert_eq!(
            verify(&tenant, Some(client_digest(TEST_PASSWORD).as_str())),
            Err(AuthError::Rejected)
        );
    }

    #[tokio::test]
    async fn only_length_limit_errors_are_payload_too_large() {
        use axum::http::StatusCode;

        let oversized = body::to_bytes(AxumBody::from(vec![0u8; 32]), 8)
            .await
            .expect_err("limit");
        assert_eq!(body_error(oversized).status(), StatusCode::PAYLOAD_TOO_LARGE);

        let broken = axum::Error::new(std::io::Error::other("connection reset"));
        assert_eq!(body_error(broken).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn auth_errors_map_to_status_codes() {
        use axum::http::StatusCode;
        assert_eq!(
            ApiError::from(AuthError::NotConfigured).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::from(AuthError::Missing).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(AuthError::Rejected).status(), StatusCode::FORBIDDEN);
    }
}
