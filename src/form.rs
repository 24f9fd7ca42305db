//! 上传表单解码：`multipart/form-data` 与 urlencoded 两种编码。

use axum::body::{Body as AxumBody, Bytes};
use axum::extract::{Form, FromRequest, Multipart};
use axum::http::{Extensions, HeaderMap, Method, Request, header};
use serde::Deserialize;
use tracing::debug;

pub const FIELD_PASSWORD: &str = "password";
pub const FIELD_FILESIZE: &str = "filesize";
pub const FIELD_UPFILE: &str = "upfile";

/// File part of the form.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    /// 客户端提交的原始文件名，未经清理。
    pub file_name: String,
    pub data: Bytes,
}

/// Decoded `POST /` or `POST /test` form. Missing fields stay `None` so
/// that handlers decide which status code an absent field maps to.
#[derive(Clone, Debug, Default)]
pub struct PhotoForm {
    pub password: Option<String>,
    pub filesize: Option<String>,
    pub upfile: Option<UploadedFile>,
}

#[derive(Deserialize, Default)]
struct UrlEncodedFields {
    password: Option<String>,
    filesize: Option<String>,
}

impl PhotoForm {
    /// Decodes an already buffered body. Bodies without a form content type
    /// decode to an empty form, and so do bodies that fail to decode, so the
    /// password check still answers first. Multipart fields read before a
    /// decoding error are kept. `extensions` carries the router's body limit
    /// over to the multipart parser.
    pub async fn decode(headers: &HeaderMap, extensions: &Extensions, body: Bytes) -> Self {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            Self::decode_multipart(rebuild_request(headers, extensions, body)).await
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            Self::decode_urlencoded(rebuild_request(headers, extensions, body)).await
        } else {
            debug!(content_type, "request without form body");
            Self::default()
        }
    }

    async fn decode_multipart(request: Request<AxumBody>) -> Self {
        let mut form = Self::default();
        let mut multipart = match Multipart::from_request(request, &()).await {
            Ok(multipart) => multipart,
            Err(err) => {
                debug!(reason = %err.body_text(), "undecodable multipart body");
                return form;
            }
        };

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(err) => {
                    debug!(reason = %err.body_text(), "multipart body ended early");
                    break;
                }
            };
            let name = field.name().unwrap_or_default().to_string();
            let decoded = match name.as_str() {
                FIELD_PASSWORD => field.text().await.map(|text| form.password = Some(text)),
                FIELD_FILESIZE => field.text().await.map(|text| form.filesize = Some(text)),
                FIELD_UPFILE => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    field
                        .bytes()
                        .await
                        .map(|data| form.upfile = Some(UploadedFile { file_name, data }))
                }
                _ => {
                    debug!(field = name, "ignoring unknown form field");
                    Ok(())
                }
            };
            if let Err(err) = decoded {
                debug!(field = name, reason = %err.body_text(), "unreadable form field");
                break;
            }
        }
        form
    }

    async fn decode_urlencoded(request: Request<AxumBody>) -> Self {
        match Form::<UrlEncodedFields>::from_request(request, &()).await {
            Ok(Form(fields)) => Self {
                password: fields.password,
                filesize: fields.filesize,
                upfile: None,
            },
            Err(err) => {
                debug!(reason = %err.body_text(), "undecodable urlencoded body");
                Self::default()
            }
        }
    }
}

fn rebuild_request(headers: &HeaderMap, extensions: &Extensions, body: Bytes) -> Request<AxumBody> {
    let mut request = Request::new(AxumBody::from(body));
    *request.method_mut() = Method::POST;
    *request.headers_mut() = headers.clone();
    *request.extensions_mut() = extensions.clone();
    request
}
