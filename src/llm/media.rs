use std::fmt;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use thiserror::Error;
use tokio::task;
use tracing::{debug, warn};

const DATA_URI_IMAGE_PREFIX: &str = "data:image/";
const DATA_URI_BASE64_MARKER: &str = ";base64,";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("image input is empty")]
    Empty,
    #[error("failed to read image file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("input is not a decodable image: {0}")]
    Undecodable(String),
    #[error("image payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

/// Removes a leading `data:image/<type>;base64,` prefix, leaving the raw
/// base64 payload. Values without the prefix pass through unchanged.
pub fn strip_data_uri_prefix(value: &str) -> &str {
    let Some(rest) = value.strip_prefix(DATA_URI_IMAGE_PREFIX) else {
        return value;
    };
    let Some(marker) = rest.find(DATA_URI_BASE64_MARKER) else {
        return value;
    };
    let subtype = &rest[..marker];
    if subtype.is_empty()
        || !subtype
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return value;
    }
    &rest[marker + DATA_URI_BASE64_MARKER.len()..]
}

/// Self-contained image value: a base64 data URI that is both previewable and
/// sendable as an API payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self::from_base64(mime_type, &general_purpose::STANDARD.encode(bytes))
    }

    pub fn from_base64(mime_type: &str, payload: &str) -> Self {
        ImageRef(format!("data:{mime_type};base64,{payload}"))
    }

    #[allow(dead_code)]
    pub fn from_data_uri(value: impl Into<String>) -> Self {
        ImageRef(value.into())
    }

    #[allow(dead_code)]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn mime_type(&self) -> Option<&str> {
        let rest = self.0.strip_prefix("data:")?;
        let end = rest.find(DATA_URI_BASE64_MARKER)?;
        let mime = &rest[..end];
        if mime.is_empty() {
            None
        } else {
            Some(mime)
        }
    }

    pub fn payload(&self) -> &str {
        strip_data_uri_prefix(&self.0)
    }

    pub fn decode_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        Ok(general_purpose::STANDARD.decode(self.payload().trim())?)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mime = self.mime_type().unwrap_or("unknown");
        write!(f, "{mime} ({} base64 chars)", self.payload().len())
    }
}

fn validate_image(bytes: &[u8]) -> Result<String, DecodeError> {
    let format = image::guess_format(bytes).map_err(|err| DecodeError::Undecodable(err.to_string()))?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|err| DecodeError::Undecodable(err.to_string()))?;
    debug!(
        "Decoded upload as {:?} ({}x{})",
        format,
        decoded.width(),
        decoded.height()
    );

    Ok(detect_mime_type(bytes).unwrap_or_else(|| format.to_mime_type().to_string()))
}

pub async fn encode(bytes: Vec<u8>) -> Result<ImageRef, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    task::spawn_blocking(move || {
        let mime_type = validate_image(&bytes)?;
        Ok(ImageRef::from_bytes(&mime_type, &bytes))
    })
    .await
    .map_err(|err| DecodeError::Undecodable(format!("decode task failed: {err}")))?
}

pub async fn encode_file(path: &Path, max_upload_bytes: usize) -> Result<ImageRef, DecodeError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if max_upload_bytes > 0 && bytes.len() > max_upload_bytes {
        warn!(
            "Upload {} is {} bytes, above the advisory limit of {} bytes",
            path.display(),
            bytes.len(),
            max_upload_bytes
        );
    }

    encode(bytes).await
}

#[cfg(test)]
pub(crate) fn tiny_png() -> Vec<u8> {
    use std::io::Cursor;

    let image = image::RgbImage::from_pixel(2, 3, image::Rgb([200, 180, 160]));
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, image::ImageFormat::Png)
        .expect("encode png fixture");
    cursor.into_inner()
}
