//! Conversion between raw image files and `data:` URLs.
//!
//! History entries are stored as data URLs so that originals and model output
//! look the same to the session. Outbound requests need the MIME type and the
//! bare base64 payload, which is what [`decode`] recovers.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

use crate::error::EditError;

/// Used when a data URL header does not carry a recognizable MIME type.
pub const FALLBACK_MIME_TYPE: &str = "image/jpeg";

/// An image the user handed us, already encoded for the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub file_name: String,
    pub mime_type: String,
    pub data_url: String,
}

impl UploadedImage {
    /// Validates the declared type and encodes the bytes.
    pub fn from_bytes(file_name: impl Into<String>, mime_type: &str, bytes: &[u8]) -> Result<Self, EditError> {
        validate_image_type(mime_type)?;
        Ok(UploadedImage {
            file_name: file_name.into(),
            mime_type: mime_type.to_string(),
            data_url: encode(mime_type, bytes),
        })
    }
}

/// MIME type plus base64 payload, the shape the generation API wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    pub fn bytes(&self) -> Result<Vec<u8>, EditError> {
        BASE64
            .decode(self.data.as_bytes())
            .map_err(|e| EditError::ReadError(format!("invalid base64 payload: {}", e)))
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

pub fn validate_image_type(mime_type: &str) -> Result<(), EditError> {
    if mime_type.trim().to_ascii_lowercase().starts_with("image/") {
        Ok(())
    } else {
        Err(EditError::InvalidFileType(mime_type.to_string()))
    }
}

pub fn encode(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, BASE64.encode(bytes))
}

/// Reads a file from disk into an [`UploadedImage`]. The type is guessed
/// from the extension and non-images are rejected before anything is read.
pub async fn encode_file(path: &Path) -> Result<UploadedImage, EditError> {
    let mime_type = mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());
    validate_image_type(&mime_type)?;

    let bytes = tokio::fs::read(path).await.map_err(|e| {
        warn!("Failed to read image file {}: {}", path.display(), e);
        EditError::ReadError(e.to_string())
    })?;
    debug!("Encoded {} | {} bytes | {}", path.display(), bytes.len(), mime_type);

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    UploadedImage::from_bytes(file_name, &mime_type, &bytes)
}

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r":(.*?);").expect("static regex"))
}

/// Splits a data URL into MIME type and payload.
///
/// A header without a `:<mime>;` section silently decodes as
/// [`FALLBACK_MIME_TYPE`]. Input with no comma yields an empty payload.
pub fn decode(data_url: &str) -> InlineImage {
    let (header, data) = data_url.split_once(',').unwrap_or((data_url, ""));
    let mime_type = header_pattern()
        .captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .unwrap_or(FALLBACK_MIME_TYPE)
        .to_string();

    InlineImage {
        mime_type,
        data: data.to_string(),
    }
}
