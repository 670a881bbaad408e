use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use uuid::Uuid;

use crate::prompts::StylePreset;

pub const DEFAULT_RESULT_MIME: &str = "image/png";

/// File extension for an image MIME type, `png` when the type is unknown.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    image::ImageFormat::from_mime_type(mime_type)
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("png")
}

/// The photo the user picked, kept exactly as uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub data: Bytes,
    pub mime_type: String,
    pub file_name: String,
}

/// Image returned by the model for the current source photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedResult {
    pub data: Bytes,
    pub mime_type: String,
}

impl ProcessedResult {
    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }
}

/// An image file as it arrives from the browser, before it is accepted.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
    pub kind: NoticeKind,
}

/// Everything the page needs to redraw itself.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub credential_set: bool,
    pub options_visible: bool,
    pub results_visible: bool,
    pub loader_visible: bool,
    pub download_visible: bool,
    /// Changes whenever the original or processed image changes; the page refetches images only then.
    pub image_revision: u64,
    pub notice: Option<Notice>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialRequest {
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub style: StylePreset,
}

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub id: Uuid,
    pub view: ViewState,
}
