use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::{
    gemini::{decode_inline, EditRequest, GeminiError, ImageEditService, ResponsePart},
    models::{Download, ImageUpload, NoticeKind, ProcessedResult, SourceImage, ViewState},
    notify::Notifier,
    prompts::{Language, StylePreset},
};

/// Builds the service client once the user has supplied a credential.
pub type ClientFactory = Arc<dyn Fn(&str) -> Arc<dyn ImageEditService> + Send + Sync>;

#[derive(Default)]
struct EditorState {
    client: Option<Arc<dyn ImageEditService>>,
    source: Option<SourceImage>,
    result: Option<ProcessedResult>,
    results_visible: bool,
    busy: bool,
    // bumped whenever the loaded photo changes so late responses can be dropped
    epoch: u64,
    // bumped whenever the source or result image changes
    revision: u64,
}

struct BusyGuard<'a> {
    state: &'a Mutex<EditorState>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().busy = false;
    }
}

/// One browser session's editor: credential, photo, style and result.
pub struct EditorController {
    state: Mutex<EditorState>,
    notifier: Notifier,
    language: Language,
    factory: ClientFactory,
}

impl EditorController {
    pub fn new(language: Language, factory: ClientFactory) -> Self {
        Self {
            state: Mutex::default(),
            notifier: Notifier::default(),
            language,
            factory,
        }
    }

    pub fn set_credential(&self, value: &str) {
        let messages = self.language.messages();
        let credential = value.trim();
        if credential.is_empty() {
            self.state.lock().client = None;
            self.notify(messages.credential_empty, NoticeKind::Error);
            return;
        }
        self.state.lock().client = Some((self.factory)(credential));
        info!("🔑 API key set for session");
        self.notify(messages.credential_saved, NoticeKind::Success);
    }

    /// Accepts the upload as the current photo if it is an image. Returns whether it was accepted.
    pub fn load_image(&self, upload: ImageUpload) -> bool {
        let Some(mime_type) = image_mime_type(&upload) else {
            self.notify(self.language.messages().not_an_image, NoticeKind::Error);
            return false;
        };

        info!(file = %upload.file_name, %mime_type, bytes = upload.data.len(), "🖼️ Loaded source image");
        let mut state = self.state.lock();
        state.source = Some(SourceImage { data: upload.data, mime_type, file_name: upload.file_name });
        state.result = None;
        state.results_visible = false;
        state.epoch += 1;
        state.revision += 1;
        true
    }

    pub async fn process(&self, style: StylePreset) {
        let messages = self.language.messages();
        let (client, request, epoch) = {
            let mut state = self.state.lock();
            let Some(client) = state.client.clone() else {
                self.notify(messages.credential_missing, NoticeKind::Error);
                return;
            };
            let Some(source) = state.source.as_ref() else {
                self.notify(messages.image_missing, NoticeKind::Error);
                return;
            };
            if state.busy {
                self.notify(messages.already_processing, NoticeKind::Info);
                return;
            }
            let request = EditRequest {
                instruction: style.instruction(self.language).to_string(),
                image: source.data.clone(),
                mime_type: source.mime_type.clone(),
            };
            info!(%style, file = %source.file_name, "🎯 Processing image");
            state.busy = true;
            state.results_visible = true;
            if state.result.take().is_some() {
                state.revision += 1;
            }
            (client, request, state.epoch)
        };

        let guard = BusyGuard { state: &self.state };
        let outcome = client.edit_image(&request).await;
        drop(guard);

        let mut state = self.state.lock();
        if state.epoch != epoch {
            info!(%style, "Discarding response for a photo that is no longer loaded");
            return;
        }

        match outcome.and_then(first_inline_image) {
            Ok(Some(result)) => {
                info!(mime_type = %result.mime_type, bytes = result.data.len(), "✅ Image processed");
                state.result = Some(result);
                state.revision += 1;
                self.notify(messages.processed, NoticeKind::Success);
            }
            Ok(None) => {
                info!("⚠️ No image part in response");
                self.notify(messages.no_result, NoticeKind::Info);
            }
            Err(e) => {
                error!("❌ Processing failed: {}", e);
                self.notify(format!("{}: {}", messages.error_prefix, e), NoticeKind::Error);
            }
        }
    }

    pub fn download(&self) -> Option<Download> {
        let state = self.state.lock();
        let result = state.result.as_ref()?;
        Some(Download {
            file_name: format!("manicure_{}.{}", Utc::now().timestamp_millis(), result.extension()),
            mime_type: result.mime_type.clone(),
            data: result.data.clone(),
        })
    }

    /// The photo currently loaded, as uploaded.
    pub fn source_image(&self) -> Option<SourceImage> {
        self.state.lock().source.clone()
    }

    pub fn processed_result(&self) -> Option<ProcessedResult> {
        self.state.lock().result.clone()
    }

    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.source = None;
        state.result = None;
        state.results_visible = false;
        state.epoch += 1;
        state.revision += 1;
        debug!("Editor reset");
    }

    pub fn notify(&self, message: impl Into<String>, kind: NoticeKind) {
        self.notifier.notify(message, kind);
    }

    pub fn view(&self) -> ViewState {
        let state = self.state.lock();
        ViewState {
            credential_set: state.client.is_some(),
            options_visible: state.source.is_some(),
            results_visible: state.results_visible,
            loader_visible: state.results_visible && state.busy,
            download_visible: state.result.is_some(),
            image_revision: state.revision,
            notice: self.notifier.current(),
        }
    }
}

// Browsers send an empty or generic type for some files, so sniff those from the bytes.
fn image_mime_type(upload: &ImageUpload) -> Option<String> {
    let declared = upload.content_type.as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("application/octet-stream"));
    match declared {
        Some(t) if t.to_ascii_lowercase().starts_with("image/") => Some(t.to_string()),
        Some(_) => None,
        None => image::guess_format(&upload.data).ok().map(|f| f.to_mime_type().to_string()),
    }
}

// Only the first inline part is decoded; anything after it is ignored.
fn first_inline_image(parts: Vec<ResponsePart>) -> Result<Option<ProcessedResult>, GeminiError> {
    for part in parts {
        match part {
            ResponsePart::InlineImage { mime_type, data } => {
                return Ok(Some(ProcessedResult { data: decode_inline(&data)?, mime_type }));
            }
            ResponsePart::Text(text) => debug!("📝 Model text: {}", text),
        }
    }
    Ok(None)
}
