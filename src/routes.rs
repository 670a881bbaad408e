use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use include_dir::{include_dir, Dir};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::{Instant, MissedTickBehavior}};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{
    config::Config,
    editor::{ClientFactory, EditorController},
    error::AppError,
    gemini::{GeminiClient, ImageEditService},
    models::{CredentialRequest, ImageUpload, ProcessRequest, SessionCreated, ViewState},
    prompts::{Language, StylePreset},
};

static STATIC_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

struct Session {
    editor: Arc<EditorController>,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct AppState {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    pub factory: ClientFactory,
    pub language: Language,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let (base_url, model) = (config.api_base.clone(), config.model.clone());
        let factory: ClientFactory = Arc::new(move |api_key: &str| {
            Arc::new(GeminiClient::new(api_key, base_url.clone(), model.clone())) as Arc<dyn ImageEditService>
        });
        Self::with_factory(config.language, factory)
    }

    pub fn with_factory(language: Language, factory: ClientFactory) -> Self {
        Self { sessions: Arc::default(), factory, language }
    }

    fn session(&self, id: Uuid) -> Result<Arc<EditorController>, AppError> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(&id).ok_or(AppError::SessionNotFound(id))?;
        session.last_seen = Instant::now();
        Ok(Arc::clone(&session.editor))
    }

    /// Drops sessions not touched within `ttl` and returns how many were dropped.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| now.duration_since(session.last_seen) < ttl);
        before - sessions.len()
    }
}

/// Periodically evicts idle sessions for as long as the server runs.
pub fn spawn_session_sweeper(state: AppState, ttl: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ttl);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = state.evict_idle(ttl);
            if evicted > 0 {
                tracing::info!("🧹 Evicted {} idle session(s)", evicted);
            }
        }
    })
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/styles", get(list_styles))
        .route("/api/session", post(create_session))
        .route("/api/session/:id", get(get_session).delete(delete_session))
        .route("/api/session/:id/credential", post(set_credential))
        .route("/api/session/:id/image", post(upload_image))
        .route("/api/session/:id/process", post(process_image))
        .route("/api/session/:id/original", get(original_image))
        .route("/api/session/:id/result", get(result_image))
        .route("/api/session/:id/download", get(download_image))
        .route("/api/session/:id/reset", post(reset_session))
        .fallback(static_asset)
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(state)
}

pub async fn list_styles() -> Json<[StylePreset; 4]> {
    Json(StylePreset::ALL)
}

pub async fn create_session(State(state): State<AppState>) -> Json<SessionCreated> {
    let id = Uuid::new_v4();
    let editor = Arc::new(EditorController::new(state.language, Arc::clone(&state.factory)));
    let view = editor.view();
    state.sessions.write().insert(id, Session { editor, last_seen: Instant::now() });
    tracing::info!("🆕 Created editor session {}", id);
    Json(SessionCreated { id, view })
}

pub async fn get_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<ViewState>, AppError> {
    Ok(Json(state.session(id)?.view()))
}

pub async fn delete_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.sessions.write().remove(&id).ok_or(AppError::SessionNotFound(id))?;
    tracing::info!("🗑️ Closed editor session {}", id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_credential(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<CredentialRequest>,
) -> Result<Json<ViewState>, AppError> {
    let editor = state.session(id)?;
    editor.set_credential(&body.value);
    Ok(Json(editor.view()))
}

pub async fn upload_image(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ViewState>, AppError> {
    let editor = state.session(id)?;
    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::Upload(e.to_string()))? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| AppError::Upload(e.to_string()))?;
        let upload = ImageUpload { file_name, content_type, data };
        let (file, declared) = (upload.file_name.clone(), upload.content_type.clone());
        if !editor.load_image(upload) {
            tracing::warn!(session = %id, %file, content_type = ?declared, "Rejected non-image upload, keeping current photo");
        }
        return Ok(Json(editor.view()));
    }
    Err(AppError::Upload("missing 'file' field".into()))
}

pub async fn process_image(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<ProcessRequest>,
) -> Result<Json<ViewState>, AppError> {
    let editor = state.session(id)?;
    editor.process(body.style).await;
    Ok(Json(editor.view()))
}

pub async fn download_image(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Response, AppError> {
    let Some(download) = state.session(id)?.download() else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    tracing::info!("💾 Serving download {}", download.file_name);
    let disposition = format!("attachment; filename=\"{}\"", download.file_name);
    Ok((
        [(header::CONTENT_TYPE, download.mime_type), (header::CONTENT_DISPOSITION, disposition)],
        download.data,
    ).into_response())
}

// Inline image for the page preview; 404 while there is nothing to show.
fn inline_image(mime_type: String, data: Bytes) -> Response {
    ([(header::CONTENT_TYPE, mime_type), (header::CACHE_CONTROL, "no-cache".to_string())], data).into_response()
}

pub async fn original_image(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Response, AppError> {
    Ok(match state.session(id)?.source_image() {
        Some(image) => inline_image(image.mime_type, image.data),
        None => StatusCode::NOT_FOUND.into_response(),
    })
}

pub async fn result_image(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Response, AppError> {
    Ok(match state.session(id)?.processed_result() {
        Some(result) => inline_image(result.mime_type, result.data),
        None => StatusCode::NOT_FOUND.into_response(),
    })
}

pub async fn reset_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<ViewState>, AppError> {
    let editor = state.session(id)?;
    editor.reset();
    Ok(Json(editor.view()))
}

pub async fn static_asset(uri: Uri) -> Response {
    let path = match uri.path().trim_start_matches('/') {
        "" => "index.html",
        other => other,
    };
    let Some(file) = STATIC_DIR.get_file(path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let content_type = match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    };
    ([(header::CONTENT_TYPE, content_type)], file.contents()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::tests::{FakeService, PNG_MAGIC};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const BOUNDARY: &str = "nail-boundary";

    fn app(fake: &Arc<FakeService>) -> Router {
        router(AppState::with_factory(Language::English, fake.factory()), 1024 * 1024)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec())
    }

    async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())).unwrap();
        let (status, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn multipart_upload(uri: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"nails.png\"\r\nContent-Type: {content_type}\r\n\r\n"
        ).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        Request::builder().method("POST").uri(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body)).unwrap()
    }

    async fn new_session(app: &Router) -> String {
        let (status, body) = send_json(app, "POST", "/api/session", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn full_editing_cycle_over_http() {
        let fake = FakeService::image("image/png", b"styled-png");
        let app = app(&fake);
        let id = new_session(&app).await;

        let (_, view) = send_json(&app, "POST", &format!("/api/session/{id}/credential"), json!({"value": " key-1 "})).await;
        assert_eq!(view["credentialSet"], true);

        let (status, bytes) = send(&app, multipart_upload(&format!("/api/session/{id}/image"), "image/png", PNG_MAGIC)).await;
        assert_eq!(status, StatusCode::OK);
        let view: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(view["optionsVisible"], true);
        let uploaded_revision = view["imageRevision"].as_u64().unwrap();

        let response = app.clone().oneshot(Request::get(format!("/api/session/{id}/original")).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec(), PNG_MAGIC.to_vec());
        let (status, _) = send(&app, Request::get(format!("/api/session/{id}/result")).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, view) = send_json(&app, "POST", &format!("/api/session/{id}/process"), json!({"style": "glamour"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["downloadVisible"], true);
        assert_eq!(view["loaderVisible"], false);
        assert!(view["imageRevision"].as_u64().unwrap() > uploaded_revision);
        assert!(view.get("processedImage").is_none());
        assert_eq!(fake.requests.lock()[0].instruction, StylePreset::Glamour.instruction(Language::English));

        let (status, preview) = send(&app, Request::get(format!("/api/session/{id}/result")).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(preview, b"styled-png".to_vec());

        let response = app.clone().oneshot(Request::get(format!("/api/session/{id}/download")).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.starts_with("attachment; filename=\"manicure_"));
        assert!(disposition.ends_with(".png\""));
        assert_eq!(to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec(), b"styled-png".to_vec());

        let (_, view) = send_json(&app, "POST", &format!("/api/session/{id}/reset"), json!({})).await;
        assert_eq!(view["optionsVisible"], false);

        let (status, body) = send(&app, Request::get(format!("/api/session/{id}/download")).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
        let (status, _) = send(&app, Request::get(format!("/api/session/{id}/original")).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleted_session_is_not_found() {
        let fake = FakeService::image("image/png", b"x");
        let app = app(&fake);
        let id = new_session(&app).await;

        let (status, _) = send(&app, Request::delete(format!("/api/session/{id}")).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send_json(&app, "GET", &format!("/api/session/{id}"), Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Request::delete(format!("/api/session/{id}")).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_is_evicted_by_the_sweeper() {
        let fake = FakeService::image("image/png", b"x");
        let state = AppState::with_factory(Language::English, fake.factory());
        let app = router(state.clone(), 1024 * 1024);
        let idle = new_session(&app).await;
        let sweeper = spawn_session_sweeper(state, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        let active = new_session(&app).await;
        tokio::time::sleep(Duration::from_secs(45)).await;

        let (status, _) = send_json(&app, "GET", &format!("/api/session/{idle}"), Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send_json(&app, "GET", &format!("/api/session/{active}"), Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        sweeper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn requests_keep_a_session_alive() {
        let fake = FakeService::image("image/png", b"x");
        let state = AppState::with_factory(Language::English, fake.factory());
        let app = router(state.clone(), 1024 * 1024);
        let id = new_session(&app).await;
        let ttl = Duration::from_secs(60);

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(40)).await;
            let (status, _) = send_json(&app, "GET", &format!("/api/session/{id}"), Value::Null).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(state.evict_idle(ttl), 0);
        }
        tokio::time::advance(ttl).await;
        assert_eq!(state.evict_idle(ttl), 1);
    }

    #[tokio::test]
    async fn non_image_upload_is_ignored() {
        let fake = FakeService::image("image/png", b"x");
        let app = app(&fake);
        let id = new_session(&app).await;

        let (status, bytes) = send(&app, multipart_upload(&format!("/api/session/{id}/image"), "text/plain", b"hello")).await;
        assert_eq!(status, StatusCode::OK);
        let view: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(view["optionsVisible"], false);
        assert_eq!(view["notice"]["kind"], "error");
    }

    #[tokio::test]
    async fn unknown_style_is_rejected_before_the_editor() {
        let fake = FakeService::image("image/png", b"x");
        let app = app(&fake);
        let id = new_session(&app).await;

        let (status, _) = send_json(&app, "POST", &format!("/api/session/{id}/process"), json!({"style": "vintage"})).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let fake = FakeService::image("image/png", b"x");
        let app = app(&fake);
        let (status, body) = send_json(&app, "POST", &format!("/api/session/{}/reset", Uuid::new_v4()), json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().starts_with("session "));
    }

    #[tokio::test]
    async fn serves_embedded_page_and_styles() {
        let fake = FakeService::image("image/png", b"x");
        let app = app(&fake);

        let response = app.clone().oneshot(Request::get("/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");

        let (status, styles) = send_json(&app, "GET", "/api/styles", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(styles, json!(["professional", "glamour", "minimal", "artistic"]));

        let (status, _) = send(&app, Request::get("/missing.js").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
