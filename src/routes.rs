use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use std::{collections::HashMap, sync::Arc, time::Duration};
use uuid::Uuid;

use crate::{
    artifacts::ArtifactStore,
    backend::GenerationBackend,
    clipboard::SharedClipboard,
    controller::{Controller, SubmitOutcome},
    error::ControllerError,
    features::{self, CatalogEntry},
    launch::{Launch, Permission},
    models::{CopyRequest, DownloadResponse, FileBlob, OpenSessionRequest, SessionSnapshot},
    params::ParameterInput,
};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<Uuid, Arc<Controller>>>>,
    pub backend: Arc<dyn GenerationBackend>,
    pub artifacts: ArtifactStore,
    pub clipboard: SharedClipboard,
    pub launch: Arc<Launch>,
}

impl AppState {
    fn session(&self, id: Uuid) -> Result<Arc<Controller>, ApiError> {
        let controller = self
            .sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Unknown session"))?;
        controller.touch();
        Ok(controller)
    }

    /// Drops sessions nobody has used for `max_idle`, releasing their files.
    /// Sessions with a submission in flight are kept.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write();
        let stale: Vec<Uuid> = sessions
            .iter()
            .filter(|(_, c)| !c.is_busy() && c.idle_for() >= max_idle)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            if let Some(controller) = sessions.remove(id) {
                controller.reset();
                tracing::info!("🧹 Evicted idle {} session {}", controller.feature().slug, id);
            }
        }
        stale.len()
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ControllerError> for ApiError {
    fn from(e: ControllerError) -> Self {
        let status = match &e {
            ControllerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ControllerError::Local(_) => StatusCode::CONFLICT,
            ControllerError::Network(_) | ControllerError::Server { .. } | ControllerError::InvalidResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        Self::new(status, e.user_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn router(state: AppState, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/api/features", get(list_features))
        .route("/api/sessions", post(open_session))
        .route("/api/sessions/:id", get(get_session).delete(close_session))
        .route("/api/sessions/:id/file", post(select_file))
        .route("/api/sessions/:id/params", put(set_parameters))
        .route("/api/sessions/:id/submit", post(submit))
        .route("/api/sessions/:id/artifacts/:index/download", post(download_artifact))
        .route("/api/sessions/:id/copy", post(copy_text))
        .route("/api/clipboard", get(read_clipboard))
        .route("/api/launch", get(launch_status))
        .route("/api/launch/permission", post(set_permission))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .with_state(state)
}

pub async fn list_features() -> Json<Vec<CatalogEntry>> {
    Json(features::catalog().into_iter().map(CatalogEntry::from).collect())
}

pub async fn open_session(
    State(state): State<AppState>,
    Json(body): Json<OpenSessionRequest>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let feature = features::find(&body.feature)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("Unknown feature '{}'", body.feature)))?;

    let controller = Arc::new(Controller::new(feature, state.backend.clone()));
    let snapshot = controller.snapshot();
    state.sessions.write().insert(controller.id(), controller);

    tracing::info!("🎯 Opened {} session {}", body.feature, snapshot.id);
    Ok((StatusCode::CREATED, Json(snapshot)))
}

pub async fn get_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionSnapshot>, ApiError> {
    Ok(Json(state.session(id)?.snapshot()))
}

pub async fn close_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> StatusCode {
    match state.sessions.write().remove(&id) {
        Some(controller) => {
            if controller.snapshot().workflow.is_submitting() {
                tracing::info!("🗑️ Session {} closed mid-flight, its result will be dropped", id);
            }
            controller.reset();
            tracing::info!("👋 Closed {} session {}", controller.feature().title, id);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

pub async fn select_file(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let controller = state.session(id)?;

    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("upload").to_string();
        let mime = field.content_type().unwrap_or("application/octet-stream").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
        file = Some(FileBlob::new(name, mime, bytes));
        break;
    }
    let file = file.ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "No file provided"))?;

    let status = match controller.select_file(file) {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::UNPROCESSABLE_ENTITY,
    };
    Ok((status, Json(controller.snapshot())))
}

pub async fn set_parameters(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<ParameterInput>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let controller = state.session(id)?;
    controller.set_parameters(&body);
    Ok(Json(controller.snapshot()))
}

pub async fn submit(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionSnapshot>, ApiError> {
    let controller = state.session(id)?;
    match controller.submit().await? {
        SubmitOutcome::Ignored => Err(ApiError::new(
            StatusCode::CONFLICT,
            "A generation is already in progress.",
        )),
        SubmitOutcome::Completed(_) | SubmitOutcome::Discarded => Ok(Json(controller.snapshot())),
    }
}

pub async fn download_artifact(
    Path((id, index)): Path<(Uuid, usize)>,
    State(state): State<AppState>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let controller = state.session(id)?;
    let path = controller.download_artifact(index, &state.artifacts).await?;
    let bytes = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or_default();
    Ok(Json(DownloadResponse {
        path: path.display().to_string(),
        bytes,
    }))
}

pub async fn copy_text(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<CopyRequest>,
) -> Result<StatusCode, ApiError> {
    let controller = state.session(id)?;
    let text = match (body.text, body.artifact) {
        (Some(text), _) => text,
        (None, Some(index)) => controller.hashtag_text(index).unwrap_or_default(),
        (None, None) => String::new(),
    };
    controller.copy_text(&text, &state.clipboard)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn read_clipboard(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "text": state.clipboard.read_text() }))
}

pub async fn launch_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!(state.launch.status(Utc::now())))
}

#[derive(Debug, Deserialize)]
pub struct PermissionRequest {
    pub decision: Permission,
}

pub async fn set_permission(
    State(state): State<AppState>,
    Json(body): Json<PermissionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let now = Utc::now();
    let notification = state
        .launch
        .request_permission(body.decision, now)
        .await
        .map_err(|e| {
            tracing::error!("❌ Failed to store notification permission: {:#}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Could not save notification preference")
        })?;
    Ok(Json(json!({ "status": state.launch.status(now), "notification": notification })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MockBackend;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::TimeZone;
    use serde_json::Value;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        state: AppState,
        backend: Arc<MockBackend>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::default());
        let launch_at = Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap();
        let state = AppState {
            sessions: Arc::default(),
            backend: backend.clone(),
            artifacts: ArtifactStore::new(dir.path().join("downloads")),
            clipboard: SharedClipboard::default(),
            launch: Arc::new(Launch::load(dir.path().join("launch.json"), launch_at)),
        };
        Harness {
            app: router(state.clone(), 8 * 1024 * 1024),
            state,
            backend,
            _dir: dir,
        }
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn json_req(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn file_req(uri: &str, name: &str, mime: &str, data: &[u8]) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn open(app: &Router, feature: &str) -> String {
        let (status, body) = call(app, json_req("POST", "/api/sessions", json!({ "feature": feature }))).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn feature_catalog_lists_all_pages() {
        let h = harness();
        let (status, body) = call(&h.app, Request::get("/api/features").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 6);
        assert_eq!(body[0]["slug"], "generate-shorts");
        assert_eq!(body[0]["acceptAttr"], "video/mp4,video/mpeg,video/quicktime");
        assert_eq!(body[5]["acceptAttr"], ".srt,.vtt");
    }

    #[tokio::test]
    async fn unknown_feature_is_not_found() {
        let h = harness();
        let (status, body) = call(&h.app, json_req("POST", "/api/sessions", json!({ "feature": "memes" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Unknown feature 'memes'");
    }

    #[tokio::test]
    async fn full_shorts_flow_over_http() {
        let h = harness();
        let id = open(&h.app, "generate-shorts").await;

        let (status, body) = call(
            &h.app,
            file_req(&format!("/api/sessions/{id}/file"), "clip.mp4", "video/mp4", b"fake video"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["validation"]["state"], "valid");

        let (_, body) = call(
            &h.app,
            json_req("PUT", &format!("/api/sessions/{id}/params"), json!({ "counts": { "numShorts": 5 } })),
        )
        .await;
        assert_eq!(body["parameters"]["counts"]["numShorts"], 3);

        let (status, body) = call(
            &h.app,
            Request::post(format!("/api/sessions/{id}/submit")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["workflow"]["state"], "succeeded");
        assert_eq!(body["result"]["artifacts"].as_array().unwrap().len(), 3);
        assert_eq!(h.backend.calls(), (1, 1));

        let (status, body) = call(
            &h.app,
            Request::post(format!("/api/sessions/{id}/artifacts/0/download"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["path"].as_str().unwrap().ends_with("short_1.mp4"));
    }

    #[tokio::test]
    async fn rejected_file_returns_422_with_reason() {
        let h = harness();
        let id = open(&h.app, "hashtag-generator").await;
        let (status, body) = call(
            &h.app,
            file_req(&format!("/api/sessions/{id}/file"), "notes.txt", "text/plain", b"hi"),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Please upload only SRT or VTT subtitle files.");
        assert!(body["file"].is_null());
    }

    #[tokio::test]
    async fn server_failure_surfaces_message() {
        let h = harness();
        h.backend.respond_upload(Err(ControllerError::Server {
            status: 500,
            message: "disk full".into(),
        }));
        let id = open(&h.app, "viral-reels").await;
        call(
            &h.app,
            file_req(&format!("/api/sessions/{id}/file"), "clip.mov", "video/quicktime", b"mov"),
        )
        .await;

        let (status, body) = call(
            &h.app,
            Request::post(format!("/api/sessions/{id}/submit")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "disk full");

        let (_, snap) = call(&h.app, Request::get(format!("/api/sessions/{id}")).body(Body::empty()).unwrap()).await;
        assert_eq!(snap["workflow"], json!({ "state": "failed", "reason": "disk full" }));
    }

    #[tokio::test]
    async fn copy_hashtags_to_shared_clipboard() {
        let h = harness();
        h.backend.respond_generate(Ok(json!({ "hashtags": ["fyp", "#viral"] })));
        let id = open(&h.app, "hashtag-generator").await;
        call(
            &h.app,
            file_req(&format!("/api/sessions/{id}/file"), "talk.srt", "application/x-subrip", b"1"),
        )
        .await;
        call(
            &h.app,
            Request::post(format!("/api/sessions/{id}/submit")).body(Body::empty()).unwrap(),
        )
        .await;

        let (status, _) = call(&h.app, json_req("POST", &format!("/api/sessions/{id}/copy"), json!({ "artifact": 0 }))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = call(&h.app, Request::get("/api/clipboard").body(Body::empty()).unwrap()).await;
        assert_eq!(body["text"], "#fyp #viral");
    }

    #[tokio::test]
    async fn closed_sessions_are_gone() {
        let h = harness();
        let id = open(&h.app, "enhanced-thumbnails").await;
        let (status, _) = call(&h.app, Request::delete(format!("/api/sessions/{id}")).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&h.app, Request::get(format!("/api/sessions/{id}")).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let h = harness();
        let idle = open(&h.app, "generate-shorts").await;
        call(
            &h.app,
            file_req(&format!("/api/sessions/{idle}/file"), "clip.mp4", "video/mp4", b"fake video"),
        )
        .await;

        assert_eq!(h.state.evict_idle(Duration::from_secs(3600)), 0);
        assert_eq!(h.state.evict_idle(Duration::ZERO), 1);

        let (status, _) = call(&h.app, Request::get(format!("/api/sessions/{idle}")).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn granting_permission_before_launch() {
        let h = harness();
        let (status, body) = call(&h.app, json_req("POST", "/api/launch/permission", json!({ "decision": "granted" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"]["permission"], "granted");
        assert_eq!(body["notification"]["title"], "✅ You're all set!");

        let (_, body) = call(&h.app, Request::get("/api/launch").body(Body::empty()).unwrap()).await;
        assert_eq!(body["launched"], false);
    }
}
