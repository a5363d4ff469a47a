//! Recording listing, artifact serving and replay.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use simplepage_core_types::ActionRecord;

use super::ServeState;
use crate::errors::{ControlError, ErrorKind};
use crate::manager::RecordingDetail;
use crate::replay::{self, ReplayOptions, ReplayResult};

pub async fn list(State(state): State<ServeState>) -> Json<Value> {
    Json(json!(state.manager.list_recordings()))
}

pub async fn detail(
    State(state): State<ServeState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ControlError> {
    match state.manager.read_recording(&id)? {
        Some(RecordingDetail::Disabled) => Ok(Json(json!({
            "recordingEnabled": false,
            "message": "recording is disabled for this page",
        }))),
        Some(RecordingDetail::Found {
            file,
            base_path,
            data_path,
        }) => Ok(Json(json!({
            "id": file.id,
            "name": file.name,
            "description": file.description,
            "actions": file.actions,
            "basePath": base_path.display().to_string(),
            "dataPath": data_path.display().to_string(),
        }))),
        None => Err(ControlError::recording_not_found(&id)),
    }
}

/// Raw artifact bytes, typed by extension.
pub async fn file(
    State(state): State<ServeState>,
    Path((id, filename)): Path<(String, String)>,
) -> Result<impl IntoResponse, ControlError> {
    let path = state.manager.recording_file_path(&id, &filename, false)?;
    let bytes = std::fs::read(&path)
        .map_err(|err| ControlError::new(ErrorKind::FilesystemError, err.to_string()))?;
    Ok(([(header::CONTENT_TYPE, content_type(&filename))], bytes))
}

/// The typed `data/` endpoint: list JSON or element HTML only.
pub async fn data(
    State(state): State<ServeState>,
    Path((id, filename)): Path<(String, String)>,
) -> Result<impl IntoResponse, ControlError> {
    let path = state.manager.recording_file_path(&id, &filename, true)?;
    let bytes = std::fs::read(&path)
        .map_err(|err| ControlError::new(ErrorKind::FilesystemError, err.to_string()))?;
    let content_type = if filename.ends_with("-list.json") {
        "application/json"
    } else {
        "text/html; charset=utf-8"
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

fn content_type(filename: &str) -> &'static str {
    if filename.ends_with(".json") {
        "application/json"
    } else if filename.ends_with(".html") {
        "text/html; charset=utf-8"
    } else if filename.ends_with(".png") {
        "image/png"
    } else {
        "text/plain; charset=utf-8"
    }
}

#[derive(Deserialize)]
pub struct ReplayBody {
    pub actions: Vec<ActionRecord>,
    #[serde(default)]
    pub options: Option<ReplayOptions>,
}

pub async fn replay(
    State(state): State<ServeState>,
    Json(body): Json<ReplayBody>,
) -> Result<Json<ReplayResult>, ControlError> {
    if body.actions.is_empty() {
        return Err(ControlError::bad_request("replay requires at least one action"));
    }
    let manager = state.manager.clone();
    let options = body.options.unwrap_or_default();
    let result = super::run_detached(async move {
        Ok(replay::replay(manager.as_ref(), &body.actions, &options).await)
    })
    .await?;
    Ok(Json(result))
}
