//! Filesystem primitives: atomic writes and the recordings index scan.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::errors::RecorderError;
use crate::layout;
use crate::model::{RecordingFile, RecordingSummary};

/// Write via a temp file + rename so readers never observe a torn file.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), RecorderError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(tmp, path)?;
    Ok(())
}

pub fn load_recording(dir: &Path) -> Result<Option<RecordingFile>, RecorderError> {
    let path = layout::actions_path(dir);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Persist `actions.json`, pretty-printed with two-space indentation.
pub fn save_recording(dir: &Path, recording: &RecordingFile) -> Result<(), RecorderError> {
    let mut bytes = serde_json::to_vec_pretty(recording)?;
    bytes.push(b'\n');
    write_atomic(&layout::actions_path(dir), &bytes)
}

/// Remove an artifact if it exists; missing files are not an error.
pub fn remove_artifact(data_dir: &Path, name: &str) {
    let path = data_dir.join(name);
    if path.exists() {
        if let Err(err) = fs::remove_file(&path) {
            warn!(target: "session-recorder", %err, path = %path.display(), "artifact removal failed");
        }
    }
}

/// Scan the recordings root for page folders carrying an `actions.json`.
pub fn scan_recordings(root: &Path) -> Vec<RecordingSummary> {
    let base = root.join("simplepage");
    let Ok(entries) = fs::read_dir(&base) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        match load_recording(&dir) {
            Ok(Some(recording)) => {
                let created_at = recording
                    .actions
                    .first()
                    .map(|a| a.timestamp)
                    .unwrap_or_else(|| dir_mtime_ms(&dir));
                out.push(RecordingSummary {
                    id: recording.id,
                    name: recording.name,
                    description: recording.description,
                    actions_count: recording.actions.len(),
                    last_action_kind: recording
                        .actions
                        .last()
                        .map(|a| a.kind.as_str().to_string()),
                    created_at,
                });
            }
            Ok(None) => {}
            Err(err) => {
                warn!(
                    target: "session-recorder",
                    %err,
                    dir = %dir.display(),
                    "skipping unreadable recording"
                );
            }
        }
    }
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    out
}

pub fn recording_dir_for(root: &Path, id: &str) -> Option<PathBuf> {
    let dir = layout::recording_dir(root, id);
    layout::actions_path(&dir).exists().then_some(dir)
}

fn dir_mtime_ms(dir: &Path) -> i64 {
    fs::metadata(dir)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|mtime| {
            mtime
                .duration_since(std::time::UNIX_EPOCH)
                .ok()
                .map(|d| d.as_millis() as i64)
        })
        .unwrap_or(0)
}
