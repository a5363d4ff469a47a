//! Session recorder: the per-page on-disk action log plus its snapshot
//! artifacts.
//!
//! Layout per page: `<root>/simplepage/<pageId>/actions.json` and
//! `<root>/simplepage/<pageId>/data/<ts>-*.{txt,json,png,html}`. Actions
//! reference artifacts by bare filename; the directory outlives the page and
//! is only removed by an explicit delete.

pub mod console;
pub mod errors;
pub mod layout;
pub mod model;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use simplepage_core_types::ActionRecord;
use tracing::debug;

pub use console::ConsoleSink;
pub use errors::RecorderError;
pub use model::{RecordingFile, RecordingSummary, SnapshotArtifacts};

pub struct SessionRecorder {
    dir: PathBuf,
    data_dir: PathBuf,
    log: Mutex<RecordingFile>,
    last_ts: AtomicI64,
}

impl SessionRecorder {
    /// Open (or seed) the recording for a page. An existing `actions.json`
    /// is loaded so a restarted service appends rather than truncates.
    pub fn open(
        root: &Path,
        page_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Self, RecorderError> {
        let dir = layout::recording_dir(root, page_id);
        let data_dir = layout::data_dir(&dir);
        std::fs::create_dir_all(&data_dir)?;

        let recording = match store::load_recording(&dir)? {
            Some(existing) => existing,
            None => {
                let seeded = RecordingFile::seed(page_id, name, description);
                store::save_recording(&dir, &seeded)?;
                seeded
            }
        };

        let last_ts = recording
            .actions
            .last()
            .map(|a| a.timestamp)
            .unwrap_or(0);

        Ok(Self {
            dir,
            data_dir,
            log: Mutex::new(recording),
            last_ts: AtomicI64::new(last_ts),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn actions_path(&self) -> PathBuf {
        layout::actions_path(&self.dir)
    }

    pub fn action_count(&self) -> usize {
        self.log.lock().actions.len()
    }

    /// Next action timestamp: wall clock, bumped to stay strictly ahead of
    /// the previous action so artifact filenames never collide.
    pub fn next_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.last_ts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .map(|last| now.max(last + 1))
            .unwrap_or(now)
    }

    /// Persist the snapshot artifacts, fill the record's filename fields and
    /// append it, rewriting `actions.json` as a whole.
    pub fn append(
        &self,
        mut record: ActionRecord,
        artifacts: SnapshotArtifacts,
    ) -> Result<ActionRecord, RecorderError> {
        let ts = record.timestamp;

        if let Some(structure) = &artifacts.structure {
            let name = layout::structure_name(ts);
            store::write_atomic(&self.data_dir.join(&name), structure.as_bytes())?;
            record.structure = Some(name);
        }
        if let Some(xpath_map) = &artifacts.xpath_map {
            let name = layout::xpath_name(ts);
            let mut bytes = serde_json::to_vec_pretty(xpath_map)?;
            bytes.push(b'\n');
            store::write_atomic(&self.data_dir.join(&name), &bytes)?;
            record.xpath_map = Some(name);
        }
        if let Some(screenshot) = &artifacts.screenshot {
            let name = layout::screenshot_name(ts);
            store::write_atomic(&self.data_dir.join(&name), screenshot)?;
            record.screenshot = Some(name);
        }

        let mut log = self.log.lock();
        log.actions.push(record.clone());
        store::save_recording(&self.dir, &log)?;
        debug!(
            target: "session-recorder",
            kind = record.kind.as_str(),
            ts,
            total = log.actions.len(),
            "action appended"
        );
        Ok(record)
    }

    /// Write a list-extraction artifact and return its filename.
    pub fn write_list_file(&self, ts: i64, items: &[String]) -> Result<String, RecorderError> {
        let name = layout::list_name(ts);
        let mut bytes = serde_json::to_vec_pretty(items)?;
        bytes.push(b'\n');
        store::write_atomic(&self.data_dir.join(&name), &bytes)?;
        Ok(name)
    }

    pub fn write_element_file(&self, ts: i64, html: &str) -> Result<String, RecorderError> {
        let name = layout::element_name(ts);
        store::write_atomic(&self.data_dir.join(&name), html.as_bytes())?;
        Ok(name)
    }

    pub fn write_page_html(&self, ts: i64, html: &str) -> Result<String, RecorderError> {
        let name = layout::page_html_name(ts);
        store::write_atomic(&self.data_dir.join(&name), html.as_bytes())?;
        Ok(name)
    }

    pub fn write_axtree(&self, ts: i64, tree: &serde_json::Value) -> Result<String, RecorderError> {
        let name = layout::axtree_name(ts);
        let mut bytes = serde_json::to_vec_pretty(tree)?;
        bytes.push(b'\n');
        store::write_atomic(&self.data_dir.join(&name), &bytes)?;
        Ok(name)
    }

    pub fn open_console(&self, ts: i64) -> Result<ConsoleSink, RecorderError> {
        ConsoleSink::open(&self.dir, ts)
    }

    /// Remove one action and every artifact file it references. Missing
    /// files are a no-op; a bad index is an error.
    pub fn delete_action(&self, index: usize) -> Result<(), RecorderError> {
        let mut log = self.log.lock();
        if index >= log.actions.len() {
            return Err(RecorderError::IndexOutOfRange(index));
        }
        let removed = log.actions.remove(index);
        for name in [
            removed.structure.as_deref(),
            removed.xpath_map.as_deref(),
            removed.screenshot.as_deref(),
            removed.list_file.as_deref(),
            removed.element_file.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            store::remove_artifact(&self.data_dir, name);
        }
        store::save_recording(&self.dir, &log)
    }

    /// Remove the whole recording directory.
    pub fn delete_all(&self) -> Result<(), RecorderError> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        self.log.lock().actions.clear();
        Ok(())
    }

    pub fn snapshot(&self) -> RecordingFile {
        self.log.lock().clone()
    }
}

/// Index every recording under the root.
pub fn list_recordings(root: &Path) -> Vec<RecordingSummary> {
    store::scan_recordings(root)
}

/// Load one recording by id; `None` when the folder or log is missing.
pub fn read_recording(root: &Path, id: &str) -> Result<Option<RecordingFile>, RecorderError> {
    match store::recording_dir_for(root, id) {
        Some(dir) => store::load_recording(&dir),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simplepage_core_types::{ActionKind, ActionRecord};
    use tempfile::tempdir;

    fn record(kind: ActionKind, ts: i64) -> ActionRecord {
        ActionRecord::new(kind, ts)
    }

    fn artifacts() -> SnapshotArtifacts {
        SnapshotArtifacts {
            structure: Some("[0-1] RootWebArea\n".into()),
            xpath_map: Some(serde_json::json!({ "0-1": "/html[1]" })),
            screenshot: None,
        }
    }

    #[test]
    fn seeds_and_reloads_actions_json() {
        let root = tempdir().unwrap();
        {
            let recorder = SessionRecorder::open(root.path(), "p-1", "demo", Some("d")).unwrap();
            let ts = recorder.next_timestamp();
            recorder
                .append(record(ActionKind::Create, ts), artifacts())
                .unwrap();
        }
        let recorder = SessionRecorder::open(root.path(), "p-1", "demo", Some("d")).unwrap();
        assert_eq!(recorder.action_count(), 1);
        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.name, "demo");
        assert_eq!(snapshot.actions[0].kind, ActionKind::Create);
    }

    #[test]
    fn append_writes_snapshot_trio_files() {
        let root = tempdir().unwrap();
        let recorder = SessionRecorder::open(root.path(), "p-2", "demo", None).unwrap();
        let ts = recorder.next_timestamp();
        let appended = recorder
            .append(record(ActionKind::Navigate, ts), artifacts())
            .unwrap();

        let structure = appended.structure.unwrap();
        let xpath = appended.xpath_map.unwrap();
        assert_eq!(structure, format!("{ts}-structure.txt"));
        assert!(recorder.data_dir().join(&structure).exists());
        assert!(recorder.data_dir().join(&xpath).exists());
        // Filenames only, never paths.
        assert!(!structure.contains('/'));
    }

    #[test]
    fn actions_json_is_two_space_pretty() {
        let root = tempdir().unwrap();
        let recorder = SessionRecorder::open(root.path(), "p-3", "demo", None).unwrap();
        let ts = recorder.next_timestamp();
        recorder
            .append(record(ActionKind::Wait, ts), SnapshotArtifacts::default())
            .unwrap();
        let raw = std::fs::read_to_string(recorder.actions_path()).unwrap();
        assert!(raw.contains("\n  \"actions\": ["));
        assert!(raw.contains("\n      \"kind\": \"wait\""));
    }

    #[test]
    fn timestamps_strictly_increase() {
        let root = tempdir().unwrap();
        let recorder = SessionRecorder::open(root.path(), "p-4", "demo", None).unwrap();
        let a = recorder.next_timestamp();
        let b = recorder.next_timestamp();
        let c = recorder.next_timestamp();
        assert!(a < b && b < c);
    }

    #[test]
    fn delete_action_removes_entry_and_artifacts() {
        let root = tempdir().unwrap();
        let recorder = SessionRecorder::open(root.path(), "p-5", "demo", None).unwrap();
        let ts = recorder.next_timestamp();
        let appended = recorder
            .append(record(ActionKind::Act, ts), artifacts())
            .unwrap();
        let structure_path = recorder.data_dir().join(appended.structure.unwrap());
        assert!(structure_path.exists());

        recorder.delete_action(0).unwrap();
        assert_eq!(recorder.action_count(), 0);
        assert!(!structure_path.exists());

        assert!(matches!(
            recorder.delete_action(0),
            Err(RecorderError::IndexOutOfRange(0))
        ));
    }

    #[test]
    fn delete_all_removes_directory() {
        let root = tempdir().unwrap();
        let recorder = SessionRecorder::open(root.path(), "p-6", "demo", None).unwrap();
        let ts = recorder.next_timestamp();
        recorder
            .append(record(ActionKind::Create, ts), artifacts())
            .unwrap();
        assert!(recorder.dir().exists());

        recorder.delete_all().unwrap();
        assert!(!recorder.dir().exists());
    }

    #[test]
    fn listing_summarizes_recordings() {
        let root = tempdir().unwrap();
        let recorder = SessionRecorder::open(root.path(), "p-7", "first", None).unwrap();
        let ts = recorder.next_timestamp();
        recorder
            .append(record(ActionKind::Create, ts), SnapshotArtifacts::default())
            .unwrap();
        let ts2 = recorder.next_timestamp();
        recorder
            .append(record(ActionKind::Close, ts2), SnapshotArtifacts::default())
            .unwrap();

        let listed = list_recordings(root.path());
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "p-7");
        assert_eq!(listed[0].actions_count, 2);
        assert_eq!(listed[0].last_action_kind.as_deref(), Some("close"));
        assert_eq!(listed[0].created_at, ts);

        let loaded = read_recording(root.path(), "p-7").unwrap().unwrap();
        assert_eq!(loaded.actions.len(), 2);
        assert!(read_recording(root.path(), "missing").unwrap().is_none());
    }
}
