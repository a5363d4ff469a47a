use serde::{Deserialize, Serialize};
use simplepage_core_types::ActionRecord;

/// Shape of `actions.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordingFile {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub actions: Vec<ActionRecord>,
}

impl RecordingFile {
    pub fn seed(id: &str, name: &str, description: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.map(|s| s.to_string()),
            actions: Vec::new(),
        }
    }
}

/// Listing entry for the recordings index.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub actions_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action_kind: Option<String>,
    /// First action's timestamp, or the directory mtime when the log is
    /// empty. Milliseconds since the Unix epoch.
    pub created_at: i64,
}

/// In-memory snapshot artifacts to be persisted next to an action.
#[derive(Clone, Debug, Default)]
pub struct SnapshotArtifacts {
    pub structure: Option<String>,
    pub xpath_map: Option<serde_json::Value>,
    pub screenshot: Option<Vec<u8>>,
}
