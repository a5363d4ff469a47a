//! Events fanned out to WebSocket subscribers.

use serde::Serialize;
use simplepage_core_types::ActionRecord;

/// Summary of a live page, shared by the REST payloads and the broadcast
/// envelope.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_log_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Broadcast envelope: serializes as `{"type": "...", "data": {...}}`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ControlEvent {
    PageCreated(PageInfo),
    PageClosed { id: String },
    ActionRecorded(ActionBroadcast),
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBroadcast {
    pub page_id: String,
    pub action: ActionRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use simplepage_core_types::ActionKind;

    #[test]
    fn envelope_shape_matches_the_wire_contract() {
        let event = ControlEvent::PageClosed { id: "p-1".into() };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "page-closed");
        assert_eq!(value["data"]["id"], "p-1");

        let event = ControlEvent::ActionRecorded(ActionBroadcast {
            page_id: "p-2".into(),
            action: ActionRecord::new(ActionKind::Navigate, 7),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "action-recorded");
        assert_eq!(value["data"]["pageId"], "p-2");
        assert_eq!(value["data"]["action"]["kind"], "navigate");
    }
}
