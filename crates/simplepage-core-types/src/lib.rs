//! Shared vocabulary for the simplepage control plane.
//!
//! Hosts the identifier newtypes, the per-page frame-ordinal registry that
//! mints encoded element ids, the persisted action model, and the selector
//! dialect test used by the HTML-extraction endpoints.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a managed page. String form of a v4 UUID so it can
/// double as a directory name under the recordings root.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PageId(pub String);

impl PageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Element handle of the form `"<frameOrdinal>-<backendNodeId>"`.
///
/// Valid only within the snapshot that produced it; the xpath map is the
/// stable bridge across snapshots.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct EncodedId(pub String);

impl EncodedId {
    pub fn new(ordinal: u32, backend_node_id: u64) -> Self {
        Self(format!("{ordinal}-{backend_node_id}"))
    }

    /// Split back into `(frame ordinal, backend node id)`.
    pub fn parse(&self) -> Result<(u32, u64), EncodedIdError> {
        let (ord, backend) = self
            .0
            .split_once('-')
            .ok_or_else(|| EncodedIdError::Malformed(self.0.clone()))?;
        let ordinal = ord
            .parse::<u32>()
            .map_err(|_| EncodedIdError::Malformed(self.0.clone()))?;
        let backend = backend
            .parse::<u64>()
            .map_err(|_| EncodedIdError::Malformed(self.0.clone()))?;
        Ok((ordinal, backend))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EncodedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum EncodedIdError {
    #[error("malformed encoded id '{0}'")]
    Malformed(String),
}

/// Per-page registry mapping browser frame ids to small stable ordinals.
///
/// The top frame is always ordinal 0 (keyed by `None`). Real frame ids are
/// assigned `len()` on first sighting and keep that ordinal until the page
/// closes or [`FrameRegistry::reset`] runs, which happens exactly when a new
/// top-frame id is observed on (re)navigation.
#[derive(Debug)]
pub struct FrameRegistry {
    ordinals: HashMap<Option<String>, u32>,
    top_frame_id: Option<String>,
}

impl FrameRegistry {
    pub fn new() -> Self {
        let mut ordinals = HashMap::new();
        ordinals.insert(None, 0);
        Self {
            ordinals,
            top_frame_id: None,
        }
    }

    /// Ordinal for a frame id, assigning the next one on first sighting.
    pub fn ordinal(&mut self, frame_id: Option<&str>) -> u32 {
        match frame_id {
            None => 0,
            Some(id) if self.top_frame_id.as_deref() == Some(id) => 0,
            Some(id) => {
                if let Some(existing) = self.ordinals.get(&Some(id.to_string())) {
                    return *existing;
                }
                let next = self.ordinals.len() as u32;
                self.ordinals.insert(Some(id.to_string()), next);
                next
            }
        }
    }

    pub fn encode(&mut self, frame_id: Option<&str>, backend_node_id: u64) -> EncodedId {
        EncodedId::new(self.ordinal(frame_id), backend_node_id)
    }

    /// Record the current top-frame id. Returns `true` (after reinitialising
    /// the ordinal table) when the id changed, i.e. the page navigated to a
    /// new document.
    pub fn observe_top_frame(&mut self, frame_id: &str) -> bool {
        if self.top_frame_id.as_deref() == Some(frame_id) {
            return false;
        }
        self.reset();
        self.top_frame_id = Some(frame_id.to_string());
        true
    }

    /// Frame id behind an ordinal. Ordinal 0 is the top frame and always
    /// resolves to `Some(None)`; unknown ordinals resolve to `None`.
    pub fn frame_for_ordinal(&self, ordinal: u32) -> Option<Option<String>> {
        if ordinal == 0 {
            return Some(None);
        }
        self.ordinals
            .iter()
            .find(|(_, assigned)| **assigned == ordinal)
            .map(|(frame, _)| frame.clone())
    }

    /// Drop every assigned ordinal, keeping only the `None -> 0` seed.
    pub fn reset(&mut self) {
        self.ordinals.clear();
        self.ordinals.insert(None, 0);
        self.top_frame_id = None;
    }

    pub fn len(&self) -> usize {
        self.ordinals.len()
    }
}

impl Default for FrameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Persisted action kinds, serialized in the wire spelling used by
/// `actions.json`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Create,
    Navigate,
    NavigateBack,
    NavigateForward,
    Reload,
    Wait,
    Condition,
    Act,
    GetListHtml,
    GetListHtmlByParent,
    GetElementHtml,
    Close,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Navigate => "navigate",
            ActionKind::NavigateBack => "navigateBack",
            ActionKind::NavigateForward => "navigateForward",
            ActionKind::Reload => "reload",
            ActionKind::Wait => "wait",
            ActionKind::Condition => "condition",
            ActionKind::Act => "act",
            ActionKind::GetListHtml => "getListHtml",
            ActionKind::GetListHtmlByParent => "getListHtmlByParent",
            ActionKind::GetElementHtml => "getElementHtml",
            ActionKind::Close => "close",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a recording's action log.
///
/// Artifact fields hold bare filenames under the recording's `data/`
/// directory, never paths.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub kind: ActionKind,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoded_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpath_map: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_scripts: Option<Vec<String>>,
}

impl ActionRecord {
    pub fn new(kind: ActionKind, timestamp: i64) -> Self {
        Self {
            kind,
            timestamp,
            url: None,
            description: None,
            method: None,
            xpath: None,
            encoded_id: None,
            args: None,
            timeout: None,
            selector: None,
            pattern: None,
            flags: None,
            matched: None,
            success: None,
            error: None,
            count: None,
            structure: None,
            xpath_map: None,
            screenshot: None,
            list_file: None,
            element_file: None,
            post_scripts: None,
        }
    }
}

/// Selector dialect accepted by the extraction endpoints.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SelectorKind {
    Css,
    XPath,
}

impl SelectorKind {
    /// Prefix test: `/`, `(` or a `::` axis marks an XPath, anything else is
    /// treated as CSS.
    pub fn detect(selector: &str) -> Self {
        let trimmed = selector.trim_start();
        if trimmed.starts_with('/') || trimmed.starts_with('(') || trimmed.contains("::") {
            SelectorKind::XPath
        } else {
            SelectorKind::Css
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_frame_is_ordinal_zero() {
        let mut registry = FrameRegistry::new();
        assert_eq!(registry.ordinal(None), 0);
        assert_eq!(registry.encode(None, 42).as_str(), "0-42");
    }

    #[test]
    fn ordinals_are_assigned_in_sighting_order() {
        let mut registry = FrameRegistry::new();
        assert_eq!(registry.ordinal(Some("frame-a")), 1);
        assert_eq!(registry.ordinal(Some("frame-b")), 2);
        assert_eq!(registry.ordinal(Some("frame-a")), 1);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn observed_top_frame_maps_to_zero() {
        let mut registry = FrameRegistry::new();
        registry.observe_top_frame("top");
        assert_eq!(registry.ordinal(Some("top")), 0);
        assert_eq!(registry.ordinal(Some("child")), 1);
    }

    #[test]
    fn new_top_frame_resets_ordinals() {
        let mut registry = FrameRegistry::new();
        registry.observe_top_frame("top-1");
        registry.ordinal(Some("child-1"));
        assert_eq!(registry.len(), 2);

        assert!(registry.observe_top_frame("top-2"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.ordinal(Some("child-1")), 1);

        assert!(!registry.observe_top_frame("top-2"));
    }

    #[test]
    fn encoded_id_round_trips() {
        let id = EncodedId::new(3, 1701);
        assert_eq!(id.as_str(), "3-1701");
        assert_eq!(id.parse().unwrap(), (3, 1701));
        assert!(EncodedId("nonsense".into()).parse().is_err());
        assert!(EncodedId("1-".into()).parse().is_err());
    }

    #[test]
    fn action_kind_wire_spelling() {
        let json = serde_json::to_string(&ActionKind::NavigateBack).unwrap();
        assert_eq!(json, "\"navigateBack\"");
        let kind: ActionKind = serde_json::from_str("\"getListHtmlByParent\"").unwrap();
        assert_eq!(kind, ActionKind::GetListHtmlByParent);
    }

    #[test]
    fn action_record_skips_empty_fields() {
        let record = ActionRecord::new(ActionKind::Wait, 1_000);
        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert!(obj.contains_key("kind"));
        assert!(obj.contains_key("timestamp"));
    }

    #[test]
    fn selector_dialect_detection() {
        assert_eq!(SelectorKind::detect("//ul[1]/li"), SelectorKind::XPath);
        assert_eq!(SelectorKind::detect("(//a)[2]"), SelectorKind::XPath);
        assert_eq!(
            SelectorKind::detect("descendant::div"),
            SelectorKind::XPath
        );
        assert_eq!(SelectorKind::detect("ul > li.item"), SelectorKind::Css);
        assert_eq!(SelectorKind::detect("#main"), SelectorKind::Css);
    }
}
