use std::collections::BTreeMap;

use serde::Serialize;
use simplepage_core_types::EncodedId;

/// One node of the assembled accessibility forest.
///
/// `frame_ordinal`/`encoded_id` are assigned in pre-order during the build so
/// ordinal assignment is deterministic for a given snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct AxNode {
    pub role: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_node_id: Option<u64>,
    pub frame_ordinal: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoded_id: Option<EncodedId>,
    /// Set on iframe owners: the id of the frame whose tree nests below.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_frame_id: Option<String>,
    pub children: Vec<AxNode>,
}

impl AxNode {
    pub fn is_frame_owner(&self) -> bool {
        self.child_frame_id.is_some()
    }
}

/// Result of a snapshot build.
#[derive(Clone, Debug, Serialize)]
pub struct AxView {
    /// The indented textual outline.
    pub simplified: String,
    /// `encodedId -> absolute indexed XPath`, each path relative to the
    /// owning frame's document.
    pub xpath_map: BTreeMap<String, String>,
    /// `encodedId -> absolute URL` for resource-bearing nodes.
    pub id_to_url: BTreeMap<String, String>,
    /// The pruned forest the outline was rendered from.
    pub tree: Vec<AxNode>,
}
