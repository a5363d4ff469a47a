use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AxViewError;

/// Raw accessibility nodes for one frame, exactly as returned by the
/// debug channel (`Accessibility.getFullAXTree`).
#[derive(Clone, Debug)]
pub struct FrameAxSnapshot {
    /// `None` marks the top frame.
    pub frame_id: Option<String>,
    pub nodes: Vec<Value>,
}

/// A pierced DOM document for one attached session
/// (`DOM.getDocument` with `depth: -1, pierce: true`). Same-process iframe
/// documents ride along inside their parent's tree.
#[derive(Clone, Debug)]
pub struct FrameDomSnapshot {
    pub frame_id: Option<String>,
    pub root: Value,
}

/// Data source for the view builder. The production implementation drives
/// the CDP adapter; tests feed fixture JSON.
#[async_trait]
pub trait PerceptionPort: Send + Sync {
    /// Accessibility trees for the top frame and every attached
    /// out-of-process iframe, top frame first.
    async fn full_ax_trees(&self) -> Result<Vec<FrameAxSnapshot>, AxViewError>;

    /// Pierced DOM documents, one per attached session.
    async fn dom_documents(&self) -> Result<Vec<FrameDomSnapshot>, AxViewError>;

    /// Backend node id of the first match of a CSS scope selector, if any.
    async fn resolve_scope(&self, selector: &str) -> Result<Option<u64>, AxViewError>;
}
