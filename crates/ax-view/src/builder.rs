//! Snapshot assembly: raw AX nodes + DOM index in, [`AxView`] out.
//!
//! The async half only gathers data; everything after
//! [`RawSnapshot`] is a pure function of the gathered JSON plus the frame
//! registry, which keeps the output deterministic and lets the caller hold
//! its registry lock without spanning an await.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use simplepage_core_types::FrameRegistry;
use tracing::warn;
use url::Url;

use crate::dom::DomIndex;
use crate::errors::AxViewError;
use crate::model::{AxNode, AxView};
use crate::outline::{clean_text, prune_forest, render_outline};
use crate::ports::{FrameAxSnapshot, PerceptionPort};

/// Everything the assembly step needs, gathered up front.
pub struct RawSnapshot {
    pub ax_trees: Vec<FrameAxSnapshot>,
    pub dom_index: DomIndex,
    pub scope_backend_id: Option<u64>,
    pub scope_selector: Option<String>,
}

/// Gather AX trees, DOM documents and the optional scope target.
///
/// AX/DOM acquisition failures are fatal; a scope selector that fails to
/// resolve is not (the full tree is used instead).
pub async fn fetch_snapshot(
    port: &dyn PerceptionPort,
    scope_selector: Option<&str>,
) -> Result<RawSnapshot, AxViewError> {
    let ax_trees = port.full_ax_trees().await?;
    let documents = port.dom_documents().await?;
    let dom_index = DomIndex::from_documents(&documents);

    let scope_backend_id = match scope_selector {
        Some(selector) => match port.resolve_scope(selector).await {
            Ok(found) => found,
            Err(err) => {
                warn!(target: "ax-view", %err, selector, "scope resolution failed");
                None
            }
        },
        None => None,
    };

    Ok(RawSnapshot {
        ax_trees,
        dom_index,
        scope_backend_id,
        scope_selector: scope_selector.map(|s| s.to_string()),
    })
}

/// Assemble the view from gathered data. Pure apart from the registry's
/// ordinal assignment, which is itself deterministic in pre-order.
pub fn assemble_view(raw: &RawSnapshot, registry: &mut FrameRegistry) -> Result<AxView, AxViewError> {
    if raw.ax_trees.is_empty() {
        return Err(AxViewError::ExtractionFailed(
            "no accessibility trees returned".into(),
        ));
    }

    // Per-frame trees, top frame first.
    let mut frame_forests: Vec<(Option<String>, Vec<AxNode>)> = Vec::new();
    for snapshot in &raw.ax_trees {
        let forest = assemble_frame(snapshot, &raw.dom_index);
        frame_forests.push((snapshot.frame_id.clone(), forest));
    }

    // Stitch out-of-process frames under their owning iframe nodes.
    let mut stitched: HashSet<usize> = HashSet::new();
    let (top, rest) = frame_forests.split_at_mut(1);
    let mut forest = std::mem::take(&mut top[0].1);
    for node in forest.iter_mut() {
        stitch_frames(node, rest, &mut stitched);
    }
    // Frames nobody claimed still surface, as extra roots.
    for (idx, (frame_id, subtree)) in rest.iter_mut().enumerate() {
        if !stitched.contains(&idx) && !subtree.is_empty() {
            warn!(
                target: "ax-view",
                frame = frame_id.as_deref().unwrap_or(""),
                "frame tree had no owning iframe node"
            );
            forest.append(subtree);
        }
    }

    // Pre-order encoded-id assignment plus both maps.
    let mut xpath_map = BTreeMap::new();
    let mut id_to_url = BTreeMap::new();
    for node in forest.iter_mut() {
        assign_ids(node, None, registry, &raw.dom_index, &mut xpath_map, &mut id_to_url);
    }

    // Scope restriction happens after assignment so ordinals do not depend
    // on the caller's selector.
    let scoped = match raw.scope_backend_id {
        Some(backend) => match find_subtree(&forest, backend) {
            Some(subtree) => vec![subtree],
            None => {
                warn!(
                    target: "ax-view",
                    selector = raw.scope_selector.as_deref().unwrap_or(""),
                    "scope selector matched no accessibility node; using full tree"
                );
                forest
            }
        },
        None => forest,
    };

    let tree = prune_forest(scoped);
    let simplified = render_outline(&tree);

    Ok(AxView {
        simplified,
        xpath_map,
        id_to_url,
        tree,
    })
}

/// Convenience wrapper for callers that own their registry.
pub async fn build_view(
    port: &dyn PerceptionPort,
    scope_selector: Option<&str>,
    registry: &mut FrameRegistry,
) -> Result<AxView, AxViewError> {
    let raw = fetch_snapshot(port, scope_selector).await?;
    assemble_view(&raw, registry)
}

struct ParsedAx {
    role: String,
    name: String,
    description: Option<String>,
    value: Option<String>,
    ignored: bool,
    backend: Option<u64>,
    child_ids: Vec<String>,
}

fn parse_ax_node(raw: &Value) -> Option<(String, ParsedAx)> {
    let id = raw.get("nodeId").and_then(|v| v.as_str())?.to_string();
    let role = raw
        .get("role")
        .and_then(|r| r.get("value"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let name = raw
        .get("name")
        .and_then(|n| n.get("value"))
        .and_then(|v| v.as_str())
        .map(clean_text)
        .unwrap_or_default();
    let description = raw
        .get("description")
        .and_then(|d| d.get("value"))
        .and_then(|v| v.as_str())
        .map(clean_text)
        .filter(|s| !s.is_empty());
    let value = raw
        .get("value")
        .and_then(|d| d.get("value"))
        .and_then(|v| v.as_str())
        .map(clean_text)
        .filter(|s| !s.is_empty());
    let ignored = raw.get("ignored").and_then(|v| v.as_bool()).unwrap_or(false);
    let backend = raw.get("backendDOMNodeId").and_then(|v| v.as_u64());
    let child_ids = raw
        .get("childIds")
        .and_then(|v| v.as_array())
        .map(|ids| {
            ids.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    Some((
        id,
        ParsedAx {
            role,
            name,
            description,
            value,
            ignored,
            backend,
            child_ids,
        },
    ))
}

/// Build one frame's tree from its flat node list. Ignored nodes and
/// InlineTextBox leaves hoist or drop; roots are the nodes nothing
/// references.
fn assemble_frame(snapshot: &FrameAxSnapshot, dom_index: &DomIndex) -> Vec<AxNode> {
    let mut table: HashMap<String, ParsedAx> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut referenced: HashSet<String> = HashSet::new();

    for raw in &snapshot.nodes {
        if let Some((id, parsed)) = parse_ax_node(raw) {
            for child in &parsed.child_ids {
                referenced.insert(child.clone());
            }
            order.push(id.clone());
            table.insert(id, parsed);
        }
    }

    let mut forest = Vec::new();
    for id in &order {
        if !referenced.contains(id) {
            forest.extend(materialize(id, &table, dom_index));
        }
    }
    forest
}

fn materialize(
    id: &str,
    table: &HashMap<String, ParsedAx>,
    dom_index: &DomIndex,
) -> Vec<AxNode> {
    let Some(parsed) = table.get(id) else {
        return Vec::new();
    };

    let mut children = Vec::new();
    for child_id in &parsed.child_ids {
        children.extend(materialize(child_id, table, dom_index));
    }

    if parsed.ignored || parsed.role.eq_ignore_ascii_case("inlinetextbox") {
        return children;
    }

    // Prefer the accessible name, fall back to the description.
    let name = if parsed.name.is_empty() {
        parsed.description.clone().unwrap_or_default()
    } else {
        parsed.name.clone()
    };

    let child_frame_id = parsed
        .backend
        .and_then(|backend| dom_index.get(backend))
        .and_then(|entry| entry.child_frame_id.clone());

    vec![AxNode {
        role: parsed.role.clone(),
        name,
        value: parsed.value.clone(),
        description: parsed.description.clone(),
        backend_node_id: parsed.backend,
        frame_ordinal: 0,
        encoded_id: None,
        child_frame_id,
        children,
    }]
}

/// Attach out-of-process frame forests beneath their owning iframe nodes.
fn stitch_frames(
    node: &mut AxNode,
    frames: &mut [(Option<String>, Vec<AxNode>)],
    stitched: &mut HashSet<usize>,
) {
    if let Some(child_frame) = node.child_frame_id.clone() {
        for (idx, (frame_id, subtree)) in frames.iter_mut().enumerate() {
            if !stitched.contains(&idx) && frame_id.as_deref() == Some(child_frame.as_str()) {
                node.children.append(subtree);
                stitched.insert(idx);
                break;
            }
        }
    }
    for child in node.children.iter_mut() {
        stitch_frames(child, frames, stitched);
    }
}

const URL_ROLES: &[&str] = &["link", "image", "img", "video", "audio"];

fn assign_ids(
    node: &mut AxNode,
    inherited_frame: Option<&str>,
    registry: &mut FrameRegistry,
    dom_index: &DomIndex,
    xpath_map: &mut BTreeMap<String, String>,
    id_to_url: &mut BTreeMap<String, String>,
) {
    let entry = node.backend_node_id.and_then(|b| dom_index.get(b));
    let frame: Option<String> = entry
        .map(|e| e.frame_id.clone())
        .unwrap_or_else(|| inherited_frame.map(|s| s.to_string()));

    node.frame_ordinal = registry.ordinal(frame.as_deref());

    if let (Some(backend), Some(entry)) = (node.backend_node_id, entry) {
        let encoded = registry.encode(frame.as_deref(), backend);
        xpath_map.insert(encoded.0.clone(), entry.xpath.clone());

        if URL_ROLES.iter().any(|r| node.role.eq_ignore_ascii_case(r)) {
            let attr = if node.role.eq_ignore_ascii_case("link") {
                "href"
            } else {
                "src"
            };
            if let Some(value) = entry.attributes.get(attr) {
                let absolute = entry
                    .document_url
                    .as_deref()
                    .and_then(|base| Url::parse(base).ok())
                    .and_then(|base| base.join(value).ok())
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| value.clone());
                id_to_url.insert(encoded.0.clone(), absolute);
            }
        }

        node.encoded_id = Some(encoded);
    }

    // The frame a child inherits switches at frame-owner boundaries.
    let child_frame: Option<String> = node.child_frame_id.clone().or(frame);
    for child in node.children.iter_mut() {
        assign_ids(
            child,
            child_frame.as_deref(),
            registry,
            dom_index,
            xpath_map,
            id_to_url,
        );
    }
}

fn find_subtree(forest: &[AxNode], backend: u64) -> Option<AxNode> {
    for node in forest {
        if node.backend_node_id == Some(backend) {
            return Some(node.clone());
        }
        if let Some(found) = find_subtree(&node.children, backend) {
            return Some(found);
        }
    }
    None
}
