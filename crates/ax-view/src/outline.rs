//! Prune/fold pass and the textual rendering of the accessibility forest.

use crate::model::AxNode;

/// Roles that carry no semantics of their own. A nameless, valueless node
/// with one of these roles exists only to group others.
fn is_structural_role(role: &str) -> bool {
    matches!(
        role.to_ascii_lowercase().as_str(),
        "generic" | "none" | "presentation" | "genericcontainer" | "ignored"
    )
}

fn is_structural(node: &AxNode) -> bool {
    is_structural_role(&node.role)
        && node.name.is_empty()
        && node
            .value
            .as_deref()
            .map(|v| v.is_empty())
            .unwrap_or(true)
        && !node.is_frame_owner()
}

/// Collapse the forest: nameless generic containers fold into their sole
/// child or vanish; nodes that never received an encoded id hoist their
/// children so every emitted line can be resolved through the xpath map.
/// Stable with respect to tree order.
pub fn prune_forest(nodes: Vec<AxNode>) -> Vec<AxNode> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        out.extend(prune_node(node));
    }
    out
}

fn prune_node(mut node: AxNode) -> Vec<AxNode> {
    let children = std::mem::take(&mut node.children);
    node.children = prune_forest(children);

    if node.encoded_id.is_none() && !node.is_frame_owner() {
        return node.children;
    }

    if is_structural(&node) {
        match node.children.len() {
            0 => return Vec::new(),
            1 => return node.children,
            _ => {}
        }
    }

    vec![node]
}

/// Render the pruned forest: pre-order, two-space indent,
/// `[<encodedId>] <role>[: <content>]`.
pub fn render_outline(nodes: &[AxNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        render_node(node, 0, &mut out);
    }
    out
}

fn render_node(node: &AxNode, depth: usize, out: &mut String) {
    if let Some(encoded_id) = &node.encoded_id {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push('[');
        out.push_str(encoded_id.as_str());
        out.push_str("] ");
        out.push_str(&node.role);
        if !node.name.is_empty() {
            out.push_str(": ");
            out.push_str(&node.name);
        }
        out.push('\n');
        for child in &node.children {
            render_node(child, depth + 1, out);
        }
    } else {
        // Frame owners kept purely for stitching render their children at
        // the current depth.
        for child in &node.children {
            render_node(child, depth, out);
        }
    }
}

/// Strip control characters and collapse runs of whitespace to single
/// spaces; outline content never spans more than one line.
pub fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if ch.is_control() {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use simplepage_core_types::EncodedId;

    fn node(role: &str, name: &str, id: Option<&str>, children: Vec<AxNode>) -> AxNode {
        AxNode {
            role: role.to_string(),
            name: name.to_string(),
            value: None,
            description: None,
            backend_node_id: None,
            frame_ordinal: 0,
            encoded_id: id.map(|s| EncodedId(s.to_string())),
            child_frame_id: None,
            children,
        }
    }

    #[test]
    fn generic_with_single_child_folds_away() {
        let forest = vec![node(
            "RootWebArea",
            "Home",
            Some("0-1"),
            vec![node(
                "generic",
                "",
                Some("0-2"),
                vec![node("button", "Go", Some("0-3"), vec![])],
            )],
        )];
        let pruned = prune_forest(forest);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].children.len(), 1);
        assert_eq!(pruned[0].children[0].role, "button");
    }

    #[test]
    fn empty_generic_drops() {
        let pruned = prune_forest(vec![node("generic", "", Some("0-9"), vec![])]);
        assert!(pruned.is_empty());
    }

    #[test]
    fn named_generic_survives() {
        let pruned = prune_forest(vec![node("generic", "toolbar", Some("0-4"), vec![])]);
        assert_eq!(pruned.len(), 1);
    }

    #[test]
    fn generic_with_multiple_children_is_kept() {
        let forest = vec![node(
            "generic",
            "",
            Some("0-2"),
            vec![
                node("button", "A", Some("0-3"), vec![]),
                node("button", "B", Some("0-4"), vec![]),
            ],
        )];
        let pruned = prune_forest(forest);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].children.len(), 2);
    }

    #[test]
    fn frame_owner_is_never_pruned() {
        let mut owner = node("generic", "", Some("0-5"), vec![]);
        owner.child_frame_id = Some("frame-1".into());
        let pruned = prune_forest(vec![owner]);
        assert_eq!(pruned.len(), 1);
    }

    #[test]
    fn idless_node_hoists_children() {
        let forest = vec![node(
            "paragraph",
            "important",
            None,
            vec![node("StaticText", "hello", Some("0-6"), vec![])],
        )];
        let pruned = prune_forest(forest);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].role, "StaticText");
    }

    #[test]
    fn outline_renders_indent_and_content() {
        let forest = vec![node(
            "RootWebArea",
            "Home",
            Some("0-1"),
            vec![
                node("heading", "Welcome", Some("0-2"), vec![]),
                node("button", "", Some("0-3"), vec![]),
            ],
        )];
        let outline = render_outline(&forest);
        assert_eq!(
            outline,
            "[0-1] RootWebArea: Home\n  [0-2] heading: Welcome\n  [0-3] button\n"
        );
    }

    #[test]
    fn clean_text_normalizes_whitespace_and_controls() {
        assert_eq!(clean_text("  hello\n\tworld\u{7}  "), "hello world");
        assert_eq!(clean_text("one  two"), "one two");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn pruning_is_stable_across_repeated_runs() {
        let forest = vec![node(
            "RootWebArea",
            "",
            Some("0-1"),
            vec![
                node("generic", "", Some("0-2"), vec![node("link", "a", Some("0-3"), vec![])]),
                node("generic", "", Some("0-4"), vec![]),
                node("StaticText", "tail", Some("0-5"), vec![]),
            ],
        )];
        let once = prune_forest(forest.clone());
        let twice = prune_forest(once.clone());
        assert_eq!(render_outline(&once), render_outline(&twice));
        assert_eq!(
            render_outline(&once),
            "[0-1] RootWebArea\n  [0-3] link: a\n  [0-5] StaticText: tail\n"
        );
    }
}
