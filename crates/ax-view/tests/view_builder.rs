//! End-to-end builder tests over fixture AX/DOM snapshots.

use async_trait::async_trait;
use serde_json::{json, Value};
use simplepage_core_types::FrameRegistry;

use ax_view::{
    build_view, AxViewError, FrameAxSnapshot, FrameDomSnapshot, PerceptionPort,
};

struct FixturePort {
    ax: Vec<FrameAxSnapshot>,
    dom: Vec<FrameDomSnapshot>,
    scope: Option<u64>,
}

#[async_trait]
impl PerceptionPort for FixturePort {
    async fn full_ax_trees(&self) -> Result<Vec<FrameAxSnapshot>, AxViewError> {
        Ok(self.ax.clone())
    }

    async fn dom_documents(&self) -> Result<Vec<FrameDomSnapshot>, AxViewError> {
        Ok(self.dom.clone())
    }

    async fn resolve_scope(&self, _selector: &str) -> Result<Option<u64>, AxViewError> {
        Ok(self.scope)
    }
}

fn ax_node(id: &str, role: &str, name: &str, backend: Option<u64>, children: &[&str]) -> Value {
    let mut node = json!({
        "nodeId": id,
        "ignored": false,
        "role": { "type": "role", "value": role },
        "name": { "type": "computedString", "value": name },
        "childIds": children,
    });
    if let Some(backend) = backend {
        node["backendDOMNodeId"] = json!(backend);
    }
    node
}

fn element(backend: u64, tag: &str, attrs: Value, children: Vec<Value>) -> Value {
    json!({
        "nodeType": 1,
        "backendNodeId": backend,
        "localName": tag,
        "nodeName": tag.to_uppercase(),
        "attributes": attrs,
        "children": children,
    })
}

/// A login-ish page: heading, textbox, anchor, plus a generic wrapper that
/// should fold away.
fn simple_fixture() -> FixturePort {
    let dom_root = json!({
        "nodeType": 9,
        "nodeName": "#document",
        "documentURL": "https://example.test/login",
        "children": [element(
            10,
            "html",
            json!([]),
            vec![element(
                11,
                "body",
                json!([]),
                vec![
                    element(12, "h1", json!([]), vec![]),
                    element(13, "div", json!([]), vec![element(
                        14,
                        "input",
                        json!(["type", "text", "name", "username"]),
                        vec![],
                    )]),
                    element(15, "a", json!(["href", "/docs"]), vec![]),
                ],
            )],
        )],
    });

    let ax_nodes = vec![
        ax_node("1", "RootWebArea", "Login", Some(10), &["2", "3", "5"]),
        ax_node("2", "heading", "Welcome", Some(12), &[]),
        ax_node("3", "generic", "", Some(13), &["4"]),
        ax_node("4", "textbox", "username", Some(14), &[]),
        ax_node("5", "link", "Docs", Some(15), &[]),
    ];

    FixturePort {
        ax: vec![FrameAxSnapshot {
            frame_id: None,
            nodes: ax_nodes,
        }],
        dom: vec![FrameDomSnapshot {
            frame_id: None,
            root: dom_root,
        }],
        scope: None,
    }
}

#[tokio::test]
async fn builds_outline_xpath_and_url_maps() {
    let port = simple_fixture();
    let mut registry = FrameRegistry::new();
    let view = build_view(&port, None, &mut registry).await.unwrap();

    assert_eq!(
        view.simplified,
        "[0-10] RootWebArea: Login\n  \
         [0-12] heading: Welcome\n  \
         [0-14] textbox: username\n  \
         [0-15] link: Docs\n"
    );

    assert_eq!(view.xpath_map.get("0-12").unwrap(), "/html[1]/body[1]/h1[1]");
    assert_eq!(
        view.xpath_map.get("0-14").unwrap(),
        "/html[1]/body[1]/div[1]/input[1]"
    );
    assert_eq!(
        view.id_to_url.get("0-15").unwrap(),
        "https://example.test/docs"
    );
}

#[tokio::test]
async fn every_outline_id_resolves_in_the_xpath_map() {
    let port = simple_fixture();
    let mut registry = FrameRegistry::new();
    let view = build_view(&port, None, &mut registry).await.unwrap();

    for line in view.simplified.lines() {
        let id = line
            .trim_start()
            .strip_prefix('[')
            .and_then(|rest| rest.split(']').next())
            .expect("line carries an encoded id");
        assert!(
            view.xpath_map.contains_key(id),
            "missing xpath for {id} in {:?}",
            view.xpath_map
        );
    }
}

#[tokio::test]
async fn repeated_builds_are_deterministic() {
    let port = simple_fixture();
    let mut registry = FrameRegistry::new();
    let first = build_view(&port, None, &mut registry).await.unwrap();
    let second = build_view(&port, None, &mut registry).await.unwrap();

    assert_eq!(first.simplified, second.simplified);
    let first_keys: Vec<_> = first.xpath_map.keys().collect();
    let second_keys: Vec<_> = second.xpath_map.keys().collect();
    assert_eq!(first_keys, second_keys);
}

#[tokio::test]
async fn scope_selector_restricts_the_outline() {
    let mut port = simple_fixture();
    port.scope = Some(13);
    let mut registry = FrameRegistry::new();
    let view = build_view(&port, Some("div"), &mut registry).await.unwrap();

    // The generic wrapper folds into its single textbox child.
    assert_eq!(view.simplified, "[0-14] textbox: username\n");
    // The xpath map still covers the whole snapshot.
    assert!(view.xpath_map.contains_key("0-12"));
}

#[tokio::test]
async fn unresolved_scope_falls_back_to_full_tree() {
    let port = simple_fixture();
    let mut registry = FrameRegistry::new();
    let view = build_view(&port, Some("#missing"), &mut registry)
        .await
        .unwrap();
    assert!(view.simplified.starts_with("[0-10] RootWebArea: Login"));
}

#[tokio::test]
async fn iframe_trees_stitch_under_their_owner() {
    let inner_doc = json!({
        "nodeType": 9,
        "nodeName": "#document",
        "documentURL": "https://widgets.test/embed",
        "frameId": "frame-7",
        "children": [element(
            40,
            "html",
            json!([]),
            vec![element(41, "body", json!([]), vec![element(42, "button", json!([]), vec![])])],
        )],
    });

    let top_doc = json!({
        "nodeType": 9,
        "nodeName": "#document",
        "documentURL": "https://example.test/",
        "children": [element(
            10,
            "html",
            json!([]),
            vec![element(11, "body", json!([]), vec![{
                let mut iframe = element(12, "iframe", json!([]), vec![]);
                iframe["frameId"] = json!("frame-7");
                iframe
            }])],
        )],
    });

    let port = FixturePort {
        ax: vec![
            FrameAxSnapshot {
                frame_id: None,
                nodes: vec![
                    ax_node("1", "RootWebArea", "Host", Some(10), &["2"]),
                    ax_node("2", "Iframe", "", Some(12), &[]),
                ],
            },
            FrameAxSnapshot {
                frame_id: Some("frame-7".into()),
                nodes: vec![
                    ax_node("1", "RootWebArea", "Embed", Some(40), &["2"]),
                    ax_node("2", "button", "Buy", Some(42), &[]),
                ],
            },
        ],
        dom: vec![
            FrameDomSnapshot {
                frame_id: None,
                root: top_doc,
            },
            FrameDomSnapshot {
                frame_id: Some("frame-7".into()),
                root: inner_doc,
            },
        ],
        scope: None,
    };

    let mut registry = FrameRegistry::new();
    let view = build_view(&port, None, &mut registry).await.unwrap();

    // The embedded frame's nodes carry ordinal 1 and per-frame xpaths.
    assert!(view.simplified.contains("[1-42] button: Buy"));
    assert_eq!(
        view.xpath_map.get("1-42").unwrap(),
        "/html[1]/body[1]/button[1]"
    );
    // The iframe owner itself stays addressable in the top frame.
    assert!(view.xpath_map.contains_key("0-12"));
}

#[tokio::test]
async fn empty_page_yields_single_root_line() {
    let dom_root = json!({
        "nodeType": 9,
        "nodeName": "#document",
        "documentURL": "about:blank",
        "children": [element(10, "html", json!([]), vec![element(11, "body", json!([]), vec![])])],
    });
    let port = FixturePort {
        ax: vec![FrameAxSnapshot {
            frame_id: None,
            nodes: vec![ax_node("1", "RootWebArea", "", Some(10), &[])],
        }],
        dom: vec![FrameDomSnapshot {
            frame_id: None,
            root: dom_root,
        }],
        scope: None,
    };

    let mut registry = FrameRegistry::new();
    let view = build_view(&port, None, &mut registry).await.unwrap();

    assert_eq!(view.simplified, "[0-10] RootWebArea\n");
    assert_eq!(view.xpath_map.get("0-10").unwrap(), "/html[1]");
}
