//! Index over pierced DOM documents: absolute indexed XPaths, frame
//! ownership and resource attributes per backend node id.

use std::collections::HashMap;

use serde_json::Value;

use crate::ports::FrameDomSnapshot;

const ELEMENT_NODE: i64 = 1;
const DOCUMENT_NODE: i64 = 9;

#[derive(Clone, Debug)]
pub struct DomEntry {
    /// `tag[n]` steps rooted at the owning frame's document element.
    pub xpath: String,
    /// Frame the node belongs to; `None` for the top frame.
    pub frame_id: Option<String>,
    pub node_name: String,
    pub attributes: HashMap<String, String>,
    /// Base URL of the owning document, for resolving relative hrefs.
    pub document_url: Option<String>,
    /// For iframe/frame owner elements: the id of the nested frame.
    pub child_frame_id: Option<String>,
}

/// Backend-node-id keyed index built in one pass over the snapshots.
#[derive(Debug, Default)]
pub struct DomIndex {
    entries: HashMap<u64, DomEntry>,
}

impl DomIndex {
    pub fn from_documents(documents: &[FrameDomSnapshot]) -> Self {
        let mut index = DomIndex::default();
        for snapshot in documents {
            index.walk_document(&snapshot.root, snapshot.frame_id.clone());
        }
        index
    }

    pub fn get(&self, backend_node_id: u64) -> Option<&DomEntry> {
        self.entries.get(&backend_node_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn walk_document(&mut self, document: &Value, default_frame: Option<String>) {
        let frame_id = document
            .get("frameId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or(default_frame);
        let document_url = document
            .get("documentURL")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        if let Some(children) = document.get("children").and_then(|v| v.as_array()) {
            self.walk_children(children, "", frame_id.as_deref(), document_url.as_deref());

            // The document node itself backs the accessibility root; alias
            // it to its document element so root encoded ids stay
            // resolvable through the xpath map.
            if let Some(doc_backend) = document.get("backendNodeId").and_then(|v| v.as_u64()) {
                let root_tag = children.iter().find_map(|child| {
                    (child.get("nodeType").and_then(|v| v.as_i64()) == Some(ELEMENT_NODE))
                        .then(|| {
                            child
                                .get("localName")
                                .and_then(|v| v.as_str())
                                .unwrap_or("html")
                                .to_string()
                        })
                });
                if let Some(tag) = root_tag {
                    self.entries.entry(doc_backend).or_insert(DomEntry {
                        xpath: format!("/{tag}[1]"),
                        frame_id: frame_id.clone(),
                        node_name: "#document".to_string(),
                        attributes: HashMap::new(),
                        document_url: document_url.clone(),
                        child_frame_id: None,
                    });
                }
            }
        }
    }

    /// Visit one element's children, numbering same-tag siblings to build
    /// the `tag[n]` steps.
    fn walk_children(
        &mut self,
        children: &[Value],
        parent_path: &str,
        frame_id: Option<&str>,
        document_url: Option<&str>,
    ) {
        let mut tag_counts: HashMap<String, usize> = HashMap::new();
        for child in children {
            let node_type = child.get("nodeType").and_then(|v| v.as_i64()).unwrap_or(0);
            if node_type != ELEMENT_NODE {
                continue;
            }
            let tag = child
                .get("localName")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .unwrap_or_else(|| {
                    child
                        .get("nodeName")
                        .and_then(|v| v.as_str())
                        .unwrap_or("node")
                        .to_ascii_lowercase()
                });
            let position = tag_counts
                .entry(tag.clone())
                .and_modify(|n| *n += 1)
                .or_insert(1);
            let path = format!("{parent_path}/{tag}[{position}]");
            self.visit_element(child, &path, frame_id, document_url);
        }
    }

    fn visit_element(
        &mut self,
        node: &Value,
        path: &str,
        frame_id: Option<&str>,
        document_url: Option<&str>,
    ) {
        if let Some(backend_id) = node.get("backendNodeId").and_then(|v| v.as_u64()) {
            let node_name = node
                .get("localName")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let child_frame_id = if matches!(node_name.as_str(), "iframe" | "frame") {
                node.get("frameId")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .or_else(|| {
                        node.get("contentDocument")
                            .and_then(|doc| doc.get("frameId"))
                            .and_then(|v| v.as_str())
                            .map(|s| s.to_string())
                    })
            } else {
                None
            };
            self.entries.insert(
                backend_id,
                DomEntry {
                    xpath: path.to_string(),
                    frame_id: frame_id.map(|s| s.to_string()),
                    node_name,
                    attributes: parse_attributes(node),
                    document_url: document_url.map(|s| s.to_string()),
                    child_frame_id,
                },
            );
        }

        // Text children inherit the element's path so named text nodes still
        // resolve to an addressable element.
        if let Some(children) = node.get("children").and_then(|v| v.as_array()) {
            for child in children {
                let node_type = child.get("nodeType").and_then(|v| v.as_i64()).unwrap_or(0);
                if node_type != ELEMENT_NODE && node_type != DOCUMENT_NODE {
                    if let Some(backend_id) = child.get("backendNodeId").and_then(|v| v.as_u64()) {
                        self.entries.insert(
                            backend_id,
                            DomEntry {
                                xpath: path.to_string(),
                                frame_id: frame_id.map(|s| s.to_string()),
                                node_name: "#text".to_string(),
                                attributes: HashMap::new(),
                                document_url: document_url.map(|s| s.to_string()),
                                child_frame_id: None,
                            },
                        );
                    }
                }
            }
            self.walk_children(children, path, frame_id, document_url);
        }

        // Same-process iframe: its document nests here and re-roots the
        // xpath at its own document element.
        if let Some(content) = node.get("contentDocument") {
            self.walk_document(content, frame_id.map(|s| s.to_string()));
        }
    }
}

fn parse_attributes(node: &Value) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if let Some(attrs) = node.get("attributes").and_then(|v| v.as_array()) {
        let mut iter = attrs.iter();
        while let (Some(name), Some(value)) = (iter.next(), iter.next()) {
            if let (Some(name), Some(value)) = (name.as_str(), value.as_str()) {
                out.insert(name.to_string(), value.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn element(backend: u64, tag: &str, children: Vec<Value>) -> Value {
        json!({
            "nodeType": 1,
            "backendNodeId": backend,
            "localName": tag,
            "nodeName": tag.to_uppercase(),
            "children": children,
        })
    }

    fn document(url: &str, frame: Option<&str>, children: Vec<Value>) -> Value {
        let mut doc = json!({
            "nodeType": 9,
            "nodeName": "#document",
            "documentURL": url,
            "children": children,
        });
        if let Some(frame) = frame {
            doc["frameId"] = json!(frame);
        }
        doc
    }

    #[test]
    fn indexes_same_tag_siblings_by_position() {
        let root = document(
            "https://example.test/",
            None,
            vec![element(
                1,
                "html",
                vec![element(
                    2,
                    "body",
                    vec![
                        element(3, "div", vec![]),
                        element(4, "div", vec![]),
                        element(5, "span", vec![]),
                    ],
                )],
            )],
        );
        let index = DomIndex::from_documents(&[FrameDomSnapshot {
            frame_id: None,
            root,
        }]);

        assert_eq!(index.get(1).unwrap().xpath, "/html[1]");
        assert_eq!(index.get(3).unwrap().xpath, "/html[1]/body[1]/div[1]");
        assert_eq!(index.get(4).unwrap().xpath, "/html[1]/body[1]/div[2]");
        assert_eq!(index.get(5).unwrap().xpath, "/html[1]/body[1]/span[1]");
    }

    #[test]
    fn content_documents_reroot_the_path() {
        let iframe_doc = document(
            "https://frames.test/inner",
            Some("frame-9"),
            vec![element(10, "html", vec![element(11, "body", vec![])])],
        );
        let mut iframe = element(6, "iframe", vec![]);
        iframe["contentDocument"] = iframe_doc;

        let root = document(
            "https://example.test/",
            None,
            vec![element(1, "html", vec![element(2, "body", vec![iframe])])],
        );
        let index = DomIndex::from_documents(&[FrameDomSnapshot {
            frame_id: None,
            root,
        }]);

        let inner = index.get(11).unwrap();
        assert_eq!(inner.xpath, "/html[1]/body[1]");
        assert_eq!(inner.frame_id.as_deref(), Some("frame-9"));
        assert_eq!(inner.document_url.as_deref(), Some("https://frames.test/inner"));

        let owner = index.get(6).unwrap();
        assert_eq!(owner.xpath, "/html[1]/body[1]/iframe[1]");
        assert_eq!(owner.frame_id, None);
    }

    #[test]
    fn attributes_parse_as_pairs() {
        let mut anchor = element(7, "a", vec![]);
        anchor["attributes"] = json!(["href", "/docs", "title", "Docs"]);
        let root = document(
            "https://example.test/",
            None,
            vec![element(1, "html", vec![element(2, "body", vec![anchor])])],
        );
        let index = DomIndex::from_documents(&[FrameDomSnapshot {
            frame_id: None,
            root,
        }]);
        let entry = index.get(7).unwrap();
        assert_eq!(entry.attributes.get("href").unwrap(), "/docs");
        assert_eq!(entry.attributes.get("title").unwrap(), "Docs");
    }

    #[test]
    fn text_nodes_inherit_their_elements_path() {
        let text = json!({ "nodeType": 3, "backendNodeId": 30, "nodeName": "#text", "nodeValue": "hi" });
        let root = document(
            "https://example.test/",
            None,
            vec![element(
                1,
                "html",
                vec![element(2, "body", vec![json!({
                    "nodeType": 1,
                    "backendNodeId": 3,
                    "localName": "p",
                    "nodeName": "P",
                    "children": [text],
                })])],
            )],
        );
        let index = DomIndex::from_documents(&[FrameDomSnapshot {
            frame_id: None,
            root,
        }]);
        assert_eq!(index.get(30).unwrap().xpath, "/html[1]/body[1]/p[1]");
    }
}
