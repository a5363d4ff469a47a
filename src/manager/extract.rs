//! HTML-extraction scripts for the list/element endpoints.
//!
//! Selectors accept either dialect: a prefix test routes XPaths through
//! ordered snapshots and everything else through `querySelectorAll`.

use serde_json::Value;
use simplepage_core_types::SelectorKind;

use crate::errors::{ControlError, ErrorKind};

fn selector_literal(selector: &str) -> Result<String, ControlError> {
    serde_json::to_string(selector).map_err(|err| ControlError::internal(err.to_string()))
}

fn collect_script(selector: &str) -> Result<String, ControlError> {
    let literal = selector_literal(selector)?;
    let collector = match SelectorKind::detect(selector) {
        SelectorKind::XPath => format!(
            "const snap = document.evaluate({literal}, document, null,\n      \
             XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);\n    \
             for (let i = 0; i < snap.snapshotLength; i++) {{ matches.push(snap.snapshotItem(i)); }}"
        ),
        SelectorKind::Css => format!(
            "document.querySelectorAll({literal}).forEach((el) => matches.push(el));"
        ),
    };
    Ok(collector)
}

/// outerHTML of every match.
pub fn list_script(selector: &str) -> Result<String, ControlError> {
    let collector = collect_script(selector)?;
    Ok(format!(
        "(() => {{\n  const matches = [];\n  try {{\n    {collector}\n  }} catch (err) {{\n    \
         return {{ status: 'invalid-selector' }};\n  }}\n  \
         return {{ status: 'ok', items: matches.map((el) => el.outerHTML) }};\n}})()"
    ))
}

/// outerHTML of each element child of the first match's parent.
pub fn list_by_parent_script(selector: &str) -> Result<String, ControlError> {
    let collector = collect_script(selector)?;
    Ok(format!(
        "(() => {{\n  const matches = [];\n  try {{\n    {collector}\n  }} catch (err) {{\n    \
         return {{ status: 'invalid-selector' }};\n  }}\n  \
         const first = matches[0];\n  \
         if (!first || !first.parentElement) {{ return {{ status: 'not-found' }}; }}\n  \
         const items = Array.from(first.parentElement.children, (el) => el.outerHTML);\n  \
         return {{ status: 'ok', items }};\n}})()"
    ))
}

/// outerHTML of the first match.
pub fn element_script(selector: &str) -> Result<String, ControlError> {
    let collector = collect_script(selector)?;
    Ok(format!(
        "(() => {{\n  const matches = [];\n  try {{\n    {collector}\n  }} catch (err) {{\n    \
         return {{ status: 'invalid-selector' }};\n  }}\n  \
         if (!matches[0]) {{ return {{ status: 'not-found' }}; }}\n  \
         return {{ status: 'ok', items: [matches[0].outerHTML] }};\n}})()"
    ))
}

/// Decode the `{ status, items }` protocol shared by the scripts above.
pub fn decode_items(value: Value, selector: &str) -> Result<Vec<String>, ControlError> {
    match value.get("status").and_then(|v| v.as_str()) {
        Some("ok") => Ok(value
            .get("items")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()),
        Some("not-found") => Err(ControlError::new(
            ErrorKind::ElementNotFound,
            format!("no element matches '{selector}'"),
        )),
        Some("invalid-selector") => Err(ControlError::new(
            ErrorKind::InvalidSelector,
            format!("invalid selector '{selector}'"),
        )),
        other => Err(ControlError::internal(format!(
            "unexpected extraction status {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn xpath_selectors_use_snapshots() {
        let script = list_script("//ul[1]/li").unwrap();
        assert!(script.contains("ORDERED_NODE_SNAPSHOT_TYPE"));
        assert!(!script.contains("querySelectorAll"));
    }

    #[test]
    fn css_selectors_use_query_selector_all() {
        let script = list_script("ul > li.item").unwrap();
        assert!(script.contains("querySelectorAll"));
        assert!(!script.contains("ORDERED_NODE_SNAPSHOT_TYPE"));
    }

    #[test]
    fn axis_selectors_count_as_xpath() {
        let script = element_script("descendant::div").unwrap();
        assert!(script.contains("ORDERED_NODE_SNAPSHOT_TYPE"));
    }

    #[test]
    fn decode_follows_status_protocol() {
        let items =
            decode_items(json!({ "status": "ok", "items": ["<li>a</li>", "<li>b</li>"] }), "x")
                .unwrap();
        assert_eq!(items.len(), 2);

        let err = decode_items(json!({ "status": "not-found" }), "x").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ElementNotFound);

        let err = decode_items(json!({ "status": "invalid-selector" }), "x").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidSelector);
    }
}
