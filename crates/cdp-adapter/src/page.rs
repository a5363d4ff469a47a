//! Per-page automation surface.
//!
//! [`PageDriver`] is a cheap handle binding a page id to the shared adapter.
//! Element interaction goes through one-shot [`Locator`]s: each action
//! resolves its XPath afresh inside the owning frame's execution context, so
//! no stale element handles survive between actions.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use network_settle::{NetworkEvent, SettleConfig, SettleOutcome};
use serde_json::{json, Value};
use simplepage_core_types::PageId;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::adapter::{DriverAdapter, PageEvent};
use crate::error::{DriverError, DriverErrorKind};
use crate::helper::{self, HELPER_SCRIPT};

/// One-shot dialog decision installed before a triggering click.
#[derive(Clone, Debug)]
pub struct DialogChoice {
    pub accept: bool,
    pub prompt_text: Option<String>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ScreenshotOpts {
    pub full_page: bool,
}

/// Handle for driving one page.
#[derive(Clone)]
pub struct PageDriver {
    adapter: Arc<DriverAdapter>,
    page: PageId,
}

impl PageDriver {
    pub fn new(adapter: Arc<DriverAdapter>, page: PageId) -> Self {
        Self { adapter, page }
    }

    pub fn page_id(&self) -> &PageId {
        &self.page
    }

    pub fn adapter(&self) -> &Arc<DriverAdapter> {
        &self.adapter
    }

    /// Enable the debug domains, capture the top frame id, inject the helper
    /// script and register the selector engine. Idempotent per page.
    pub async fn init(&self) -> Result<(), DriverError> {
        for (method, params) in [
            ("Page.enable", json!({})),
            ("Network.enable", json!({})),
            ("Runtime.enable", json!({})),
        ] {
            self.adapter
                .send_page_command(&self.page, method, params)
                .await?;
        }

        let tree = self
            .adapter
            .send_page_command(&self.page, "Page.getFrameTree", json!({}))
            .await?;
        if let Some(frame_id) = tree
            .get("frameTree")
            .and_then(|t| t.get("frame"))
            .and_then(|f| f.get("id"))
            .and_then(|v| v.as_str())
        {
            self.adapter.set_top_frame_id(&self.page, frame_id.to_string());
        }

        // New documents get the helper before any page script runs; the
        // current document gets it immediately.
        self.adapter
            .send_page_command(
                &self.page,
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": HELPER_SCRIPT }),
            )
            .await?;
        self.adapter
            .evaluate_in_frame(&self.page, None, HELPER_SCRIPT, true)
            .await?;

        if helper::register_selector_engine() {
            debug!(target: "cdp-adapter", engine = helper::SELECTOR_ENGINE_NAME, "selector engine registered");
        }

        Ok(())
    }

    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<String, DriverError> {
        let response = self
            .adapter
            .send_page_command(&self.page, "Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error_text) = response.get("errorText").and_then(|v| v.as_str()) {
            if !error_text.is_empty() {
                return Err(DriverError::gone(format!("navigation failed: {error_text}")));
            }
        }
        self.adapter.set_recent_url(&self.page, url.to_string());
        self.wait_for_dom_content_loaded(timeout).await?;
        self.current_url().await
    }

    pub async fn navigate_back(&self, timeout: Duration) -> Result<String, DriverError> {
        self.navigate_history(-1, timeout).await
    }

    pub async fn navigate_forward(&self, timeout: Duration) -> Result<String, DriverError> {
        self.navigate_history(1, timeout).await
    }

    async fn navigate_history(&self, delta: i64, timeout: Duration) -> Result<String, DriverError> {
        let history = self
            .adapter
            .send_page_command(&self.page, "Page.getNavigationHistory", json!({}))
            .await?;
        let current = history
            .get("currentIndex")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| DriverError::internal("navigation history missing currentIndex"))?;
        let entries = history
            .get("entries")
            .and_then(|v| v.as_array())
            .ok_or_else(|| DriverError::internal("navigation history missing entries"))?;
        let target = current + delta;
        let entry = usize::try_from(target)
            .ok()
            .and_then(|idx| entries.get(idx))
            .ok_or_else(|| DriverError::internal("no history entry in that direction"))?;
        let entry_id = entry
            .get("id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| DriverError::internal("history entry missing id"))?;

        self.adapter
            .send_page_command(
                &self.page,
                "Page.navigateToHistoryEntry",
                json!({ "entryId": entry_id }),
            )
            .await?;
        self.wait_for_dom_content_loaded(timeout).await?;
        self.current_url().await
    }

    pub async fn reload(&self, timeout: Duration) -> Result<String, DriverError> {
        self.adapter
            .send_page_command(&self.page, "Page.reload", json!({}))
            .await?;
        self.wait_for_dom_content_loaded(timeout).await?;
        self.current_url().await
    }

    /// Poll `document.readyState` until the DOM is usable.
    pub async fn wait_for_dom_content_loaded(&self, timeout: Duration) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() >= deadline {
                return Err(DriverError::timeout("waiting for domcontentloaded"));
            }
            let ready = self
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|v| v.as_str().map(|s| matches!(s, "interactive" | "complete")))
                .unwrap_or(false);
            if ready {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
    }

    pub async fn wait_for_timeout(&self, ms: u64) {
        sleep(Duration::from_millis(ms)).await;
    }

    pub async fn title(&self) -> Result<String, DriverError> {
        Ok(self
            .evaluate("document.title")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    pub async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self
            .evaluate("window.location.href")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    /// Full serialized HTML of the top document.
    pub async fn content(&self) -> Result<String, DriverError> {
        Ok(self
            .evaluate("document.documentElement ? document.documentElement.outerHTML : ''")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    pub async fn screenshot(&self, opts: ScreenshotOpts) -> Result<Vec<u8>, DriverError> {
        let response = self
            .adapter
            .send_page_command(
                &self.page,
                "Page.captureScreenshot",
                json!({
                    "format": "png",
                    "captureBeyondViewport": opts.full_page,
                }),
            )
            .await?;
        let data = response
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DriverError::internal("screenshot response missing data"))?;
        BASE64
            .decode(data)
            .map_err(|err| DriverError::internal(format!("screenshot decode failed: {err}")))
    }

    /// Evaluate an expression in the top frame and return its JSON value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, DriverError> {
        let result = self
            .adapter
            .evaluate_in_frame(&self.page, None, expression, true)
            .await?;
        Ok(result.get("value").cloned().unwrap_or(Value::Null))
    }

    /// Install a one-shot dialog decision consumed by the next dialog.
    pub fn once_dialog(&self, choice: DialogChoice) {
        self.adapter.set_dialog_choice(&self.page, choice);
    }

    pub fn clear_dialog(&self) {
        self.adapter.clear_dialog_choice(&self.page);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PageEvent> {
        self.adapter.subscribe_page_events(&self.page)
    }

    pub fn subscribe_network(&self) -> broadcast::Receiver<NetworkEvent> {
        self.adapter.subscribe_network(&self.page)
    }

    /// Wait for network quiescence; see the `network-settle` crate for the
    /// policy.
    pub async fn settle(&self, timeout: Option<Duration>) -> SettleOutcome {
        network_settle::wait_for_settled(
            self.adapter.subscribe_network(&self.page),
            SettleConfig::default(),
            timeout,
        )
        .await
    }

    /// Forward file paths into the `<input type=file>` behind the xpath.
    pub async fn set_input_files(
        &self,
        xpath: &str,
        frame: Option<&str>,
        paths: &[String],
    ) -> Result<(), DriverError> {
        let expression = format!(
            "{prelude} __simplepage_node",
            prelude = locator_prelude(xpath)?
        );
        let result = self
            .adapter
            .evaluate_in_frame(&self.page, frame, &expression, false)
            .await?;
        let object_id = result
            .get("objectId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                DriverError::element_not_found(format!("no file input for xpath {xpath}"))
            })?;
        self.adapter
            .send_page_command(
                &self.page,
                "DOM.setFileInputFiles",
                json!({ "files": paths, "objectId": object_id }),
            )
            .await?;
        Ok(())
    }

    /// Raw accessibility trees: one `(frame id, nodes)` pair per attached
    /// session (top frame first).
    pub async fn ax_trees(&self) -> Result<Vec<(Option<String>, Vec<Value>)>, DriverError> {
        let sessions = self.adapter.page_sessions(&self.page);
        if sessions.is_empty() {
            return Err(DriverError::new(DriverErrorKind::Detached).with_hint("page has no session"));
        }
        let mut out = Vec::with_capacity(sessions.len());
        for (frame_id, session) in sessions {
            let response = self
                .adapter
                .send_session_command(&session, "Accessibility.getFullAXTree", json!({}))
                .await?;
            let nodes = response
                .get("nodes")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            out.push((frame_id, nodes));
        }
        Ok(out)
    }

    /// Pierced DOM documents, one per attached session. Same-process iframe
    /// documents ride along inside the top document.
    pub async fn dom_documents(&self) -> Result<Vec<(Option<String>, Value)>, DriverError> {
        let sessions = self.adapter.page_sessions(&self.page);
        if sessions.is_empty() {
            return Err(DriverError::new(DriverErrorKind::Detached).with_hint("page has no session"));
        }
        let mut out = Vec::with_capacity(sessions.len());
        for (frame_id, session) in sessions {
            let response = self
                .adapter
                .send_session_command(
                    &session,
                    "DOM.getDocument",
                    json!({ "depth": -1, "pierce": true }),
                )
                .await?;
            let root = response
                .get("root")
                .cloned()
                .ok_or_else(|| DriverError::internal("DOM.getDocument missing root"))?;
            out.push((frame_id, root));
        }
        Ok(out)
    }

    /// Backend node id of the first CSS match, used to scope snapshots.
    pub async fn resolve_css_backend_id(
        &self,
        selector: &str,
    ) -> Result<Option<u64>, DriverError> {
        let literal = js_string(selector)?;
        let expression =
            format!("(() => {{ try {{ return document.querySelector({literal}); }} catch (err) {{ return null; }} }})()");
        let result = self
            .adapter
            .evaluate_in_frame(&self.page, None, &expression, false)
            .await?;
        let Some(object_id) = result.get("objectId").and_then(|v| v.as_str()) else {
            return Ok(None);
        };
        let described = self
            .adapter
            .send_page_command(
                &self.page,
                "DOM.describeNode",
                json!({ "objectId": object_id }),
            )
            .await?;
        Ok(described
            .get("node")
            .and_then(|n| n.get("backendNodeId"))
            .and_then(|v| v.as_u64()))
    }

    pub async fn close(&self) -> Result<(), DriverError> {
        self.adapter.close_page(&self.page).await
    }

    /// One-shot locator for an xpath inside an optional frame.
    pub fn locator<'a>(&'a self, xpath: &'a str, frame: Option<&'a str>) -> Locator<'a> {
        Locator {
            driver: self,
            xpath,
            frame,
        }
    }
}

/// One-shot element operations. Every call re-resolves the xpath.
pub struct Locator<'a> {
    driver: &'a PageDriver,
    xpath: &'a str,
    frame: Option<&'a str>,
}

impl<'a> Locator<'a> {
    /// Forced click: no actionability wait, the element is scrolled into
    /// view and clicked directly.
    pub async fn click(&self) -> Result<(), DriverError> {
        self.run_op(
            "node.scrollIntoView({ block: 'center', inline: 'center' });\n  node.click();",
        )
        .await
        .map(|_| ())
    }

    pub async fn fill(&self, text: &str) -> Result<(), DriverError> {
        let literal = js_string(text)?;
        let body = format!(
            "node.focus();\n  \
             const proto = node instanceof HTMLTextAreaElement\n    \
               ? HTMLTextAreaElement.prototype\n    \
               : (node instanceof HTMLInputElement ? HTMLInputElement.prototype : null);\n  \
             const desc = proto ? Object.getOwnPropertyDescriptor(proto, 'value') : null;\n  \
             if (desc && desc.set) {{ desc.set.call(node, {literal}); }}\n  \
             else if ('value' in node) {{ node.value = {literal}; }}\n  \
             else {{ node.textContent = {literal}; }}\n  \
             node.dispatchEvent(new Event('input', {{ bubbles: true }}));\n  \
             node.dispatchEvent(new Event('change', {{ bubbles: true }}));"
        );
        self.run_op(&body).await.map(|_| ())
    }

    pub async fn select_option(&self, value: &str) -> Result<(), DriverError> {
        let literal = js_string(value)?;
        let body = format!(
            "let matched = false;\n  \
             for (const option of node.options || []) {{\n    \
               if (option.value === {literal} || option.label === {literal}\n        \
                   || option.textContent.trim() === {literal}) {{\n      \
                 node.value = option.value;\n      matched = true;\n      break;\n    \
               }}\n  }}\n  \
             if (!matched) {{ return {{ status: 'option-not-found' }}; }}\n  \
             node.dispatchEvent(new Event('input', {{ bubbles: true }}));\n  \
             node.dispatchEvent(new Event('change', {{ bubbles: true }}));"
        );
        self.run_op(&body).await.map(|_| ())
    }

    pub async fn check(&self) -> Result<(), DriverError> {
        self.set_checked(true).await
    }

    pub async fn uncheck(&self) -> Result<(), DriverError> {
        self.set_checked(false).await
    }

    async fn set_checked(&self, want: bool) -> Result<(), DriverError> {
        let body = format!("if (node.checked !== {want}) {{ node.click(); }}");
        self.run_op(&body).await.map(|_| ())
    }

    /// Move the mouse to the element's center.
    pub async fn hover(&self) -> Result<(), DriverError> {
        let value = self
            .run_op(
                "const rect = node.getBoundingClientRect();\n  \
                 return { status: 'ok', x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 };",
            )
            .await?;
        let x = value.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let y = value.get("y").and_then(|v| v.as_f64()).unwrap_or(0.0);
        self.driver
            .adapter
            .send_page_command(
                self.driver.page_id(),
                "Input.dispatchMouseEvent",
                json!({
                    "type": "mouseMoved",
                    "x": x,
                    "y": y,
                    "pointerType": "mouse",
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn press(&self, key: &str) -> Result<(), DriverError> {
        self.run_op("node.focus();").await?;
        let descriptor = key_descriptor(key)?;
        for event_type in ["keyDown", "keyUp"] {
            let mut params = json!({
                "type": event_type,
                "key": descriptor.key,
                "code": descriptor.code,
                "windowsVirtualKeyCode": descriptor.key_code,
                "nativeVirtualKeyCode": descriptor.key_code,
            });
            if event_type == "keyDown" {
                if let Some(text) = &descriptor.text {
                    params["text"] = json!(text);
                }
            }
            self.driver
                .adapter
                .send_page_command(self.driver.page_id(), "Input.dispatchKeyEvent", params)
                .await?;
        }
        Ok(())
    }

    /// Run `(el, arg) => { ... }` against the resolved element and return the
    /// function's value. Used by the scroll primitives.
    pub async fn evaluate_on(&self, fn_source: &str, arg: &Value) -> Result<Value, DriverError> {
        let arg_literal = serde_json::to_string(arg)
            .map_err(|err| DriverError::internal(format!("invalid evaluate arg: {err}")))?;
        let body = format!(
            "const fn = {fn_source};\n  return {{ status: 'ok', value: fn(node, {arg_literal}) }};"
        );
        let value = self.run_op(&body).await?;
        Ok(value.get("value").cloned().unwrap_or(Value::Null))
    }

    /// Wrap an operation body in the xpath resolution preamble, evaluate it
    /// in the owning frame and translate the status protocol into errors.
    async fn run_op(&self, body: &str) -> Result<Value, DriverError> {
        let expression = format!(
            "(() => {{\n  {prelude}\n  const node = __simplepage_node;\n  \
             if (node === '__invalid_xpath__') {{ return {{ status: 'invalid-selector' }}; }}\n  \
             if (!node) {{ return {{ status: 'not-found' }}; }}\n  {body}\n  \
             return {{ status: 'ok' }};\n}})()",
            prelude = locator_prelude(self.xpath)?,
        );
        let result = self
            .driver
            .adapter
            .evaluate_in_frame(self.driver.page_id(), self.frame, &expression, true)
            .await?;
        let value = result.get("value").cloned().unwrap_or(Value::Null);
        match value.get("status").and_then(|v| v.as_str()) {
            Some("ok") => Ok(value),
            Some("not-found") => Err(DriverError::element_not_found(format!(
                "no element for xpath {}",
                self.xpath
            ))),
            Some("option-not-found") => Err(DriverError::element_not_found(format!(
                "no matching option under xpath {}",
                self.xpath
            ))),
            Some("invalid-selector") => Err(DriverError::new(DriverErrorKind::InvalidSelector)
                .with_hint(format!("invalid xpath {}", self.xpath))),
            other => Err(DriverError::internal(format!(
                "unexpected locator status {other:?}"
            ))),
        }
    }
}

/// Shared xpath resolution preamble. Binds `__simplepage_node` to the first
/// match, `null`, or the invalid-xpath sentinel.
fn locator_prelude(xpath: &str) -> Result<String, DriverError> {
    let literal = js_string(xpath)?;
    Ok(format!(
        "let __simplepage_node = null;\n  try {{\n    \
         __simplepage_node = document.evaluate({literal}, document, null,\n      \
         XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;\n  \
         }} catch (err) {{ __simplepage_node = '__invalid_xpath__'; }}"
    ))
}

fn js_string(value: &str) -> Result<String, DriverError> {
    serde_json::to_string(value)
        .map_err(|err| DriverError::internal(format!("string encoding failed: {err}")))
}

struct KeyDescriptor {
    key: &'static str,
    code: &'static str,
    key_code: u32,
    text: Option<String>,
}

/// Minimal key map covering the keys the action surface accepts.
fn key_descriptor(key: &str) -> Result<KeyDescriptor, DriverError> {
    let descriptor = match key {
        "Enter" => KeyDescriptor {
            key: "Enter",
            code: "Enter",
            key_code: 13,
            text: Some("\r".into()),
        },
        "Tab" => KeyDescriptor {
            key: "Tab",
            code: "Tab",
            key_code: 9,
            text: None,
        },
        "Escape" => KeyDescriptor {
            key: "Escape",
            code: "Escape",
            key_code: 27,
            text: None,
        },
        "Backspace" => KeyDescriptor {
            key: "Backspace",
            code: "Backspace",
            key_code: 8,
            text: None,
        },
        "Delete" => KeyDescriptor {
            key: "Delete",
            code: "Delete",
            key_code: 46,
            text: None,
        },
        "ArrowUp" => KeyDescriptor {
            key: "ArrowUp",
            code: "ArrowUp",
            key_code: 38,
            text: None,
        },
        "ArrowDown" => KeyDescriptor {
            key: "ArrowDown",
            code: "ArrowDown",
            key_code: 40,
            text: None,
        },
        "ArrowLeft" => KeyDescriptor {
            key: "ArrowLeft",
            code: "ArrowLeft",
            key_code: 37,
            text: None,
        },
        "ArrowRight" => KeyDescriptor {
            key: "ArrowRight",
            code: "ArrowRight",
            key_code: 39,
            text: None,
        },
        "Home" => KeyDescriptor {
            key: "Home",
            code: "Home",
            key_code: 36,
            text: None,
        },
        "End" => KeyDescriptor {
            key: "End",
            code: "End",
            key_code: 35,
            text: None,
        },
        "PageUp" => KeyDescriptor {
            key: "PageUp",
            code: "PageUp",
            key_code: 33,
            text: None,
        },
        "PageDown" => KeyDescriptor {
            key: "PageDown",
            code: "PageDown",
            key_code: 34,
            text: None,
        },
        " " | "Space" => KeyDescriptor {
            key: " ",
            code: "Space",
            key_code: 32,
            text: Some(" ".into()),
        },
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => {
                    return Ok(KeyDescriptor {
                        key: "Unidentified",
                        code: "Unidentified",
                        key_code: ch.to_ascii_uppercase() as u32,
                        text: Some(ch.to_string()),
                    });
                }
                _ => {
                    return Err(DriverError::internal(format!("unsupported key '{other}'")));
                }
            }
        }
    };
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_prelude_embeds_escaped_xpath() {
        let prelude = locator_prelude("//a[@title=\"x\"]").unwrap();
        assert!(prelude.contains("document.evaluate(\"//a[@title=\\\"x\\\"]\""));
        assert!(prelude.contains("FIRST_ORDERED_NODE_TYPE"));
    }

    #[test]
    fn key_descriptors_cover_named_and_single_chars() {
        assert_eq!(key_descriptor("Enter").unwrap().key_code, 13);
        let a = key_descriptor("a").unwrap();
        assert_eq!(a.text.as_deref(), Some("a"));
        assert!(key_descriptor("NoSuchKey").is_err());
    }
}
