//! In-memory state of one live page.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ax_view::AxView;
use cdp_adapter::{PageDriver, PageEvent, ScreenshotOpts};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use session_recorder::{ConsoleSink, SessionRecorder, SnapshotArtifacts};
use simplepage_core_types::{EncodedId, FrameRegistry, PageId};
use tracing::debug;

use crate::errors::{ControlError, ErrorKind};
use crate::perception::PagePerception;

pub struct PageState {
    pub id: PageId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub driver: PageDriver,
    pub registry: Mutex<FrameRegistry>,
    /// Map published by the latest snapshot; consulted when acting by
    /// encoded id.
    pub cached_xpath: RwLock<Option<BTreeMap<String, String>>>,
    pub recorder: Option<SessionRecorder>,
    pub console: Option<ConsoleSink>,
    pub enable_screenshot: bool,
    pub settle_timeout: Duration,
}

/// A page plus its operation lock. The tokio mutex is fair, so queued
/// requests run in FIFO order, strictly one at a time per page.
pub struct PageEntry {
    pub state: Arc<PageState>,
    pub op_lock: tokio::sync::Mutex<()>,
}

impl PageState {
    /// Timestamp for the next recorded action; monotone even without a
    /// recorder so broadcast-only pages still order correctly.
    pub fn next_ts(&self) -> i64 {
        match &self.recorder {
            Some(recorder) => recorder.next_timestamp(),
            None => Utc::now().timestamp_millis(),
        }
    }

    pub fn console_log_path(&self) -> Option<String> {
        self.console
            .as_ref()
            .map(|sink| sink.path().display().to_string())
    }

    /// Build a fresh accessibility view and publish its xpath map as the
    /// page's cached map.
    pub async fn capture_view(&self, scope: Option<&str>) -> Result<AxView, ControlError> {
        let port = PagePerception::new(&self.driver);
        let raw = ax_view::fetch_snapshot(&port, scope).await?;
        let view = {
            let mut registry = self.registry.lock();
            ax_view::assemble_view(&raw, &mut registry)?
        };
        *self.cached_xpath.write() = Some(view.xpath_map.clone());
        Ok(view)
    }

    /// Snapshot trio for the recorder: outline, xpath map, and (when
    /// enabled) a screenshot.
    pub async fn capture_artifacts(&self) -> Result<(AxView, SnapshotArtifacts), ControlError> {
        let view = self.capture_view(None).await?;
        let screenshot = if self.enable_screenshot {
            match self.driver.screenshot(ScreenshotOpts::default()).await {
                Ok(bytes) => Some(bytes),
                // Screenshot capture must never fail the action.
                Err(err) => {
                    debug!(target: "simplepage", %err, "screenshot capture failed");
                    None
                }
            }
        } else {
            None
        };
        let xpath_map = serde_json::to_value(&view.xpath_map)
            .map_err(|err| ControlError::internal(err.to_string()))?;
        let artifacts = SnapshotArtifacts {
            structure: Some(view.simplified.clone()),
            xpath_map: Some(xpath_map),
            screenshot,
        };
        Ok((view, artifacts))
    }

    /// Resolve an encoded id against the cached xpath map into an
    /// `(xpath, owning frame)` pair.
    pub fn resolve_encoded(&self, encoded: &str) -> Result<(String, Option<String>), ControlError> {
        let cache = self.cached_xpath.read();
        let Some(map) = cache.as_ref() else {
            return Err(ControlError::new(
                ErrorKind::XPathMapNotCached,
                "no xpath map cached; fetch the page structure first",
            ));
        };
        let Some(xpath) = map.get(encoded) else {
            return Err(ControlError::new(
                ErrorKind::NoXPathForEncodedId,
                format!("no xpath cached for encoded id '{encoded}'"),
            ));
        };

        let (ordinal, _) = EncodedId(encoded.to_string())
            .parse()
            .map_err(|err| ControlError::bad_request(err.to_string()))?;
        let frame = self
            .registry
            .lock()
            .frame_for_ordinal(ordinal)
            .ok_or_else(|| {
                ControlError::new(
                    ErrorKind::NoXPathForEncodedId,
                    format!("unknown frame ordinal in '{encoded}'"),
                )
            })?;
        Ok((xpath.clone(), frame))
    }

    /// Watch the page's debug events: console lines go to the sink, a new
    /// top-frame document resets the frame ordinals.
    pub fn spawn_event_watcher(self: Arc<Self>) {
        let state = self;
        let mut events = state.driver.subscribe_events();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(PageEvent::Console { level, text, stack }) => {
                        if let Some(sink) = &state.console {
                            sink.log(&level, &text, stack.as_deref());
                        }
                    }
                    Ok(PageEvent::PageError { message, stack }) => {
                        if let Some(sink) = &state.console {
                            sink.page_error(&message, stack.as_deref());
                        }
                    }
                    Ok(PageEvent::TopFrameNavigated { frame_id, .. }) => {
                        let mut registry = state.registry.lock();
                        if registry.observe_top_frame(&frame_id) {
                            debug!(
                                target: "simplepage",
                                page = %state.id,
                                "new top frame document; frame ordinals reset"
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}
