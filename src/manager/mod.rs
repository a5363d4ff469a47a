//! Page manager: owns every live page, serializes per-page operations and
//! wires the driver, view builder, executor and recorder together.

pub mod extract;
pub mod page;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use action_primitives::{ActMethod, ActRequest};
use cdp_adapter::{DriverAdapter, PageDriver};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use regex::RegexBuilder;
use serde_json::Value;
use session_recorder::{layout, RecordingSummary, SessionRecorder, SnapshotArtifacts};
use simplepage_core_types::{ActionKind, ActionRecord, FrameRegistry};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::errors::{ControlError, ErrorKind};
use crate::events::{ActionBroadcast, ControlEvent, PageInfo};
use page::{PageEntry, PageState};

/// `/health` payload.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthInfo {
    pub status: String,
    pub pages: usize,
    pub browser_connected: bool,
}

/// `GET /structure` payload fields.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureInfo {
    pub structure: String,
    pub html_path: String,
    pub actions_path: String,
    pub console_log_path: String,
}

/// `GET /api/recordings/:id` outcome.
pub enum RecordingDetail {
    Disabled,
    Found {
        file: session_recorder::RecordingFile,
        base_path: PathBuf,
        data_path: PathBuf,
    },
}

pub struct PageManager {
    config: ServiceConfig,
    adapter: Arc<DriverAdapter>,
    pages: DashMap<String, Arc<PageEntry>>,
    events: broadcast::Sender<ControlEvent>,
}

impl PageManager {
    pub fn new(config: ServiceConfig, adapter: Arc<DriverAdapter>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            config,
            adapter,
            pages: DashMap::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.events.subscribe()
    }

    pub fn health(&self) -> HealthInfo {
        HealthInfo {
            status: "ok".to_string(),
            pages: self.pages.len(),
            browser_connected: self.adapter.connected(),
        }
    }

    pub async fn shutdown(&self) {
        self.adapter.shutdown().await;
    }

    fn entry(&self, id: &str) -> Result<Arc<PageEntry>, ControlError> {
        self.pages
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| ControlError::page_not_found(id))
    }

    fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.config.settle_timeout_ms)
    }

    fn info_for(&self, state: &PageState) -> PageInfo {
        PageInfo {
            id: state.id.0.clone(),
            name: state.name.clone(),
            description: state.description.clone(),
            url: self
                .adapter
                .recent_url(&state.id)
                .unwrap_or_else(|| "about:blank".to_string()),
            created_at: state.created_at,
            console_log_path: state.console_log_path(),
            title: None,
        }
    }

    fn append_record(&self, state: &PageState, record: ActionRecord, artifacts: SnapshotArtifacts) {
        let Some(recorder) = &state.recorder else {
            return;
        };
        match recorder.append(record, artifacts) {
            Ok(appended) => {
                let _ = self.events.send(ControlEvent::ActionRecorded(ActionBroadcast {
                    page_id: state.id.0.clone(),
                    action: appended,
                }));
            }
            Err(err) => {
                warn!(target: "simplepage", %err, page = %state.id, "recording append failed");
            }
        }
    }

    /// Pre-action snapshot; `None` when the page does not record. A capture
    /// failure fails the whole operation so every recorded action keeps its
    /// snapshot invariant.
    async fn pre_snapshot(
        &self,
        state: &PageState,
    ) -> Result<Option<SnapshotArtifacts>, ControlError> {
        if state.recorder.is_none() {
            return Ok(None);
        }
        let (_, artifacts) = state.capture_artifacts().await?;
        Ok(Some(artifacts))
    }

    // ---- lifecycle ------------------------------------------------------

    pub async fn create_page(
        &self,
        name: String,
        url: String,
        description: Option<String>,
        timeout_ms: u64,
        record_actions: bool,
    ) -> Result<PageInfo, ControlError> {
        let page_id = self.adapter.create_page().await.map_err(ControlError::from)?;
        let driver = PageDriver::new(Arc::clone(&self.adapter), page_id.clone());
        driver.init().await.map_err(ControlError::from)?;

        let created_at = Utc::now().timestamp_millis();
        let recorder = if record_actions {
            Some(SessionRecorder::open(
                &self.config.recordings_root,
                &page_id.0,
                &name,
                description.as_deref(),
            )?)
        } else {
            None
        };
        let console = match &recorder {
            Some(recorder) => Some(recorder.open_console(created_at)?),
            None => None,
        };

        let mut registry = FrameRegistry::new();
        if let Some(top) = self.adapter.top_frame_id(&page_id) {
            registry.observe_top_frame(&top);
        }

        let state = Arc::new(PageState {
            id: page_id.clone(),
            name,
            description,
            created_at,
            driver,
            registry: Mutex::new(registry),
            cached_xpath: parking_lot::RwLock::new(None),
            recorder,
            console,
            enable_screenshot: self.config.screenshot,
            settle_timeout: self.settle_timeout(),
        });
        Arc::clone(&state).spawn_event_watcher();

        let entry = Arc::new(PageEntry {
            state: Arc::clone(&state),
            op_lock: tokio::sync::Mutex::new(()),
        });
        self.pages.insert(page_id.0.clone(), Arc::clone(&entry));

        {
            let _guard = entry.op_lock.lock().await;

            // The create action is emitted post-init so its snapshot works;
            // the initial navigation belongs to it rather than to a separate
            // navigate entry.
            if state.recorder.is_some() {
                let artifacts = match self.pre_snapshot(&state).await {
                    Ok(artifacts) => artifacts.unwrap_or_default(),
                    Err(err) => {
                        self.drop_page(&state).await;
                        return Err(err);
                    }
                };
                let mut record = ActionRecord::new(ActionKind::Create, state.next_ts());
                record.url = Some(url.clone());
                record.description = state.description.clone();
                record.timeout = Some(timeout_ms);
                self.append_record(&state, record, artifacts);
            }

            if let Err(err) = state
                .driver
                .navigate(&url, Duration::from_millis(timeout_ms))
                .await
            {
                self.drop_page(&state).await;
                return Err(err.into());
            }
            state.driver.settle(Some(state.settle_timeout)).await;
        }

        let page_info = self.info_for(&state);
        info!(target: "simplepage", page = %state.id, url = %url, "page created");
        if record_actions {
            let _ = self.events.send(ControlEvent::PageCreated(page_info.clone()));
        }
        Ok(page_info)
    }

    async fn drop_page(&self, state: &PageState) {
        if let Err(err) = state.driver.close().await {
            warn!(target: "simplepage", %err, page = %state.id, "driver close failed");
        }
        self.pages.remove(&state.id.0);
    }

    pub fn list_pages(&self) -> Vec<PageInfo> {
        let mut pages: Vec<PageInfo> = self
            .pages
            .iter()
            .map(|entry| self.info_for(&entry.value().state))
            .collect();
        pages.sort_by_key(|p| p.created_at);
        pages
    }

    pub async fn page_info(&self, id: &str) -> Result<PageInfo, ControlError> {
        let entry = self.entry(id)?;
        let mut page_info = self.info_for(&entry.state);
        match entry.state.driver.title().await {
            Ok(title) => page_info.title = Some(title),
            Err(err) => {
                warn!(target: "simplepage", %err, page = id, "title fetch failed");
            }
        }
        Ok(page_info)
    }

    pub async fn close_page(&self, id: &str) -> Result<(), ControlError> {
        let entry = self.entry(id)?;
        {
            let _guard = entry.op_lock.lock().await;
            let state = &entry.state;
            // Close never snapshots.
            let record = ActionRecord::new(ActionKind::Close, state.next_ts());
            self.append_record(state, record, SnapshotArtifacts::default());
            if let Err(err) = state.driver.close().await {
                warn!(target: "simplepage", %err, page = id, "driver close failed");
            }
        }
        self.pages.remove(id);
        let _ = self.events.send(ControlEvent::PageClosed { id: id.to_string() });
        info!(target: "simplepage", page = id, "page closed");
        Ok(())
    }

    // ---- navigation -----------------------------------------------------

    pub async fn navigate(
        &self,
        id: &str,
        url: &str,
        timeout_ms: u64,
        description: Option<String>,
    ) -> Result<String, ControlError> {
        let entry = self.entry(id)?;
        let _guard = entry.op_lock.lock().await;
        let state = &entry.state;

        let artifacts = self.pre_snapshot(state).await?;
        let result = state
            .driver
            .navigate(url, Duration::from_millis(timeout_ms))
            .await;
        state.driver.settle(Some(state.settle_timeout)).await;

        self.finish_navigation(
            state,
            ActionKind::Navigate,
            result,
            artifacts,
            description,
            Some(timeout_ms),
        )
    }

    pub async fn navigate_back(
        &self,
        id: &str,
        description: Option<String>,
    ) -> Result<String, ControlError> {
        let entry = self.entry(id)?;
        let _guard = entry.op_lock.lock().await;
        let state = &entry.state;

        let artifacts = self.pre_snapshot(state).await?;
        let result = state
            .driver
            .navigate_back(Duration::from_millis(crate::config::DEFAULT_NAVIGATE_TIMEOUT_MS))
            .await;
        state.driver.settle(Some(state.settle_timeout)).await;

        self.finish_navigation(state, ActionKind::NavigateBack, result, artifacts, description, None)
    }

    pub async fn navigate_forward(
        &self,
        id: &str,
        description: Option<String>,
    ) -> Result<String, ControlError> {
        let entry = self.entry(id)?;
        let _guard = entry.op_lock.lock().await;
        let state = &entry.state;

        let artifacts = self.pre_snapshot(state).await?;
        let result = state
            .driver
            .navigate_forward(Duration::from_millis(crate::config::DEFAULT_NAVIGATE_TIMEOUT_MS))
            .await;
        state.driver.settle(Some(state.settle_timeout)).await;

        self.finish_navigation(
            state,
            ActionKind::NavigateForward,
            result,
            artifacts,
            description,
            None,
        )
    }

    pub async fn reload(&self, id: &str, timeout_ms: u64) -> Result<String, ControlError> {
        let entry = self.entry(id)?;
        let _guard = entry.op_lock.lock().await;
        let state = &entry.state;

        let artifacts = self.pre_snapshot(state).await?;
        let result = state
            .driver
            .reload(Duration::from_millis(timeout_ms))
            .await;
        state.driver.settle(Some(state.settle_timeout)).await;

        self.finish_navigation(state, ActionKind::Reload, result, artifacts, None, Some(timeout_ms))
    }

    fn finish_navigation(
        &self,
        state: &PageState,
        kind: ActionKind,
        result: Result<String, cdp_adapter::DriverError>,
        artifacts: Option<SnapshotArtifacts>,
        description: Option<String>,
        timeout_ms: Option<u64>,
    ) -> Result<String, ControlError> {
        match result {
            Ok(final_url) => {
                if let Some(artifacts) = artifacts {
                    let mut record = ActionRecord::new(kind, state.next_ts());
                    record.url = Some(final_url.clone());
                    record.description = description;
                    record.timeout = timeout_ms;
                    record.success = Some(true);
                    self.append_record(state, record, artifacts);
                }
                Ok(final_url)
            }
            Err(err) => {
                // A failed step is only recorded when its snapshot exists.
                if let Some(artifacts) = artifacts {
                    let mut record = ActionRecord::new(kind, state.next_ts());
                    record.description = description;
                    record.timeout = timeout_ms;
                    record.success = Some(false);
                    record.error = Some(err.to_string());
                    self.append_record(state, record, artifacts);
                }
                Err(err.into())
            }
        }
    }

    // ---- snapshots ------------------------------------------------------

    pub async fn structure(
        &self,
        id: &str,
        selector: Option<&str>,
    ) -> Result<StructureInfo, ControlError> {
        let entry = self.entry(id)?;
        let _guard = entry.op_lock.lock().await;
        let state = &entry.state;

        let view = state.capture_view(selector).await?;

        let mut html_path = String::new();
        let mut actions_path = String::new();
        if let Some(recorder) = &state.recorder {
            actions_path = recorder.actions_path().display().to_string();
            let ts = recorder.next_timestamp();
            match state.driver.content().await {
                Ok(html) => match recorder.write_page_html(ts, &html) {
                    Ok(name) => {
                        html_path = recorder.data_dir().join(name).display().to_string();
                    }
                    Err(err) => {
                        warn!(target: "simplepage", %err, "page html artifact write failed");
                    }
                },
                Err(err) => {
                    warn!(target: "simplepage", %err, "page content fetch failed");
                }
            }
            match serde_json::to_value(&view.tree) {
                Ok(tree) => {
                    if let Err(err) = recorder.write_axtree(ts, &tree) {
                        warn!(target: "simplepage", %err, "axtree artifact write failed");
                    }
                }
                Err(err) => {
                    warn!(target: "simplepage", %err, "axtree serialization failed");
                }
            }
        }

        Ok(StructureInfo {
            structure: view.simplified,
            html_path,
            actions_path,
            console_log_path: state.console_log_path().unwrap_or_default(),
        })
    }

    pub async fn screenshot(&self, id: &str) -> Result<Vec<u8>, ControlError> {
        let entry = self.entry(id)?;
        entry
            .state
            .driver
            .screenshot(Default::default())
            .await
            .map_err(ControlError::from)
    }

    pub fn xpath_for(&self, id: &str, encoded: &str) -> Result<String, ControlError> {
        let entry = self.entry(id)?;
        let (xpath, _) = entry.state.resolve_encoded(encoded)?;
        Ok(xpath)
    }

    // ---- actions --------------------------------------------------------

    pub async fn act_xpath(
        &self,
        id: &str,
        xpath: String,
        method: &str,
        args: Vec<Value>,
        description: Option<String>,
    ) -> Result<(), ControlError> {
        let method: ActMethod = method.parse().map_err(ControlError::from)?;
        self.act_inner(id, Target::XPath(xpath), method, args, description)
            .await
    }

    pub async fn act_encoded(
        &self,
        id: &str,
        encoded: String,
        method: &str,
        args: Vec<Value>,
        description: Option<String>,
    ) -> Result<(), ControlError> {
        let method: ActMethod = method.parse().map_err(ControlError::from)?;
        self.act_inner(id, Target::Encoded(encoded), method, args, description)
            .await
    }

    async fn act_inner(
        &self,
        id: &str,
        target: Target,
        method: ActMethod,
        args: Vec<Value>,
        description: Option<String>,
    ) -> Result<(), ControlError> {
        let entry = self.entry(id)?;
        let _guard = entry.op_lock.lock().await;
        let state = &entry.state;

        let artifacts = self.pre_snapshot(state).await?;

        // Encoded ids resolve against the freshly cached map.
        let (xpath, frame, encoded) = match &target {
            Target::XPath(xpath) => (xpath.clone(), None, None),
            Target::Encoded(encoded) => {
                let (xpath, frame) = state.resolve_encoded(encoded)?;
                (xpath, frame, Some(encoded.clone()))
            }
        };

        let request = ActRequest {
            method,
            xpath: xpath.clone(),
            frame,
            args: args.clone(),
            settle_timeout: Some(state.settle_timeout),
        };
        let result = action_primitives::execute(&state.driver, &request).await;

        let build_record = |success: bool, error: Option<String>, ts: i64| {
            let mut record = ActionRecord::new(ActionKind::Act, ts);
            record.method = Some(method.as_str().to_string());
            record.xpath = Some(xpath.clone());
            record.encoded_id = encoded.clone();
            if !args.is_empty() {
                record.args = Some(args.clone());
            }
            record.description = description.clone();
            record.success = Some(success);
            record.error = error;
            record
        };

        match result {
            Ok(()) => {
                if let Some(artifacts) = artifacts {
                    let record = build_record(true, None, state.next_ts());
                    self.append_record(state, record, artifacts);
                }
                Ok(())
            }
            Err(err) => {
                if let Some(artifacts) = artifacts {
                    let record = build_record(false, Some(err.to_string()), state.next_ts());
                    self.append_record(state, record, artifacts);
                }
                Err(err.into())
            }
        }
    }

    pub async fn wait(
        &self,
        id: &str,
        timeout_ms: u64,
        description: Option<String>,
    ) -> Result<(), ControlError> {
        let entry = self.entry(id)?;
        let _guard = entry.op_lock.lock().await;
        let state = &entry.state;

        let artifacts = self.pre_snapshot(state).await?;
        state.driver.wait_for_timeout(timeout_ms).await;

        if let Some(artifacts) = artifacts {
            let mut record = ActionRecord::new(ActionKind::Wait, state.next_ts());
            record.timeout = Some(timeout_ms);
            record.description = description;
            record.success = Some(true);
            self.append_record(state, record, artifacts);
        }
        Ok(())
    }

    pub async fn condition(
        &self,
        id: &str,
        pattern: &str,
        flags: Option<&str>,
        description: Option<String>,
    ) -> Result<bool, ControlError> {
        let entry = self.entry(id)?;
        let _guard = entry.op_lock.lock().await;
        let state = &entry.state;

        let regex = build_regex(pattern, flags)?;

        // The condition's own snapshot doubles as its recorded artifacts.
        let (view, artifacts) = if state.recorder.is_some() {
            let (view, artifacts) = state.capture_artifacts().await?;
            (view, Some(artifacts))
        } else {
            (state.capture_view(None).await?, None)
        };
        let matched = regex.is_match(&view.simplified);

        if let Some(artifacts) = artifacts {
            let mut record = ActionRecord::new(ActionKind::Condition, state.next_ts());
            record.pattern = Some(pattern.to_string());
            record.flags = flags.map(|s| s.to_string());
            record.matched = Some(matched);
            record.description = description;
            record.success = Some(true);
            self.append_record(state, record, artifacts);
        }
        Ok(matched)
    }

    // ---- html extraction ------------------------------------------------

    pub async fn get_list_html(
        &self,
        id: &str,
        selector: &str,
    ) -> Result<(String, usize), ControlError> {
        let (list_file, count, _) = self
            .extract_html(id, selector, ActionKind::GetListHtml)
            .await?;
        Ok((list_file.unwrap_or_default(), count))
    }

    pub async fn get_list_html_by_parent(
        &self,
        id: &str,
        selector: &str,
    ) -> Result<(String, usize), ControlError> {
        let (list_file, count, _) = self
            .extract_html(id, selector, ActionKind::GetListHtmlByParent)
            .await?;
        Ok((list_file.unwrap_or_default(), count))
    }

    pub async fn get_element_html(
        &self,
        id: &str,
        selector: &str,
    ) -> Result<String, ControlError> {
        let (_, _, element_file) = self
            .extract_html(id, selector, ActionKind::GetElementHtml)
            .await?;
        Ok(element_file.unwrap_or_default())
    }

    async fn extract_html(
        &self,
        id: &str,
        selector: &str,
        kind: ActionKind,
    ) -> Result<(Option<String>, usize, Option<String>), ControlError> {
        let entry = self.entry(id)?;
        let _guard = entry.op_lock.lock().await;
        let state = &entry.state;

        let Some(recorder) = &state.recorder else {
            return Err(ControlError::bad_request(
                "html extraction requires recording to be enabled for the page",
            ));
        };

        let (_, artifacts) = state.capture_artifacts().await?;

        let script = match kind {
            ActionKind::GetListHtml => extract::list_script(selector)?,
            ActionKind::GetListHtmlByParent => extract::list_by_parent_script(selector)?,
            ActionKind::GetElementHtml => extract::element_script(selector)?,
            other => {
                return Err(ControlError::internal(format!(
                    "extract_html called with kind {other}"
                )))
            }
        };

        let ts = recorder.next_timestamp();
        let mut record = ActionRecord::new(kind, ts);
        record.selector = Some(selector.to_string());

        let outcome: Result<(Option<String>, usize, Option<String>), ControlError> = async {
            let value = state
                .driver
                .evaluate(&script)
                .await
                .map_err(ControlError::from)?;
            let items = extract::decode_items(value, selector)?;

            match kind {
                ActionKind::GetElementHtml => {
                    let html = items.first().ok_or_else(|| {
                        ControlError::new(
                            ErrorKind::ElementNotFound,
                            format!("no element matches '{selector}'"),
                        )
                    })?;
                    let name = recorder.write_element_file(ts, html)?;
                    Ok((None, items.len(), Some(name)))
                }
                _ => {
                    let name = recorder.write_list_file(ts, &items)?;
                    Ok((Some(name), items.len(), None))
                }
            }
        }
        .await;

        match outcome {
            Ok((list_file, count, element_file)) => {
                record.list_file = list_file.clone();
                record.element_file = element_file.clone();
                if list_file.is_some() {
                    record.count = Some(count);
                }
                record.success = Some(true);
                self.append_record(state, record, artifacts);
                Ok((list_file, count, element_file))
            }
            Err(err) => {
                record.success = Some(false);
                record.error = Some(err.to_string());
                self.append_record(state, record, artifacts);
                Err(err)
            }
        }
    }

    // ---- recordings -----------------------------------------------------

    pub async fn delete_action(&self, id: &str, index: usize) -> Result<(), ControlError> {
        let entry = self.entry(id)?;
        let _guard = entry.op_lock.lock().await;
        let recorder = entry.state.recorder.as_ref().ok_or_else(|| {
            ControlError::bad_request("recording is disabled for this page")
        })?;
        recorder.delete_action(index).map_err(ControlError::from)
    }

    /// Remove the recording directory and drop the page entirely
    /// (invariant: afterwards the directory is absent and the id unknown).
    pub async fn delete_records(&self, id: &str) -> Result<(), ControlError> {
        let entry = self.entry(id)?;
        {
            let _guard = entry.op_lock.lock().await;
            let state = &entry.state;
            if let Some(recorder) = &state.recorder {
                recorder.delete_all()?;
            }
            if let Err(err) = state.driver.close().await {
                warn!(target: "simplepage", %err, page = id, "driver close failed");
            }
        }
        self.pages.remove(id);
        let _ = self.events.send(ControlEvent::PageClosed { id: id.to_string() });
        Ok(())
    }

    pub fn list_recordings(&self) -> Vec<RecordingSummary> {
        session_recorder::list_recordings(&self.config.recordings_root)
    }

    pub fn read_recording(&self, id: &str) -> Result<Option<RecordingDetail>, ControlError> {
        // A live page that opted out of recording reports that explicitly.
        if let Some(entry) = self.pages.get(id) {
            if entry.state.recorder.is_none() {
                return Ok(Some(RecordingDetail::Disabled));
            }
        }

        let file = session_recorder::read_recording(&self.config.recordings_root, id)?;
        Ok(file.map(|file| {
            let base_path = layout::recording_dir(&self.config.recordings_root, id);
            let data_path = layout::data_dir(&base_path);
            RecordingDetail::Found {
                file,
                base_path,
                data_path,
            }
        }))
    }

    /// Resolve a servable artifact path, enforcing the filename shape and
    /// the canonical containment check.
    pub fn recording_file_path(
        &self,
        id: &str,
        filename: &str,
        data_only: bool,
    ) -> Result<PathBuf, ControlError> {
        let valid_name = if data_only {
            layout::is_data_name(filename)
        } else {
            layout::is_artifact_name(filename) || filename == "actions.json"
        };
        if !valid_name {
            return Err(ControlError::forbidden(format!(
                "filename '{filename}' is not a servable artifact"
            )));
        }

        let base = layout::recording_dir(&self.config.recordings_root, id);
        if !layout::actions_path(&base).exists() {
            return Err(ControlError::recording_not_found(id));
        }

        let in_root = filename == "actions.json" || filename.starts_with("console-");
        let dir = if in_root {
            base.clone()
        } else {
            layout::data_dir(&base)
        };
        let candidate = dir.join(filename);

        let canonical_dir = dir
            .canonicalize()
            .map_err(|_| ControlError::recording_not_found(id))?;
        let canonical = candidate
            .canonicalize()
            .map_err(|_| ControlError::recording_not_found(filename))?;
        if !canonical.starts_with(&canonical_dir) {
            return Err(ControlError::forbidden("artifact path escapes the recording"));
        }
        Ok(canonical)
    }
}

enum Target {
    XPath(String),
    Encoded(String),
}

fn build_regex(pattern: &str, flags: Option<&str>) -> Result<regex::Regex, ControlError> {
    let mut builder = RegexBuilder::new(pattern);
    if let Some(flags) = flags {
        for flag in flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                other => {
                    return Err(ControlError::bad_request(format!(
                        "unsupported regex flag '{other}'"
                    )));
                }
            }
        }
    }
    builder
        .build()
        .map_err(|err| ControlError::bad_request(format!("invalid pattern: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_flags_apply() {
        let re = build_regex("hello", Some("i")).unwrap();
        assert!(re.is_match("HELLO world"));
        assert!(build_regex("(", None).is_err());
        assert!(build_regex("x", Some("g")).is_err());
    }
}
