//! Driver adapter: owns the transport, tracks targets/sessions/frames and
//! fans normalized debug events out per page.
//!
//! Out-of-process iframes auto-attach as their own sessions and are aliased
//! to the owning page here, so consumers see one network-event stream per
//! page regardless of the frame topology. Same-process iframes never get a
//! session of their own and transparently use the top-level one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use network_settle::NetworkEvent;
use serde_json::{json, Value};
use simplepage_core_types::PageId;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::error::{DriverError, DriverErrorKind};
use crate::page::DialogChoice;
use crate::transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};

/// Page-scoped events other than network traffic.
#[derive(Clone, Debug)]
pub enum PageEvent {
    DialogOpening {
        message: String,
        kind: String,
    },
    DialogHandled {
        accepted: bool,
    },
    Console {
        level: String,
        text: String,
        stack: Option<String>,
    },
    PageError {
        message: String,
        stack: Option<String>,
    },
    TopFrameNavigated {
        frame_id: String,
        url: String,
    },
}

#[derive(Clone, Debug, Default)]
struct PageContext {
    target_id: String,
    session: Option<String>,
    /// `(session id, frame id)` pairs for attached out-of-process iframes.
    iframe_sessions: Vec<(String, String)>,
    top_frame_id: Option<String>,
    recent_url: Option<String>,
}

#[derive(Clone, Debug)]
struct ExecutionContext {
    session: Option<String>,
    context_id: i64,
}

/// Concurrent adapter state. One instance serves every page of the browser.
pub struct DriverAdapter {
    pub cfg: DriverConfig,
    transport: Arc<dyn CdpTransport>,
    targets: DashMap<String, PageId>,
    sessions: DashMap<String, PageId>,
    pages: DashMap<PageId, PageContext>,
    contexts: DashMap<String, ExecutionContext>,
    net_buses: DashMap<PageId, broadcast::Sender<NetworkEvent>>,
    page_buses: DashMap<PageId, broadcast::Sender<PageEvent>>,
    dialog_choices: DashMap<PageId, DialogChoice>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DriverAdapter {
    /// Build against a launched/attached Chromium, or fall back to the noop
    /// transport when no browser can be found (the service stays up and
    /// reports itself disconnected).
    pub fn new(mut cfg: DriverConfig) -> Self {
        let transport: Arc<dyn CdpTransport> = if cfg.websocket_url.is_some() {
            Arc::new(ChromiumTransport::new(cfg.clone()))
        } else {
            let detected = if cfg.executable.as_os_str().is_empty() || !cfg.executable.exists() {
                crate::config::detect_chrome_executable()
            } else {
                Some(cfg.executable.clone())
            };
            match detected {
                Some(path) => {
                    cfg.executable = path;
                    Arc::new(ChromiumTransport::new(cfg.clone()))
                }
                None => {
                    warn!(
                        target: "cdp-adapter",
                        "no chromium executable found; running without a browser (set SIMPLEPAGE_CHROME)"
                    );
                    Arc::new(crate::transport::NoopTransport)
                }
            }
        };
        Self::with_transport(cfg, transport)
    }

    pub fn with_transport(cfg: DriverConfig, transport: Arc<dyn CdpTransport>) -> Self {
        Self {
            cfg,
            transport,
            targets: DashMap::new(),
            sessions: DashMap::new(),
            pages: DashMap::new(),
            contexts: DashMap::new(),
            net_buses: DashMap::new(),
            page_buses: DashMap::new(),
            dialog_choices: DashMap::new(),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn connected(&self) -> bool {
        self.transport.connected()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn start(self: Arc<Self>) -> Result<(), DriverError> {
        {
            let guard = self.tasks.lock().await;
            if !guard.is_empty() {
                return Ok(());
            }
        }
        self.transport.start().await?;
        let loop_task = tokio::spawn(Self::event_loop(Arc::clone(&self)));
        self.tasks.lock().await.push(loop_task);
        info!(target: "cdp-adapter", "adapter event loop started");
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut handles = self.tasks.lock().await;
        while let Some(handle) = handles.pop() {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Open a new browser page and wait until its session is attached.
    pub async fn create_page(&self) -> Result<PageId, DriverError> {
        let response = self
            .send_browser_command("Target.createTarget", json!({ "url": "about:blank" }))
            .await?;
        let target_id = response
            .get("targetId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DriverError::internal("createTarget missing targetId"))?
            .to_string();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(entry) = self.targets.get(&target_id) {
                let page = entry.value().clone();
                if self
                    .pages
                    .get(&page)
                    .map(|ctx| ctx.session.is_some())
                    .unwrap_or(false)
                {
                    return Ok(page);
                }
            }
            if Instant::now() >= deadline {
                return Err(DriverError::timeout("waiting for target attach"));
            }
            sleep(Duration::from_millis(50)).await;
        }
    }

    pub async fn close_page(&self, page: &PageId) -> Result<(), DriverError> {
        let target_id = self
            .pages
            .get(page)
            .map(|ctx| ctx.target_id.clone())
            .ok_or_else(|| DriverError::new(DriverErrorKind::Detached).with_hint("unknown page"))?;
        self.send_browser_command("Target.closeTarget", json!({ "targetId": target_id }))
            .await?;
        Ok(())
    }

    pub async fn send_browser_command(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Value, DriverError> {
        self.transport
            .send_command(CommandTarget::Browser, method, params)
            .await
    }

    pub async fn send_session_command(
        &self,
        session: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, DriverError> {
        self.transport
            .send_command(CommandTarget::Session(session.to_string()), method, params)
            .await
    }

    /// Command against the page's top session.
    pub async fn send_page_command(
        &self,
        page: &PageId,
        method: &str,
        params: Value,
    ) -> Result<Value, DriverError> {
        let session = self.top_session(page)?;
        self.send_session_command(&session, method, params).await
    }

    pub fn top_session(&self, page: &PageId) -> Result<String, DriverError> {
        self.pages
            .get(page)
            .and_then(|ctx| ctx.session.clone())
            .ok_or_else(|| {
                DriverError::new(DriverErrorKind::Detached)
                    .with_hint(format!("no cdp session for page {page}"))
            })
    }

    /// `(frame id, session id)` pairs: the top frame plus every attached
    /// out-of-process iframe.
    pub fn page_sessions(&self, page: &PageId) -> Vec<(Option<String>, String)> {
        let Some(ctx) = self.pages.get(page) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        if let Some(top) = ctx.session.clone() {
            out.push((None, top));
        }
        for (session, frame) in &ctx.iframe_sessions {
            out.push((Some(frame.clone()), session.clone()));
        }
        out
    }

    pub fn top_frame_id(&self, page: &PageId) -> Option<String> {
        self.pages.get(page).and_then(|ctx| ctx.top_frame_id.clone())
    }

    pub fn set_top_frame_id(&self, page: &PageId, frame_id: String) {
        if let Some(mut ctx) = self.pages.get_mut(page) {
            ctx.top_frame_id = Some(frame_id);
        }
    }

    pub fn recent_url(&self, page: &PageId) -> Option<String> {
        self.pages.get(page).and_then(|ctx| ctx.recent_url.clone())
    }

    pub fn set_recent_url(&self, page: &PageId, url: String) {
        if let Some(mut ctx) = self.pages.get_mut(page) {
            ctx.recent_url = Some(url);
        }
    }

    pub fn subscribe_network(&self, page: &PageId) -> broadcast::Receiver<NetworkEvent> {
        self.net_bus(page).subscribe()
    }

    pub fn subscribe_page_events(&self, page: &PageId) -> broadcast::Receiver<PageEvent> {
        self.page_bus(page).subscribe()
    }

    pub fn set_dialog_choice(&self, page: &PageId, choice: DialogChoice) {
        self.dialog_choices.insert(page.clone(), choice);
    }

    pub fn clear_dialog_choice(&self, page: &PageId) {
        self.dialog_choices.remove(page);
    }

    /// Evaluate an expression in a frame's default execution context.
    ///
    /// Frames without a tracked context (same-process iframes before their
    /// context event, or the top frame itself) alias to the top session's
    /// default context.
    pub async fn evaluate_in_frame(
        &self,
        page: &PageId,
        frame_id: Option<&str>,
        expression: &str,
        return_by_value: bool,
    ) -> Result<Value, DriverError> {
        let mut params = json!({
            "expression": expression,
            "returnByValue": return_by_value,
            "awaitPromise": true,
        });

        let session = match frame_id {
            Some(frame) if Some(frame) != self.top_frame_id(page).as_deref() => {
                match self.contexts.get(frame) {
                    Some(ctx) => {
                        params["contextId"] = json!(ctx.context_id);
                        match &ctx.session {
                            Some(session) => session.clone(),
                            None => self.top_session(page)?,
                        }
                    }
                    None => {
                        debug!(
                            target: "cdp-adapter",
                            frame,
                            "no execution context for frame; aliasing to top session"
                        );
                        self.top_session(page)?
                    }
                }
            }
            _ => self.top_session(page)?,
        };

        let response = self
            .send_session_command(&session, "Runtime.evaluate", params)
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            let text = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|d| d.as_str())
                .or_else(|| details.get("text").and_then(|t| t.as_str()))
                .unwrap_or("javascript exception");
            return Err(DriverError::internal(text));
        }

        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    fn net_bus(&self, page: &PageId) -> broadcast::Sender<NetworkEvent> {
        self.net_buses
            .entry(page.clone())
            .or_insert_with(|| broadcast::channel(512).0)
            .clone()
    }

    fn page_bus(&self, page: &PageId) -> broadcast::Sender<PageEvent> {
        self.page_buses
            .entry(page.clone())
            .or_insert_with(|| broadcast::channel(256).0)
            .clone()
    }

    fn page_from_session(&self, session: Option<&String>) -> Option<PageId> {
        session.and_then(|sid| self.sessions.get(sid).map(|entry| entry.value().clone()))
    }

    async fn event_loop(self: Arc<Self>) {
        const MIN_BACKOFF: Duration = Duration::from_millis(250);
        const MAX_BACKOFF: Duration = Duration::from_secs(5);
        let mut backoff = MIN_BACKOFF;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = self.transport.next_event() => {
                    match event {
                        Some(ev) => {
                            backoff = MIN_BACKOFF;
                            self.process_event(ev).await;
                        }
                        None => {
                            if self.shutdown.is_cancelled() {
                                break;
                            }
                            debug!(target: "cdp-adapter", "transport stream idle");
                            sleep(backoff).await;
                            backoff = (backoff * 2).min(MAX_BACKOFF);
                        }
                    }
                }
            }
        }
        debug!(target: "cdp-adapter", "event loop exiting");
    }

    async fn process_event(&self, event: TransportEvent) {
        match event.method.as_str() {
            "Target.targetCreated" => self.on_target_created(event.params),
            "Target.targetDestroyed" => self.on_target_destroyed(event.params),
            "Target.attachedToTarget" => self.on_target_attached(event).await,
            "Target.detachedFromTarget" => self.on_target_detached(event.params),
            "Page.frameNavigated" => self.on_frame_navigated(event),
            "Page.frameStoppedLoading" => {
                if let Some(page) = self.page_from_session(event.session_id.as_ref()) {
                    if let Some(frame) = event.params.get("frameId").and_then(|v| v.as_str()) {
                        let _ = self.net_bus(&page).send(NetworkEvent::FrameStoppedLoading {
                            frame_id: frame.to_string(),
                        });
                    }
                }
            }
            "Network.requestWillBeSent" => self.on_request_will_be_sent(event),
            "Network.responseReceived" => self.on_response_received(event),
            "Network.loadingFinished" => {
                self.forward_completion(event, |id| NetworkEvent::LoadingFinished { request_id: id })
            }
            "Network.loadingFailed" => {
                self.forward_completion(event, |id| NetworkEvent::LoadingFailed { request_id: id })
            }
            "Network.requestServedFromCache" => {
                self.forward_completion(event, |id| NetworkEvent::ServedFromCache { request_id: id })
            }
            "Page.javascriptDialogOpening" => self.on_dialog_opening(event).await,
            "Runtime.consoleAPICalled" => self.on_console_api(event),
            "Runtime.exceptionThrown" => self.on_exception_thrown(event),
            "Runtime.executionContextCreated" => self.on_context_created(event),
            "Runtime.executionContextDestroyed" | "Runtime.executionContextsCleared" => {
                self.on_contexts_dropped(event)
            }
            other => {
                debug!(target: "cdp-adapter", method = other, "unhandled cdp event");
            }
        }
    }

    fn on_target_created(&self, params: Value) {
        let Some(info) = params.get("targetInfo") else {
            return;
        };
        if info.get("type").and_then(|v| v.as_str()) != Some("page") {
            return;
        }
        let Some(target_id) = info.get("targetId").and_then(|v| v.as_str()) else {
            return;
        };
        if self.targets.contains_key(target_id) {
            return;
        }
        let page = PageId::new();
        self.targets.insert(target_id.to_string(), page.clone());
        let mut ctx = PageContext::default();
        ctx.target_id = target_id.to_string();
        ctx.recent_url = info
            .get("url")
            .and_then(|v| v.as_str())
            .filter(|u| !u.is_empty())
            .map(|u| u.to_string());
        self.pages.insert(page, ctx);
    }

    fn on_target_destroyed(&self, params: Value) {
        let Some(target_id) = params.get("targetId").and_then(|v| v.as_str()) else {
            return;
        };
        if let Some((_, page)) = self.targets.remove(target_id) {
            self.sessions.retain(|_, owner| *owner != page);
            self.pages.remove(&page);
            self.dialog_choices.remove(&page);
            // Dropping the senders closes any outstanding subscriptions.
            self.net_buses.remove(&page);
            self.page_buses.remove(&page);
        }
    }

    async fn on_target_attached(&self, event: TransportEvent) {
        let params = event.params;
        let Some(session_id) = params.get("sessionId").and_then(|v| v.as_str()) else {
            return;
        };
        let Some(info) = params.get("targetInfo") else {
            return;
        };
        let target_type = info.get("type").and_then(|v| v.as_str()).unwrap_or("");
        let target_id = info
            .get("targetId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        match target_type {
            "page" => {
                let Some(entry) = self.targets.get(&target_id) else {
                    return;
                };
                let page = entry.value().clone();
                drop(entry);
                self.sessions.insert(session_id.to_string(), page.clone());
                if let Some(mut ctx) = self.pages.get_mut(&page) {
                    ctx.session = Some(session_id.to_string());
                }
            }
            "iframe" => {
                // OOPIF: the attach notification arrives on the parent's
                // session; the new target id doubles as the frame id.
                let Some(owner) = self.page_from_session(event.session_id.as_ref()) else {
                    return;
                };
                self.sessions.insert(session_id.to_string(), owner.clone());
                if let Some(mut ctx) = self.pages.get_mut(&owner) {
                    ctx.iframe_sessions
                        .push((session_id.to_string(), target_id.clone()));
                }
                self.enable_session_domains(session_id.to_string());
            }
            // Workers are excluded from the debug surface.
            _ => {}
        }
    }

    fn on_target_detached(&self, params: Value) {
        let Some(session_id) = params.get("sessionId").and_then(|v| v.as_str()) else {
            return;
        };
        if let Some((session, page)) = self.sessions.remove(session_id) {
            if let Some(mut ctx) = self.pages.get_mut(&page) {
                ctx.iframe_sessions.retain(|(s, _)| *s != session);
            }
        }
        self.contexts
            .retain(|_, ctx| ctx.session.as_deref() != Some(session_id));
    }

    fn on_frame_navigated(&self, event: TransportEvent) {
        let Some(page) = self.page_from_session(event.session_id.as_ref()) else {
            return;
        };
        let Some(frame) = event.params.get("frame") else {
            return;
        };
        let is_top = frame.get("parentId").is_none();
        if !is_top {
            return;
        }
        let frame_id = frame
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let url = frame
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if let Some(mut ctx) = self.pages.get_mut(&page) {
            // Only the page target's own session reports the page's top
            // frame; OOPIF sessions report their root frame here too.
            if ctx.session.as_deref() != event.session_id.as_deref() {
                return;
            }
            ctx.top_frame_id = Some(frame_id.clone());
            ctx.recent_url = Some(url.clone());
        }
        let _ = self
            .page_bus(&page)
            .send(PageEvent::TopFrameNavigated { frame_id, url });
    }

    fn on_request_will_be_sent(&self, event: TransportEvent) {
        let Some(page) = self.page_from_session(event.session_id.as_ref()) else {
            return;
        };
        let params = event.params;
        let Some(request_id) = params.get("requestId").and_then(|v| v.as_str()) else {
            return;
        };
        let url = params
            .get("request")
            .and_then(|r| r.get("url"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let resource_type = params
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("Other")
            .to_string();
        let frame_id = params
            .get("frameId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let is_document = resource_type == "Document";
        let _ = self.net_bus(&page).send(NetworkEvent::RequestWillBeSent {
            request_id: request_id.to_string(),
            url,
            resource_type,
            frame_id,
            is_document,
        });
    }

    fn on_response_received(&self, event: TransportEvent) {
        let Some(page) = self.page_from_session(event.session_id.as_ref()) else {
            return;
        };
        let params = event.params;
        let Some(request_id) = params.get("requestId").and_then(|v| v.as_str()) else {
            return;
        };
        let url = params
            .get("response")
            .and_then(|r| r.get("url"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let _ = self.net_bus(&page).send(NetworkEvent::ResponseReceived {
            request_id: request_id.to_string(),
            url,
        });
    }

    fn forward_completion<F>(&self, event: TransportEvent, make: F)
    where
        F: FnOnce(String) -> NetworkEvent,
    {
        let Some(page) = self.page_from_session(event.session_id.as_ref()) else {
            return;
        };
        if let Some(request_id) = event.params.get("requestId").and_then(|v| v.as_str()) {
            let _ = self.net_bus(&page).send(make(request_id.to_string()));
        }
    }

    async fn on_dialog_opening(&self, event: TransportEvent) {
        let Some(page) = self.page_from_session(event.session_id.as_ref()) else {
            return;
        };
        let Some(session) = event.session_id.clone() else {
            return;
        };
        let message = event
            .params
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let kind = event
            .params
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("alert")
            .to_string();

        let choice = self.dialog_choices.remove(&page).map(|(_, c)| c);
        let accepted = choice.as_ref().map(|c| c.accept).unwrap_or(false);
        let mut params = json!({ "accept": accepted });
        if let Some(text) = choice.as_ref().and_then(|c| c.prompt_text.clone()) {
            params["promptText"] = json!(text);
        }

        let _ = self
            .page_bus(&page)
            .send(PageEvent::DialogOpening { message, kind });

        // Respond off the event loop so a slow command cannot stall other
        // pages' events.
        let bus = self.page_bus(&page);
        let transport = Arc::clone(&self.transport);
        let had_choice = choice.is_some();
        tokio::spawn(async move {
            let result = transport
                .send_command(
                    CommandTarget::Session(session),
                    "Page.handleJavaScriptDialog",
                    params,
                )
                .await;
            match result {
                Ok(_) => {
                    if had_choice {
                        let _ = bus.send(PageEvent::DialogHandled { accepted });
                    }
                }
                Err(err) => {
                    warn!(target: "cdp-adapter", %err, "failed to handle javascript dialog");
                }
            }
        });
    }

    fn on_console_api(&self, event: TransportEvent) {
        let Some(page) = self.page_from_session(event.session_id.as_ref()) else {
            return;
        };
        let level = event
            .params
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("log")
            .to_string();
        let text = event
            .params
            .get("args")
            .and_then(|v| v.as_array())
            .map(|args| {
                args.iter()
                    .map(preview_remote_object)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();
        let stack = matches!(level.as_str(), "error" | "warning")
            .then(|| format_stack(event.params.get("stackTrace")))
            .flatten();
        let _ = self.page_bus(&page).send(PageEvent::Console { level, text, stack });
    }

    fn on_exception_thrown(&self, event: TransportEvent) {
        let Some(page) = self.page_from_session(event.session_id.as_ref()) else {
            return;
        };
        let details = event.params.get("exceptionDetails");
        let message = details
            .and_then(|d| d.get("exception"))
            .and_then(|e| e.get("description"))
            .and_then(|v| v.as_str())
            .or_else(|| {
                details
                    .and_then(|d| d.get("text"))
                    .and_then(|v| v.as_str())
            })
            .unwrap_or("uncaught exception")
            .to_string();
        let stack = format_stack(details.and_then(|d| d.get("stackTrace")));
        let _ = self
            .page_bus(&page)
            .send(PageEvent::PageError { message, stack });
    }

    fn on_context_created(&self, event: TransportEvent) {
        let Some(context) = event.params.get("context") else {
            return;
        };
        let Some(context_id) = context.get("id").and_then(|v| v.as_i64()) else {
            return;
        };
        let aux = context.get("auxData");
        let is_default = aux
            .and_then(|a| a.get("isDefault"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !is_default {
            return;
        }
        let Some(frame_id) = aux.and_then(|a| a.get("frameId")).and_then(|v| v.as_str()) else {
            return;
        };
        self.contexts.insert(
            frame_id.to_string(),
            ExecutionContext {
                session: event.session_id,
                context_id,
            },
        );
    }

    fn on_contexts_dropped(&self, event: TransportEvent) {
        match event.params.get("executionContextId").and_then(|v| v.as_i64()) {
            Some(context_id) => {
                self.contexts.retain(|_, ctx| {
                    ctx.context_id != context_id || ctx.session != event.session_id
                });
            }
            None => {
                self.contexts
                    .retain(|_, ctx| ctx.session != event.session_id);
            }
        }
    }

    fn enable_session_domains(&self, session: String) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            for (method, params) in [
                ("Page.enable", json!({})),
                ("Network.enable", json!({})),
                ("Runtime.enable", json!({})),
            ] {
                if let Err(err) = transport
                    .send_command(
                        CommandTarget::Session(session.clone()),
                        method,
                        params,
                    )
                    .await
                {
                    warn!(target: "cdp-adapter", %err, method, "iframe session enable failed");
                }
            }
        });
    }
}

fn preview_remote_object(obj: &Value) -> String {
    if let Some(value) = obj.get("value") {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    } else if let Some(desc) = obj.get("description").and_then(|v| v.as_str()) {
        desc.to_string()
    } else {
        obj.get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("object")
            .to_string()
    }
}

fn format_stack(stack: Option<&Value>) -> Option<String> {
    let frames = stack?.get("callFrames")?.as_array()?;
    let lines: Vec<String> = frames
        .iter()
        .map(|frame| {
            let func = frame
                .get("functionName")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .unwrap_or("<anonymous>");
            let url = frame.get("url").and_then(|v| v.as_str()).unwrap_or("");
            let line = frame.get("lineNumber").and_then(|v| v.as_i64()).unwrap_or(0);
            let col = frame
                .get("columnNumber")
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            format!("    at {func} ({url}:{line}:{col})")
        })
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::NoopTransport;

    fn adapter() -> DriverAdapter {
        DriverAdapter::with_transport(DriverConfig::default(), Arc::new(NoopTransport))
    }

    fn attach_page(adapter: &DriverAdapter, target: &str, session: &str) -> PageId {
        adapter.on_target_created(json!({
            "targetInfo": { "targetId": target, "type": "page", "url": "" }
        }));
        let page = adapter.targets.get(target).unwrap().value().clone();
        adapter.sessions.insert(session.to_string(), page.clone());
        adapter.pages.get_mut(&page).unwrap().session = Some(session.to_string());
        page
    }

    #[tokio::test]
    async fn network_events_fan_out_per_page() {
        let adapter = adapter();
        let page = attach_page(&adapter, "t-1", "s-1");
        let mut rx = adapter.subscribe_network(&page);

        adapter.on_request_will_be_sent(TransportEvent {
            method: "Network.requestWillBeSent".into(),
            params: json!({
                "requestId": "r-1",
                "type": "Document",
                "frameId": "f-1",
                "request": { "url": "https://example.test/" },
            }),
            session_id: Some("s-1".into()),
        });

        match rx.try_recv().unwrap() {
            NetworkEvent::RequestWillBeSent {
                request_id,
                is_document,
                frame_id,
                ..
            } => {
                assert_eq!(request_id, "r-1");
                assert!(is_document);
                assert_eq!(frame_id.as_deref(), Some("f-1"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn events_from_unknown_sessions_are_dropped() {
        let adapter = adapter();
        let page = attach_page(&adapter, "t-1", "s-1");
        let mut rx = adapter.subscribe_network(&page);

        adapter.on_request_will_be_sent(TransportEvent {
            method: "Network.requestWillBeSent".into(),
            params: json!({
                "requestId": "r-9",
                "request": { "url": "https://other.test/" },
            }),
            session_id: Some("s-unknown".into()),
        });

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn oopif_attach_aliases_to_owner_page() {
        let adapter = adapter();
        let page = attach_page(&adapter, "t-1", "s-1");

        adapter
            .on_target_attached(TransportEvent {
                method: "Target.attachedToTarget".into(),
                params: json!({
                    "sessionId": "s-iframe",
                    "targetInfo": { "targetId": "frame-7", "type": "iframe" },
                }),
                session_id: Some("s-1".into()),
            })
            .await;

        assert_eq!(
            adapter.page_from_session(Some(&"s-iframe".to_string())),
            Some(page.clone())
        );
        let sessions = adapter.page_sessions(&page);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[1].0.as_deref(), Some("frame-7"));
    }

    #[tokio::test]
    async fn top_frame_navigation_updates_context() {
        let adapter = adapter();
        let page = attach_page(&adapter, "t-1", "s-1");
        let mut rx = adapter.subscribe_page_events(&page);

        adapter.on_frame_navigated(TransportEvent {
            method: "Page.frameNavigated".into(),
            params: json!({
                "frame": { "id": "top-frame", "url": "https://example.test/home" }
            }),
            session_id: Some("s-1".into()),
        });

        assert_eq!(adapter.top_frame_id(&page).as_deref(), Some("top-frame"));
        assert_eq!(
            adapter.recent_url(&page).as_deref(),
            Some("https://example.test/home")
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            PageEvent::TopFrameNavigated { .. }
        ));
    }

    #[tokio::test]
    async fn target_destroy_drops_all_state() {
        let adapter = adapter();
        let page = attach_page(&adapter, "t-1", "s-1");
        let _rx = adapter.subscribe_network(&page);

        adapter.on_target_destroyed(json!({ "targetId": "t-1" }));

        assert!(adapter.pages.get(&page).is_none());
        assert!(adapter.sessions.get("s-1").is_none());
        assert!(adapter.net_buses.get(&page).is_none());
    }
}
