//! Replay driver: re-issues a recorded action trace against the service's
//! own operations.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use simplepage_core_types::{ActionKind, ActionRecord};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{DEFAULT_CREATE_TIMEOUT_MS, DEFAULT_NAVIGATE_TIMEOUT_MS};
use crate::errors::ControlError;
use crate::manager::PageManager;

/// Operations replay needs from the service. The page manager implements
/// this; tests substitute a scripted target.
#[async_trait]
pub trait ReplayTarget: Send + Sync {
    /// Open a fresh page; replay runs never record.
    async fn create_page(
        &self,
        name: &str,
        url: &str,
        timeout_ms: u64,
    ) -> Result<String, ControlError>;
    async fn navigate(&self, page: &str, url: &str, timeout_ms: u64) -> Result<(), ControlError>;
    async fn navigate_back(&self, page: &str) -> Result<(), ControlError>;
    async fn navigate_forward(&self, page: &str) -> Result<(), ControlError>;
    async fn reload(&self, page: &str) -> Result<(), ControlError>;
    async fn act(
        &self,
        page: &str,
        xpath: Option<&str>,
        encoded_id: Option<&str>,
        method: &str,
        args: Vec<Value>,
    ) -> Result<(), ControlError>;
    async fn wait(&self, page: &str, timeout_ms: u64) -> Result<(), ControlError>;
    async fn condition(
        &self,
        page: &str,
        pattern: &str,
        flags: Option<&str>,
    ) -> Result<bool, ControlError>;
    async fn close_page(&self, page: &str) -> Result<(), ControlError>;
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplayOptions {
    /// Pause between consecutive steps, in milliseconds.
    pub delay_ms: u64,
    pub verbose: bool,
    pub continue_on_error: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            verbose: false,
            continue_on_error: false,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayError {
    pub index: usize,
    pub kind: String,
    pub error: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResult {
    pub success: bool,
    pub executed_actions: usize,
    pub total_actions: usize,
    pub errors: Vec<ReplayError>,
}

/// Walk the trace sequentially. `act` prefers the xpath over the encoded id
/// when both were recorded; kinds the API cannot re-issue are logged and
/// skipped. The created page is best-effort closed on exit.
pub async fn replay(
    target: &dyn ReplayTarget,
    actions: &[ActionRecord],
    options: &ReplayOptions,
) -> ReplayResult {
    let mut page: Option<String> = None;
    let mut executed = 0usize;
    let mut errors = Vec::new();
    let mut closed = false;

    for (index, action) in actions.iter().enumerate() {
        if index > 0 && options.delay_ms > 0 {
            sleep(Duration::from_millis(options.delay_ms)).await;
        }
        if options.verbose {
            info!(target: "replay", index, kind = action.kind.as_str(), "replaying step");
        }

        let step = run_step(target, &mut page, &mut closed, action).await;
        match step {
            Ok(StepOutcome::Executed) => executed += 1,
            Ok(StepOutcome::Skipped) => {
                warn!(
                    target: "replay",
                    index,
                    kind = action.kind.as_str(),
                    "step kind not replayable; skipping"
                );
            }
            Err(err) => {
                errors.push(ReplayError {
                    index,
                    kind: format!("{:?}", err.kind),
                    error: err.message.clone(),
                });
                if !options.continue_on_error {
                    break;
                }
            }
        }
    }

    if let Some(page_id) = page {
        if !closed {
            if let Err(err) = target.close_page(&page_id).await {
                warn!(target: "replay", %err, "best-effort close failed");
            }
        }
    }

    ReplayResult {
        success: errors.is_empty(),
        executed_actions: executed,
        total_actions: actions.len(),
        errors,
    }
}

enum StepOutcome {
    Executed,
    Skipped,
}

async fn run_step(
    target: &dyn ReplayTarget,
    page: &mut Option<String>,
    closed: &mut bool,
    action: &ActionRecord,
) -> Result<StepOutcome, ControlError> {
    match action.kind {
        ActionKind::Create => {
            let url = action.url.as_deref().unwrap_or("about:blank");
            let timeout = action.timeout.unwrap_or(DEFAULT_CREATE_TIMEOUT_MS);
            let id = target.create_page("replay", url, timeout).await?;
            *page = Some(id);
            *closed = false;
            Ok(StepOutcome::Executed)
        }
        ActionKind::Navigate => {
            let id = require_page(page)?;
            let url = action
                .url
                .as_deref()
                .ok_or_else(|| ControlError::bad_request("navigate step is missing its url"))?;
            let timeout = action.timeout.unwrap_or(DEFAULT_NAVIGATE_TIMEOUT_MS);
            target.navigate(&id, url, timeout).await?;
            Ok(StepOutcome::Executed)
        }
        ActionKind::NavigateBack => {
            let id = require_page(page)?;
            target.navigate_back(&id).await?;
            Ok(StepOutcome::Executed)
        }
        ActionKind::NavigateForward => {
            let id = require_page(page)?;
            target.navigate_forward(&id).await?;
            Ok(StepOutcome::Executed)
        }
        ActionKind::Reload => {
            let id = require_page(page)?;
            target.reload(&id).await?;
            Ok(StepOutcome::Executed)
        }
        ActionKind::Act => {
            let id = require_page(page)?;
            let method = action
                .method
                .as_deref()
                .ok_or_else(|| ControlError::bad_request("act step is missing its method"))?;
            target
                .act(
                    &id,
                    action.xpath.as_deref(),
                    action.encoded_id.as_deref(),
                    method,
                    action.args.clone().unwrap_or_default(),
                )
                .await?;
            Ok(StepOutcome::Executed)
        }
        ActionKind::Wait => {
            let id = require_page(page)?;
            target.wait(&id, action.timeout.unwrap_or(1_000)).await?;
            Ok(StepOutcome::Executed)
        }
        ActionKind::Condition => {
            let id = require_page(page)?;
            let pattern = action
                .pattern
                .as_deref()
                .ok_or_else(|| ControlError::bad_request("condition step is missing its pattern"))?;
            target
                .condition(&id, pattern, action.flags.as_deref())
                .await?;
            Ok(StepOutcome::Executed)
        }
        ActionKind::Close => {
            let id = require_page(page)?;
            target.close_page(&id).await?;
            *closed = true;
            Ok(StepOutcome::Executed)
        }
        ActionKind::GetListHtml | ActionKind::GetListHtmlByParent | ActionKind::GetElementHtml => {
            Ok(StepOutcome::Skipped)
        }
    }
}

fn require_page(page: &Option<String>) -> Result<String, ControlError> {
    page.clone()
        .ok_or_else(|| ControlError::bad_request("trace references a page before its create step"))
}

#[async_trait]
impl ReplayTarget for PageManager {
    async fn create_page(
        &self,
        name: &str,
        url: &str,
        timeout_ms: u64,
    ) -> Result<String, ControlError> {
        let info = PageManager::create_page(
            self,
            name.to_string(),
            url.to_string(),
            None,
            timeout_ms,
            false,
        )
        .await?;
        Ok(info.id)
    }

    async fn navigate(&self, page: &str, url: &str, timeout_ms: u64) -> Result<(), ControlError> {
        PageManager::navigate(self, page, url, timeout_ms, None).await?;
        Ok(())
    }

    async fn navigate_back(&self, page: &str) -> Result<(), ControlError> {
        PageManager::navigate_back(self, page, None).await?;
        Ok(())
    }

    async fn navigate_forward(&self, page: &str) -> Result<(), ControlError> {
        PageManager::navigate_forward(self, page, None).await?;
        Ok(())
    }

    async fn reload(&self, page: &str) -> Result<(), ControlError> {
        PageManager::reload(self, page, DEFAULT_NAVIGATE_TIMEOUT_MS).await?;
        Ok(())
    }

    async fn act(
        &self,
        page: &str,
        xpath: Option<&str>,
        encoded_id: Option<&str>,
        method: &str,
        args: Vec<Value>,
    ) -> Result<(), ControlError> {
        match (xpath, encoded_id) {
            (Some(xpath), _) => {
                PageManager::act_xpath(self, page, xpath.to_string(), method, args, None).await
            }
            (None, Some(encoded)) => {
                // Encoded ids only resolve against a snapshot, so take one.
                PageManager::structure(self, page, None).await?;
                PageManager::act_encoded(self, page, encoded.to_string(), method, args, None).await
            }
            (None, None) => Err(ControlError::bad_request(
                "act step carries neither xpath nor encoded id",
            )),
        }
    }

    async fn wait(&self, page: &str, timeout_ms: u64) -> Result<(), ControlError> {
        PageManager::wait(self, page, timeout_ms, None).await
    }

    async fn condition(
        &self,
        page: &str,
        pattern: &str,
        flags: Option<&str>,
    ) -> Result<bool, ControlError> {
        PageManager::condition(self, page, pattern, flags, None).await
    }

    async fn close_page(&self, page: &str) -> Result<(), ControlError> {
        PageManager::close_page(self, page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct ScriptedTarget {
        calls: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl ScriptedTarget {
        fn record(&self, call: impl Into<String>) -> Result<(), ControlError> {
            let call = call.into();
            self.calls.lock().push(call.clone());
            if self.fail_on.as_deref() == Some(call.as_str()) {
                return Err(ControlError::new(ErrorKind::ElementNotFound, "stale xpath"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ReplayTarget for ScriptedTarget {
        async fn create_page(
            &self,
            _name: &str,
            url: &str,
            _timeout_ms: u64,
        ) -> Result<String, ControlError> {
            self.record(format!("create:{url}"))?;
            Ok("page-1".into())
        }

        async fn navigate(
            &self,
            _page: &str,
            url: &str,
            _timeout_ms: u64,
        ) -> Result<(), ControlError> {
            self.record(format!("navigate:{url}"))
        }

        async fn navigate_back(&self, _page: &str) -> Result<(), ControlError> {
            self.record("back")
        }

        async fn navigate_forward(&self, _page: &str) -> Result<(), ControlError> {
            self.record("forward")
        }

        async fn reload(&self, _page: &str) -> Result<(), ControlError> {
            self.record("reload")
        }

        async fn act(
            &self,
            _page: &str,
            xpath: Option<&str>,
            encoded_id: Option<&str>,
            method: &str,
            _args: Vec<Value>,
        ) -> Result<(), ControlError> {
            self.record(format!(
                "act:{method}:{}",
                xpath.or(encoded_id).unwrap_or("none")
            ))
        }

        async fn wait(&self, _page: &str, timeout_ms: u64) -> Result<(), ControlError> {
            self.record(format!("wait:{timeout_ms}"))
        }

        async fn condition(
            &self,
            _page: &str,
            pattern: &str,
            _flags: Option<&str>,
        ) -> Result<bool, ControlError> {
            self.record(format!("condition:{pattern}"))?;
            Ok(true)
        }

        async fn close_page(&self, _page: &str) -> Result<(), ControlError> {
            self.record("close")
        }
    }

    fn action(kind: ActionKind) -> ActionRecord {
        ActionRecord::new(kind, 0)
    }

    fn trace() -> Vec<ActionRecord> {
        let mut create = action(ActionKind::Create);
        create.url = Some("about:blank".into());
        let mut nav = action(ActionKind::Navigate);
        nav.url = Some("https://example.test/".into());
        let mut act = action(ActionKind::Act);
        act.method = Some("click".into());
        act.xpath = Some("//button[1]".into());
        act.encoded_id = Some("0-7".into());
        vec![create, nav, act, action(ActionKind::Close)]
    }

    #[tokio::test]
    async fn replays_kinds_in_order_and_prefers_xpath() {
        let target = ScriptedTarget::default();
        let result = replay(&target, &trace(), &ReplayOptions::default()).await;

        assert!(result.success);
        assert_eq!(result.executed_actions, 4);
        assert_eq!(
            *target.calls.lock(),
            vec![
                "create:about:blank",
                "navigate:https://example.test/",
                "act:click://button[1]",
                "close",
            ]
        );
    }

    #[tokio::test]
    async fn stops_on_first_error_by_default() {
        let target = ScriptedTarget {
            fail_on: Some("navigate:https://example.test/".into()),
            ..Default::default()
        };
        let result = replay(&target, &trace(), &ReplayOptions::default()).await;

        assert!(!result.success);
        assert_eq!(result.executed_actions, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].index, 1);
        // The page still gets a best-effort close.
        assert_eq!(target.calls.lock().last().unwrap(), "close");
    }

    #[tokio::test]
    async fn continue_on_error_collects_and_proceeds() {
        let steps = trace();
        let target = ScriptedTarget {
            fail_on: Some("act:click://button[1]".into()),
            ..Default::default()
        };
        let options = ReplayOptions {
            continue_on_error: true,
            ..Default::default()
        };
        let result = replay(&target, &steps, &options).await;

        assert!(!result.success);
        assert_eq!(result.executed_actions, steps.len() - 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, "ElementNotFound");
    }

    #[tokio::test]
    async fn extraction_kinds_are_skipped() {
        let mut steps = trace();
        let mut list = action(ActionKind::GetListHtml);
        list.selector = Some("//li".into());
        steps.insert(2, list);

        let target = ScriptedTarget::default();
        let result = replay(&target, &steps, &ReplayOptions::default()).await;

        assert!(result.success);
        assert_eq!(result.executed_actions, 4);
        assert!(!target
            .calls
            .lock()
            .iter()
            .any(|call| call.starts_with("getList")));
    }

    #[tokio::test]
    async fn orphan_step_reports_bad_request() {
        let mut nav = action(ActionKind::Navigate);
        nav.url = Some("https://example.test/".into());
        let target = ScriptedTarget::default();
        let result = replay(&target, &[nav], &ReplayOptions::default()).await;

        assert!(!result.success);
        assert_eq!(result.errors[0].kind, "BadRequest");
    }
}
