//! Dispatch of one [`ActRequest`] against a page.
//!
//! Every method takes a fresh locator, and every successful driver call is
//! followed by a settle wait before the executor returns, so the caller can
//! record and reply against a stable page.

use std::time::Duration;

use cdp_adapter::{DialogChoice, PageDriver, PageEvent};
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::ActionError;
use crate::scroll::{scroll_arg, scroll_script};
use crate::types::{ActMethod, ActRequest, ScrollAmount, ScrollAxis};

pub async fn execute(driver: &PageDriver, request: &ActRequest) -> Result<(), ActionError> {
    debug!(
        target: "action-primitives",
        method = request.method.as_str(),
        xpath = %request.xpath,
        "executing action"
    );

    let locator = driver.locator(&request.xpath, request.frame.as_deref());

    match request.method {
        ActMethod::Click => locator.click().await?,
        ActMethod::Fill => {
            let text = string_arg(request, 0, "fill expects the text to enter")?;
            locator.fill(&text).await?;
        }
        ActMethod::SelectOption => {
            let value = string_arg(request, 0, "selectOption expects the option value")?;
            locator.select_option(&value).await?;
        }
        ActMethod::Check => locator.check().await?,
        ActMethod::Uncheck => locator.uncheck().await?,
        ActMethod::Hover => locator.hover().await?,
        ActMethod::Press => {
            let key = string_arg(request, 0, "press expects a key name")?;
            locator.press(&key).await?;
        }
        ActMethod::ScrollX | ActMethod::ScrollY => {
            let axis = if request.method == ActMethod::ScrollX {
                ScrollAxis::X
            } else {
                ScrollAxis::Y
            };
            let raw = request
                .args
                .first()
                .ok_or_else(|| ActionError::InvalidArgs("scroll expects one argument".into()))?;
            let amount = ScrollAmount::parse(raw, axis)?;
            locator
                .evaluate_on(scroll_script(axis), &scroll_arg(amount))
                .await?;
        }
        ActMethod::HandleDialog => {
            return handle_dialog(driver, request).await;
        }
        ActMethod::FileUpload => {
            let paths = path_args(request)?;
            driver
                .set_input_files(&request.xpath, request.frame.as_deref(), &paths)
                .await?;
        }
    }

    settle(driver, request).await;
    Ok(())
}

/// Install the one-shot dialog decision, click the trigger, then require the
/// dialog to actually surface within the settle window.
async fn handle_dialog(driver: &PageDriver, request: &ActRequest) -> Result<(), ActionError> {
    let decision = string_arg(request, 0, "handleDialog expects 'accept' or 'dismiss'")?;
    let accept = match decision.as_str() {
        "accept" => true,
        "dismiss" => false,
        other => {
            return Err(ActionError::InvalidArgs(format!(
                "handleDialog expects 'accept' or 'dismiss', got '{other}'"
            )))
        }
    };
    let prompt_text = request
        .args
        .get(1)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    // Subscribe before the click so the handled notification cannot race us.
    let mut events = driver.subscribe_events();
    driver.once_dialog(DialogChoice {
        accept,
        prompt_text,
    });

    let locator = driver.locator(&request.xpath, request.frame.as_deref());
    if let Err(err) = locator.click().await {
        driver.clear_dialog();
        return Err(err.into());
    }

    let window = request.settle_timeout.unwrap_or(Duration::from_secs(30));
    let fired = timeout(window, async {
        loop {
            match events.recv().await {
                Ok(PageEvent::DialogHandled { .. }) => break true,
                Ok(_) => continue,
                Err(_) => break false,
            }
        }
    })
    .await
    .unwrap_or(false);

    if !fired {
        driver.clear_dialog();
        return Err(ActionError::DialogNotFired);
    }

    settle(driver, request).await;
    Ok(())
}

async fn settle(driver: &PageDriver, request: &ActRequest) {
    let outcome = driver.settle(request.settle_timeout).await;
    if !outcome.quiet {
        warn!(
            target: "action-primitives",
            pending = outcome.pending,
            "page did not settle before the deadline"
        );
    }
}

fn string_arg(request: &ActRequest, idx: usize, hint: &str) -> Result<String, ActionError> {
    request
        .args
        .get(idx)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| ActionError::InvalidArgs(hint.to_string()))
}

fn path_args(request: &ActRequest) -> Result<Vec<String>, ActionError> {
    if request.args.is_empty() {
        return Err(ActionError::InvalidArgs(
            "fileUpload expects at least one path".into(),
        ));
    }
    request
        .args
        .iter()
        .map(|v| match v {
            Value::String(s) => Ok(s.clone()),
            other => Err(ActionError::InvalidArgs(format!(
                "fileUpload paths must be strings, got {other}"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(method: ActMethod, args: Vec<Value>) -> ActRequest {
        ActRequest {
            method,
            xpath: "//button[1]".into(),
            frame: None,
            args,
            settle_timeout: None,
        }
    }

    #[test]
    fn string_arg_validates_presence_and_type() {
        let ok = request(ActMethod::Fill, vec![json!("alice")]);
        assert_eq!(string_arg(&ok, 0, "x").unwrap(), "alice");

        let missing = request(ActMethod::Fill, vec![]);
        assert!(matches!(
            string_arg(&missing, 0, "x"),
            Err(ActionError::InvalidArgs(_))
        ));

        let wrong = request(ActMethod::Fill, vec![json!(5)]);
        assert!(string_arg(&wrong, 0, "x").is_err());
    }

    #[test]
    fn path_args_require_string_list() {
        let ok = request(ActMethod::FileUpload, vec![json!("/tmp/a.png"), json!("/tmp/b.png")]);
        assert_eq!(path_args(&ok).unwrap().len(), 2);

        let empty = request(ActMethod::FileUpload, vec![]);
        assert!(path_args(&empty).is_err());

        let mixed = request(ActMethod::FileUpload, vec![json!("/tmp/a"), json!(1)]);
        assert!(path_args(&mixed).is_err());
    }
}
