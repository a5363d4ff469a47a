//! Method taxonomy and argument parsing for the action surface.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ActionError;

/// Supported interaction methods, in the wire spelling of the act endpoints.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActMethod {
    Click,
    Fill,
    SelectOption,
    Check,
    Uncheck,
    Hover,
    Press,
    ScrollX,
    ScrollY,
    HandleDialog,
    FileUpload,
}

impl ActMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActMethod::Click => "click",
            ActMethod::Fill => "fill",
            ActMethod::SelectOption => "selectOption",
            ActMethod::Check => "check",
            ActMethod::Uncheck => "uncheck",
            ActMethod::Hover => "hover",
            ActMethod::Press => "press",
            ActMethod::ScrollX => "scrollX",
            ActMethod::ScrollY => "scrollY",
            ActMethod::HandleDialog => "handleDialog",
            ActMethod::FileUpload => "fileUpload",
        }
    }
}

impl FromStr for ActMethod {
    type Err = ActionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "click" => Ok(ActMethod::Click),
            "fill" => Ok(ActMethod::Fill),
            "selectOption" => Ok(ActMethod::SelectOption),
            "check" => Ok(ActMethod::Check),
            "uncheck" => Ok(ActMethod::Uncheck),
            "hover" => Ok(ActMethod::Hover),
            "press" => Ok(ActMethod::Press),
            "scrollX" => Ok(ActMethod::ScrollX),
            "scrollY" => Ok(ActMethod::ScrollY),
            "handleDialog" => Ok(ActMethod::HandleDialog),
            "fileUpload" => Ok(ActMethod::FileUpload),
            other => Err(ActionError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// One resolved act request: the xpath target (already mapped from an
/// encoded id where applicable), its owning frame and the method payload.
#[derive(Clone, Debug)]
pub struct ActRequest {
    pub method: ActMethod,
    pub xpath: String,
    /// Frame id for non-top frames; `None` targets the top frame.
    pub frame: Option<String>,
    pub args: Vec<Value>,
    /// Overrides the page's default post-action settle deadline.
    pub settle_timeout: Option<Duration>,
}

/// Scroll axis, deciding which metrics and scroll properties apply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScrollAxis {
    X,
    Y,
}

/// Parsed scroll argument.
///
/// Strings name the far edges; positive integers are relative deltas in
/// pixels; negative integers address the absolute position `|n|` (kept for
/// compatibility, prefer the edge strings).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScrollAmount {
    Start,
    End,
    Relative(i64),
    Absolute(i64),
}

impl ScrollAmount {
    pub fn parse(arg: &Value, axis: ScrollAxis) -> Result<Self, ActionError> {
        match arg {
            Value::String(s) => match (s.as_str(), axis) {
                ("top", ScrollAxis::Y) | ("left", ScrollAxis::X) => Ok(ScrollAmount::Start),
                ("bottom", ScrollAxis::Y) | ("right", ScrollAxis::X) => Ok(ScrollAmount::End),
                _ => s
                    .parse::<i64>()
                    .map(Self::from_pixels)
                    .map_err(|_| ActionError::InvalidArgs(format!("bad scroll argument '{s}'"))),
            },
            Value::Number(n) => n
                .as_i64()
                .map(Self::from_pixels)
                .ok_or_else(|| ActionError::InvalidArgs(format!("bad scroll argument {n}"))),
            other => Err(ActionError::InvalidArgs(format!(
                "scroll argument must be a string or integer, got {other}"
            ))),
        }
    }

    fn from_pixels(n: i64) -> Self {
        if n < 0 {
            ScrollAmount::Absolute(-n)
        } else {
            ScrollAmount::Relative(n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn methods_parse_from_wire_spelling() {
        assert_eq!("click".parse::<ActMethod>().unwrap(), ActMethod::Click);
        assert_eq!(
            "handleDialog".parse::<ActMethod>().unwrap(),
            ActMethod::HandleDialog
        );
        assert!(matches!(
            "doubleClick".parse::<ActMethod>(),
            Err(ActionError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn scroll_edges_respect_axis() {
        assert_eq!(
            ScrollAmount::parse(&json!("top"), ScrollAxis::Y).unwrap(),
            ScrollAmount::Start
        );
        assert_eq!(
            ScrollAmount::parse(&json!("right"), ScrollAxis::X).unwrap(),
            ScrollAmount::End
        );
        assert!(ScrollAmount::parse(&json!("top"), ScrollAxis::X).is_err());
    }

    #[test]
    fn scroll_numbers_split_relative_and_absolute() {
        assert_eq!(
            ScrollAmount::parse(&json!(250), ScrollAxis::Y).unwrap(),
            ScrollAmount::Relative(250)
        );
        assert_eq!(
            ScrollAmount::parse(&json!(-400), ScrollAxis::Y).unwrap(),
            ScrollAmount::Absolute(400)
        );
        assert_eq!(
            ScrollAmount::parse(&json!("120"), ScrollAxis::X).unwrap(),
            ScrollAmount::Relative(120)
        );
        assert!(ScrollAmount::parse(&json!(true), ScrollAxis::Y).is_err());
    }
}
