//! Scroll scripts evaluated against the target element.
//!
//! The window scrolls when the target is the body (or the document element);
//! any other element manipulates its own scroll box.

use crate::types::{ScrollAmount, ScrollAxis};

/// Build the `(el, arg)` function source executed by the locator.
///
/// The argument protocol mirrors [`ScrollAmount`]: `"start"`, `"end"`, a
/// relative delta `{ "by": n }` or an absolute position `{ "to": n }`.
pub fn scroll_script(axis: ScrollAxis) -> &'static str {
    match axis {
        ScrollAxis::Y => {
            r#"(el, arg) => {
  const isPage = el === document.body || el === document.documentElement;
  const scroller = document.scrollingElement || document.documentElement;
  if (arg === 'start') {
    if (isPage) { window.scrollTo(window.scrollX, 0); } else { el.scrollTop = 0; }
  } else if (arg === 'end') {
    if (isPage) { window.scrollTo(window.scrollX, scroller.scrollHeight); }
    else { el.scrollTop = el.scrollHeight; }
  } else if (arg && typeof arg.by === 'number') {
    if (isPage) { window.scrollBy(0, arg.by); } else { el.scrollTop += arg.by; }
  } else if (arg && typeof arg.to === 'number') {
    if (isPage) { window.scrollTo(window.scrollX, arg.to); } else { el.scrollTop = arg.to; }
  }
  return isPage ? window.scrollY : el.scrollTop;
}"#
        }
        ScrollAxis::X => {
            r#"(el, arg) => {
  const isPage = el === document.body || el === document.documentElement;
  const scroller = document.scrollingElement || document.documentElement;
  if (arg === 'start') {
    if (isPage) { window.scrollTo(0, window.scrollY); } else { el.scrollLeft = 0; }
  } else if (arg === 'end') {
    if (isPage) { window.scrollTo(scroller.scrollWidth, window.scrollY); }
    else { el.scrollLeft = el.scrollWidth; }
  } else if (arg && typeof arg.by === 'number') {
    if (isPage) { window.scrollBy(arg.by, 0); } else { el.scrollLeft += arg.by; }
  } else if (arg && typeof arg.to === 'number') {
    if (isPage) { window.scrollTo(arg.to, window.scrollY); } else { el.scrollLeft = arg.to; }
  }
  return isPage ? window.scrollX : el.scrollLeft;
}"#
        }
    }
}

/// JSON value handed to the script as `arg`.
pub fn scroll_arg(amount: ScrollAmount) -> serde_json::Value {
    match amount {
        ScrollAmount::Start => serde_json::json!("start"),
        ScrollAmount::End => serde_json::json!("end"),
        ScrollAmount::Relative(by) => serde_json::json!({ "by": by }),
        ScrollAmount::Absolute(to) => serde_json::json!({ "to": to }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_cover_both_surfaces() {
        for axis in [ScrollAxis::X, ScrollAxis::Y] {
            let script = scroll_script(axis);
            assert!(script.contains("window.scrollTo"));
            assert!(script.contains("window.scrollBy"));
        }
        assert!(scroll_script(ScrollAxis::Y).contains("scrollTop"));
        assert!(scroll_script(ScrollAxis::X).contains("scrollLeft"));
    }

    #[test]
    fn args_follow_the_protocol() {
        assert_eq!(scroll_arg(ScrollAmount::Start), serde_json::json!("start"));
        assert_eq!(
            scroll_arg(ScrollAmount::Relative(40)),
            serde_json::json!({ "by": 40 })
        );
        assert_eq!(
            scroll_arg(ScrollAmount::Absolute(900)),
            serde_json::json!({ "to": 900 })
        );
    }
}
