//! Page helper script and the process-wide selector engine.
//!
//! The helper is injected once per page (and re-injected into every new
//! document via `Page.addScriptToEvaluateOnNewDocument`). It is guarded by a
//! window sentinel and installs exactly two globals: the injection flag and
//! the backdoor object that records closed shadow roots and hosts the
//! attribute selector engine.

use std::sync::atomic::{AtomicBool, Ordering};

/// Injection flag property name.
pub const INJECTED_FLAG: &str = "__simplepage_injected";
/// Backdoor object property name.
pub const BACKDOOR: &str = "__simplepage_backdoor";

/// Name under which the attribute engine is registered.
pub const SELECTOR_ENGINE_NAME: &str = "simplepage";

/// Guarded helper installed into every document of a managed page.
///
/// The patched `attachShadow` records closed roots in a WeakMap so the
/// selector engine (and tests) can traverse them via `getClosedRoot(host)`.
pub const HELPER_SCRIPT: &str = r#"
(() => {
  if (window.__simplepage_injected) { return; }
  Object.defineProperty(window, '__simplepage_injected', {
    value: true,
    configurable: false,
    enumerable: false,
  });

  const closedRoots = new WeakMap();
  const nativeAttachShadow = Element.prototype.attachShadow;
  Element.prototype.attachShadow = function attachShadow(init) {
    const root = nativeAttachShadow.call(this, init);
    if (init && init.mode === 'closed') {
      closedRoots.set(this, root);
    }
    return root;
  };

  const backdoor = {
    getClosedRoot(host) {
      return closedRoots.get(host) || null;
    },
    // Attribute engine: matches elements carrying the default attribute (or
    // an explicit `attr=value` pair), walking the element tree including
    // open and closed shadow roots.
    query(root, selector, defaultAttribute) {
      let attr = defaultAttribute;
      let expected = selector;
      const eq = selector.indexOf('=');
      if (eq > 0) {
        attr = selector.slice(0, eq);
        expected = selector.slice(eq + 1);
      }
      const matches = [];
      const walk = (node) => {
        if (!node) { return; }
        if (node.nodeType === Node.ELEMENT_NODE) {
          if (node.getAttribute && node.getAttribute(attr) === expected) {
            matches.push(node);
          }
          const open = node.shadowRoot;
          if (open) { walk(open); }
          const closed = backdoor.getClosedRoot(node);
          if (closed) { walk(closed); }
        }
        const children = node.children || (node.childNodes ? node.childNodes : []);
        for (const child of children) { walk(child); }
      };
      walk(root);
      return matches;
    },
  };
  Object.defineProperty(window, '__simplepage_backdoor', {
    value: backdoor,
    configurable: false,
    enumerable: false,
  });
})();
"#;

static ENGINE_REGISTERED: AtomicBool = AtomicBool::new(false);

/// Mark the selector engine registered for this process.
///
/// The driver allows one engine registration per process; repeated calls
/// (including racing ones) are treated as success, so page init never fails
/// on an "already registered" condition.
pub fn register_selector_engine() -> bool {
    ENGINE_REGISTERED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

pub fn selector_engine_registered() -> bool {
    ENGINE_REGISTERED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_idempotent() {
        // First call may or may not be the winner depending on test order;
        // every later call must report success-by-tolerance.
        register_selector_engine();
        assert!(selector_engine_registered());
        register_selector_engine();
        assert!(selector_engine_registered());
    }

    #[test]
    fn helper_script_defines_only_two_globals() {
        let defines = HELPER_SCRIPT
            .matches("Object.defineProperty(window,")
            .count();
        assert_eq!(defines, 2);
        assert!(HELPER_SCRIPT.contains(INJECTED_FLAG));
        assert!(HELPER_SCRIPT.contains(BACKDOOR));
    }

    #[test]
    fn helper_script_is_guarded() {
        assert!(HELPER_SCRIPT
            .trim_start()
            .starts_with("(() => {\n  if (window.__simplepage_injected) { return; }"));
    }
}
