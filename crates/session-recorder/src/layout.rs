//! Filesystem layout of a recording and the artifact-name validation used
//! by the serving layer.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

static ARTIFACT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d+-(structure\.txt|xpath\.json|screenshot\.png|page\.html|axtree\.json|list\.json|element\.html)|console-\d+\.log)$",
    )
    .expect("valid artifact regex")
});

static DATA_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+-(list\.json|element\.html)$").expect("valid data regex"));

/// `<root>/simplepage/<pageId>`
pub fn recording_dir(root: &Path, page_id: &str) -> PathBuf {
    root.join("simplepage").join(page_id)
}

pub fn data_dir(recording_dir: &Path) -> PathBuf {
    recording_dir.join("data")
}

pub fn actions_path(recording_dir: &Path) -> PathBuf {
    recording_dir.join("actions.json")
}

pub fn structure_name(ts: i64) -> String {
    format!("{ts}-structure.txt")
}

pub fn xpath_name(ts: i64) -> String {
    format!("{ts}-xpath.json")
}

pub fn screenshot_name(ts: i64) -> String {
    format!("{ts}-screenshot.png")
}

pub fn page_html_name(ts: i64) -> String {
    format!("{ts}-page.html")
}

pub fn axtree_name(ts: i64) -> String {
    format!("{ts}-axtree.json")
}

pub fn list_name(ts: i64) -> String {
    format!("{ts}-list.json")
}

pub fn element_name(ts: i64) -> String {
    format!("{ts}-element.html")
}

pub fn console_log_name(ts: i64) -> String {
    format!("console-{ts}.log")
}

/// Any artifact a recording may legitimately serve.
pub fn is_artifact_name(name: &str) -> bool {
    ARTIFACT_NAME.is_match(name)
}

/// The narrow shape allowed on the typed `data/` endpoint.
pub fn is_data_name(name: &str) -> bool {
    DATA_NAME.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_compose() {
        let dir = recording_dir(Path::new("/tmp/rec"), "page-1");
        assert!(dir.ends_with("simplepage/page-1"));
        assert!(actions_path(&dir).ends_with("simplepage/page-1/actions.json"));
        assert!(data_dir(&dir).ends_with("simplepage/page-1/data"));
    }

    #[test]
    fn artifact_names_validate() {
        assert!(is_artifact_name("1712000000000-structure.txt"));
        assert!(is_artifact_name("1712000000000-screenshot.png"));
        assert!(is_artifact_name("console-1712000000000.log"));
        assert!(!is_artifact_name("../../etc/passwd"));
        assert!(!is_artifact_name("1712000000000-structure.txt.bak"));
        assert!(!is_artifact_name("notes.txt"));
    }

    #[test]
    fn data_names_are_narrower() {
        assert!(is_data_name("1712000000000-list.json"));
        assert!(is_data_name("1712000000000-element.html"));
        assert!(!is_data_name("1712000000000-structure.txt"));
        assert!(!is_data_name("console-1712000000000.log"));
    }
}
