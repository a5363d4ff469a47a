//! Typed adapter over the Chrome DevTools Protocol.
//!
//! The rest of the control plane never speaks CDP directly: it sees the
//! page-automation surface ([`page::PageDriver`]), the normalized debug-event
//! streams fanned out per page by [`adapter::DriverAdapter`], and the
//! process-wide selector-engine/helper-script registration in [`helper`].

pub mod adapter;
pub mod error;
pub mod helper;
pub mod page;
pub mod transport;

pub use adapter::{DriverAdapter, PageEvent};
pub use error::{DriverError, DriverErrorKind};
pub use page::{DialogChoice, PageDriver, ScreenshotOpts};
pub use transport::{CdpTransport, ChromiumTransport, CommandTarget, NoopTransport, TransportEvent};

pub mod config {
    use std::path::PathBuf;
    use std::{env, path::Path};

    use which::which;

    /// Launch and tuning configuration for the driver.
    #[derive(Clone, Debug)]
    pub struct DriverConfig {
        pub executable: PathBuf,
        pub user_data_dir: PathBuf,
        pub headless: bool,
        pub default_deadline_ms: u64,
        /// Attach to an already-running browser instead of launching one.
        pub websocket_url: Option<String>,
    }

    impl Default for DriverConfig {
        fn default() -> Self {
            Self {
                executable: detect_chrome_executable().unwrap_or_default(),
                user_data_dir: default_profile_dir(),
                headless: true,
                default_deadline_ms: 30_000,
                websocket_url: None,
            }
        }
    }

    fn default_profile_dir() -> PathBuf {
        if let Ok(path) = env::var("USER_DATA_DIR") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return PathBuf::from(trimmed);
            }
        }
        if let Ok(home) = env::var("HOME") {
            return Path::new(&home).join(".simplepage-profile");
        }
        PathBuf::from("./.simplepage-profile")
    }

    /// Locate a Chromium binary: `SIMPLEPAGE_CHROME` override, then `PATH`,
    /// then OS-specific install locations.
    pub fn detect_chrome_executable() -> Option<PathBuf> {
        if let Ok(raw) = env::var("SIMPLEPAGE_CHROME") {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                let candidate = PathBuf::from(trimmed);
                if candidate.exists() {
                    return Some(candidate);
                }
            }
        }

        for name in chrome_executable_names() {
            if let Ok(path) = which(name) {
                return Some(path);
            }
        }

        os_specific_chrome_paths()
            .into_iter()
            .find(|candidate| candidate.exists())
    }

    fn chrome_executable_names() -> &'static [&'static str] {
        #[cfg(target_os = "windows")]
        {
            &["chrome.exe", "chromium.exe", "msedge.exe"]
        }

        #[cfg(not(target_os = "windows"))]
        {
            &[
                "google-chrome-stable",
                "google-chrome",
                "chromium",
                "chromium-browser",
            ]
        }
    }

    fn os_specific_chrome_paths() -> Vec<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            vec![
                PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
                PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
            ]
        }

        #[cfg(target_os = "linux")]
        {
            vec![
                PathBuf::from("/usr/bin/google-chrome-stable"),
                PathBuf::from("/usr/bin/google-chrome"),
                PathBuf::from("/usr/bin/chromium-browser"),
                PathBuf::from("/usr/bin/chromium"),
            ]
        }

        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        {
            Vec::new()
        }
    }
}

pub use config::DriverConfig;
