//! Service configuration, resolved from the environment with CLI overrides
//! applied on top.

use std::env;
use std::path::PathBuf;

use cdp_adapter::DriverConfig;

pub const DEFAULT_PORT: u16 = 3100;
pub const DEFAULT_CREATE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_NAVIGATE_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 30_000;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub port: u16,
    pub headless: bool,
    pub user_data_dir: PathBuf,
    /// Per-action screenshots; opt-in because captures are expensive.
    pub screenshot: bool,
    /// Recordings land under `<recordings_root>/simplepage/<pageId>/`.
    pub recordings_root: PathBuf,
    /// CORS origin; `None` allows any origin.
    pub cors_origin: Option<String>,
    pub settle_timeout_ms: u64,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            headless: flag("HEADLESS"),
            user_data_dir: env::var("USER_DATA_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_user_data_dir),
            screenshot: flag("SCREENSHOT"),
            recordings_root: env::var("TMPDIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            cors_origin: env::var("CORS_ORIGIN")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            settle_timeout_ms: DEFAULT_SETTLE_TIMEOUT_MS,
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            user_data_dir: self.user_data_dir.clone(),
            headless: self.headless,
            ..DriverConfig::default()
        }
    }
}

fn flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn default_user_data_dir() -> PathBuf {
    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home).join(".simplepage-profile");
    }
    PathBuf::from("./.simplepage-profile")
}
