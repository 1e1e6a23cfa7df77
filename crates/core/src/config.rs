//! Project configuration
//!
//! Manages the droidcase.toml project manifest:
//! - App identity (name, package, version)
//! - Run-time tuning for device orchestration
//! - Android SDK overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};

/// File name of the project manifest.
pub const CONFIG_FILE_NAME: &str = "droidcase.toml";

/// App identity as declared in the `[app]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppSpec {
    /// Machine-friendly app name (lowercase, no spaces)
    pub name: String,
    /// Human-friendly name used for distributable artefacts
    pub formal_name: String,
    /// Reverse-domain package prefix (e.g. com.example)
    pub package: String,
    /// Trailing package segment; defaults to the app name
    #[serde(default)]
    pub module: Option<String>,
    /// App version string (e.g. 0.1.0)
    pub version: String,
    /// Fully qualified activity launched by `run`
    #[serde(default = "default_main_activity")]
    pub main_activity: String,
}

fn default_main_activity() -> String {
    "org.droidcase.android.MainActivity".to_string()
}

impl AppSpec {
    /// The trailing segment of the application ID.
    pub fn module_name(&self) -> &str {
        self.module.as_deref().unwrap_or(&self.name)
    }

    /// The Android application ID (package prefix plus module segment).
    pub fn application_id(&self) -> String {
        format!("{}.{}", self.package, self.module_name())
    }
}

/// Run-time tuning knobs from the `[run]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunSettings {
    /// Budget for the app process to appear after launch, in milliseconds
    #[serde(default = "default_pid_timeout_ms")]
    pub pid_timeout_ms: u64,
    /// Delay between process ID polls, in milliseconds
    #[serde(default = "default_pid_poll_interval_ms")]
    pub pid_poll_interval_ms: u64,
    /// Delay between liveness checks while streaming logs, in milliseconds
    #[serde(default = "default_stop_poll_interval_ms")]
    pub stop_poll_interval_ms: u64,
    /// Budget for a cold emulator boot, in seconds
    #[serde(default = "default_boot_timeout_secs")]
    pub boot_timeout_secs: u64,
}

fn default_pid_timeout_ms() -> u64 { 5000 }
fn default_pid_poll_interval_ms() -> u64 { 10 }
fn default_stop_poll_interval_ms() -> u64 { 500 }
fn default_boot_timeout_secs() -> u64 { 120 }

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            pid_timeout_ms: default_pid_timeout_ms(),
            pid_poll_interval_ms: default_pid_poll_interval_ms(),
            stop_poll_interval_ms: default_stop_poll_interval_ms(),
            boot_timeout_secs: default_boot_timeout_secs(),
        }
    }
}

impl RunSettings {
    pub fn pid_timeout(&self) -> Duration {
        Duration::from_millis(self.pid_timeout_ms)
    }

    pub fn pid_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pid_poll_interval_ms)
    }

    pub fn stop_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stop_poll_interval_ms)
    }

    pub fn boot_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_timeout_secs)
    }
}

/// Android SDK overrides from the `[android]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AndroidSettings {
    /// Explicit SDK root; falls back to ANDROID_HOME / ANDROID_SDK_ROOT
    #[serde(default)]
    pub sdk_root: Option<PathBuf>,
    /// Explicit JDK location exported to build and SDK tools
    #[serde(default)]
    pub java_home: Option<PathBuf>,
}

/// The parsed droidcase.toml manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectConfig {
    /// App identity
    pub app: AppSpec,
    /// Run-time tuning
    #[serde(default)]
    pub run: RunSettings,
    /// SDK overrides
    #[serde(default)]
    pub android: AndroidSettings,
}

impl ProjectConfig {
    /// Load and validate a manifest from the given file.
    pub async fn load(path: &Path) -> Result<Self> {
        debug!("Loading project manifest from {}", path.display());
        let raw = tokio::fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check manifest fields that TOML typing alone cannot enforce.
    pub fn validate(&self) -> Result<()> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Invalid("app name must not be empty".into()));
        }
        if self.app.name.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "app name {:?} must not contain whitespace",
                self.app.name
            )));
        }
        if self.app.version.is_empty() {
            return Err(ConfigError::Invalid("app version must not be empty".into()));
        }
        if !self.app.package.contains('.') {
            return Err(ConfigError::Invalid(format!(
                "package {:?} must contain at least two dot-separated segments",
                self.app.package
            )));
        }
        Ok(())
    }
}

/// Walk up from `start` looking for a droidcase.toml manifest.
pub fn find_config(start: &Path) -> Result<PathBuf> {
    let mut dir = start;
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return Err(ConfigError::NotFound(start.to_path_buf())),
        }
    }
}
