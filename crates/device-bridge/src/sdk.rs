//! Android SDK Location
//!
//! Finds the SDK root and the command-line tools inside it, and
//! installs missing SDK packages on demand.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// SDK location errors
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("Android SDK not found; set ANDROID_HOME or the android.sdk-root manifest key")]
    SdkNotFound,
    #[error("SDK tool not found: {0}")]
    ToolNotFound(String),
    #[error("sdkmanager failed: {0}")]
    InstallFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A located Android SDK installation
#[derive(Debug, Clone)]
pub struct AndroidSdk {
    root: PathBuf,
    java_home: Option<PathBuf>,
}

impl AndroidSdk {
    /// Use an explicit SDK root.
    pub fn new(root: PathBuf) -> Result<Self, SdkError> {
        if !root.is_dir() {
            return Err(SdkError::SdkNotFound);
        }
        Ok(Self {
            root,
            java_home: None,
        })
    }

    /// Locate the SDK from an explicit override, the environment, or
    /// common install locations (in that order).
    pub fn discover(explicit: Option<PathBuf>) -> Result<Self, SdkError> {
        let candidates = explicit
            .into_iter()
            .chain(Self::sdk_candidates())
            .collect::<Vec<_>>();

        for path in candidates {
            if path.join("platform-tools").is_dir() {
                debug!("Found Android SDK at {}", path.display());
                return Self::new(path);
            }
        }

        Err(SdkError::SdkNotFound)
    }

    /// Export a JDK location to the tools this SDK runs.
    pub fn with_java_home(mut self, java_home: Option<PathBuf>) -> Self {
        self.java_home = java_home;
        self
    }

    /// Get SDK path candidates
    fn sdk_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        // Environment variables
        if let Ok(android_home) = env::var("ANDROID_HOME") {
            candidates.push(PathBuf::from(android_home));
        }
        if let Ok(sdk_root) = env::var("ANDROID_SDK_ROOT") {
            candidates.push(PathBuf::from(sdk_root));
        }

        // Common Windows paths
        if cfg!(windows) {
            if let Some(local) = dirs::data_local_dir() {
                candidates.push(local.join("Android").join("Sdk"));
            }
        }

        // Common Unix paths
        if cfg!(unix) {
            if let Some(home) = dirs::home_dir() {
                candidates.push(home.join("Android").join("Sdk"));
                candidates.push(home.join("Library").join("Android").join("sdk"));
                candidates.push(home.join("android-sdk"));
            }
            candidates.push(PathBuf::from("/opt/android-sdk"));
            candidates.push(PathBuf::from("/usr/local/android-sdk"));
        }

        candidates
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn java_home(&self) -> Option<&Path> {
        self.java_home.as_deref()
    }

    /// Environment variables exported to every tool this SDK runs.
    pub fn env(&self) -> Vec<(&'static str, PathBuf)> {
        let mut env = vec![
            ("ANDROID_HOME", self.root.clone()),
            ("ANDROID_SDK_ROOT", self.root.clone()),
        ];
        if let Some(java_home) = &self.java_home {
            env.push(("JAVA_HOME", java_home.clone()));
        }
        env
    }

    /// Path to the adb executable.
    pub fn adb_path(&self) -> PathBuf {
        let platform_tools = self.root.join("platform-tools");
        if cfg!(windows) {
            platform_tools.join("adb.exe")
        } else {
            platform_tools.join("adb")
        }
    }

    /// Path to the emulator executable.
    pub fn emulator_path(&self) -> PathBuf {
        let emulator = self.root.join("emulator");
        if cfg!(windows) {
            emulator.join("emulator.exe")
        } else {
            emulator.join("emulator")
        }
    }

    /// Locate sdkmanager inside the command-line tools.
    pub fn sdkmanager_path(&self) -> Result<PathBuf, SdkError> {
        self.find_cmdline_tool(if cfg!(windows) { "sdkmanager.bat" } else { "sdkmanager" })
    }

    /// Locate avdmanager inside the command-line tools.
    pub fn avdmanager_path(&self) -> Result<PathBuf, SdkError> {
        self.find_cmdline_tool(if cfg!(windows) { "avdmanager.bat" } else { "avdmanager" })
    }

    fn find_cmdline_tool(&self, exe_name: &str) -> Result<PathBuf, SdkError> {
        // Try cmdline-tools/latest
        let path = self
            .root
            .join("cmdline-tools")
            .join("latest")
            .join("bin")
            .join(exe_name);
        if path.exists() {
            return Ok(path);
        }

        // Try cmdline-tools/X.X (versioned)
        let cmdline_tools = self.root.join("cmdline-tools");
        if cmdline_tools.exists() {
            if let Ok(entries) = std::fs::read_dir(&cmdline_tools) {
                for entry in entries.flatten() {
                    let path = entry.path().join("bin").join(exe_name);
                    if path.exists() {
                        return Ok(path);
                    }
                }
            }
        }

        // Try tools directory (legacy)
        let path = self.root.join("tools").join("bin").join(exe_name);
        if path.exists() {
            return Ok(path);
        }

        Err(SdkError::ToolNotFound(exe_name.to_string()))
    }

    /// Directory where AVD definitions live.
    pub fn avd_home(&self) -> Option<PathBuf> {
        if let Ok(avd_home) = env::var("ANDROID_AVD_HOME") {
            return Some(PathBuf::from(avd_home));
        }
        dirs::home_dir().map(|home| home.join(".android").join("avd"))
    }

    /// Whether an SDK package (e.g. "system-images;android-31;default;x86_64")
    /// is already installed.
    pub fn has_package(&self, package: &str) -> bool {
        let mut path = self.root.clone();
        for segment in package.split(';') {
            path = path.join(segment);
        }
        path.is_dir()
    }

    /// Install an SDK package, accepting license prompts.
    pub async fn install_package(&self, package: &str) -> Result<(), SdkError> {
        let sdkmanager = self.sdkmanager_path()?;
        info!("Installing SDK package {package}...");

        let mut cmd = Command::new(&sdkmanager);
        cmd.arg(package);
        for (key, value) in self.env() {
            cmd.env(key, value);
        }

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Accept any license prompts
        if let Some(mut stdin) = child.stdin.take() {
            for _ in 0..10 {
                if stdin.write_all(b"y\n").await.is_err() {
                    break;
                }
            }
        }

        if let Some(stdout) = child.stdout.take() {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("sdkmanager: {line}");
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(SdkError::InstallFailed(format!(
                "installing {package} exited with {status}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sdk_in(dir: &Path) -> AndroidSdk {
        std::fs::create_dir_all(dir.join("platform-tools")).unwrap();
        AndroidSdk::new(dir.to_path_buf()).unwrap()
    }

    #[test]
    fn tool_paths_hang_off_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let sdk = sdk_in(dir.path());

        assert!(sdk.adb_path().starts_with(dir.path()));
        assert!(sdk
            .adb_path()
            .to_string_lossy()
            .contains("platform-tools"));
        assert!(sdk.emulator_path().ends_with(if cfg!(windows) {
            "emulator/emulator.exe"
        } else {
            "emulator/emulator"
        }));
    }

    #[test]
    fn cmdline_tools_latest_wins() {
        let dir = tempfile::tempdir().unwrap();
        let sdk = sdk_in(dir.path());
        let exe = if cfg!(windows) { "sdkmanager.bat" } else { "sdkmanager" };

        let latest = dir.path().join("cmdline-tools").join("latest").join("bin");
        std::fs::create_dir_all(&latest).unwrap();
        std::fs::write(latest.join(exe), "").unwrap();

        assert_eq!(sdk.sdkmanager_path().unwrap(), latest.join(exe));
    }

    #[test]
    fn versioned_cmdline_tools_are_found() {
        let dir = tempfile::tempdir().unwrap();
        let sdk = sdk_in(dir.path());
        let exe = if cfg!(windows) { "avdmanager.bat" } else { "avdmanager" };

        let versioned = dir.path().join("cmdline-tools").join("11.0").join("bin");
        std::fs::create_dir_all(&versioned).unwrap();
        std::fs::write(versioned.join(exe), "").unwrap();

        assert_eq!(sdk.avdmanager_path().unwrap(), versioned.join(exe));
    }

    #[test]
    fn missing_tool_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sdk = sdk_in(dir.path());
        assert!(matches!(
            sdk.sdkmanager_path(),
            Err(SdkError::ToolNotFound(_))
        ));
    }

    #[test]
    fn package_presence_follows_directory_layout() {
        let dir = tempfile::tempdir().unwrap();
        let sdk = sdk_in(dir.path());
        let image = "system-images;android-31;default;x86_64";

        assert!(!sdk.has_package(image));
        std::fs::create_dir_all(
            dir.path()
                .join("system-images")
                .join("android-31")
                .join("default")
                .join("x86_64"),
        )
        .unwrap();
        assert!(sdk.has_package(image));
    }

    #[test]
    fn env_includes_java_home_when_set() {
        let dir = tempfile::tempdir().unwrap();
        let sdk = sdk_in(dir.path()).with_java_home(Some(PathBuf::from("/opt/jdk17")));

        let env = sdk.env();
        assert!(env.iter().any(|(k, _)| *k == "ANDROID_HOME"));
        assert!(env
            .iter()
            .any(|(k, v)| *k == "JAVA_HOME" && v == &PathBuf::from("/opt/jdk17")));
    }
}
