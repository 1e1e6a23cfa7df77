//! Gradle Backend
//!
//! Runs the Gradle wrapper inside the generated Android project and
//! knows where Gradle leaves its artefacts.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::{AppBackend, BuildError, PackagingFormat};

/// Gradle-backed Android project
pub struct GradleBackend {
    base_dir: PathBuf,
    app_name: String,
    formal_name: String,
    version: String,
    sdk_root: PathBuf,
    java_home: Option<PathBuf>,
}

impl GradleBackend {
    /// Create a backend for the app rooted at `base_dir` (the
    /// directory holding droidcase.toml).
    pub fn new(
        base_dir: PathBuf,
        app_name: &str,
        formal_name: &str,
        version: &str,
        sdk_root: PathBuf,
    ) -> Self {
        Self {
            base_dir,
            app_name: app_name.to_string(),
            formal_name: formal_name.to_string(),
            version: version.to_string(),
            sdk_root,
            java_home: None,
        }
    }

    /// Set JAVA_HOME for Gradle invocations
    pub fn with_java_home(mut self, java_home: Option<PathBuf>) -> Self {
        self.java_home = java_home;
        self
    }

    /// Get gradlew path
    fn gradlew_path(&self) -> PathBuf {
        let wrapper_name = if cfg!(windows) { "gradlew.bat" } else { "gradlew" };
        self.project_path().join(wrapper_name)
    }

    /// Check if the Gradle wrapper exists
    pub fn has_gradle_wrapper(&self) -> bool {
        self.gradlew_path().exists()
    }

    fn outputs_dir(&self) -> PathBuf {
        self.project_path().join("app").join("build").join("outputs")
    }

    /// Build the debug APK used by `run`.
    pub async fn build(&self) -> Result<PathBuf, BuildError> {
        info!("Building Android APK with Gradle...");
        self.run_build_tool(&[PackagingFormat::DebugApk.gradle_task()])
            .await?;

        let binary = self.binary_path();
        if !binary.is_file() {
            return Err(BuildError::ArtifactMissing(binary));
        }
        info!("Built {}", binary.display());
        Ok(binary)
    }

    /// Build a distributable and move it into the dist directory.
    pub async fn package(&self, format: PackagingFormat) -> Result<PathBuf, BuildError> {
        info!("Building {format} with Gradle...");
        self.run_build_tool(&[format.gradle_task()]).await?;

        let artifact = self.locate_artifact(format)?;
        let dist = self.distribution_path(format);
        if let Some(parent) = dist.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!("Moving {} to {}", artifact.display(), dist.display());
        // Rename fails across filesystems; fall back to copy + remove
        if tokio::fs::rename(&artifact, &dist).await.is_err() {
            tokio::fs::copy(&artifact, &dist).await?;
            tokio::fs::remove_file(&artifact).await?;
        }

        info!("Packaged {}", dist.display());
        Ok(dist)
    }

    /// Find the artefact a Gradle task just produced.
    ///
    /// Checks the documented output location first, then searches the
    /// outputs tree, since Gradle plugin versions move things around.
    fn locate_artifact(&self, format: PackagingFormat) -> Result<PathBuf, BuildError> {
        let outputs = self.outputs_dir();
        let mut expected = outputs.clone();
        for part in format.output_subpath() {
            expected = expected.join(part);
        }
        if expected.is_file() {
            return Ok(expected);
        }

        let (extension, marker) = match format {
            PackagingFormat::Aab => ("aab", "release"),
            PackagingFormat::Apk => ("apk", "release"),
            PackagingFormat::DebugApk => ("apk", "debug"),
        };
        let found = WalkDir::new(&outputs)
            .into_iter()
            .filter_map(Result::ok)
            .map(|entry| entry.into_path())
            .find(|path| {
                path.is_file()
                    && path.extension().map(|e| e == extension).unwrap_or(false)
                    && path
                        .file_name()
                        .map(|n| n.to_string_lossy().contains(marker))
                        .unwrap_or(false)
            });

        found.ok_or(BuildError::ArtifactMissing(expected))
    }
}

impl AppBackend for GradleBackend {
    fn project_path(&self) -> PathBuf {
        self.base_dir
            .join("build")
            .join(&self.app_name)
            .join("android")
            .join("gradle")
    }

    fn binary_path(&self) -> PathBuf {
        let mut path = self.outputs_dir();
        for part in PackagingFormat::DebugApk.output_subpath() {
            path = path.join(part);
        }
        path
    }

    fn distribution_path(&self, format: PackagingFormat) -> PathBuf {
        self.base_dir.join("dist").join(format!(
            "{}-{}.{}",
            self.formal_name,
            self.version,
            format.extension()
        ))
    }

    async fn run_build_tool(&self, args: &[&str]) -> Result<(), BuildError> {
        let gradlew = self.gradlew_path();
        if !gradlew.exists() {
            return Err(BuildError::ToolchainNotFound(format!(
                "no Gradle wrapper at {}; create the Android project first",
                gradlew.display()
            )));
        }

        debug!("Running: gradlew --console plain {args:?}");

        let mut cmd = Command::new(&gradlew);
        cmd.current_dir(self.project_path());
        cmd.arg("--console").arg("plain");
        cmd.args(args);

        // Set environment
        cmd.env("ANDROID_HOME", &self.sdk_root);
        cmd.env("ANDROID_SDK_ROOT", &self.sdk_root);
        if let Some(java_home) = &self.java_home {
            cmd.env("JAVA_HOME", java_home);
        }

        let output = cmd.output().await?;
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuildError::BuildFailed(format!("{stdout}\n{stderr}")));
        }

        Ok(())
    }
}
