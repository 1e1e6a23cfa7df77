//! Android Build Engine
//!
//! Drives the Gradle project that wraps the app: debug builds for
//! `run`, release bundles and APKs for `package`.

pub mod gradle;

pub use gradle::GradleBackend;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Build errors
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Build failed: {0}")]
    BuildFailed(String),
    #[error("Toolchain not found: {0}")]
    ToolchainNotFound(String),
    #[error("no build artefact at {}; run `droidcase build` first", .0.display())]
    ArtifactMissing(PathBuf),
    #[error("unknown packaging format {0:?}; expected one of aab, apk, debug-apk")]
    UnknownFormat(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Distributable packaging formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackagingFormat {
    /// Android App Bundle, the Play Store submission format
    Aab,
    /// Unsigned release APK
    Apk,
    /// Debug APK for direct sideloading
    DebugApk,
}

impl PackagingFormat {
    /// The Gradle task that produces this format.
    pub fn gradle_task(self) -> &'static str {
        match self {
            Self::Aab => "bundleRelease",
            Self::Apk => "assembleRelease",
            Self::DebugApk => "assembleDebug",
        }
    }

    /// Artefact location below `app/build/outputs`, as path components.
    pub fn output_subpath(self) -> &'static [&'static str] {
        match self {
            Self::Aab => &["bundle", "release", "app-release.aab"],
            Self::Apk => &["apk", "release", "app-release-unsigned.apk"],
            Self::DebugApk => &["apk", "debug", "app-debug.apk"],
        }
    }

    /// Extension of the distributable file name.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Aab => "aab",
            Self::Apk => "apk",
            Self::DebugApk => "debug.apk",
        }
    }
}

impl FromStr for PackagingFormat {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aab" => Ok(Self::Aab),
            "apk" => Ok(Self::Apk),
            "debug-apk" => Ok(Self::DebugApk),
            other => Err(BuildError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for PackagingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Aab => "aab",
            Self::Apk => "apk",
            Self::DebugApk => "debug-apk",
        };
        write!(f, "{name}")
    }
}

/// What commands need from a platform build backend.
#[allow(async_fn_in_trait)]
pub trait AppBackend {
    /// Root of the generated platform project.
    fn project_path(&self) -> PathBuf;

    /// The artefact `run` installs onto a device.
    fn binary_path(&self) -> PathBuf;

    /// Where `package` leaves the distributable for a format.
    fn distribution_path(&self, format: PackagingFormat) -> PathBuf;

    /// Invoke the platform build tool with the given arguments.
    async fn run_build_tool(&self, args: &[&str]) -> Result<(), BuildError>;
}
