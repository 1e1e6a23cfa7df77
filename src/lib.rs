//! Droidcase - package, run and stream Android apps from the command line
//!
//! Droidcase turns a project described by `droidcase.toml` into a running
//! Android app: it drives the Gradle project that wraps the app, picks or
//! boots a target device, installs the debug APK, launches the main
//! activity, and streams the app's own output back to the terminal.
//!
//! ## Architecture
//!
//! Droidcase is organized into specialized crates:
//!
//! - `droidcase-core`: manifest loading and run-time configuration
//! - `droidcase-device-bridge`: ADB, AVD and emulator management, app
//!   launching and log streaming
//! - `droidcase-build-engine`: Gradle builds and distributable packaging

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commands;
pub mod project;

// Re-export member crates for library usage
pub use droidcase_build_engine as build;
pub use droidcase_core as core;
pub use droidcase_device_bridge as device;

/// Prelude module for convenient imports
pub mod prelude {
    pub use droidcase_build_engine::{AppBackend, GradleBackend, PackagingFormat};
    pub use droidcase_core::ProjectConfig;
    pub use droidcase_device_bridge::{
        AdbClient, AppLauncher, AvdManager, LaunchOptions, TargetSelector,
    };
}
