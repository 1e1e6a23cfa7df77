//! Droidcase device bridge
//!
//! Talks to Android devices and emulators: discovers the SDK, selects
//! or boots a target device, installs and launches the app, and
//! streams its log output back to the terminal.
//!
//! The launcher is generic over [`channel::DeviceChannel`], the
//! capability surface a device exposes; `adb::Adb` implements it over
//! real ADB subprocess calls.

pub mod adb;
pub mod avd;
pub mod channel;
pub mod device;
pub mod launch;
pub mod logcat;
pub mod poll;
pub mod relay;
pub mod sdk;
pub mod select;

#[cfg(test)]
mod testutil;

pub use adb::{Adb, AdbClient, AdbError};
pub use avd::{AvdError, AvdManager};
pub use channel::{DeviceChannel, LogSource};
pub use device::{Device, DeviceState, DeviceType};
pub use launch::{AppLauncher, LaunchError, LaunchOptions, LaunchSession};
pub use logcat::{LogClassifier, LogStream, STDERR_TAG, STDOUT_TAG};
pub use relay::PortRelays;
pub use sdk::{AndroidSdk, SdkError};
pub use select::{choose, DeviceCandidate, SelectError, TargetChoice, TargetSelector};
