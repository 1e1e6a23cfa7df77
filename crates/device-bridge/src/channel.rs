//! Device Channel
//!
//! The capability surface the app launcher needs from a connected
//! device. `Adb` is the production implementation; tests substitute
//! an in-memory fake.

use std::path::Path;

use chrono::NaiveDateTime;

use crate::adb::AdbError;

/// One attached device, addressable by ADB.
#[allow(async_fn_in_trait)]
pub trait DeviceChannel {
    /// The log stream type produced by [`DeviceChannel::open_log_stream`].
    type Stream: LogSource;

    /// Stop any running instance of the given application ID.
    async fn force_stop(&self, package: &str) -> Result<(), AdbError>;

    /// Install (or replace) an app from a local artefact.
    async fn install(&self, artifact: &Path) -> Result<(), AdbError>;

    /// Launch an activity, passing each extra argument as an indexed
    /// string extra (`-e arg0 ...`, `-e arg1 ...`).
    async fn start_activity(
        &self,
        package: &str,
        activity: &str,
        extras: &[String],
    ) -> Result<(), AdbError>;

    /// Process ID of the given application, if it is running.
    async fn pidof(&self, package: &str, quiet: bool) -> Option<u32>;

    /// Whether the given process is still alive.
    async fn pid_exists(&self, pid: u32, quiet: bool) -> bool;

    /// Current wall-clock time on the device.
    async fn device_clock(&self) -> Result<NaiveDateTime, AdbError>;

    /// Open a follow-mode log stream filtered to the given process.
    async fn open_log_stream(&self, pid: u32) -> Result<Self::Stream, AdbError>;

    /// Fetch the raw log recorded since the given device timestamp.
    async fn tail_log_since(&self, since: NaiveDateTime) -> Result<String, AdbError>;

    /// Map a host port onto a device port.
    async fn forward(&self, host_port: u16, device_port: u16) -> Result<(), AdbError>;

    /// Remove a host-to-device port mapping.
    async fn forward_remove(&self, host_port: u16) -> Result<(), AdbError>;

    /// Map a device port back onto a host port.
    async fn reverse(&self, device_port: u16, host_port: u16) -> Result<(), AdbError>;

    /// Remove a device-to-host port mapping.
    async fn reverse_remove(&self, device_port: u16) -> Result<(), AdbError>;

    /// Ask the device to shut down (meaningful for emulators only).
    async fn kill(&self) -> Result<(), AdbError>;
}

/// A line-oriented device log stream.
#[allow(async_fn_in_trait)]
pub trait LogSource {
    /// Next raw log line, or `None` once the stream closes.
    async fn next_line(&mut self) -> std::io::Result<Option<String>>;

    /// Tear the stream down, releasing any underlying process.
    async fn terminate(&mut self);
}
