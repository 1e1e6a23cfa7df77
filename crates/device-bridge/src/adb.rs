//! ADB (Android Debug Bridge) Client
//!
//! Communicates with devices via ADB. `AdbClient` speaks to the ADB
//! server as a whole; `Adb` is bound to one device serial and carries
//! the per-device operations the launcher needs.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::NaiveDateTime;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::channel::DeviceChannel;
use crate::device::{self, Device};
use crate::logcat::LogStream;
use crate::sdk::AndroidSdk;

/// ADB errors
#[derive(Debug, thiserror::Error)]
pub enum AdbError {
    #[error("ADB not found at {0}")]
    NotFound(PathBuf),
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("ADB command failed: {0}")]
    CommandFailed(String),
    #[error("Unexpected ADB output: {0}")]
    UnexpectedOutput(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run an ADB command and capture its output.
///
/// Quiet invocations are used by tight polling loops; they echo at
/// trace level instead of debug to keep verbose logs readable.
async fn run_adb(adb: &Path, args: &[&str], quiet: bool) -> Result<String, AdbError> {
    if !adb.exists() {
        return Err(AdbError::NotFound(adb.to_path_buf()));
    }

    if quiet {
        trace!("adb {:?}", args);
    } else {
        debug!("adb {:?}", args);
    }

    let output = Command::new(adb).args(args).output().await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AdbError::CommandFailed(stderr.to_string()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Quote an argument so the device-side shell treats it as one word.
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Build the `am start` argument list for launching an activity.
///
/// Trailing user arguments become indexed string extras; the app reads
/// them back as arg0, arg1, and so on.
fn launch_intent_args(package: &str, activity: &str, extras: &[String]) -> Vec<String> {
    let mut args = vec![
        "shell".to_string(),
        "am".to_string(),
        "start".to_string(),
        format!("{package}/{activity}"),
        "-a".to_string(),
        "android.intent.action.MAIN".to_string(),
        "-c".to_string(),
        "android.intent.category.LAUNCHER".to_string(),
    ];
    for (i, extra) in extras.iter().enumerate() {
        args.push("-e".to_string());
        args.push(format!("arg{i}"));
        args.push(shell_quote(extra));
    }
    args
}

/// ADB client for server-wide queries
#[derive(Debug, Clone)]
pub struct AdbClient {
    adb_path: PathBuf,
}

impl AdbClient {
    /// Create a new ADB client
    pub fn new(sdk: &AndroidSdk) -> Self {
        Self {
            adb_path: sdk.adb_path(),
        }
    }

    /// Check if ADB is available
    pub fn is_available(&self) -> bool {
        self.adb_path.exists()
    }

    async fn run(&self, args: &[&str], quiet: bool) -> Result<String, AdbError> {
        run_adb(&self.adb_path, args, quiet).await
    }

    /// List connected devices
    pub async fn devices(&self) -> Result<Vec<Device>, AdbError> {
        let output = self.run(&["devices", "-l"], false).await?;
        Ok(device::parse_devices(&output))
    }

    /// The AVD name behind a running emulator serial, if the emulator
    /// console answers.
    pub async fn avd_name(&self, serial: &str) -> Option<String> {
        let output = self
            .run(&["-s", serial, "emu", "avd", "name"], true)
            .await
            .ok()?;
        let name = output.lines().next()?.trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// Bind a handle to one device serial.
    pub fn device(&self, serial: &str) -> Adb {
        Adb {
            adb_path: self.adb_path.clone(),
            serial: serial.to_string(),
        }
    }
}

/// ADB handle bound to a single device
#[derive(Debug, Clone)]
pub struct Adb {
    adb_path: PathBuf,
    serial: String,
}

impl Adb {
    pub fn serial(&self) -> &str {
        &self.serial
    }

    async fn run(&self, args: &[&str], quiet: bool) -> Result<String, AdbError> {
        let mut full_args = vec!["-s", self.serial.as_str()];
        full_args.extend(args);
        run_adb(&self.adb_path, &full_args, quiet).await
    }

    /// Run a shell command on the device
    pub async fn shell(&self, args: &[&str], quiet: bool) -> Result<String, AdbError> {
        let mut full_args = vec!["shell"];
        full_args.extend(args);
        self.run(&full_args, quiet).await
    }

    /// Read a system property
    pub async fn getprop(&self, prop: &str) -> Result<String, AdbError> {
        let output = self.shell(&["getprop", prop], true).await?;
        Ok(output.trim().to_string())
    }
}

impl DeviceChannel for Adb {
    type Stream = LogStream;

    async fn force_stop(&self, package: &str) -> Result<(), AdbError> {
        self.shell(&["am", "force-stop", package], false).await?;
        Ok(())
    }

    async fn install(&self, artifact: &Path) -> Result<(), AdbError> {
        let path = artifact.to_string_lossy();
        self.run(&["install", "-r", &path], false).await?;
        Ok(())
    }

    async fn start_activity(
        &self,
        package: &str,
        activity: &str,
        extras: &[String],
    ) -> Result<(), AdbError> {
        let args = launch_intent_args(package, activity, extras);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run(&arg_refs, false).await?;

        // `am start` reports some failures on stdout with a zero exit code
        if output.lines().any(|line| line.trim().starts_with("Error")) {
            return Err(AdbError::CommandFailed(output.trim().to_string()));
        }
        Ok(())
    }

    async fn pidof(&self, package: &str, quiet: bool) -> Option<u32> {
        let output = self.shell(&["pidof", "-s", package], quiet).await.ok()?;
        output.split_whitespace().next()?.parse().ok()
    }

    async fn pid_exists(&self, pid: u32, quiet: bool) -> bool {
        let path = format!("/proc/{pid}");
        self.shell(&["test", "-e", &path], quiet).await.is_ok()
    }

    async fn device_clock(&self) -> Result<NaiveDateTime, AdbError> {
        let output = self.shell(&["date", "+'%Y-%m-%d %H:%M:%S'"], false).await?;
        NaiveDateTime::parse_from_str(output.trim(), "%Y-%m-%d %H:%M:%S").map_err(|err| {
            AdbError::UnexpectedOutput(format!("device clock {:?}: {err}", output.trim()))
        })
    }

    async fn open_log_stream(&self, pid: u32) -> Result<LogStream, AdbError> {
        let pid_str = pid.to_string();
        let args = [
            "-s",
            self.serial.as_str(),
            "logcat",
            "--pid",
            &pid_str,
            "--format",
            "tag",
            "EGL_emulation:S",
        ];
        debug!("adb {:?}", args);

        let child = Command::new(&self.adb_path)
            .args(args)
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        LogStream::from_child(child).map_err(AdbError::Io)
    }

    async fn tail_log_since(&self, since: NaiveDateTime) -> Result<String, AdbError> {
        let cutoff = since.format("%m-%d %H:%M:%S.000000").to_string();
        self.run(&["logcat", "-t", &cutoff], false).await
    }

    async fn forward(&self, host_port: u16, device_port: u16) -> Result<(), AdbError> {
        let host = format!("tcp:{host_port}");
        let device = format!("tcp:{device_port}");
        self.run(&["forward", &host, &device], false).await?;
        Ok(())
    }

    async fn forward_remove(&self, host_port: u16) -> Result<(), AdbError> {
        let host = format!("tcp:{host_port}");
        self.run(&["forward", "--remove", &host], false).await?;
        Ok(())
    }

    async fn reverse(&self, device_port: u16, host_port: u16) -> Result<(), AdbError> {
        let device = format!("tcp:{device_port}");
        let host = format!("tcp:{host_port}");
        self.run(&["reverse", &device, &host], false).await?;
        Ok(())
    }

    async fn reverse_remove(&self, device_port: u16) -> Result<(), AdbError> {
        let device = format!("tcp:{device_port}");
        self.run(&["reverse", "--remove", &device], false).await?;
        Ok(())
    }

    async fn kill(&self) -> Result<(), AdbError> {
        self.run(&["emu", "kill"], false).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_arguments_are_not_quoted() {
        assert_eq!(shell_quote("--value=3"), "--value=3");
        assert_eq!(shell_quote("path/to/file.txt"), "path/to/file.txt");
    }

    #[test]
    fn arguments_with_spaces_are_quoted() {
        assert_eq!(shell_quote("hello world"), "'hello world'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn single_quotes_are_escaped() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn launch_args_carry_indexed_extras() {
        let extras = vec!["--first".to_string(), "second value".to_string()];
        let args = launch_intent_args("com.example.app", "org.droidcase.android.MainActivity", &extras);

        assert_eq!(args[3], "com.example.app/org.droidcase.android.MainActivity");
        assert_eq!(
            &args[8..],
            &[
                "-e".to_string(),
                "arg0".to_string(),
                "--first".to_string(),
                "-e".to_string(),
                "arg1".to_string(),
                "'second value'".to_string(),
            ]
        );
    }

    #[test]
    fn launch_args_without_extras_end_at_category() {
        let args = launch_intent_args("com.example.app", "a.b.MainActivity", &[]);
        assert_eq!(args.last().map(String::as_str), Some("android.intent.category.LAUNCHER"));
        assert_eq!(args.len(), 8);
    }
}
