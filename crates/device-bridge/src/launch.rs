//! App Launch
//!
//! Sequences a run against a resolved device: stop the old instance,
//! install the artefact, relay ports, launch the activity, resolve its
//! process ID and stream its log output until the process dies or the
//! user cancels. Cleanup runs on every path: stream teardown, then
//! port teardown, then (if asked for) emulator shutdown.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adb::AdbError;
use crate::channel::{DeviceChannel, LogSource};
use crate::logcat::LogClassifier;
use crate::poll::resolve_pid;
use crate::relay::PortRelays;

/// Launch errors, one per failing step
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to stop the running instance of {package}: {source}")]
    StopOld { package: String, source: AdbError },

    #[error("failed to install {path} onto the device: {source}", path = .artifact.display())]
    Install { artifact: PathBuf, source: AdbError },

    #[error("failed to relay ports: {0}")]
    Relay(AdbError),

    #[error("failed to read the device clock: {0}")]
    Clock(AdbError),

    #[error("failed to launch {package}/{activity}: {source}")]
    Launch {
        package: String,
        activity: String,
        source: AdbError,
    },

    #[error("problem starting app {package:?}; the device log above may explain why")]
    StartFailure { package: String },

    #[error("failed to open the device log stream: {0}")]
    LogStream(AdbError),
}

/// Everything a launch needs to know, resolved ahead of time.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Android application ID to install and launch
    pub package: String,
    /// Fully qualified activity to start
    pub activity: String,
    /// Artefact to install (debug APK)
    pub artifact: PathBuf,
    /// Trailing user arguments handed to the app as indexed extras
    pub passthrough: Vec<String>,
    /// Host ports forwarded onto the device
    pub forward_ports: Vec<u16>,
    /// Device ports reversed back to the host
    pub reverse_ports: Vec<u16>,
    /// Shut the emulator down once the run ends
    pub shutdown_on_exit: bool,
    /// Budget for the app process to appear after launch
    pub pid_timeout: Duration,
    /// Spacing between process ID polls
    pub pid_poll_interval: Duration,
    /// Spacing between liveness checks while streaming
    pub stop_poll_interval: Duration,
}

/// Book-keeping for one run, returned once the run ends cleanly.
#[derive(Debug, Clone)]
pub struct LaunchSession {
    /// ADB serial of the target device
    pub device_id: String,
    /// Process ID of the launched app, once resolved
    pub pid: Option<u32>,
    /// Device clock time recorded just before the launch
    pub launched_at: Option<NaiveDateTime>,
    /// Ports forwarded for this session
    pub forward_ports: Vec<u16>,
    /// Ports reversed for this session
    pub reverse_ports: Vec<u16>,
}

/// How the streaming phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// The app process disappeared from the device.
    ProcessExited,
    /// The log stream closed or failed (device gone, adb restarted).
    StreamClosed,
    /// The user interrupted the run.
    Cancelled,
}

/// Runs an app on an already resolved device and streams its output.
pub struct AppLauncher {
    options: LaunchOptions,
    classifier: LogClassifier,
}

impl AppLauncher {
    pub fn new(options: LaunchOptions) -> Self {
        Self {
            options,
            classifier: LogClassifier::default(),
        }
    }

    /// Replace the default stdout/stderr sentinel tags.
    pub fn with_classifier(mut self, classifier: LogClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Run the app and stream its output into `out`.
    ///
    /// Always tears down what it set up; when `shutdown_on_exit` is
    /// set the emulator is asked to stop as the very last step, even
    /// if an earlier step failed.
    pub async fn run<C, W>(
        &self,
        channel: &C,
        device_id: &str,
        cancel: CancellationToken,
        out: &mut W,
    ) -> Result<LaunchSession, LaunchError>
    where
        C: DeviceChannel,
        W: Write,
    {
        let mut session = LaunchSession {
            device_id: device_id.to_string(),
            pid: None,
            launched_at: None,
            forward_ports: self.options.forward_ports.clone(),
            reverse_ports: self.options.reverse_ports.clone(),
        };

        let outcome = self.run_inner(channel, &mut session, &cancel, out).await;

        if self.options.shutdown_on_exit {
            info!("Stopping emulator...");
            if let Err(err) = channel.kill().await {
                warn!("Failed to stop the emulator: {err}");
            }
        }

        outcome.map(|_| session)
    }

    async fn run_inner<C, W>(
        &self,
        channel: &C,
        session: &mut LaunchSession,
        cancel: &CancellationToken,
        out: &mut W,
    ) -> Result<(), LaunchError>
    where
        C: DeviceChannel,
        W: Write,
    {
        let package = &self.options.package;

        info!("Stopping old versions of the app...");
        channel
            .force_stop(package)
            .await
            .map_err(|source| LaunchError::StopOld {
                package: package.clone(),
                source,
            })?;

        info!("Installing new app version...");
        channel
            .install(&self.options.artifact)
            .await
            .map_err(|source| LaunchError::Install {
                artifact: self.options.artifact.clone(),
                source,
            })?;

        let mut relays = PortRelays::establish(
            channel,
            &self.options.forward_ports,
            &self.options.reverse_ports,
        )
        .await
        .map_err(LaunchError::Relay)?;

        let outcome = self.launch_and_stream(channel, session, cancel, out).await;

        relays.release(channel).await;
        outcome
    }

    /// Launch the activity and stream its log output (or fall back to
    /// the diagnostic tail when no process appears).
    async fn launch_and_stream<C, W>(
        &self,
        channel: &C,
        session: &mut LaunchSession,
        cancel: &CancellationToken,
        out: &mut W,
    ) -> Result<(), LaunchError>
    where
        C: DeviceChannel,
        W: Write,
    {
        let package = &self.options.package;

        info!("Launching {package}...");

        // Capture the earliest device time in case the PID is never found
        let device_start_time = channel.device_clock().await.map_err(LaunchError::Clock)?;
        session.launched_at = Some(device_start_time);

        channel
            .start_activity(package, &self.options.activity, &self.options.passthrough)
            .await
            .map_err(|source| LaunchError::Launch {
                package: package.clone(),
                activity: self.options.activity.clone(),
                source,
            })?;

        // The budget is anchored at the launch moment, not per poll
        let deadline = Instant::now() + self.options.pid_timeout;
        let pid =
            resolve_pid(channel, package, deadline, self.options.pid_poll_interval, true).await;

        match pid {
            Some(pid) => {
                session.pid = Some(pid);
                debug!("{package} is running as PID {pid}");

                info!("Following device log output (type CTRL-C to stop log)...");
                let mut stream = channel
                    .open_log_stream(pid)
                    .await
                    .map_err(LaunchError::LogStream)?;

                let ended = self.stream_logs(channel, &mut stream, pid, cancel, out).await;
                stream.terminate().await;
                debug!("Log stream ended: {ended:?}");
                Ok(())
            }
            None => {
                error!("Unable to find PID for app {package}");
                error!("Logs for launch attempt follow...");

                // Show the log from the start time of the app
                let _ = writeln!(out, "{}", "=".repeat(75));
                match channel.tail_log_since(device_start_time).await {
                    Ok(tail) => {
                        let _ = write!(out, "{tail}");
                        if !tail.ends_with('\n') {
                            let _ = writeln!(out);
                        }
                    }
                    Err(err) => warn!("Could not fetch the device log: {err}"),
                }
                let _ = writeln!(out, "{}", "=".repeat(75));

                Err(LaunchError::StartFailure {
                    package: package.clone(),
                })
            }
        }
    }

    /// Pump log lines through the classifier until the app exits, the
    /// stream closes, or the run is cancelled.
    async fn stream_logs<C, S, W>(
        &self,
        channel: &C,
        stream: &mut S,
        pid: u32,
        cancel: &CancellationToken,
        out: &mut W,
    ) -> StreamEnd
    where
        C: DeviceChannel,
        S: LogSource,
        W: Write,
    {
        let mut liveness = interval(self.options.stop_poll_interval);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Log stream stopped by user");
                    return StreamEnd::Cancelled;
                }
                _ = liveness.tick() => {
                    // Quiet so the check does not pollute verbose logs
                    if !channel.pid_exists(pid, true).await {
                        debug!("PID {pid} no longer exists; ending log stream");
                        return StreamEnd::ProcessExited;
                    }
                }
                line = stream.next_line() => match line {
                    Ok(Some(line)) => {
                        let (content, include) = self.classifier.classify(&line);
                        if include {
                            let _ = writeln!(out, "{content}");
                        }
                    }
                    Ok(None) => return StreamEnd::StreamClosed,
                    Err(err) => {
                        // A vanished device ends the run, it does not fail it
                        warn!("Device log stream error: {err}");
                        return StreamEnd::StreamClosed;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeDevice;

    fn options() -> LaunchOptions {
        LaunchOptions {
            package: "com.example.helloworld".to_string(),
            activity: "org.droidcase.android.MainActivity".to_string(),
            artifact: PathBuf::from("/tmp/app-debug.apk"),
            passthrough: Vec::new(),
            forward_ports: vec![8080],
            reverse_ports: vec![9000],
            shutdown_on_exit: false,
            pid_timeout: Duration::from_secs(5),
            pid_poll_interval: Duration::from_millis(10),
            stop_poll_interval: Duration::from_millis(500),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_run_streams_and_cleans_up_in_order() {
        let device = FakeDevice::default()
            .with_pid(5678, 2)
            .with_pid_checks_until_exit(2)
            .with_log_lines([
                "I/python.stdout: Hello, World!",
                "D/EGL_emulation: eglMakeCurrent",
                "I/python.stderr: warning: it happened",
            ]);

        let launcher = AppLauncher::new(options());
        let mut out = Vec::new();
        let session = launcher
            .run(&device, "emulator-5554", CancellationToken::new(), &mut out)
            .await
            .unwrap();

        assert_eq!(session.pid, Some(5678));
        assert!(session.launched_at.is_some());

        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed, "Hello, World!\nwarning: it happened\n");

        let calls = device.call_log();
        let pos = |call: &str| {
            calls
                .iter()
                .position(|c| c == call)
                .unwrap_or_else(|| panic!("{call} missing from {calls:?}"))
        };

        // Steps happen in launch order
        assert!(pos("force_stop com.example.helloworld") < pos("install app-debug.apk"));
        assert!(pos("install app-debug.apk") < pos("forward 8080->8080"));
        assert!(pos("forward 8080->8080") < pos("reverse 9000->9000"));
        assert!(pos("reverse 9000->9000") < pos("device_clock"));
        assert!(pos("device_clock") < pos("start_activity com.example.helloworld/org.droidcase.android.MainActivity"));
        assert!(pos("start_activity com.example.helloworld/org.droidcase.android.MainActivity") < pos("open_log_stream 5678"));

        // Teardown: stream first, then the port mappings
        assert!(pos("terminate_stream") < pos("forward_remove 8080"));
        assert!(pos("forward_remove 8080") < pos("reverse_remove 9000"));
        assert!(!calls.contains(&"kill".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_pid_prints_tail_and_fails() {
        let device = FakeDevice::default().with_tail_text("01-01 12:00:01.000 F/libc: Fatal signal 6");

        let launcher = AppLauncher::new(options());
        let mut out = Vec::new();
        let result = launcher
            .run(&device, "emulator-5554", CancellationToken::new(), &mut out)
            .await;

        assert!(matches!(result, Err(LaunchError::StartFailure { .. })));

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Fatal signal 6"));

        let calls = device.call_log();
        // The diagnostic tail starts from the recorded launch moment
        assert!(calls.contains(&"tail_log_since 2024-01-01 12:00:00".to_string()));
        // No stream was ever opened, and ports still came down
        assert!(!calls.iter().any(|c| c.starts_with("open_log_stream")));
        assert!(calls.contains(&"forward_remove 8080".to_string()));
        assert!(calls.contains(&"reverse_remove 9000".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_on_exit_runs_last_even_after_failure() {
        let device = FakeDevice::default();

        let mut opts = options();
        opts.shutdown_on_exit = true;
        let launcher = AppLauncher::new(opts);
        let mut out = Vec::new();
        let result = launcher
            .run(&device, "emulator-5554", CancellationToken::new(), &mut out)
            .await;
        assert!(result.is_err());

        let calls = device.call_log();
        assert_eq!(calls.last().map(String::as_str), Some("kill"));
        let kill_pos = calls.iter().position(|c| c == "kill").unwrap();
        let remove_pos = calls.iter().position(|c| c == "reverse_remove 9000").unwrap();
        assert!(remove_pos < kill_pos);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_stream_and_cleans_up() {
        let device = FakeDevice::default().with_pid(4242, 0).with_log_lines([
            "I/python.stdout: first",
        ]);

        let cancel = CancellationToken::new();
        let launcher = AppLauncher::new(options());

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let mut out = Vec::new();
        let session = launcher
            .run(&device, "emulator-5554", cancel, &mut out)
            .await
            .unwrap();
        assert_eq!(session.pid, Some(4242));

        let calls = device.call_log();
        assert!(calls.contains(&"terminate_stream".to_string()));
        assert!(calls.contains(&"forward_remove 8080".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_stream_ends_the_run_cleanly() {
        let device = FakeDevice::default()
            .with_pid(99, 0)
            .with_log_lines(["I/python.stdout: only line"])
            .with_stream_close_after_lines();

        let launcher = AppLauncher::new(options());
        let mut out = Vec::new();
        launcher
            .run(&device, "emulator-5554", CancellationToken::new(), &mut out)
            .await
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "only line\n");
    }

    #[tokio::test(start_paused = true)]
    async fn launch_error_reported_in_output_fails_the_run() {
        let device = FakeDevice::default().with_launch_failure("Error: Activity class does not exist");

        let launcher = AppLauncher::new(options());
        let mut out = Vec::new();
        let result = launcher
            .run(&device, "emulator-5554", CancellationToken::new(), &mut out)
            .await;

        assert!(matches!(result, Err(LaunchError::Launch { .. })));

        // Ports were mapped before the launch attempt and removed after
        let calls = device.call_log();
        assert!(calls.contains(&"forward_remove 8080".to_string()));
    }
}
