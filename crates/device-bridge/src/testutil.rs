//! Test doubles for the device channel.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};

use crate::adb::AdbError;
use crate::channel::{DeviceChannel, LogSource};

fn fixed_clock() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap()
}

/// In-memory device that records every call made against it.
///
/// Process ID behavior is scripted: `with_pid` controls how many polls
/// `pidof` misses before resolving, `with_pid_checks_until_exit`
/// controls how many liveness checks pass before the fake process
/// "exits". Polling calls are not recorded; they would drown the call
/// log the order assertions read.
pub(crate) struct FakeDevice {
    calls: Arc<Mutex<Vec<String>>>,
    pid: Option<u32>,
    pid_polls_until_found: usize,
    pidof_calls: AtomicUsize,
    pid_checks_until_exit: usize,
    pid_checks: AtomicUsize,
    log_lines: Mutex<VecDeque<String>>,
    close_stream_after_lines: bool,
    tail_text: String,
    launch_failure: Option<String>,
    fail_forward: Option<u16>,
    fail_forward_remove: Option<u16>,
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            pid: None,
            pid_polls_until_found: 0,
            pidof_calls: AtomicUsize::new(0),
            pid_checks_until_exit: usize::MAX,
            pid_checks: AtomicUsize::new(0),
            log_lines: Mutex::new(VecDeque::new()),
            close_stream_after_lines: false,
            tail_text: String::new(),
            launch_failure: None,
            fail_forward: None,
            fail_forward_remove: None,
        }
    }
}

impl FakeDevice {
    /// Resolve `pidof` to `pid` after `polls_until_found` misses.
    pub fn with_pid(mut self, pid: u32, polls_until_found: usize) -> Self {
        self.pid = Some(pid);
        self.pid_polls_until_found = polls_until_found;
        self
    }

    /// Let `pid_exists` succeed `checks` times, then report the
    /// process as gone.
    pub fn with_pid_checks_until_exit(mut self, checks: usize) -> Self {
        self.pid_checks_until_exit = checks;
        self
    }

    /// Script the raw lines the log stream will produce.
    pub fn with_log_lines<I, T>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.log_lines = Mutex::new(lines.into_iter().map(Into::into).collect());
        self
    }

    /// Close the log stream once its scripted lines run out, instead
    /// of blocking like a live logcat.
    pub fn with_stream_close_after_lines(mut self) -> Self {
        self.close_stream_after_lines = true;
        self
    }

    /// Text returned by the diagnostic log tail.
    pub fn with_tail_text(mut self, text: &str) -> Self {
        self.tail_text = text.to_string();
        self
    }

    /// Make `start_activity` fail with the given message.
    pub fn with_launch_failure(mut self, message: &str) -> Self {
        self.launch_failure = Some(message.to_string());
        self
    }

    /// Make forwarding the given port fail.
    pub fn fail_forward_on(mut self, port: u16) -> Self {
        self.fail_forward = Some(port);
        self
    }

    /// Make removing the given forwarded port fail.
    pub fn fail_forward_remove_on(mut self, port: u16) -> Self {
        self.fail_forward_remove = Some(port);
        self
    }

    /// Everything that was called, in call order.
    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DeviceChannel for FakeDevice {
    type Stream = FakeLogStream;

    async fn force_stop(&self, package: &str) -> Result<(), AdbError> {
        self.record(format!("force_stop {package}"));
        Ok(())
    }

    async fn install(&self, artifact: &Path) -> Result<(), AdbError> {
        let name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.record(format!("install {name}"));
        Ok(())
    }

    async fn start_activity(
        &self,
        package: &str,
        activity: &str,
        _extras: &[String],
    ) -> Result<(), AdbError> {
        self.record(format!("start_activity {package}/{activity}"));
        match &self.launch_failure {
            Some(message) => Err(AdbError::CommandFailed(message.clone())),
            None => Ok(()),
        }
    }

    async fn pidof(&self, _package: &str, _quiet: bool) -> Option<u32> {
        let polls = self.pidof_calls.fetch_add(1, Ordering::SeqCst);
        match self.pid {
            Some(pid) if polls >= self.pid_polls_until_found => Some(pid),
            _ => None,
        }
    }

    async fn pid_exists(&self, _pid: u32, _quiet: bool) -> bool {
        let checks = self.pid_checks.fetch_add(1, Ordering::SeqCst);
        checks < self.pid_checks_until_exit
    }

    async fn device_clock(&self) -> Result<NaiveDateTime, AdbError> {
        self.record("device_clock".to_string());
        Ok(fixed_clock())
    }

    async fn open_log_stream(&self, pid: u32) -> Result<FakeLogStream, AdbError> {
        self.record(format!("open_log_stream {pid}"));
        let lines = std::mem::take(&mut *self.log_lines.lock().unwrap());
        Ok(FakeLogStream {
            lines,
            close_after_lines: self.close_stream_after_lines,
            calls: Arc::clone(&self.calls),
        })
    }

    async fn tail_log_since(&self, since: NaiveDateTime) -> Result<String, AdbError> {
        self.record(format!("tail_log_since {}", since.format("%Y-%m-%d %H:%M:%S")));
        Ok(self.tail_text.clone())
    }

    async fn forward(&self, host_port: u16, device_port: u16) -> Result<(), AdbError> {
        self.record(format!("forward {host_port}->{device_port}"));
        if self.fail_forward == Some(host_port) {
            return Err(AdbError::CommandFailed(format!(
                "cannot bind listener on port {host_port}"
            )));
        }
        Ok(())
    }

    async fn forward_remove(&self, host_port: u16) -> Result<(), AdbError> {
        self.record(format!("forward_remove {host_port}"));
        if self.fail_forward_remove == Some(host_port) {
            return Err(AdbError::CommandFailed(format!(
                "no forward mapping on port {host_port}"
            )));
        }
        Ok(())
    }

    async fn reverse(&self, device_port: u16, host_port: u16) -> Result<(), AdbError> {
        self.record(format!("reverse {device_port}->{host_port}"));
        Ok(())
    }

    async fn reverse_remove(&self, device_port: u16) -> Result<(), AdbError> {
        self.record(format!("reverse_remove {device_port}"));
        Ok(())
    }

    async fn kill(&self) -> Result<(), AdbError> {
        self.record("kill".to_string());
        Ok(())
    }
}

/// Scripted log stream handed out by [`FakeDevice`].
pub(crate) struct FakeLogStream {
    lines: VecDeque<String>,
    close_after_lines: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl LogSource for FakeLogStream {
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        if let Some(line) = self.lines.pop_front() {
            return Ok(Some(line));
        }
        if self.close_after_lines {
            return Ok(None);
        }
        // A live logcat blocks once it has printed everything so far
        std::future::pending().await
    }

    async fn terminate(&mut self) {
        self.calls.lock().unwrap().push("terminate_stream".to_string());
    }
}
