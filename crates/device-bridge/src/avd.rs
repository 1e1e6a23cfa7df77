//! Android Virtual Devices
//!
//! Lists, verifies, creates and boots AVDs through avdmanager and the
//! emulator binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use configparser::ini::Ini;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::adb::{AdbClient, AdbError};
use crate::device::DeviceState;
use crate::sdk::{AndroidSdk, SdkError};

/// Android API level used for freshly created devices.
const TARGET_API_LEVEL: u32 = 31;

/// Device profile used for freshly created devices.
const DEVICE_PROFILE: &str = "pixel_4";

/// Base name for freshly created devices.
const NEW_AVD_BASE_NAME: &str = "droidcase-device";

/// AVD errors
#[derive(Debug, thiserror::Error)]
pub enum AvdError {
    #[error("emulator executable not found at {0}")]
    EmulatorNotFound(PathBuf),
    #[error("unknown virtual device {0:?}")]
    UnknownAvd(String),
    #[error("emulator command failed: {0}")]
    EmulatorFailed(String),
    #[error("could not create virtual device: {0}")]
    CreateFailed(String),
    #[error("emulator for @{avd} exited during boot: {detail}")]
    BootFailed { avd: String, detail: String },
    #[error("emulator for @{avd} did not finish booting within {timeout_secs}s")]
    BootTimeout { avd: String, timeout_secs: u64 },
    #[error("could not determine the AVD home directory")]
    NoAvdHome,
    #[error("AVD config parse error: {0}")]
    Parse(String),
    #[error("SDK error: {0}")]
    Sdk(#[from] SdkError),
    #[error("ADB error: {0}")]
    Adb(#[from] AdbError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Emulator ABI matching the host architecture.
fn emulator_abi() -> &'static str {
    match std::env::consts::ARCH {
        "aarch64" => "arm64-v8a",
        _ => "x86_64",
    }
}

/// System image package installed for freshly created devices.
fn default_system_image() -> String {
    format!(
        "system-images;android-{};default;{}",
        TARGET_API_LEVEL,
        emulator_abi()
    )
}

/// Convert a config.ini `image.sysdir.1` value into an SDK package name.
fn image_package_from_sysdir(sysdir: &str) -> String {
    sysdir
        .trim_matches('/')
        .split('/')
        .collect::<Vec<_>>()
        .join(";")
}

/// First AVD name based on [`NEW_AVD_BASE_NAME`] that is not taken.
fn next_free_avd_name(existing: &[String]) -> String {
    if !existing.iter().any(|name| name == NEW_AVD_BASE_NAME) {
        return NEW_AVD_BASE_NAME.to_string();
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{NEW_AVD_BASE_NAME}-{suffix}");
        if !existing.iter().any(|name| name == &candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Manager for Android Virtual Devices
pub struct AvdManager {
    sdk: AndroidSdk,
    client: AdbClient,
    avd_home: Option<PathBuf>,
}

impl AvdManager {
    /// Create a new AVD manager
    pub fn new(sdk: AndroidSdk) -> Self {
        let client = AdbClient::new(&sdk);
        Self {
            sdk,
            client,
            avd_home: None,
        }
    }

    /// Override the AVD home directory (defaults to ~/.android/avd).
    pub fn with_avd_home(mut self, avd_home: PathBuf) -> Self {
        self.avd_home = Some(avd_home);
        self
    }

    fn avd_home(&self) -> Result<PathBuf, AvdError> {
        self.avd_home
            .clone()
            .or_else(|| self.sdk.avd_home())
            .ok_or(AvdError::NoAvdHome)
    }

    /// Names of all defined AVDs.
    pub async fn list_avds(&self) -> Result<Vec<String>, AvdError> {
        let emulator = self.sdk.emulator_path();
        if !emulator.exists() {
            return Err(AvdError::EmulatorNotFound(emulator));
        }

        debug!("{} -list-avds", emulator.display());
        let output = Command::new(&emulator).arg("-list-avds").output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AvdError::EmulatorFailed(stderr.to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.contains('|'))
            .map(String::from)
            .collect())
    }

    /// Check that an AVD exists and its system image is installed,
    /// installing the image if it has gone missing.
    pub async fn verify_avd(&self, name: &str) -> Result<(), AvdError> {
        let avd_home = self.avd_home()?;
        let ini_path = avd_home.join(format!("{name}.ini"));
        if !ini_path.is_file() {
            return Err(AvdError::UnknownAvd(name.to_string()));
        }

        let content = tokio::fs::read_to_string(&ini_path).await?;
        let mut ini = Ini::new();
        ini.read(content).map_err(AvdError::Parse)?;

        let avd_dir = match ini.get("default", "path") {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => avd_home.join(format!("{name}.avd")),
        };

        let config_path = avd_dir.join("config.ini");
        if !config_path.is_file() {
            return Err(AvdError::Parse(format!(
                "no config.ini for virtual device {name:?}"
            )));
        }
        let config_content = tokio::fs::read_to_string(&config_path).await?;
        let mut config = Ini::new();
        config.read(config_content).map_err(AvdError::Parse)?;

        let sysdir = config.get("default", "image.sysdir.1").unwrap_or_default();
        if sysdir.is_empty() {
            debug!("AVD {name} does not declare a system image; skipping image check");
            return Ok(());
        }

        let package = image_package_from_sysdir(&sysdir);
        if !self.sdk.has_package(&package) {
            info!("System image {package} for @{name} is missing");
            self.sdk.install_package(&package).await?;
        }

        Ok(())
    }

    /// Create a fresh AVD from the default system image.
    ///
    /// Not idempotent: every call creates a new device under a new
    /// name. Returns the name of the device it created.
    pub async fn create_device(&self) -> Result<String, AvdError> {
        let image = default_system_image();
        if !self.sdk.has_package(&image) {
            self.sdk.install_package(&image).await?;
        }

        let existing = self.list_avds().await?;
        let name = next_free_avd_name(&existing);

        info!("Creating Android virtual device @{name}...");
        let avdmanager = self.sdk.avdmanager_path()?;

        let mut cmd = Command::new(&avdmanager);
        cmd.arg("create")
            .arg("avd")
            .arg("-n")
            .arg(&name)
            .arg("-k")
            .arg(&image)
            .arg("-d")
            .arg(DEVICE_PROFILE);
        for (key, value) in self.sdk.env() {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        // Answer the custom hardware profile question
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(b"no\n").await;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AvdError::CreateFailed(stderr.to_string()));
        }

        // Freshly created devices have no hardware keyboard; typing
        // through the host keyboard needs this flag.
        let config_path = self
            .avd_home()?
            .join(format!("{name}.avd"))
            .join("config.ini");
        if config_path.exists() {
            let mut content = tokio::fs::read_to_string(&config_path).await?;
            if !content.contains("hw.keyboard") {
                content.push_str("hw.keyboard = yes\n");
                tokio::fs::write(&config_path, content).await?;
            }
        }

        info!("Created @{name}");
        Ok(name)
    }

    /// Boot an AVD and wait until Android finishes starting.
    ///
    /// Returns the new emulator's ADB serial and a display name.
    pub async fn start(
        &self,
        avd: &str,
        extra_args: &[String],
        boot_timeout: Duration,
    ) -> Result<(String, String), AvdError> {
        let emulator = self.sdk.emulator_path();
        if !emulator.exists() {
            return Err(AvdError::EmulatorNotFound(emulator));
        }

        // Serials already in use, so the new emulator can be told apart
        let known: Vec<String> = self
            .client
            .devices()
            .await?
            .into_iter()
            .filter(|d| d.is_emulator())
            .map(|d| d.serial)
            .collect();

        let mut args = vec!["-avd".to_string(), avd.to_string()];
        args.extend(extra_args.iter().cloned());
        debug!("{} {:?}", emulator.display(), args);

        let mut cmd = Command::new(&emulator);
        cmd.args(&args);
        for (key, value) in self.sdk.env() {
            cmd.env(key, value);
        }
        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain emulator output so the pipes never fill up
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("emulator: {line}");
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("emulator: {line}");
                }
            });
        }

        info!("Waiting for @{avd} to boot...");
        let deadline = tokio::time::Instant::now() + boot_timeout;

        while tokio::time::Instant::now() < deadline {
            // A dead emulator will never produce a device
            if let Some(status) = child.try_wait()? {
                return Err(AvdError::BootFailed {
                    avd: avd.to_string(),
                    detail: format!("exit status {status}"),
                });
            }

            if let Some(serial) = self.find_booted_emulator(avd, &known).await {
                info!("@{avd} is ready (device ID {serial})");
                return Ok((serial, format!("@{avd} (running emulator)")));
            }

            tokio::time::sleep(Duration::from_secs(2)).await;
        }

        Err(AvdError::BootTimeout {
            avd: avd.to_string(),
            timeout_secs: boot_timeout.as_secs(),
        })
    }

    /// Look for a newly appeared emulator backed by `avd` that has
    /// finished booting.
    async fn find_booted_emulator(&self, avd: &str, known: &[String]) -> Option<String> {
        let devices = self.client.devices().await.ok()?;
        for device in devices {
            if !device.is_emulator()
                || device.state != DeviceState::Online
                || known.contains(&device.serial)
            {
                continue;
            }
            if self.client.avd_name(&device.serial).await.as_deref() != Some(avd) {
                continue;
            }
            let adb = self.client.device(&device.serial);
            if let Ok(flag) = adb.getprop("sys.boot_completed").await {
                if flag == "1" {
                    return Some(device.serial);
                }
            }
        }
        None
    }
}
