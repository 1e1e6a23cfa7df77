//! Target Selection
//!
//! Decides which device a run should use from the `-d` hint, the
//! devices ADB reports, and the defined AVDs. The decision itself is a
//! pure function; acting on it (booting or creating an emulator) is
//! side-effecting and lives in [`TargetSelector::resolve`].

use std::time::Duration;

use tracing::info;

use crate::adb::{AdbClient, AdbError};
use crate::avd::{AvdError, AvdManager};
use crate::device::DeviceState;

/// Selection errors
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("no device or emulator matches the device ID {0:?}")]
    UnknownDevice(String),
    #[error("no Android virtual device named {0:?} is defined")]
    UnknownAvd(String),
    #[error("device {0} is connected but not authorized for development; accept the USB debugging prompt on the device")]
    Unauthorized(String),
    #[error("multiple candidate devices found; pass -d with one of: {}", .0.join(", "))]
    Ambiguous(Vec<String>),
    #[error("ADB error: {0}")]
    Adb(#[from] AdbError),
    #[error("virtual device error: {0}")]
    Avd(#[from] AvdError),
}

/// One device a run could target.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    /// ADB serial
    pub serial: String,
    /// Human-friendly name
    pub name: String,
    /// Backing AVD name for running emulators
    pub avd: Option<String>,
    /// Connection state
    pub state: DeviceState,
}

/// Outcome of the pure selection step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetChoice {
    /// Use a device that is already reachable.
    Device {
        serial: String,
        name: String,
        avd: Option<String>,
    },
    /// Boot this defined but not running AVD.
    BootAvd(String),
    /// Create a brand new AVD, then boot it.
    CreateNew,
}

/// Decide the target from a hint, the reachable devices, and the
/// defined AVDs. No side effects.
///
/// Hints starting with `@` name an AVD; anything else is a device ID.
/// With no hint, a single usable device wins, none at all means
/// creating an emulator, and several is an error asking for `-d`.
pub fn choose(
    hint: Option<&str>,
    candidates: &[DeviceCandidate],
    avds: &[String],
) -> Result<TargetChoice, SelectError> {
    match hint {
        Some(hint) if hint.starts_with('@') => {
            let avd = &hint[1..];
            if let Some(candidate) = candidates
                .iter()
                .find(|c| c.avd.as_deref() == Some(avd) && c.state == DeviceState::Online)
            {
                return Ok(TargetChoice::Device {
                    serial: candidate.serial.clone(),
                    name: candidate.name.clone(),
                    avd: candidate.avd.clone(),
                });
            }
            if avds.iter().any(|name| name == avd) {
                Ok(TargetChoice::BootAvd(avd.to_string()))
            } else {
                Err(SelectError::UnknownAvd(avd.to_string()))
            }
        }
        Some(serial) => {
            let candidate = candidates
                .iter()
                .find(|c| c.serial == serial)
                .ok_or_else(|| SelectError::UnknownDevice(serial.to_string()))?;
            if candidate.state == DeviceState::Unauthorized {
                return Err(SelectError::Unauthorized(candidate.serial.clone()));
            }
            Ok(TargetChoice::Device {
                serial: candidate.serial.clone(),
                name: candidate.name.clone(),
                avd: candidate.avd.clone(),
            })
        }
        None => {
            let usable: Vec<&DeviceCandidate> = candidates
                .iter()
                .filter(|c| c.state == DeviceState::Online)
                .collect();
            match usable.as_slice() {
                [] => Ok(TargetChoice::CreateNew),
                [single] => Ok(TargetChoice::Device {
                    serial: single.serial.clone(),
                    name: single.name.clone(),
                    avd: single.avd.clone(),
                }),
                many => Err(SelectError::Ambiguous(
                    many.iter().map(|c| c.name.clone()).collect(),
                )),
            }
        }
    }
}

/// Finds, boots or creates the device a run will use.
pub struct TargetSelector {
    client: AdbClient,
    avds: AvdManager,
}

impl TargetSelector {
    pub fn new(client: AdbClient, avds: AvdManager) -> Self {
        Self { client, avds }
    }

    /// Devices currently visible to ADB, with AVD names attached to
    /// running emulators.
    pub async fn candidates(&self) -> Result<Vec<DeviceCandidate>, SelectError> {
        let devices = self.client.devices().await?;
        let mut candidates = Vec::with_capacity(devices.len());

        for device in devices {
            let avd = if device.is_emulator() && device.state == DeviceState::Online {
                self.client.avd_name(&device.serial).await
            } else {
                None
            };
            let name = match &avd {
                Some(avd) => format!("@{avd} (running emulator)"),
                None => device.display_name(),
            };
            candidates.push(DeviceCandidate {
                serial: device.serial,
                name,
                avd,
                state: device.state,
            });
        }

        Ok(candidates)
    }

    /// Apply [`choose`] to the current device list.
    pub async fn select_target(&self, hint: Option<&str>) -> Result<TargetChoice, SelectError> {
        let candidates = self.candidates().await?;
        let avds = self.avds.list_avds().await?;
        choose(hint, &candidates, &avds)
    }

    /// Resolve the hint all the way to a live device, booting or
    /// creating an emulator when the choice calls for it.
    ///
    /// Returns the target's ADB serial and display name.
    pub async fn resolve(
        &self,
        hint: Option<&str>,
        extra_emulator_args: &[String],
        boot_timeout: Duration,
    ) -> Result<(String, String), SelectError> {
        match self.select_target(hint).await? {
            TargetChoice::Device { serial, name, .. } => {
                info!("Using existing device {name}");
                Ok((serial, name))
            }
            TargetChoice::BootAvd(avd) => {
                self.avds.verify_avd(&avd).await?;
                info!("Starting emulator @{avd}...");
                let started = self.avds.start(&avd, extra_emulator_args, boot_timeout).await?;
                Ok(started)
            }
            TargetChoice::CreateNew => {
                info!("No connected devices; creating a new Android emulator");
                let avd = self.avds.create_device().await?;
                info!("Starting emulator @{avd}...");
                let started = self.avds.start(&avd, extra_emulator_args, boot_timeout).await?;
                Ok(started)
            }
        }
    }
}
