//! Device Model
//!
//! Typed view of the devices ADB reports, plus the parser for
//! `adb devices -l` output.

use serde::{Deserialize, Serialize};

/// Connection state as reported by ADB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Ready for commands
    Online,
    /// Connected but not responding
    Offline,
    /// Connected but USB debugging not authorized
    Unauthorized,
    /// In bootloader/fastboot mode
    Bootloader,
    /// In recovery mode
    Recovery,
    /// Unrecognized state string
    Unknown,
}

/// Physical device or emulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Physical,
    Emulator,
}

/// A device known to ADB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Serial number (e.g. "emulator-5554" or "R58M12ABCDE")
    pub serial: String,
    /// Connection state
    pub state: DeviceState,
    /// Physical or emulator
    pub device_type: DeviceType,
    /// Model name if reported
    pub model: Option<String>,
    /// Product name if reported
    pub product: Option<String>,
    /// ADB transport ID if reported
    pub transport_id: Option<u32>,
}

impl Device {
    /// Whether this device can accept commands right now.
    pub fn is_usable(&self) -> bool {
        self.state == DeviceState::Online
    }

    pub fn is_emulator(&self) -> bool {
        self.device_type == DeviceType::Emulator
    }

    /// Human-friendly name for selection lists and log messages.
    pub fn display_name(&self) -> String {
        match &self.model {
            Some(model) => format!("{} ({})", model.replace('_', " "), self.serial),
            None => match self.state {
                DeviceState::Unauthorized => {
                    format!("Unknown device (not authorized for development) ({})", self.serial)
                }
                _ => format!("Unknown device ({})", self.serial),
            },
        }
    }
}

/// Parse the output of `adb devices -l`.
///
/// The first line is the "List of devices attached" header; every
/// following non-empty line names one device.
pub fn parse_devices(output: &str) -> Vec<Device> {
    let mut devices = Vec::new();

    for line in output.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }

        let serial = parts[0].to_string();
        let state = match parts[1] {
            "device" => DeviceState::Online,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            "bootloader" => DeviceState::Bootloader,
            "recovery" => DeviceState::Recovery,
            _ => DeviceState::Unknown,
        };

        // Parse additional properties
        let mut model = None;
        let mut product = None;
        let mut transport_id = None;

        for part in parts.iter().skip(2) {
            if let Some(value) = part.strip_prefix("model:") {
                model = Some(value.to_string());
            } else if let Some(value) = part.strip_prefix("product:") {
                product = Some(value.to_string());
            } else if let Some(value) = part.strip_prefix("transport_id:") {
                transport_id = value.parse().ok();
            }
        }

        let device_type = if serial.starts_with("emulator-") {
            DeviceType::Emulator
        } else {
            DeviceType::Physical
        };

        devices.push(Device {
            serial,
            state,
            device_type,
            model,
            product,
            transport_id,
        });
    }

    devices
}
