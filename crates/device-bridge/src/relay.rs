//! Port Relays
//!
//! Scoped ownership of ADB port mappings for one launch session.
//! Mappings are established before the app launches and removed when
//! the session ends, whatever way it ends.

use tracing::warn;

use crate::adb::AdbError;
use crate::channel::DeviceChannel;

/// Active port mappings held for a launch session.
///
/// `establish` puts up every requested mapping or none: a failure part
/// way through removes the mappings already made before returning the
/// error. Call [`PortRelays::release`] when the session ends; dropping
/// an unreleased guard only logs, since removal needs the device.
#[must_use = "port relays stay mapped until release is called"]
pub struct PortRelays {
    forwards: Vec<u16>,
    reverses: Vec<u16>,
    released: bool,
}

impl PortRelays {
    /// Map each forward port host-to-device and each reverse port
    /// device-to-host, in caller order, forwards first.
    pub async fn establish<C: DeviceChannel>(
        channel: &C,
        forward_ports: &[u16],
        reverse_ports: &[u16],
    ) -> Result<Self, AdbError> {
        let mut relays = Self {
            forwards: Vec::new(),
            reverses: Vec::new(),
            released: false,
        };

        for &port in forward_ports {
            if let Err(err) = channel.forward(port, port).await {
                relays.release(channel).await;
                return Err(err);
            }
            relays.forwards.push(port);
        }
        for &port in reverse_ports {
            if let Err(err) = channel.reverse(port, port).await {
                relays.release(channel).await;
                return Err(err);
            }
            relays.reverses.push(port);
        }

        Ok(relays)
    }

    /// Remove every mapping this guard holds.
    ///
    /// Removal is best-effort: a failed removal is logged and the
    /// remaining mappings are still attempted. Calling release twice
    /// is a no-op.
    pub async fn release<C: DeviceChannel>(&mut self, channel: &C) {
        if self.released {
            return;
        }
        self.released = true;

        for &port in &self.forwards {
            if let Err(err) = channel.forward_remove(port).await {
                warn!("Failed to remove forwarded port {port}: {err}");
            }
        }
        for &port in &self.reverses {
            if let Err(err) = channel.reverse_remove(port).await {
                warn!("Failed to remove reversed port {port}: {err}");
            }
        }
    }
}

impl Drop for PortRelays {
    fn drop(&mut self) {
        if !self.released && (!self.forwards.is_empty() || !self.reverses.is_empty()) {
            warn!("Port relays dropped without release; mappings may remain on the device");
        }
    }
}
