//! Device capability snapshots and snapshot diffs.

use std::fmt;

use super::DeviceId;

/// Capabilities of one audio device at enumeration time.
///
/// Descriptors are immutable snapshots. Re-enumerating the catalog produces
/// new descriptors; previously issued ones never change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Stable identifier, used to open the device.
    pub id: DeviceId,
    /// Human-readable device name.
    pub name: String,
    /// Maximum channel count across input and output.
    pub channels: u16,
    /// Supported sample rates in Hz.
    pub sample_rates: Vec<u32>,
    /// The device can capture.
    pub is_input: bool,
    /// The device can play back.
    pub is_output: bool,
    /// The device is the system default for at least one direction.
    pub is_default: bool,
}

impl DeviceDescriptor {
    /// Returns `true` if the device advertises `sample_rate`.
    pub fn supports_rate(&self, sample_rate: u32) -> bool {
        self.sample_rates.contains(&sample_rate)
    }

    /// Returns `true` for PipeWire or JACK virtual devices.
    pub fn is_graph_device(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        name.contains("pipewire") || name.contains("jack")
    }

    fn direction(&self) -> &'static str {
        match (self.is_input, self.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            (false, false) => "Inactive",
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {}ch, ", self.name, self.direction(), self.channels)?;
        match (self.sample_rates.iter().min(), self.sample_rates.iter().max()) {
            (Some(low), Some(high)) if low == high => write!(f, "{low}Hz)")?,
            (Some(low), Some(high)) => write!(f, "{low}-{high}Hz)")?,
            _ => f.write_str("no rates)")?,
        }
        if self.is_default {
            f.write_str(" [DEFAULT]")?;
        }
        Ok(())
    }
}

/// Difference between two catalog snapshots.
///
/// Used to detect hot-plugged and removed devices without touching the
/// audio stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceChanges {
    /// Devices present now but not before.
    pub added: Vec<DeviceDescriptor>,
    /// Devices present before but not now.
    pub removed: Vec<DeviceDescriptor>,
    /// Devices present in both snapshots whose capabilities changed.
    pub changed: Vec<DeviceDescriptor>,
}

impl DeviceChanges {
    /// Diffs `previous` against `current`, matching devices by id.
    pub fn between(previous: &[DeviceDescriptor], current: &[DeviceDescriptor]) -> Self {
        let mut changes = Self::default();

        for device in current {
            match previous.iter().find(|d| d.id == device.id) {
                None => changes.added.push(device.clone()),
                Some(old) if old != device => changes.changed.push(device.clone()),
                Some(_) => {}
            }
        }

        changes.removed = previous
            .iter()
            .filter(|old| !current.iter().any(|d| d.id == old.id))
            .cloned()
            .collect();

        changes
    }

    /// Returns `true` if the snapshots are equivalent.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, is_default: bool) -> DeviceDescriptor {
        DeviceDescriptor {
            id: DeviceId::new(name),
            name: name.to_string(),
            channels: 2,
            sample_rates: vec![44100, 48000],
            is_input: true,
            is_output: false,
            is_default,
        }
    }

    #[test]
    fn test_display() {
        let mic = descriptor("USB Mic", true);
        assert_eq!(mic.to_string(), "USB Mic (Input, 2ch, 44100-48000Hz) [DEFAULT]");

        let mut speakers = descriptor("Speakers", false);
        speakers.is_input = false;
        speakers.is_output = true;
        speakers.sample_rates = vec![48000];
        assert_eq!(speakers.to_string(), "Speakers (Output, 2ch, 48000Hz)");
    }

    #[test]
    fn test_supports_rate() {
        let mic = descriptor("USB Mic", false);
        assert!(mic.supports_rate(48000));
        assert!(!mic.supports_rate(96000));

        let mut unsorted = descriptor("Interface", false);
        unsorted.sample_rates = vec![96000, 44100, 48000];
        assert!(unsorted.supports_rate(44100));
        assert!(unsorted.supports_rate(96000));
        assert_eq!(unsorted.to_string(), "Interface (Input, 2ch, 44100-96000Hz)");
    }

    #[test]
    fn test_graph_device() {
        assert!(descriptor("PipeWire Sound Server", false).is_graph_device());
        assert!(descriptor("jack", false).is_graph_device());
        assert!(!descriptor("HDA Intel PCH", false).is_graph_device());
    }

    #[test]
    fn test_changes_between_identical_snapshots() {
        let snapshot = vec![descriptor("a", true), descriptor("b", false)];
        assert!(DeviceChanges::between(&snapshot, &snapshot).is_empty());
    }

    #[test]
    fn test_changes_detects_hotplug() {
        let before = vec![descriptor("a", true), descriptor("b", false)];
        let mut after = vec![descriptor("a", false), descriptor("c", false)];
        after[0].is_default = false;

        let changes = DeviceChanges::between(&before, &after);
        assert_eq!(changes.added, vec![descriptor("c", false)]);
        assert_eq!(changes.removed, vec![descriptor("b", false)]);
        assert_eq!(changes.changed.len(), 1);
        assert_eq!(changes.changed[0].id.as_str(), "a");
    }
}
