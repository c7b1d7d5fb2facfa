//! Device identification type.

use std::sync::Arc;

/// Stable identifier for a capture device.
///
/// For the CPAL backend this is the device name reported by the host, which
/// is the only identity CPAL offers that survives re-enumeration. It uses
/// `Arc<str>` internally, so cloning is a pointer copy.
///
/// # Example
///
/// ```
/// use omega_audio::DeviceId;
///
/// let mic = DeviceId::new("USB Mic");
/// let line = DeviceId::new("Line In");
///
/// assert_ne!(mic, line);
/// assert_eq!(mic, DeviceId::new("USB Mic"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    /// Creates a device id from a string.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
