//! Domain types for device events.
//!
//! Everything here is plain data: created per kernel notification or per
//! probed device, consumed by the hook invoker and the client broadcast,
//! never persisted.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Event name the kernel reports for a newly attached device. The startup
/// probe reuses it for devices that were already present.
pub const ATTACH_EVENT: &str = "device-attach";

/// Event name the kernel reports when a device goes away.
pub const DETACH_EVENT: &str = "device-detach";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Autoconfiguration name of a device, e.g. `wd0` or `atabus0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceName(pub String);

impl DeviceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DeviceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for DeviceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One attach/detach notification.
///
/// `parent` is empty for devices hanging directly off the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub event: String,
    pub device: DeviceName,
    #[serde(default)]
    pub parent: DeviceName,
}

impl DeviceEvent {
    pub fn new(
        event: impl Into<String>,
        device: impl Into<DeviceName>,
        parent: impl Into<DeviceName>,
    ) -> Self {
        Self {
            event: event.into(),
            device: device.into(),
            parent: parent.into(),
        }
    }
}

impl fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "event='{}', device='{}', parent='{}'",
            self.event, self.device, self.parent
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(DeviceName::from("wd0").to_string(), "wd0");
        assert_eq!(DeviceName::from(String::from("sd1")).as_str(), "sd1");
    }

    #[test]
    fn event_display_matches_log_format() {
        let event = DeviceEvent::new(ATTACH_EVENT, "wd0", "atabus0");
        assert_eq!(
            event.to_string(),
            "event='device-attach', device='wd0', parent='atabus0'"
        );
    }
}
