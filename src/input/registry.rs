//! Input device enumeration and filtering.
//!
//! Scans `/dev/input` for event nodes, probes each device's capabilities,
//! and applies the configured name filter. The same filter gates hot-plug
//! attachment, so a blacklisted device never produces events.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use evdev::{AbsoluteAxisCode, Device, KeyCode, RelativeAxisCode};
use log::{debug, warn};

use crate::input::event::{Capabilities, DeviceDescriptor, DeviceId};

const INPUT_DIR: &str = "/dev/input";
const EVENT_NODE_PREFIX: &str = "event";

/// Device-name filter policy.
///
/// A configured whitelist admits exact name matches only and overrides the
/// blacklist. Otherwise names containing any blacklist entry are rejected.
/// With neither configured, every device with a recognized capability is
/// admitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPolicy {
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
}

impl FilterPolicy {
    pub fn admits(&self, name: &str) -> bool {
        if !self.whitelist.is_empty() {
            return self.whitelist.iter().any(|allow| allow == name);
        }
        !self.blacklist.iter().any(|block| name.contains(block.as_str()))
    }
}

/// Event node paths currently present under `/dev/input`.
pub(crate) fn scan_event_nodes() -> HashSet<PathBuf> {
    let mut found = HashSet::new();
    let Ok(entries) = std::fs::read_dir(INPUT_DIR) else {
        return found;
    };
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let is_event_node = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(EVENT_NODE_PREFIX));
        if is_event_node {
            found.insert(path);
        }
    }
    found
}

/// Open and probe one event node.
///
/// Returns `Ok(None)` for devices the filter rejects or whose capabilities
/// this backend does not handle. The device is returned in non-blocking
/// mode, ready for the poll loop.
pub(crate) fn probe(path: &Path, filter: &FilterPolicy) -> io::Result<Option<(Device, DeviceDescriptor)>> {
    let mut device = Device::open(path)?;
    let name = device.name().unwrap_or("Unknown Device").to_string();

    if !filter.admits(&name) {
        debug!("filtered out input device {name:?} at {}", path.display());
        return Ok(None);
    }

    let capabilities = capabilities_of(&device);
    if capabilities.is_empty() {
        debug!("no recognized capability on {name:?} at {}", path.display());
        return Ok(None);
    }

    device.set_nonblocking(true)?;

    let descriptor = DeviceDescriptor {
        path: path.to_path_buf(),
        name,
        capabilities,
        id: identity_of(&device),
    };
    Ok(Some((device, descriptor)))
}

/// Enumerate all admitted devices currently present.
pub(crate) fn enumerate(filter: &FilterPolicy) -> Vec<(Device, DeviceDescriptor)> {
    let mut out = Vec::new();
    let mut paths: Vec<_> = scan_event_nodes().into_iter().collect();
    paths.sort();
    for path in paths {
        match probe(&path, filter) {
            Ok(Some(found)) => out.push(found),
            Ok(None) => {}
            Err(e) => warn!("cannot probe {}: {e}", path.display()),
        }
    }
    out
}

/// Classify a device by its advertised event types.
pub(crate) fn capabilities_of(device: &Device) -> Capabilities {
    let mut caps = Capabilities::empty();

    let abs = device.supported_absolute_axes();
    if abs.is_some_and(|axes| {
        axes.contains(AbsoluteAxisCode::ABS_MT_POSITION_X) || axes.contains(AbsoluteAxisCode::ABS_X)
    }) {
        caps |= Capabilities::TOUCH;
    }

    let has_rel = device
        .supported_relative_axes()
        .is_some_and(|axes| axes.contains(RelativeAxisCode::REL_X));
    let has_button = device
        .supported_keys()
        .is_some_and(|keys| keys.contains(KeyCode::BTN_LEFT));
    if has_rel && has_button {
        caps |= Capabilities::POINTER;
    }

    if device.supported_keys().is_some_and(|keys| {
        keys.contains(KeyCode::KEY_A) && keys.contains(KeyCode::KEY_ENTER)
    }) {
        caps |= Capabilities::KEYBOARD;
    }

    caps
}

fn identity_of(device: &Device) -> DeviceId {
    let id = device.input_id();
    DeviceId {
        bus: id.bus_type().0,
        vendor: id.vendor(),
        product: id.product(),
        version: id.version(),
        name: device.name().unwrap_or("Unknown Device").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitelist_admits_exact_matches_only() {
        let filter = FilterPolicy {
            whitelist: vec!["Goodix Capacitive TouchScreen".into()],
            blacklist: vec![],
        };
        assert!(filter.admits("Goodix Capacitive TouchScreen"));
        assert!(!filter.admits("Generic Mouse"));
        // Substrings are not exact matches.
        assert!(!filter.admits("Goodix"));
    }

    #[test]
    fn test_blacklist_excludes_matching_names() {
        let filter = FilterPolicy {
            whitelist: vec![],
            blacklist: vec!["Virtual".into()],
        };
        assert!(!filter.admits("Virtual Keyboard"));
        assert!(filter.admits("AT Translated Set 2 keyboard"));
    }

    #[test]
    fn test_whitelist_overrides_blacklist() {
        let filter = FilterPolicy {
            whitelist: vec!["Virtual Keyboard".into()],
            blacklist: vec!["Virtual".into()],
        };
        assert!(filter.admits("Virtual Keyboard"));
        assert!(!filter.admits("Other Device"));
    }

    #[test]
    fn test_empty_filter_admits_everything() {
        let filter = FilterPolicy::default();
        assert!(filter.admits("anything at all"));
    }
}
