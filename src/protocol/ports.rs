use serde::Serialize;
use std::collections::BTreeSet;

use serialport::{SerialPortInfo, SerialPortType};

pub const UNKNOWN: &str = "unknown";

/// One serial device as seen in a single enumeration pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortDescriptor {
    #[serde(rename = "path")]
    pub device_name: String,
    pub description: String,
    #[serde(rename = "vid", skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u16>,
    #[serde(rename = "pid", skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
    #[serde(rename = "serial", skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

impl PortDescriptor {
    /// Descriptor with no metadata, e.g. for virtual devices.
    pub fn bare(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            description: UNKNOWN.to_string(),
            vendor_id: None,
            product_id: None,
            serial_number: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl From<SerialPortInfo> for PortDescriptor {
    fn from(info: SerialPortInfo) -> Self {
        let mut port = Self::bare(info.port_name);
        match info.port_type {
            SerialPortType::UsbPort(usb) => {
                port.description = usb
                    .product
                    .or(usb.manufacturer)
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| "USB serial device".to_string());
                port.vendor_id = Some(usb.vid);
                port.product_id = Some(usb.pid);
                port.serial_number = usb.serial_number;
            }
            SerialPortType::PciPort => port.description = "PCI serial port".to_string(),
            SerialPortType::BluetoothPort => {
                port.description = "Bluetooth serial port".to_string()
            }
            SerialPortType::Unknown => {}
        }
        port
    }
}

/// Difference between two consecutive enumeration passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Selection after the refresh.
    pub selected: Option<String>,
}

/// Keeps the displayed port list and the user's selection across polls.
#[derive(Debug, Default)]
pub struct PortWatcher {
    ports: Vec<PortDescriptor>,
    selected: Option<String>,
}

impl PortWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn contains(&self, device_name: &str) -> bool {
        self.ports.iter().any(|p| p.device_name == device_name)
    }

    /// Select a listed device; unknown names leave the selection unchanged.
    pub fn select(&mut self, device_name: &str) -> bool {
        if self.contains(device_name) {
            self.selected = Some(device_name.to_string());
            true
        } else {
            false
        }
    }

    /// Compare a fresh snapshot with the displayed list. Returns `None` when
    /// the set of device names is unchanged.
    pub fn poll(&mut self, snapshot: Vec<PortDescriptor>) -> Option<PortChange> {
        let before: BTreeSet<&str> = self.ports.iter().map(|p| p.device_name.as_str()).collect();
        let after: BTreeSet<&str> = snapshot.iter().map(|p| p.device_name.as_str()).collect();
        if before == after {
            return None;
        }

        let added = after
            .difference(&before)
            .map(|s| s.to_string())
            .collect::<Vec<_>>();
        let removed = before
            .difference(&after)
            .map(|s| s.to_string())
            .collect::<Vec<_>>();

        let keep = self
            .selected
            .as_deref()
            .filter(|name| after.contains(name))
            .map(str::to_string);
        self.selected = keep.or_else(|| snapshot.first().map(|p| p.device_name.clone()));
        self.ports = snapshot;

        Some(PortChange {
            added,
            removed,
            selected: self.selected.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    fn ports(names: &[&str]) -> Vec<PortDescriptor> {
        names.iter().map(|n| PortDescriptor::bare(*n)).collect()
    }

    #[test]
    fn usb_metadata_is_carried_over() {
        let info = SerialPortInfo {
            port_name: "/dev/ttyUSB0".into(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x10c4,
                pid: 0xea60,
                serial_number: Some("0001".into()),
                manufacturer: Some("Silicon Labs".into()),
                product: None,
            }),
        };
        let port = PortDescriptor::from(info);
        assert_eq!(port.description, "Silicon Labs");
        assert_eq!(port.vendor_id, Some(0x10c4));
        assert_eq!(port.serial_number.as_deref(), Some("0001"));

        let unknown = PortDescriptor::from(SerialPortInfo {
            port_name: "/dev/ttyS0".into(),
            port_type: SerialPortType::Unknown,
        });
        assert_eq!(unknown.description, UNKNOWN);
    }

    #[test]
    fn first_poll_selects_first_port() {
        let mut watcher = PortWatcher::new();
        let change = watcher.poll(ports(&["COM1", "COM3"])).expect("change");
        assert_eq!(change.added, vec!["COM1", "COM3"]);
        assert_eq!(change.selected.as_deref(), Some("COM1"));
        assert!(watcher.poll(ports(&["COM3", "COM1"])).is_none());
    }

    #[test]
    fn selection_survives_refresh_when_still_present() {
        let mut watcher = PortWatcher::new();
        watcher.poll(ports(&["COM1", "COM3"]));
        assert!(watcher.select("COM3"));
        assert!(!watcher.select("COM9"));

        let change = watcher.poll(ports(&["COM1", "COM3", "COM4"])).expect("change");
        assert_eq!(change.added, vec!["COM4"]);
        assert_eq!(change.selected.as_deref(), Some("COM3"));

        let change = watcher.poll(ports(&["COM1"])).expect("change");
        assert_eq!(change.removed, vec!["COM3", "COM4"]);
        assert_eq!(change.selected.as_deref(), Some("COM1"));
    }

    #[test]
    fn empty_snapshots_clear_selection() {
        let mut watcher = PortWatcher::new();
        assert!(watcher.poll(Vec::new()).is_none());
        watcher.poll(ports(&["COM1"]));
        let change = watcher.poll(Vec::new()).expect("change");
        assert_eq!(change.removed, vec!["COM1"]);
        assert_eq!(change.selected, None);
    }
}
