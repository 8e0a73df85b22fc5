use serialport::SerialPortInfo;
use std::collections::HashSet;

/// Return the list of available serial ports sorted/deduped for Unix.
pub fn available_ports_sorted() -> Vec<SerialPortInfo> {
    let raw_ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(err) => {
            log::warn!("Serial port enumeration failed: {err}");
            Vec::new()
        }
    };
    sort_and_dedup_ports(raw_ports)
}

/// Drop duplicate device paths (udev and sysfs can both report a port) and
/// order USB adapters before on-board UARTs.
pub(crate) fn sort_and_dedup_ports(raw_ports: Vec<SerialPortInfo>) -> Vec<SerialPortInfo> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut ports: Vec<SerialPortInfo> = raw_ports
        .into_iter()
        .filter(|p| seen.insert(p.port_name.clone()))
        .collect();

    fn priority(name: &str) -> i32 {
        let n = name.to_lowercase();
        if n.contains("ttyusb") || n.contains("usbserial") || n.contains("usbmodem") {
            0
        } else if n.contains("acm") {
            1
        } else if n.contains("ttys") || n.contains("serial") {
            2
        } else {
            10
        }
    }

    ports.sort_by(|a, b| {
        priority(&a.port_name)
            .cmp(&priority(&b.port_name))
            .then_with(|| a.port_name.cmp(&b.port_name))
    });

    ports
}
