// Platform-dispatched port enumeration

#[cfg(unix)]
mod tty_unix;
#[cfg(unix)]
pub use tty_unix::available_ports_sorted;

// Other platforms: names are already unique (COMx), only order them.
#[cfg(not(unix))]
pub fn available_ports_sorted() -> Vec<serialport::SerialPortInfo> {
    let mut ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(err) => {
            log::warn!("Serial port enumeration failed: {err}");
            Vec::new()
        }
    };
    ports.sort_by(|a, b| a.port_name.cmp(&b.port_name));
    ports.dedup_by(|a, b| a.port_name == b.port_name);
    ports
}
