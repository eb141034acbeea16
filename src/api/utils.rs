use anyhow::{anyhow, Result};
use std::time::Duration;

/// Open a serial device with the requested timeout, enabling exclusive access on Unix systems.
///
/// Two test runs sharing one CAN dongle would interleave each other's frames,
/// so the device is locked for the lifetime of the handle.
pub fn open_serial_port(
    path: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn serialport::SerialPort>> {
    if path.trim().is_empty() {
        return Err(anyhow!("Serial device path is empty"));
    }

    let builder = serialport::new(path, baud_rate).timeout(timeout);

    #[cfg(unix)]
    {
        let mut handle = builder
            .open_native()
            .map_err(|err| anyhow!("Failed to open {path}: {err}"))?;
        handle
            .set_exclusive(true)
            .map_err(|err| anyhow!("Failed to acquire exclusive access to {path}: {err}"))?;
        Ok(Box::new(handle))
    }

    #[cfg(not(unix))]
    {
        builder
            .open()
            .map_err(|err| anyhow!("Failed to open {path}: {err}"))
    }
}
