/// Serial-line CAN (slcan / Lawicel) adapter
///
/// Most USB-CAN dongles on the bench expose the Lawicel ASCII protocol over a
/// virtual serial port. A standard data frame looks like `t0028AABBCCDDEEFF0011\r`:
/// `t`, three hex digits of identifier, one digit of length, then the payload
/// in hex. The adapter answers commands with `\r` (ok) or BEL (error) and
/// acknowledges transmissions with `z\r`.
use anyhow::{anyhow, Context, Result};
use std::{
    io::{ErrorKind, Read, Write},
    time::{Duration, Instant},
};

use super::{validate_bitrate, CanBus, CanFrame, MAX_FRAME_PAYLOAD, RECV_POLL_TIMEOUT};
use crate::api::utils::open_serial_port;

/// Line speed between host and dongle; the CAN bitrate is configured separately.
const SLCAN_SERIAL_BAUD: u32 = 115_200;

const BELL: u8 = 0x07;

/// Map a CAN bitrate onto the slcan `Sn` setup command.
pub fn bitrate_command(bitrate: u32) -> Result<&'static str> {
    match validate_bitrate(bitrate)? {
        250_000 => Ok("S5"),
        500_000 => Ok("S6"),
        _ => Ok("S8"),
    }
}

/// Encode a frame into its slcan text form, terminator included.
pub fn encode_frame(frame: &CanFrame) -> Vec<u8> {
    let mut line = format!("t{:03X}{}", frame.id(), frame.payload().len());
    for byte in frame.payload() {
        line.push_str(&format!("{byte:02X}"));
    }
    line.push('\r');
    line.into_bytes()
}

/// Decode one slcan line (terminator stripped).
///
/// Only standard data frames are of interest; acknowledgements, status replies
/// and extended frames yield `None`.
pub fn decode_line(line: &[u8]) -> Option<CanFrame> {
    // byte-indexed slicing below needs single-byte chars
    if !line.is_ascii() {
        return None;
    }
    let text = std::str::from_utf8(line).ok()?;
    let body = text.strip_prefix('t')?;
    if body.len() < 4 {
        return None;
    }

    let id = u32::from_str_radix(&body[..3], 16).ok()?;
    let len = body[3..4].parse::<usize>().ok()?;
    if len > MAX_FRAME_PAYLOAD || body.len() < 4 + len * 2 {
        return None;
    }

    let mut payload = Vec::with_capacity(len);
    for i in 0..len {
        let start = 4 + i * 2;
        payload.push(u8::from_str_radix(&body[start..start + 2], 16).ok()?);
    }
    CanFrame::new(id, &payload).ok()
}

/// slcan adapter bound to one serial device.
pub struct SlcanBus {
    path: String,
    port: Option<Box<dyn serialport::SerialPort>>,
    pending: Vec<u8>,
}

impl SlcanBus {
    /// Open the dongle at `path` and bring the CAN channel up at `bitrate`.
    pub fn open(path: &str, bitrate: u32) -> Result<Self> {
        let setup = bitrate_command(bitrate)?;
        let port = open_serial_port(path, SLCAN_SERIAL_BAUD, RECV_POLL_TIMEOUT)?;

        let mut bus = Self {
            path: path.to_string(),
            port: Some(port),
            pending: Vec::new(),
        };
        // A dongle left open by a crashed run refuses `Sn`, so close it first.
        bus.write_command("C")?;
        bus.write_command(setup)?;
        bus.write_command("O")?;

        log::info!("CAN bus initialised: device={path}, bitrate={bitrate}");
        Ok(bus)
    }

    fn port(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        let path = &self.path;
        self.port
            .as_mut()
            .ok_or_else(|| anyhow!("CAN bus {path} is already shut down"))
    }

    fn write_command(&mut self, command: &str) -> Result<()> {
        let path = self.path.clone();
        let port = self.port()?;
        port.write_all(command.as_bytes())
            .and_then(|_| port.write_all(b"\r"))
            .and_then(|_| port.flush())
            .with_context(|| format!("Failed to send slcan command {command} to {path}"))
    }

    /// Pop the next complete data frame out of the receive buffer.
    fn take_buffered_frame(&mut self) -> Option<CanFrame> {
        while let Some(end) = self
            .pending
            .iter()
            .position(|&b| b == b'\r' || b == BELL)
        {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            if line[end] == BELL {
                log::warn!("slcan adapter {} reported an error", self.path);
                continue;
            }
            if let Some(frame) = decode_line(&line[..end]) {
                return Some(frame);
            }
        }
        None
    }
}

impl CanBus for SlcanBus {
    fn send(&mut self, frame: &CanFrame) -> Result<()> {
        let encoded = encode_frame(frame);
        let path = self.path.clone();
        let port = self.port()?;
        port.write_all(&encoded)
            .and_then(|_| port.flush())
            .with_context(|| format!("CAN send failed on {path}"))
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<CanFrame>> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 64];

        loop {
            if let Some(frame) = self.take_buffered_frame() {
                return Ok(Some(frame));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let path = self.path.clone();
            let port = self.port()?;
            port.set_timeout(deadline - now)?;
            match port.read(&mut chunk) {
                Ok(0) => {}
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::TimedOut => {}
                Err(err) => return Err(anyhow!("CAN receive failed on {path}: {err}")),
            }
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.port.is_none() {
            return Ok(());
        }
        let result = self.write_command("C");
        self.port = None;
        self.pending.clear();
        log::info!("CAN bus {} closed", self.path);
        result
    }
}

impl Drop for SlcanBus {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("Error closing CAN bus {}: {err}", self.path);
        }
    }
}
