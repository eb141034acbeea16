//! CAN transport plumbing
//!
//! The hand firmware speaks a byte-stream protocol that is carried over classic
//! CAN frames. This module only deals with the transport side: moving raw frames
//! in and out of an adapter and cutting/reassembling the byte stream. What the
//! bytes mean is decided by a `HandProtocol` codec (see `api::hand::framed`).

pub mod framing;
pub mod slcan;
pub mod virtual_bus;

use anyhow::{anyhow, Result};
use std::{fmt, time::Duration};

pub use framing::{split_into_frames, InboundFilter, MAX_FRAME_PAYLOAD};
pub use slcan::SlcanBus;
pub use virtual_bus::VirtualCanBus;

/// Bus identifier used by the test controller itself.
pub const ADDRESS_MASTER: u32 = 0x01;

/// Receive poll timeout. Kept short so a pending receive never stalls a round.
pub const RECV_POLL_TIMEOUT: Duration = Duration::from_millis(5);

/// Bitrates accepted by the hand firmware.
pub const SUPPORTED_BITRATES: [u32; 3] = [250_000, 500_000, 1_000_000];

/// Default bitrate used by every test program.
pub const DEFAULT_BITRATE: u32 = 1_000_000;

/// A classic (non-FD) CAN frame with a standard identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    id: u32,
    len: u8,
    data: [u8; MAX_FRAME_PAYLOAD],
}

impl CanFrame {
    /// Build a frame. Payloads longer than 8 bytes are rejected.
    pub fn new(id: u32, payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(anyhow!(
                "CAN payload of {} bytes exceeds the {MAX_FRAME_PAYLOAD}-byte frame limit",
                payload.len()
            ));
        }
        if id > 0x7FF {
            return Err(anyhow!("Identifier 0x{id:X} is not a standard 11-bit id"));
        }

        let mut data = [0u8; MAX_FRAME_PAYLOAD];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            len: payload.len() as u8,
            data,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID=0x{:03X}, LEN={}, DATA=", self.id, self.len)?;
        for byte in self.payload() {
            write!(f, "{byte:02X} ")?;
        }
        Ok(())
    }
}

/// A CAN adapter that can send and (with a timeout) receive frames.
///
/// Implementations own the underlying device handle; `shutdown` must release it
/// and must be safe to call more than once.
pub trait CanBus: Send {
    fn send(&mut self, frame: &CanFrame) -> Result<()>;

    /// Wait at most `timeout` for the next frame. `Ok(None)` means nothing arrived.
    fn recv(&mut self, timeout: Duration) -> Result<Option<CanFrame>>;

    fn shutdown(&mut self) -> Result<()>;
}

/// Validate a bitrate against the set supported by the firmware.
pub fn validate_bitrate(bitrate: u32) -> Result<u32> {
    if SUPPORTED_BITRATES.contains(&bitrate) {
        Ok(bitrate)
    } else {
        Err(anyhow!(
            "Unsupported bitrate {bitrate}, expected one of 250000, 500000 or 1000000"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_oversized_payload() {
        assert!(CanFrame::new(0x02, &[0u8; 9]).is_err());
        assert!(CanFrame::new(0x800, &[1]).is_err());

        let frame = CanFrame::new(0x02, &[0xAA, 0xBB]).unwrap();
        assert_eq!(frame.payload(), &[0xAA, 0xBB]);
        assert_eq!(frame.to_string(), "ID=0x002, LEN=2, DATA=AA BB ");
    }

    #[test]
    fn test_validate_bitrate() {
        assert!(validate_bitrate(1_000_000).is_ok());
        assert!(validate_bitrate(500_000).is_ok());
        assert!(validate_bitrate(125_000).is_err());
    }
}
