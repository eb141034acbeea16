use std::fmt;

use super::traits::StatusCode;

/// Failures a hand session can run into.
///
/// Each variant carries its own containment rule: connection errors surface as
/// a single failing result for the round, command errors abort the current
/// gesture, read errors are skipped, verification failures mark the unit broken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandError {
    /// The session could not be opened or configured.
    Connection { port: String, reason: String },
    /// A command was answered with a non-success status.
    Command { finger: u8, status: StatusCode },
    /// A readback was answered with a non-success status.
    Read { finger: u8, status: StatusCode },
    /// Observed state is outside tolerance.
    Verification {
        finger: u8,
        expected: u16,
        observed: u16,
    },
    /// The session was used after `close()`.
    SessionClosed { port: String },
}

impl HandError {
    pub fn is_connection(&self) -> bool {
        matches!(self, HandError::Connection { .. })
    }
}

impl fmt::Display for HandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandError::Connection { port, reason } => {
                write!(f, "connection to {port} failed: {reason}")
            }
            HandError::Command { finger, status } => {
                write!(f, "command to finger {finger} failed with status {status}")
            }
            HandError::Read { finger, status } => {
                write!(f, "readback of finger {finger} failed with status {status}")
            }
            HandError::Verification {
                finger,
                expected,
                observed,
            } => write!(
                f,
                "finger {finger} out of tolerance: expected {expected}, observed {observed}"
            ),
            HandError::SessionClosed { port } => write!(f, "session for {port} is closed"),
        }
    }
}

impl std::error::Error for HandError {}
