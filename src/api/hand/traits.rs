/// Device API surface consumed by the test engine
///
/// These traits describe a hand as a request/response device without saying
/// anything about how requests travel. The engine only ever sees status codes:
/// `HAND_RESP_SUCCESS` means the command went through, every other value is a
/// failure and is treated uniformly.
use anyhow::Result;

use crate::core::port::PortId;

/// Status code returned by every device command.
pub type StatusCode = u8;

/// The one status value that means success.
pub const HAND_RESP_SUCCESS: StatusCode = 0;

/// Status reported when a command got no complete answer before its timeout.
pub const HAND_RESP_TIMEOUT: StatusCode = 0xFE;

/// Number of motors (actuators) on one hand.
pub const MAX_MOTOR_CNT: usize = 6;

/// Device-side command timeout applied when a session is configured.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u16 = 255;

/// A status code plus the value that came back with it.
///
/// The value is only meaningful when the status is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply<T> {
    pub status: StatusCode,
    pub value: T,
}

impl<T> Reply<T> {
    pub fn success(value: T) -> Self {
        Self {
            status: HAND_RESP_SUCCESS,
            value,
        }
    }

    pub fn failure(status: StatusCode, value: T) -> Self {
        Self { status, value }
    }

    pub fn is_success(&self) -> bool {
        self.status == HAND_RESP_SUCCESS
    }

    /// The value, when the status says it can be trusted.
    pub fn ok(self) -> Option<T> {
        self.is_success().then_some(self.value)
    }
}

/// Logical position of one finger: where it was told to go and where it is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FingerPosition {
    pub target: u16,
    pub current: u16,
}

/// An open connection to one hand.
///
/// A link is owned by exactly one session and is never shared between threads;
/// `Send` is required so the session can move onto a worker thread.
pub trait HandLink: Send {
    /// Set the device-side timeout applied to every later command.
    fn set_command_timeout(&mut self, timeout_ms: u16) -> StatusCode;

    /// Command one finger to a position at a given speed.
    fn set_finger_pos(&mut self, node_id: u8, finger_id: u8, position: u16, speed: u16)
        -> StatusCode;

    /// Read back target and current logical position of one finger.
    fn get_finger_pos(&mut self, node_id: u8, finger_id: u8) -> Reply<FingerPosition>;

    /// Read the motor current of one finger, in mA.
    fn get_finger_current(&mut self, node_id: u8, finger_id: u8) -> Reply<u16>;

    /// Set the motor current limit of one finger, in mA.
    fn set_finger_current_limit(&mut self, node_id: u8, finger_id: u8, limit_ma: u16)
        -> StatusCode;

    /// Release the device handle and the bus beneath it. Must be idempotent.
    fn shutdown(&mut self) -> Result<()>;
}

/// Factory that connects to the hand behind a port.
pub trait HandDriver: Send + Sync {
    fn connect(&self, port: &PortId) -> Result<Box<dyn HandLink>>;
}
