pub mod error;
pub mod framed;
pub mod simulated;
pub mod traits;

pub use error::HandError;
pub use framed::{
    CanHandDriver, CanHandLink, HandProtocol, HandRequest, HandResponse, ProtocolFactory,
};
pub use simulated::{SimulatedDriver, SimulatedHandSpec, SimulatedStats};
pub use traits::{
    FingerPosition, HandDriver, HandLink, Reply, StatusCode, DEFAULT_COMMAND_TIMEOUT_MS,
    HAND_RESP_SUCCESS, HAND_RESP_TIMEOUT, MAX_MOTOR_CNT,
};
