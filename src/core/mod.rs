/// Test engine
///
/// Everything between the device API and the command line: sessions,
/// gestures, verification, current sampling, the per-port worker, the round
/// scheduler and the records it produces.
pub mod control;
pub mod gesture;
pub mod port;
pub mod program;
pub mod quarantine;
pub mod report;
pub mod sampler;
pub mod scheduler;
pub mod session;
pub mod task_manager;
pub mod timing;
pub mod verifier;
pub mod worker;

// Re-export commonly used types
pub use control::{
    AnyControl, ControlChannel, ControlSignal, FileControlChannel, NeverControl, SharedControl,
};
pub use gesture::{Gesture, GestureExecutor, GestureProgram, Pose, StatusPolicy};
pub use port::PortId;
pub use program::{PortContext, RunSettings, TestProgram};
pub use quarantine::QuarantineRegistry;
pub use report::{CampaignReport, GestureResult, PortResult, StopReason, Verdict};
pub use scheduler::{Campaign, CampaignConfig, QuarantinePolicy};
pub use session::DeviceSession;
pub use timing::Timing;
pub use verifier::{Health, ToleranceConfig, ToleranceVerifier};
pub use worker::{PhaseTrace, PortOutcome, WorkerPhase};
