/// Built-in test programs
///
/// Each program drives one connected hand through one round. The campaign
/// scheduler decides how many rounds run and on which ports.
pub mod aging;
pub mod gesture_stress;
pub mod motor_current;

pub use aging::AgingProgram;
pub use gesture_stress::GestureStressProgram;
pub use motor_current::MotorCurrentProgram;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString};

use crate::core::program::TestProgram;

/// Motor names in motor index order.
pub const MOTOR_NAMES: [&str; crate::api::hand::MAX_MOTOR_CNT] =
    ["thumb", "index", "middle", "third", "little", "thumb_root"];

/// Highest acceptable mean motor current (mA).
pub const CURRENT_STANDARD_MA: u16 = 100;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ProgramKind {
    Aging,
    GestureStress,
    MotorCurrent,
}

impl ProgramKind {
    pub fn summary(self) -> &'static str {
        match self {
            ProgramKind::Aging => {
                "repeat the grasp gesture, sample motor currents and check the fingers"
            }
            ProgramKind::GestureStress => "cycle through 28 gestures, checking the rest pose after each",
            ProgramKind::MotorCurrent => {
                "record start and end currents of every motor, single round"
            }
        }
    }

    /// File name prefix of the per-run log.
    pub fn log_prefix(self) -> &'static str {
        match self {
            ProgramKind::Aging => "AgingTest",
            ProgramKind::GestureStress => "GestureStressTest",
            ProgramKind::MotorCurrent => "MotorCurrentTest",
        }
    }

    pub fn build(self) -> Arc<dyn TestProgram> {
        match self {
            ProgramKind::Aging => Arc::new(AgingProgram::default()),
            ProgramKind::GestureStress => Arc::new(GestureStressProgram::default()),
            ProgramKind::MotorCurrent => Arc::new(MotorCurrentProgram::default()),
        }
    }
}
