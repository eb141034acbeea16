/// Gestures and the executor that drives a session through them
///
/// A pose is one (position, speed) target per motor; a gesture is a short,
/// ordered list of poses (for example "open" then "close"); a gesture program
/// is a named list of gestures plus the rest pose the hand returns to for
/// verification.
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{session::DeviceSession, timing::settle};
use crate::api::hand::{HandError, HAND_RESP_SUCCESS, MAX_MOTOR_CNT};

/// Speed used by every test program.
pub const DEFAULT_SPEED: u16 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorTarget {
    pub position: u16,
    pub speed: u16,
}

/// Target state for every motor of the hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pose {
    pub targets: Vec<ActuatorTarget>,
}

impl Pose {
    /// All motors at `DEFAULT_SPEED`.
    pub fn from_positions(positions: [u16; MAX_MOTOR_CNT]) -> Self {
        Self::with_speed(positions, DEFAULT_SPEED)
    }

    pub fn with_speed(positions: [u16; MAX_MOTOR_CNT], speed: u16) -> Self {
        Self {
            targets: positions
                .iter()
                .map(|&position| ActuatorTarget { position, speed })
                .collect(),
        }
    }

    pub fn position(&self, finger: usize) -> Option<u16> {
        self.targets.get(finger).map(|t| t.position)
    }

    pub fn positions(&self) -> Vec<u16> {
        self.targets.iter().map(|t| t.position).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gesture {
    pub name: String,
    pub phases: Vec<Pose>,
}

impl Gesture {
    pub fn new(name: impl Into<String>, phases: Vec<Pose>) -> Self {
        Self {
            name: name.into(),
            phases,
        }
    }

    /// Two-phase gesture from raw positions.
    pub fn two_phase(
        name: impl Into<String>,
        first: [u16; MAX_MOTOR_CNT],
        second: [u16; MAX_MOTOR_CNT],
    ) -> Self {
        Self::new(
            name,
            vec![Pose::from_positions(first), Pose::from_positions(second)],
        )
    }

    /// The pose the hand ends up in.
    pub fn final_pose(&self) -> Option<&Pose> {
        self.phases.last()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureProgram {
    pub name: String,
    pub gestures: Vec<Gesture>,
    pub rest: Pose,
}

/// Which command statuses decide whether a pose was accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPolicy {
    /// Only the status of the final motor command counts. Earlier failures are
    /// logged but do not fail the pose.
    #[default]
    LastCommand,
    /// Stop at, and fail on, the first rejected command.
    EveryCommand,
}

/// Drives a session through poses and gestures.
#[derive(Debug, Clone)]
pub struct GestureExecutor {
    settle: Duration,
    policy: StatusPolicy,
}

impl GestureExecutor {
    pub fn new(settle: Duration, policy: StatusPolicy) -> Self {
        Self { settle, policy }
    }

    pub fn policy(&self) -> StatusPolicy {
        self.policy
    }

    /// Send one pose, motor by motor in index order.
    pub fn run_pose(&self, session: &mut DeviceSession, pose: &Pose) -> Result<(), HandError> {
        settle(self.settle);

        let node_id = session.node_id();
        let port = session.port().clone();
        let link = session.link()?;

        let mut last = None;
        for (finger, target) in pose.targets.iter().enumerate() {
            let finger = finger as u8;
            let status = link.set_finger_pos(node_id, finger, target.position, target.speed);
            if status != HAND_RESP_SUCCESS {
                match self.policy {
                    StatusPolicy::EveryCommand => {
                        return Err(HandError::Command { finger, status });
                    }
                    StatusPolicy::LastCommand => log::warn!(
                        "[port = {port}] finger {finger} rejected position {} with status {status}",
                        target.position
                    ),
                }
            }
            last = Some((finger, status));
        }

        match last {
            Some((finger, status)) if status != HAND_RESP_SUCCESS => {
                Err(HandError::Command { finger, status })
            }
            _ => Ok(()),
        }
    }

    /// Run every phase of a gesture; the first failing phase aborts the rest.
    pub fn run_gesture(
        &self,
        session: &mut DeviceSession,
        gesture: &Gesture,
    ) -> Result<(), HandError> {
        for (index, phase) in gesture.phases.iter().enumerate() {
            if let Err(err) = self.run_pose(session, phase) {
                log::warn!(
                    "[port = {}] gesture '{}' aborted at phase {}: {err}",
                    session.port(),
                    gesture.name,
                    index + 1
                );
                return Err(err);
            }
        }
        Ok(())
    }
}
