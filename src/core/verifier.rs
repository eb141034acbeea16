use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{gesture::Pose, session::DeviceSession, timing::settle};
use crate::api::hand::{HandError, MAX_MOTOR_CNT};

/// Maximum position loss tolerated on a finger.
pub const POS_MAX_LOSS: u16 = 200;

/// Thumb-root floor: the lowest position the last motor can reach.
pub const SIXTH_FINGER_MIN_POS: u16 = 728;

/// Tolerance settings as they appear in a campaign file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    pub window: u16,
    pub thumb_root_floor: u16,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            window: POS_MAX_LOSS,
            thumb_root_floor: SIXTH_FINGER_MIN_POS,
        }
    }
}

impl ToleranceConfig {
    pub fn verifier(&self, settle: Duration) -> ToleranceVerifier {
        ToleranceVerifier::standard(self.window, self.thumb_root_floor, settle)
    }
}

/// Tolerance for a single motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToleranceRule {
    pub window: u16,
    /// When the reference is below this floor the motor must read back exactly the floor.
    #[serde(default)]
    pub clamp: Option<u16>,
}

impl ToleranceRule {
    pub fn window(window: u16) -> Self {
        Self {
            window,
            clamp: None,
        }
    }

    pub fn with_clamp(mut self, floor: u16) -> Self {
        self.clamp = Some(floor);
        self
    }
}

/// Whether `observed` is acceptable for `reference` under `rule`.
pub fn check_actuator(rule: &ToleranceRule, reference: u16, observed: u16) -> bool {
    match rule.clamp {
        Some(floor) if reference < floor => observed == floor,
        _ => reference.abs_diff(observed) < rule.window,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Broken {
        actuator: u8,
        expected: u16,
        observed: u16,
    },
}

impl Health {
    pub fn is_broken(&self) -> bool {
        matches!(self, Health::Broken { .. })
    }

    pub fn into_error(self) -> Option<HandError> {
        match self {
            Health::Healthy => None,
            Health::Broken {
                actuator,
                expected,
                observed,
            } => Some(HandError::Verification {
                finger: actuator,
                expected,
                observed,
            }),
        }
    }
}

/// Decides whether a hand is mechanically broken by comparing readback
/// positions with a reference pose.
#[derive(Debug, Clone)]
pub struct ToleranceVerifier {
    rules: Vec<ToleranceRule>,
    settle: Duration,
}

impl ToleranceVerifier {
    pub fn new(rules: Vec<ToleranceRule>, settle: Duration) -> Self {
        Self { rules, settle }
    }

    /// Rules of a six-motor hand: window `window` everywhere, thumb root clamped at `floor`.
    pub fn standard(window: u16, floor: u16, settle: Duration) -> Self {
        let mut rules = vec![ToleranceRule::window(window); MAX_MOTOR_CNT];
        rules[MAX_MOTOR_CNT - 1] = ToleranceRule::window(window).with_clamp(floor);
        Self::new(rules, settle)
    }

    pub fn ohand_default(settle: Duration) -> Self {
        Self::standard(POS_MAX_LOSS, SIXTH_FINGER_MIN_POS, settle)
    }

    pub fn rules(&self) -> &[ToleranceRule] {
        &self.rules
    }

    /// Read every motor back and compare it with `reference`.
    ///
    /// A motor that cannot be read is skipped. The first motor out of
    /// tolerance ends the check.
    pub fn judge_broken(
        &self,
        session: &mut DeviceSession,
        reference: &Pose,
    ) -> Result<Health, HandError> {
        settle(self.settle);

        let node_id = session.node_id();
        let port = session.port().clone();
        let link = session.link()?;

        for (idx, rule) in self.rules.iter().enumerate() {
            let Some(expected) = reference.position(idx) else {
                break;
            };
            let finger = idx as u8;

            let reply = link.get_finger_pos(node_id, finger);
            if !reply.is_success() {
                let err = HandError::Read {
                    finger,
                    status: reply.status,
                };
                log::warn!("[port = {port}] {err}, not judged");
                continue;
            }
            let observed = reply.value.current;
            log::debug!(
                "[port = {port}] finger {finger}: target {}, current {observed}",
                reply.value.target
            );

            if !check_actuator(rule, expected, observed) {
                log::debug!(
                    "[port = {port}] finger {finger} out of tolerance: expected {expected}, observed {observed}"
                );
                return Ok(Health::Broken {
                    actuator: finger,
                    expected,
                    observed,
                });
            }
        }

        Ok(Health::Healthy)
    }
}
