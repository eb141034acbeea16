/// Simulated hand fleet
///
/// Stands in for real hardware: each port gets a hand that tracks commanded
/// positions, clamps the thumb-root motor the way the firmware does and reports
/// fixed motor currents. Faults (refused connections, offset fingers, failing
/// reads, rejected commands) are injected per port through `SimulatedHandSpec`.
use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};

use super::traits::{
    FingerPosition, HandDriver, HandLink, Reply, StatusCode, HAND_RESP_SUCCESS, MAX_MOTOR_CNT,
};
use crate::core::port::PortId;

/// Status the simulator answers with when a fault is injected.
pub const SIM_FAULT_STATUS: StatusCode = 0x03;

/// Lowest position the thumb-root motor can physically reach.
pub const SIM_THUMB_ROOT_FLOOR: u16 = 728;

/// Behaviour of one simulated hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedHandSpec {
    /// Refuse every connection attempt.
    pub connect_fails: bool,
    /// Added to every position readback, per finger.
    pub position_offsets: [i32; MAX_MOTOR_CNT],
    /// Motor current reported by every current read, per finger (mA).
    pub currents_ma: [u16; MAX_MOTOR_CNT],
    /// Fingers whose position and current reads always fail.
    pub failing_reads: Vec<u8>,
    /// Fingers whose position commands are always rejected.
    pub rejected_commands: Vec<u8>,
}

impl Default for SimulatedHandSpec {
    fn default() -> Self {
        Self {
            connect_fails: false,
            position_offsets: [0; MAX_MOTOR_CNT],
            currents_ma: [40; MAX_MOTOR_CNT],
            failing_reads: Vec::new(),
            rejected_commands: Vec::new(),
        }
    }
}

impl SimulatedHandSpec {
    pub fn unreachable() -> Self {
        Self {
            connect_fails: true,
            ..Self::default()
        }
    }

    /// A hand whose `finger` never lands where it is sent.
    pub fn with_offset(mut self, finger: u8, offset: i32) -> Self {
        if let Some(slot) = self.position_offsets.get_mut(finger as usize) {
            *slot = offset;
        }
        self
    }

    pub fn with_currents(mut self, currents_ma: [u16; MAX_MOTOR_CNT]) -> Self {
        self.currents_ma = currents_ma;
        self
    }

    pub fn with_failing_read(mut self, finger: u8) -> Self {
        self.failing_reads.push(finger);
        self
    }

    pub fn with_rejected_command(mut self, finger: u8) -> Self {
        self.rejected_commands.push(finger);
        self
    }
}

/// Per-port counters, mostly useful to assert on in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatedStats {
    pub connect_attempts: u32,
    pub shutdowns: u32,
    pub position_commands: u32,
    pub current_reads: u32,
}

type SharedStats = Arc<Mutex<HashMap<PortId, SimulatedStats>>>;

/// Driver that hands out simulated links.
#[derive(Clone, Default)]
pub struct SimulatedDriver {
    default_spec: SimulatedHandSpec,
    hands: HashMap<PortId, SimulatedHandSpec>,
    stats: SharedStats,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Behaviour of every port without an explicit spec.
    pub fn with_default(mut self, spec: SimulatedHandSpec) -> Self {
        self.default_spec = spec;
        self
    }

    pub fn with_hand(mut self, port: PortId, spec: SimulatedHandSpec) -> Self {
        self.hands.insert(port, spec);
        self
    }

    pub fn stats(&self, port: &PortId) -> SimulatedStats {
        self.stats.lock().get(port).copied().unwrap_or_default()
    }

    fn spec_for(&self, port: &PortId) -> SimulatedHandSpec {
        self.hands
            .get(port)
            .cloned()
            .unwrap_or_else(|| self.default_spec.clone())
    }
}

impl HandDriver for SimulatedDriver {
    fn connect(&self, port: &PortId) -> Result<Box<dyn HandLink>> {
        self.stats
            .lock()
            .entry(port.clone())
            .or_default()
            .connect_attempts += 1;

        let spec = self.spec_for(port);
        if spec.connect_fails {
            return Err(anyhow!("simulated adapter for {port} did not respond"));
        }

        Ok(Box::new(SimulatedHand {
            port: port.clone(),
            spec,
            targets: [0; MAX_MOTOR_CNT],
            open: true,
            stats: self.stats.clone(),
        }))
    }
}

/// One connected simulated hand.
pub struct SimulatedHand {
    port: PortId,
    spec: SimulatedHandSpec,
    targets: [u16; MAX_MOTOR_CNT],
    open: bool,
    stats: SharedStats,
}

impl SimulatedHand {
    fn addressed(&self, node_id: u8, finger_id: u8) -> bool {
        self.open && node_id == self.port.node_id && (finger_id as usize) < MAX_MOTOR_CNT
    }

    fn bump(&self, f: impl FnOnce(&mut SimulatedStats)) {
        f(self.stats.lock().entry(self.port.clone()).or_default());
    }

    fn observed_position(&self, finger_id: u8) -> u16 {
        let idx = finger_id as usize;
        let mut reached = self.targets[idx];
        if idx == MAX_MOTOR_CNT - 1 {
            reached = reached.max(SIM_THUMB_ROOT_FLOOR);
        }
        (reached as i32 + self.spec.position_offsets[idx]).clamp(0, u16::MAX as i32) as u16
    }
}

impl HandLink for SimulatedHand {
    fn set_command_timeout(&mut self, _timeout_ms: u16) -> StatusCode {
        if self.open {
            HAND_RESP_SUCCESS
        } else {
            SIM_FAULT_STATUS
        }
    }

    fn set_finger_pos(
        &mut self,
        node_id: u8,
        finger_id: u8,
        position: u16,
        _speed: u16,
    ) -> StatusCode {
        self.bump(|s| s.position_commands += 1);
        if !self.addressed(node_id, finger_id) || self.spec.rejected_commands.contains(&finger_id)
        {
            return SIM_FAULT_STATUS;
        }
        self.targets[finger_id as usize] = position;
        HAND_RESP_SUCCESS
    }

    fn get_finger_pos(&mut self, node_id: u8, finger_id: u8) -> Reply<FingerPosition> {
        if !self.addressed(node_id, finger_id) || self.spec.failing_reads.contains(&finger_id) {
            return Reply::failure(SIM_FAULT_STATUS, FingerPosition::default());
        }
        Reply::success(FingerPosition {
            target: self.targets[finger_id as usize],
            current: self.observed_position(finger_id),
        })
    }

    fn get_finger_current(&mut self, node_id: u8, finger_id: u8) -> Reply<u16> {
        self.bump(|s| s.current_reads += 1);
        if !self.addressed(node_id, finger_id) || self.spec.failing_reads.contains(&finger_id) {
            return Reply::failure(SIM_FAULT_STATUS, 0);
        }
        Reply::success(self.spec.currents_ma[finger_id as usize])
    }

    fn set_finger_current_limit(
        &mut self,
        node_id: u8,
        finger_id: u8,
        _limit_ma: u16,
    ) -> StatusCode {
        if self.addressed(node_id, finger_id) {
            HAND_RESP_SUCCESS
        } else {
            SIM_FAULT_STATUS
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.bump(|s| s.shutdowns += 1);
        }
        Ok(())
    }
}
