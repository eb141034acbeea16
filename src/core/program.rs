/// Test programs and the per-port context they run in
///
/// A program drives one connected hand through one round: it runs gestures,
/// verifies, samples currents and records gesture results. Programs may return
/// early with an error at any point; the worker turns that into a failing
/// result and still closes the session.
use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{
    gesture::{Gesture, GestureExecutor, Pose, StatusPolicy},
    port::PortId,
    report::GestureResult,
    sampler::{CurrentSample, CurrentSampler},
    session::DeviceSession,
    timing::Timing,
    verifier::{Health, ToleranceConfig},
    worker::{PhaseTrace, WorkerPhase},
};
use crate::{api::hand::HandError, programs::ProgramKind};

/// Knobs shared by every worker of a campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub timing: Timing,
    pub tolerance: ToleranceConfig,
}

pub trait TestProgram: Send + Sync {
    fn kind(&self) -> ProgramKind;

    /// Human readable campaign title, e.g. "Aging test".
    fn title(&self) -> &str;

    /// Description used for results that are not tied to a gesture.
    fn description(&self) -> &str;

    /// Expected values shown next to results.
    fn expected(&self) -> Vec<u16> {
        Vec::new()
    }

    fn show_current(&self) -> bool {
        false
    }

    /// Run exactly one round regardless of the campaign duration.
    fn single_round(&self) -> bool {
        false
    }

    fn run(&self, ctx: &mut PortContext<'_>) -> Result<()>;
}

/// What a program gets to work with on one port.
///
/// Gestures, verification and sampling go through the context so the worker
/// trace follows the program from phase to phase.
pub struct PortContext<'a> {
    session: &'a mut DeviceSession,
    settings: &'a RunSettings,
    round: u32,
    trace: &'a mut PhaseTrace,
    results: Vec<GestureResult>,
    broken: bool,
}

impl<'a> PortContext<'a> {
    pub fn new(
        session: &'a mut DeviceSession,
        settings: &'a RunSettings,
        round: u32,
        trace: &'a mut PhaseTrace,
    ) -> Self {
        Self {
            session,
            settings,
            round,
            trace,
            results: Vec::new(),
            broken: false,
        }
    }

    pub fn session(&mut self) -> &mut DeviceSession {
        &mut *self.session
    }

    pub fn port(&self) -> &PortId {
        self.session.port()
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn timing(&self) -> &Timing {
        &self.settings.timing
    }

    /// Executor settling `settle_units` base delays before every pose.
    pub fn executor(&self, settle_units: u32, policy: StatusPolicy) -> GestureExecutor {
        GestureExecutor::new(self.settings.timing.base(settle_units), policy)
    }

    pub fn run_gesture(
        &mut self,
        executor: &GestureExecutor,
        gesture: &Gesture,
    ) -> Result<(), HandError> {
        self.trace.enter(WorkerPhase::Executing);
        executor.run_gesture(&mut *self.session, gesture)
    }

    pub fn run_pose(&mut self, executor: &GestureExecutor, pose: &Pose) -> Result<(), HandError> {
        self.trace.enter(WorkerPhase::Executing);
        executor.run_pose(&mut *self.session, pose)
    }

    /// Compare the hand with `reference` after `settle_units` base delays.
    pub fn verify(&mut self, settle_units: u32, reference: &Pose) -> Result<Health, HandError> {
        self.trace.enter(WorkerPhase::Verifying);
        let verifier = self
            .settings
            .tolerance
            .verifier(self.settings.timing.base(settle_units));
        let health = verifier.judge_broken(&mut *self.session, reference)?;
        if let Some(err) = health.into_error() {
            log::warn!("[port = {}] unit judged broken: {err}", self.port());
        }
        Ok(health)
    }

    /// Average motor currents over `repetitions` sweeps.
    pub fn sample(
        &mut self,
        repetitions: u32,
        pre_delay_units: u32,
    ) -> Result<CurrentSample, HandError> {
        self.trace.enter(WorkerPhase::Sampling);
        let sampler = CurrentSampler::new(
            repetitions,
            self.settings.timing.base(pre_delay_units),
            self.settings.timing.base(1),
        );
        sampler.sample(&mut *self.session)
    }

    pub fn record(&mut self, result: GestureResult) {
        if result.is_fail() {
            log::warn!(
                "[port = {}] {}: fail ({})",
                self.port(),
                result.description,
                result.comment
            );
        } else {
            log::info!("[port = {}] {}: pass", self.port(), result.description);
        }
        self.results.push(result);
    }

    /// Report the unit as mechanically broken.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn results(&self) -> &[GestureResult] {
        &self.results
    }

    pub(crate) fn finish(self) -> (Vec<GestureResult>, bool) {
        (self.results, self.broken)
    }
}
