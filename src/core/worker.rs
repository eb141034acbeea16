use std::panic::{catch_unwind, AssertUnwindSafe};

use super::{
    port::PortId,
    program::{PortContext, RunSettings, TestProgram},
    report::{GestureResult, PortResult},
    session::DeviceSession,
};
use crate::api::hand::{HandDriver, HandError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum WorkerPhase {
    Idle,
    Connecting,
    Configuring,
    Executing,
    Verifying,
    Sampling,
    Reporting,
    Disconnecting,
    Done,
}

/// Phases one worker went through, logged at debug as they are entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTrace {
    port: PortId,
    round: u32,
    phases: Vec<WorkerPhase>,
}

impl PhaseTrace {
    pub fn new(port: PortId, round: u32) -> Self {
        Self {
            port,
            round,
            phases: vec![WorkerPhase::Idle],
        }
    }

    pub fn current(&self) -> WorkerPhase {
        self.phases.last().copied().unwrap_or(WorkerPhase::Idle)
    }

    /// Move to `phase`; re-entering the current phase is a no-op.
    pub fn enter(&mut self, phase: WorkerPhase) {
        let from = self.current();
        if from == phase {
            return;
        }
        log::debug!(
            "[port = {}] round {}: {from} -> {phase}",
            self.port,
            self.round
        );
        self.phases.push(phase);
    }

    pub fn phases(&self) -> &[WorkerPhase] {
        &self.phases
    }
}

/// What went wrong on a port, as far as quarantine is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortFault {
    None,
    ConnectFailed,
    Broken,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortOutcome {
    pub result: PortResult,
    pub connected: bool,
    pub fault: PortFault,
    pub phases: Vec<WorkerPhase>,
}

/// Runs one program against one port for one round.
///
/// Never fails: connection problems, program errors and panics all end up as
/// failing gesture results in the returned outcome.
pub struct PortWorker<'a> {
    driver: &'a dyn HandDriver,
    program: &'a dyn TestProgram,
    settings: &'a RunSettings,
    port: PortId,
    round: u32,
    trace: PhaseTrace,
}

impl<'a> PortWorker<'a> {
    pub fn new(
        driver: &'a dyn HandDriver,
        program: &'a dyn TestProgram,
        settings: &'a RunSettings,
        port: PortId,
        round: u32,
    ) -> Self {
        Self {
            driver,
            program,
            settings,
            trace: PhaseTrace::new(port.clone(), round),
            port,
            round,
        }
    }

    fn enter(&mut self, phase: WorkerPhase) {
        self.trace.enter(phase);
    }

    pub fn run(mut self) -> PortOutcome {
        let mut result = PortResult::new(self.port.clone(), self.round);

        self.enter(WorkerPhase::Connecting);
        let mut session = match DeviceSession::open(self.driver, &self.port) {
            Ok(session) => session,
            Err(err) => return self.connect_failed(result, err),
        };

        self.enter(WorkerPhase::Configuring);
        if let Err(err) = session.configure(self.settings.timing.command_timeout_ms) {
            self.enter(WorkerPhase::Disconnecting);
            session.close();
            return self.connect_failed(result, err);
        }
        result.connected = true;

        self.enter(WorkerPhase::Executing);
        let program = self.program;
        let mut ctx = PortContext::new(&mut session, self.settings, self.round, &mut self.trace);
        let run = catch_unwind(AssertUnwindSafe(|| program.run(&mut ctx)));
        let (mut gestures, broken) = ctx.finish();

        self.enter(WorkerPhase::Reporting);
        let aborted = match run {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(format!("{err:#}")),
            Err(panic) => Some(format!("panicked: {}", panic_message(panic.as_ref()))),
        };
        if let Some(reason) = aborted {
            log::error!("[port = {}] {} aborted: {reason}", self.port, program.title());
            gestures.push(
                GestureResult::new(program.description())
                    .with_expected(program.expected())
                    .fail(reason),
            );
        }
        result.gestures = gestures;

        self.enter(WorkerPhase::Disconnecting);
        session.close();
        self.enter(WorkerPhase::Done);

        PortOutcome {
            result,
            connected: true,
            fault: if broken {
                PortFault::Broken
            } else {
                PortFault::None
            },
            phases: self.trace.phases().to_vec(),
        }
    }

    fn connect_failed(mut self, mut result: PortResult, err: HandError) -> PortOutcome {
        let reason = match err {
            HandError::Connection { reason, .. } => reason,
            other => other.to_string(),
        };
        log::error!("[port = {}] connection failed: {reason}", self.port);

        result.connected = false;
        result.gestures.push(
            GestureResult::new(self.program.description())
                .with_expected(self.program.expected())
                .fail(format!("connection failed: {reason}")),
        );
        self.enter(WorkerPhase::Done);

        PortOutcome {
            result,
            connected: false,
            fault: PortFault::ConnectFailed,
            phases: self.trace.phases().to_vec(),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
