use anyhow::Result;
use std::collections::BTreeMap;

use super::{ProgramKind, CURRENT_STANDARD_MA, MOTOR_NAMES};
use crate::{
    api::hand::MAX_MOTOR_CNT,
    core::{
        gesture::{Gesture, StatusPolicy},
        program::{PortContext, TestProgram},
        report::{GestureResult, ResultContent},
        timing::settle,
    },
};

const SAMPLE_REPETITIONS: u32 = 5;
const SAMPLE_PRE_DELAY: u32 = 10;
const PHASE_SETTLE: u32 = 5;

/// Which slots of the start/end tables a gesture's currents fill in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Start,
    End(&'static [usize]),
}

/// Moves each motor between its end positions and records the current at
/// both ends. Runs once per campaign.
pub struct MotorCurrentProgram {
    gestures: Vec<(Gesture, Capture)>,
    current_standard_ma: u16,
}

impl Default for MotorCurrentProgram {
    fn default() -> Self {
        let open = [0, 0, 0, 0, 0, 728];
        Self {
            gestures: vec![
                (
                    Gesture::two_phase("thumb bend", open, [65535, 0, 0, 0, 0, 728]),
                    Capture::End(&[0]),
                ),
                (
                    Gesture::two_phase("thumb rotation", open, [0, 0, 0, 0, 0, 65535]),
                    Capture::End(&[5]),
                ),
                (
                    Gesture::two_phase(
                        "four finger bend",
                        open,
                        [0, 65535, 65535, 65535, 65535, 728],
                    ),
                    Capture::End(&[1, 2, 3, 4]),
                ),
                (
                    Gesture::two_phase("natural open", open, open),
                    Capture::Start,
                ),
            ],
            current_standard_ma: CURRENT_STANDARD_MA,
        }
    }
}

impl TestProgram for MotorCurrentProgram {
    fn kind(&self) -> ProgramKind {
        ProgramKind::MotorCurrent
    }

    fn title(&self) -> &str {
        "Motor current test"
    }

    fn description(&self) -> &str {
        "record every motor current at the start and end positions"
    }

    fn expected(&self) -> Vec<u16> {
        vec![self.current_standard_ma; MAX_MOTOR_CNT]
    }

    fn show_current(&self) -> bool {
        true
    }

    fn single_round(&self) -> bool {
        true
    }

    fn run(&self, ctx: &mut PortContext<'_>) -> Result<()> {
        let executor = ctx.executor(PHASE_SETTLE, StatusPolicy::EveryCommand);
        let mut start = [0.0; MAX_MOTOR_CNT];
        let mut end = [0.0; MAX_MOTOR_CNT];
        let mut problems = Vec::new();

        for (gesture, capture) in &self.gestures {
            if let Err(err) = ctx.run_gesture(&executor, gesture) {
                problems.push(format!("{} failed: {err}", gesture.name));
                continue;
            }
            log::info!("[port = {}] running ----> {}", ctx.port(), gesture.name);

            settle(ctx.timing().current_dwell());
            let sample = ctx.sample(SAMPLE_REPETITIONS, SAMPLE_PRE_DELAY)?;
            if sample.exceeds(self.current_standard_ma as f64) {
                problems.push(format!("{} current above standard", gesture.name));
            }

            match capture {
                Capture::Start => start.copy_from_slice(&sample.means[..MAX_MOTOR_CNT]),
                Capture::End(motors) => {
                    for &motor in motors.iter() {
                        end[motor] = sample.means[motor];
                    }
                }
            }
        }

        let currents: BTreeMap<String, [f64; 2]> = MOTOR_NAMES
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.to_string(), [start[idx], end[idx]]))
            .collect();
        for (name, [from, to]) in &currents {
            log::info!(
                "[port = {}][{name}] motor current --> <start> {from}mA, <end> {to}mA",
                ctx.port()
            );
        }

        let result = GestureResult::new(self.description())
            .with_expected(self.expected())
            .with_content(ResultContent::MotorCurrents(currents));
        if problems.is_empty() {
            ctx.record(result);
        } else {
            ctx.record(result.fail(problems.join("; ")));
        }
        Ok(())
    }
}
