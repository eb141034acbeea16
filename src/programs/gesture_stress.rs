use anyhow::Result;

use super::ProgramKind;
use crate::core::{
    gesture::{Gesture, GestureProgram, Pose, StatusPolicy},
    program::{PortContext, TestProgram},
    report::GestureResult,
};

/// Settle units before every gesture phase.
const PHASE_SETTLE: u32 = 5;

/// Settle units before verifying the rest pose.
const VERIFY_SETTLE: u32 = 10;

const GESTURE_TABLE: [(&str, [[u16; 6]; 2]); 28] = [
    ("fist", [[0, 62258, 62258, 62258, 62258, 728], [36044, 62258, 62258, 62258, 62258, 728]]),
    ("mouse", [[32768, 0, 0, 0, 45875, 728], [32768, 7864, 0, 7864, 45875, 728]]),
    ("key", [[0, 36044, 62258, 62258, 62258, 728], [42598, 36044, 62258, 62258, 62258, 728]]),
    ("point", [[0, 0, 62258, 62258, 62258, 728], [52428, 0, 62258, 62258, 62258, 728]]),
    ("column", [[52428, 0, 64880, 64880, 64880, 728], [52428, 36044, 64880, 64880, 64880, 728]]),
    ("palm", [[26214, 16384, 16384, 16384, 19661, 728], [26214, 16384, 16384, 16384, 16384, 728]]),
    ("salute", [[29491, 0, 0, 0, 0, 728], [29491, 0, 0, 0, 0, 728]]),
    ("chopstick", [[16384, 19661, 62258, 62258, 62258, 728], [16384, 45875, 62258, 62258, 62258, 728]]),
    ("power", [[0, 62258, 62258, 62258, 62258, 62258], [40000, 62258, 62258, 62258, 62258, 62258]]),
    ("grasp", [[27525, 29491, 32768, 27525, 24903, 62258], [27525, 29491, 32768, 27525, 24903, 62258]]),
    ("lift", [[0, 22937, 22937, 22937, 22937, 62258], [39321, 62258, 62258, 62258, 62258, 62258]]),
    ("plate", [[0, 9830, 11141, 9830, 11141, 62258], [62258, 9830, 11141, 9830, 11141, 62258]]),
    ("buckle", [[36044, 0, 55705, 55705, 55705, 728], [36044, 29491, 55705, 55705, 55705, 62258]]),
    ("pinch_ic", [[29491, 0, 62258, 62258, 62258, 728], [29491, 32768, 62258, 62258, 62258, 62258]]),
    ("pinch_io", [[29491, 0, 0, 0, 0, 62258], [29491, 32768, 0, 0, 0, 62258]]),
    ("pinch_tc", [[0, 29491, 62258, 62258, 62258, 62258], [32768, 29491, 62258, 62258, 62258, 62258]]),
    ("pinch_to", [[0, 29491, 0, 0, 0, 62258], [32768, 29491, 0, 0, 0, 62258]]),
    ("pinch_itc", [[0, 0, 62258, 62258, 62258, 728], [29491, 29491, 62258, 62258, 62258, 62258]]),
    ("tripod_ic", [[30801, 0, 0, 62258, 62258, 62258], [30801, 30146, 32768, 62258, 62258, 62258]]),
    ("tripod_io", [[30801, 0, 0, 0, 0, 62258], [30801, 30146, 32768, 0, 0, 62258]]),
    ("tripod_tc", [[0, 30146, 32768, 62258, 62258, 62258], [30801, 30146, 32768, 62258, 62258, 62258]]),
    ("tripod_to", [[0, 30146, 32768, 0, 0, 62258], [30801, 30146, 32768, 0, 0, 62258]]),
    ("tripod_itc", [[0, 0, 0, 62258, 62258, 62258], [30801, 30146, 32768, 62258, 62258, 62258]]),
    ("gun", [[0, 0, 62258, 62258, 62258, 728], [0, 0, 62258, 62258, 62258, 728]]),
    ("love", [[0, 0, 0, 62258, 62258, 728], [0, 0, 0, 62258, 62258, 728]]),
    ("swear", [[0, 62258, 0, 0, 62258, 728], [0, 62258, 0, 0, 62258, 728]]),
    ("victory", [[62258, 0, 0, 62258, 62258, 728], [62258, 0, 0, 62258, 62258, 728]]),
    ("six", [[0, 62258, 62258, 62258, 0, 728], [0, 62258, 62258, 62258, 0, 728]]),
];

/// Cycles through the gesture table, returning to rest and checking the
/// fingers after every gesture.
pub struct GestureStressProgram {
    program: GestureProgram,
}

impl Default for GestureStressProgram {
    fn default() -> Self {
        Self::new(GestureProgram {
            name: "gesture stress".into(),
            gestures: GESTURE_TABLE
                .iter()
                .map(|(name, [first, second])| Gesture::two_phase(*name, *first, *second))
                .collect(),
            rest: Pose::from_positions([0, 0, 0, 0, 0, 728]),
        })
    }
}

impl GestureStressProgram {
    pub fn new(program: GestureProgram) -> Self {
        Self { program }
    }

    pub fn gestures(&self) -> &[Gesture] {
        &self.program.gestures
    }
}

impl TestProgram for GestureStressProgram {
    fn kind(&self) -> ProgramKind {
        ProgramKind::GestureStress
    }

    fn title(&self) -> &str {
        "Gesture stress test"
    }

    fn description(&self) -> &str {
        "cycle through 28 gestures"
    }

    fn run(&self, ctx: &mut PortContext<'_>) -> Result<()> {
        let executor = ctx.executor(PHASE_SETTLE, StatusPolicy::LastCommand);
        let rest = &self.program.rest;

        for gesture in &self.program.gestures {
            log::info!("[port = {}] running ----> {}", ctx.port(), gesture.name);
            let mut result = GestureResult::new(gesture.name.as_str());

            if let Err(err) = ctx.run_gesture(&executor, gesture) {
                result = result.with_comment(format!("gesture rejected: {err}"));
            }

            let rested = ctx.run_pose(&executor, rest).is_ok();
            let healthy = rested && !ctx.verify(VERIFY_SETTLE, rest)?.is_broken();

            if healthy {
                ctx.record(result);
            } else {
                ctx.mark_broken();
                let comment = if result.comment.is_empty() {
                    "finger abnormal".to_string()
                } else {
                    format!("finger abnormal, {}", result.comment)
                };
                ctx.record(result.fail(comment));
            }
        }
        Ok(())
    }
}
