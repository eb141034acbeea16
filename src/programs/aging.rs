use anyhow::Result;

use super::{ProgramKind, CURRENT_STANDARD_MA};
use crate::{
    api::hand::{HAND_RESP_SUCCESS, MAX_MOTOR_CNT},
    core::{
        gesture::{Gesture, StatusPolicy},
        program::{PortContext, TestProgram},
        report::{GestureResult, ResultContent},
        timing::settle,
    },
};

/// Current limit applied to every motor before the grasp (mA).
pub const AGING_CURRENT_LIMIT_MA: u16 = 200;

const SAMPLE_REPETITIONS: u32 = 3;

/// Repeated grasp with current sampling and a finger check after reopening.
pub struct AgingProgram {
    grasp: Gesture,
    open: Gesture,
    current_limit_ma: u16,
    current_standard_ma: u16,
}

impl Default for AgingProgram {
    fn default() -> Self {
        Self {
            grasp: Gesture::two_phase(
                "grasp",
                [0, 31499, 36569, 32949, 28966, 62258],
                [26069, 31499, 36569, 32949, 28966, 62258],
            ),
            open: Gesture::two_phase(
                "open",
                [26069, 31499, 36569, 32949, 28966, 62258],
                [0, 0, 0, 0, 0, 62258],
            ),
            current_limit_ma: AGING_CURRENT_LIMIT_MA,
            current_standard_ma: CURRENT_STANDARD_MA,
        }
    }
}

impl AgingProgram {
    fn set_current_limits(&self, ctx: &mut PortContext<'_>) -> Result<bool> {
        let before = ctx.timing().base(5);
        let after = ctx.timing().base(1);
        let port = ctx.port().clone();
        let limit = self.current_limit_ma;
        let link = ctx.session().link()?;

        for finger in 0..MAX_MOTOR_CNT as u8 {
            settle(before);
            let status = link.set_finger_current_limit(port.node_id, finger, limit);
            settle(after);
            if status != HAND_RESP_SUCCESS {
                log::warn!(
                    "[port = {port}] current limit on finger {finger} rejected with status {status}"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl TestProgram for AgingProgram {
    fn kind(&self) -> ProgramKind {
        ProgramKind::Aging
    }

    fn title(&self) -> &str {
        "Aging test"
    }

    fn description(&self) -> &str {
        "repeat the grasp gesture and record every motor current"
    }

    fn expected(&self) -> Vec<u16> {
        vec![self.current_standard_ma; MAX_MOTOR_CNT]
    }

    fn run(&self, ctx: &mut PortContext<'_>) -> Result<()> {
        let result = GestureResult::new(self.description()).with_expected(self.expected());

        if !self.set_current_limits(ctx)? {
            ctx.record(result.fail("failed to set motor current limit"));
            return Ok(());
        }

        let executor = ctx.executor(5, StatusPolicy::LastCommand);
        let mut currents = vec![0.0; MAX_MOTOR_CNT];
        if ctx.run_gesture(&executor, &self.grasp).is_ok() {
            let sample = ctx.sample(SAMPLE_REPETITIONS, 5)?;
            log::info!(
                "[port = {}] grasp motor currents --> {:?}",
                ctx.port(),
                sample.means
            );
            currents = sample.means;
        }

        let opened = ctx.run_gesture(&executor, &self.open).is_ok();
        let healthy = match self.open.final_pose() {
            Some(reference) if opened => !ctx.verify(6, reference)?.is_broken(),
            _ => false,
        };

        if !healthy {
            ctx.mark_broken();
            ctx.record(result.fail("finger abnormal"));
        } else if currents
            .iter()
            .all(|&mean| mean <= self.current_standard_ma as f64)
        {
            ctx.record(result.with_content(ResultContent::Currents(currents)));
        } else {
            ctx.record(
                result
                    .with_content(ResultContent::Currents(currents))
                    .fail("current above standard"),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::hand::{SimulatedDriver, SimulatedHandSpec},
        core::{
            port::PortId,
            program::RunSettings,
            report::Verdict,
            timing::Timing,
            worker::{PortFault, PortWorker},
        },
    };

    fn run_on(spec: SimulatedHandSpec) -> crate::core::worker::PortOutcome {
        let port = PortId::new("PCAN_USBBUS1", 2);
        let driver = SimulatedDriver::new().with_hand(port.clone(), spec);
        let settings = RunSettings {
            timing: Timing::instant(),
            ..RunSettings::default()
        };
        PortWorker::new(&driver, &AgingProgram::default(), &settings, port, 1).run()
    }

    #[test]
    fn test_healthy_hand_passes_with_currents() {
        let outcome = run_on(SimulatedHandSpec::default().with_currents([50; MAX_MOTOR_CNT]));
        let gesture = &outcome.result.gestures[0];

        assert_eq!(outcome.result.gestures.len(), 1);
        assert_eq!(gesture.verdict, Verdict::Pass);
        assert_eq!(gesture.expected, vec![100; MAX_MOTOR_CNT]);
        assert_eq!(
            gesture.content,
            ResultContent::Currents(vec![50.0; MAX_MOTOR_CNT])
        );
    }

    #[test]
    fn test_high_current_fails() {
        let outcome = run_on(
            SimulatedHandSpec::default().with_currents([40, 40, 140, 40, 40, 40]),
        );
        assert_eq!(outcome.result.gestures[0].comment, "current above standard");
        assert_eq!(outcome.result.verdict(), Verdict::Fail);
        assert_eq!(outcome.fault, PortFault::None);
    }

    #[test]
    fn test_displaced_finger_is_abnormal() {
        let outcome = run_on(SimulatedHandSpec::default().with_offset(1, 500));
        assert_eq!(outcome.result.gestures[0].comment, "finger abnormal");
        assert_eq!(outcome.fault, PortFault::Broken);
    }
}
