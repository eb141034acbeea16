use std::time::Duration;

use super::{session::DeviceSession, timing::settle};
use crate::api::hand::{HandError, MAX_MOTOR_CNT};

/// Mean motor currents (mA) of one sampling pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CurrentSample {
    pub means: Vec<f64>,
    /// Reads that failed and were left out of the sums.
    pub failed_reads: u32,
}

impl CurrentSample {
    pub fn exceeds(&self, limit_ma: f64) -> bool {
        self.means.iter().any(|&mean| mean > limit_ma)
    }
}

/// Reads every motor current `repetitions` times and averages.
///
/// The sum is always divided by `repetitions`, not by the number of reads that
/// succeeded, so failed reads pull the mean down.
#[derive(Debug, Clone)]
pub struct CurrentSampler {
    repetitions: u32,
    pre_delay: Duration,
    sample_delay: Duration,
    motors: usize,
}

impl CurrentSampler {
    pub fn new(repetitions: u32, pre_delay: Duration, sample_delay: Duration) -> Self {
        Self {
            repetitions: repetitions.max(1),
            pre_delay,
            sample_delay,
            motors: MAX_MOTOR_CNT,
        }
    }

    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    pub fn sample(&self, session: &mut DeviceSession) -> Result<CurrentSample, HandError> {
        settle(self.pre_delay);

        let node_id = session.node_id();
        let port = session.port().clone();
        let link = session.link()?;

        let mut sums = vec![0u64; self.motors];
        let mut failed_reads = 0;
        for _ in 0..self.repetitions {
            for (finger, sum) in sums.iter_mut().enumerate() {
                settle(self.sample_delay);
                let reply = link.get_finger_current(node_id, finger as u8);
                if reply.is_success() {
                    *sum += reply.value as u64;
                } else {
                    failed_reads += 1;
                    let err = HandError::Read {
                        finger: finger as u8,
                        status: reply.status,
                    };
                    log::warn!("[port = {port}] current {err}, skipped");
                }
            }
        }

        let means = sums
            .into_iter()
            .map(|sum| round3(sum as f64 / self.repetitions as f64))
            .collect::<Vec<_>>();
        log::info!("[port = {port}] average currents: {means:?}");

        Ok(CurrentSample {
            means,
            failed_reads,
        })
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::hand::{SimulatedDriver, SimulatedHandSpec},
        core::port::PortId,
    };

    #[test]
    fn test_constant_reads_average_to_the_value() {
        let port = PortId::new("PCAN_USBBUS1", 2);
        let driver = SimulatedDriver::new()
            .with_default(SimulatedHandSpec::default().with_currents([10, 20, 30, 40, 50, 60]));
        let mut session = DeviceSession::open(&driver, &port).unwrap();

        for repetitions in [1, 3, 5] {
            let sampler = CurrentSampler::new(repetitions, Duration::ZERO, Duration::ZERO);
            let sample = sampler.sample(&mut session).unwrap();
            assert_eq!(sample.means, vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
            assert_eq!(sample.failed_reads, 0);
        }
        assert_eq!(driver.stats(&port).current_reads, 9 * MAX_MOTOR_CNT as u32);
    }

    #[test]
    fn test_failed_reads_bias_the_mean_down() {
        let port = PortId::new("PCAN_USBBUS1", 2);
        let driver = SimulatedDriver::new().with_default(
            SimulatedHandSpec::default()
                .with_currents([90; MAX_MOTOR_CNT])
                .with_failing_read(3),
        );
        let mut session = DeviceSession::open(&driver, &port).unwrap();
        let sample = CurrentSampler::new(3, Duration::ZERO, Duration::ZERO)
            .sample(&mut session)
            .unwrap();

        assert_eq!(sample.means[3], 0.0);
        assert_eq!(sample.means[0], 90.0);
        assert_eq!(sample.failed_reads, 3);
        assert!(!sample.exceeds(100.0));
    }

    #[test]
    fn test_zero_repetitions_clamp_to_one() {
        assert_eq!(
            CurrentSampler::new(0, Duration::ZERO, Duration::ZERO).repetitions(),
            1
        );
        assert_eq!(round3(1.0 / 3.0), 0.333);
    }
}
