/// Round scheduler
///
/// A campaign repeats rounds until its deadline: each round polls the control
/// channel, dispatches one worker per active port onto a bounded blocking pool,
/// waits for all of them, merges the results and applies the quarantine
/// policy. Rounds already in flight finish past the deadline.
use chrono::Local;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::{
    control::{ControlChannel, NeverControl},
    port::PortId,
    program::{RunSettings, TestProgram},
    quarantine::QuarantineRegistry,
    report::{CampaignReport, GestureResult, PortResult, ResultAggregator, StopReason},
    task_manager::run_bounded_blocking,
    worker::{PortFault, PortOutcome, PortWorker},
};
use crate::api::hand::HandDriver;

pub const DEFAULT_MAX_WORKERS: usize = 64;
pub const DEFAULT_PAUSE_INTERVAL: Duration = Duration::from_secs(2);

/// When a port gets excluded from later rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarantinePolicy {
    /// Consecutive failed connections before a port is excluded.
    pub connect_failures_before_quarantine: u32,
    /// Also exclude ports whose unit was found broken.
    pub quarantine_broken: bool,
}

impl Default for QuarantinePolicy {
    fn default() -> Self {
        Self {
            connect_failures_before_quarantine: 1,
            quarantine_broken: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CampaignConfig {
    pub duration: Duration,
    pub max_rounds: Option<u32>,
    pub max_workers: usize,
    pub pause_interval: Duration,
    pub quarantine: QuarantinePolicy,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs_f64(1.5 * 3600.0),
            max_rounds: None,
            max_workers: DEFAULT_MAX_WORKERS,
            pause_interval: DEFAULT_PAUSE_INTERVAL,
            quarantine: QuarantinePolicy::default(),
        }
    }
}

impl CampaignConfig {
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: Option<u32>) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_pause_interval(mut self, pause_interval: Duration) -> Self {
        self.pause_interval = pause_interval;
        self
    }

    pub fn with_quarantine(mut self, quarantine: QuarantinePolicy) -> Self {
        self.quarantine = quarantine;
        self
    }
}

pub struct Campaign {
    ports: Vec<PortId>,
    driver: Arc<dyn HandDriver>,
    program: Arc<dyn TestProgram>,
    control: Arc<dyn ControlChannel>,
    quarantine: QuarantineRegistry,
    settings: Arc<RunSettings>,
    config: CampaignConfig,
}

impl Campaign {
    pub fn new(
        ports: Vec<PortId>,
        driver: Arc<dyn HandDriver>,
        program: Arc<dyn TestProgram>,
    ) -> Self {
        Self {
            ports,
            driver,
            program,
            control: Arc::new(NeverControl),
            quarantine: QuarantineRegistry::new(),
            settings: Arc::new(RunSettings::default()),
            config: CampaignConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CampaignConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_control(mut self, control: Arc<dyn ControlChannel>) -> Self {
        self.control = control;
        self
    }

    /// Share an existing registry, e.g. to carry exclusions across campaigns.
    pub fn with_quarantine(mut self, quarantine: QuarantineRegistry) -> Self {
        self.quarantine = quarantine;
        self
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn quarantine(&self) -> &QuarantineRegistry {
        &self.quarantine
    }

    fn round_limit(&self) -> Option<u32> {
        if self.program.single_round() {
            Some(self.config.max_rounds.map_or(1, |limit| limit.min(1)))
        } else {
            self.config.max_rounds
        }
    }

    pub async fn run(self) -> CampaignReport {
        let id = Uuid::new_v4();
        let started_at = Local::now();
        let deadline = Instant::now().checked_add(self.config.duration);
        let round_limit = self.round_limit();
        let pool = Arc::new(Semaphore::new(self.config.max_workers.max(1)));

        log::info!(
            "---------- {} started on {} port(s) <{}> ----------",
            self.program.title(),
            self.ports.len(),
            started_at.format("%Y-%m-%d %H:%M:%S")
        );

        let mut aggregator = ResultAggregator::new();
        let mut connect_streaks: HashMap<PortId, u32> = HashMap::new();
        let mut round = 0u32;
        // paused polls consume a round number but not the round limit
        let mut dispatched = 0u32;

        let stop_reason = loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break StopReason::DeadlineReached;
            }
            if round_limit.is_some_and(|limit| dispatched >= limit) {
                break StopReason::RoundLimit;
            }

            let active = self.quarantine.active_ports(&self.ports);
            if active.is_empty() {
                log::warn!("No testable devices");
                break StopReason::NoTestableDevices;
            }

            round += 1;
            let signal = self.control.poll();
            if signal.stop {
                log::info!("Test stopped");
                break StopReason::Stopped;
            }
            if signal.pause {
                log::info!("Test paused");
                tokio::time::sleep(self.config.pause_interval).await;
                continue;
            }

            dispatched += 1;
            let round_started = Local::now();
            log::info!("########## round {round} started ##########");

            let outcomes = self.dispatch(&pool, active, round).await;
            for outcome in &outcomes {
                self.apply_quarantine(outcome, &mut connect_streaks);
            }
            let verdict = aggregator.merge_round(
                round,
                round_started,
                outcomes.into_iter().map(|outcome| outcome.result).collect(),
            );
            log::info!("########## round {round} finished: {verdict} ##########");
        };

        let verdict = aggregator.verdict();
        let (rounds, results) = aggregator.into_parts();
        let report = CampaignReport {
            id,
            title: self.program.title().to_string(),
            program: self.program.kind().to_string(),
            started_at,
            finished_at: Local::now(),
            rounds,
            results,
            verdict,
            show_current: self.program.show_current(),
            quarantined: self.quarantine.snapshot(),
            stop_reason,
        };

        log::info!(
            "---------- {} finished: {} <{}> ----------",
            report.title,
            report.verdict,
            report.finished_at.format("%Y-%m-%d %H:%M:%S")
        );
        report
    }

    /// One worker per port; collected in completion order.
    async fn dispatch(
        &self,
        pool: &Arc<Semaphore>,
        ports: Vec<PortId>,
        round: u32,
    ) -> Vec<PortOutcome> {
        let mut pending = FuturesUnordered::new();
        for port in ports {
            let driver = self.driver.clone();
            let program = self.program.clone();
            let settings = self.settings.clone();
            let worker_port = port.clone();
            let task = run_bounded_blocking(pool.clone(), move || {
                PortWorker::new(
                    driver.as_ref(),
                    program.as_ref(),
                    settings.as_ref(),
                    worker_port,
                    round,
                )
                .run()
            });
            pending.push(async move { (port, task.await) });
        }

        let mut outcomes = Vec::new();
        while let Some((port, joined)) = pending.next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    log::error!("[port = {port}] {err:#}");
                    let mut result = PortResult::new(port, round);
                    result.gestures.push(
                        GestureResult::new(self.program.description())
                            .with_expected(self.program.expected())
                            .fail(format!("{err:#}")),
                    );
                    outcomes.push(PortOutcome {
                        result,
                        connected: false,
                        fault: PortFault::None,
                        phases: Vec::new(),
                    });
                }
            }
        }
        outcomes
    }

    fn apply_quarantine(&self, outcome: &PortOutcome, streaks: &mut HashMap<PortId, u32>) {
        let port = &outcome.result.port;
        let policy = self.config.quarantine;

        match outcome.fault {
            PortFault::ConnectFailed => {
                let streak = streaks.entry(port.clone()).or_insert(0);
                *streak += 1;
                if *streak >= policy.connect_failures_before_quarantine.max(1) {
                    self.quarantine.exclude(port);
                }
            }
            PortFault::Broken => {
                streaks.remove(port);
                if policy.quarantine_broken {
                    self.quarantine.exclude(port);
                }
            }
            PortFault::None => {
                if outcome.connected {
                    streaks.remove(port);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::hand::{SimulatedDriver, SimulatedHandSpec},
        core::{
            control::{ControlSignal, SharedControl},
            report::Verdict,
            timing::Timing,
        },
        programs::{AgingProgram, MotorCurrentProgram},
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_settings() -> RunSettings {
        RunSettings {
            timing: Timing::instant(),
            ..RunSettings::default()
        }
    }

    fn campaign(ports: Vec<PortId>, driver: SimulatedDriver, config: CampaignConfig) -> Campaign {
        Campaign::new(ports, Arc::new(driver), Arc::new(AgingProgram::default()))
            .with_settings(fast_settings())
            .with_config(config)
    }

    fn rounds(max_rounds: u32) -> CampaignConfig {
        CampaignConfig::default()
            .with_duration(Duration::from_secs(3600))
            .with_max_rounds(Some(max_rounds))
            .with_pause_interval(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_zero_deadline_runs_no_round() {
        let port = PortId::new("PCAN_USBBUS1", 2);
        let driver = SimulatedDriver::new();
        let report = campaign(
            vec![port.clone()],
            driver.clone(),
            CampaignConfig::default().with_duration(Duration::ZERO),
        )
        .run()
        .await;

        assert_eq!(report.stop_reason, StopReason::DeadlineReached);
        assert!(report.results.is_empty());
        assert_eq!(report.verdict, Verdict::Pass);
        assert_eq!(driver.stats(&port).connect_attempts, 0);
    }

    #[tokio::test]
    async fn test_single_unreachable_port_is_quarantined() {
        let port = PortId::new("PCAN_USBBUS1", 2);
        let driver = SimulatedDriver::new().with_default(SimulatedHandSpec::unreachable());
        let report = campaign(vec![port.clone()], driver.clone(), rounds(10))
            .run()
            .await;

        assert_eq!(report.stop_reason, StopReason::NoTestableDevices);
        assert_eq!(report.round_count(), 1);
        assert_eq!(report.verdict, Verdict::Fail);
        assert_eq!(report.quarantined, vec![port.clone()]);
        assert_eq!(driver.stats(&port).connect_attempts, 1);
    }

    #[tokio::test]
    async fn test_quarantined_port_is_never_dispatched_again() {
        let good = PortId::new("PCAN_USBBUS1", 2);
        let bad = PortId::new("PCAN_USBBUS2", 2);
        let driver = SimulatedDriver::new().with_hand(bad.clone(), SimulatedHandSpec::unreachable());
        let report = campaign(vec![good.clone(), bad.clone()], driver.clone(), rounds(3))
            .run()
            .await;

        assert_eq!(report.stop_reason, StopReason::RoundLimit);
        assert_eq!(report.round_count(), 3);
        assert_eq!(driver.stats(&bad).connect_attempts, 1);
        assert_eq!(driver.stats(&good).connect_attempts, 3);
        // the failure of round 1 decides the whole campaign
        assert_eq!(report.rounds[0].verdict, Verdict::Fail);
        assert_eq!(report.rounds[1].verdict, Verdict::Pass);
        assert_eq!(report.verdict, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_connect_failure_threshold() {
        let port = PortId::new("PCAN_USBBUS1", 2);
        let driver = SimulatedDriver::new().with_default(SimulatedHandSpec::unreachable());
        let config = rounds(10).with_quarantine(QuarantinePolicy {
            connect_failures_before_quarantine: 3,
            quarantine_broken: false,
        });
        let report = campaign(vec![port.clone()], driver.clone(), config).run().await;

        assert_eq!(report.round_count(), 3);
        assert_eq!(driver.stats(&port).connect_attempts, 3);
        assert_eq!(report.stop_reason, StopReason::NoTestableDevices);
    }

    #[tokio::test]
    async fn test_broken_units_quarantined_only_on_request() {
        let port = PortId::new("PCAN_USBBUS1", 2);
        let driver = SimulatedDriver::new().with_default(SimulatedHandSpec::default().with_offset(0, 900));

        let report = campaign(vec![port.clone()], driver.clone(), rounds(2)).run().await;
        assert_eq!(report.round_count(), 2);
        assert!(report.quarantined.is_empty());

        let config = rounds(2).with_quarantine(QuarantinePolicy {
            quarantine_broken: true,
            ..QuarantinePolicy::default()
        });
        let report = campaign(vec![port.clone()], driver, config).run().await;
        assert_eq!(report.round_count(), 1);
        assert_eq!(report.quarantined, vec![port]);
    }

    #[tokio::test]
    async fn test_stop_signal_ends_campaign() {
        let control = SharedControl::new();
        control.request_stop();
        let report = campaign(vec![PortId::new("PCAN_USBBUS1", 2)], SimulatedDriver::new(), rounds(5))
            .with_control(Arc::new(control))
            .run()
            .await;

        assert_eq!(report.stop_reason, StopReason::Stopped);
        assert_eq!(report.round_count(), 0);
    }

    /// Pauses for the first `pauses` polls, then stops.
    struct PauseThenStop {
        polls: AtomicU32,
        pauses: u32,
    }

    impl ControlChannel for PauseThenStop {
        fn poll(&self) -> ControlSignal {
            let seen = self.polls.fetch_add(1, Ordering::SeqCst);
            ControlSignal {
                stop: seen >= self.pauses,
                pause: seen < self.pauses,
            }
        }
    }

    #[tokio::test]
    async fn test_pause_skips_dispatch() {
        let port = PortId::new("PCAN_USBBUS1", 2);
        let driver = SimulatedDriver::new();
        let control = Arc::new(PauseThenStop {
            polls: AtomicU32::new(0),
            pauses: 3,
        });
        let report = campaign(vec![port.clone()], driver.clone(), rounds(5))
            .with_control(control.clone())
            .run()
            .await;

        assert_eq!(report.stop_reason, StopReason::Stopped);
        assert_eq!(control.polls.load(Ordering::SeqCst), 4);
        assert_eq!(driver.stats(&port).connect_attempts, 0);
    }

    /// Replays a fixed list of signals, then stops.
    struct Scripted {
        signals: parking_lot::Mutex<Vec<ControlSignal>>,
    }

    impl ControlChannel for Scripted {
        fn poll(&self) -> ControlSignal {
            let mut signals = self.signals.lock();
            if signals.is_empty() {
                ControlSignal {
                    stop: true,
                    pause: false,
                }
            } else {
                signals.remove(0)
            }
        }
    }

    #[tokio::test]
    async fn test_paused_poll_consumes_round_number() {
        let paused = ControlSignal {
            stop: false,
            pause: true,
        };
        let control = Arc::new(Scripted {
            signals: parking_lot::Mutex::new(vec![paused, ControlSignal::default()]),
        });
        let report = campaign(vec![PortId::new("PCAN_USBBUS1", 2)], SimulatedDriver::new(), rounds(5))
            .with_control(control)
            .run()
            .await;

        assert_eq!(report.stop_reason, StopReason::Stopped);
        let labels: Vec<u32> = report.rounds.iter().map(|r| r.round).collect();
        assert_eq!(labels, vec![2]);
        assert_eq!(report.results[0].round, 2);
        assert_eq!(report.round_count(), 1);
    }

    #[tokio::test]
    async fn test_paused_polls_do_not_count_toward_round_limit() {
        let paused = ControlSignal {
            stop: false,
            pause: true,
        };
        let control = Arc::new(Scripted {
            signals: parking_lot::Mutex::new(vec![
                paused,
                ControlSignal::default(),
                paused,
                ControlSignal::default(),
                ControlSignal::default(),
            ]),
        });
        let report = campaign(vec![PortId::new("PCAN_USBBUS1", 2)], SimulatedDriver::new(), rounds(2))
            .with_control(control)
            .run()
            .await;

        assert_eq!(report.stop_reason, StopReason::RoundLimit);
        let labels: Vec<u32> = report.rounds.iter().map(|r| r.round).collect();
        assert_eq!(labels, vec![2, 4]);
    }

    #[tokio::test]
    async fn test_single_round_program() {
        let port = PortId::new("PCAN_USBBUS1", 2);
        let report = Campaign::new(
            vec![port],
            Arc::new(SimulatedDriver::new()),
            Arc::new(MotorCurrentProgram::default()),
        )
        .with_settings(fast_settings())
        .with_config(CampaignConfig::default().with_duration(Duration::from_secs(3600)))
        .run()
        .await;

        assert_eq!(report.round_count(), 1);
        assert_eq!(report.stop_reason, StopReason::RoundLimit);
        assert!(report.show_current);
        assert_eq!(report.program, "motor-current");
    }
}
