/// Result records and the campaign report
///
/// Workers produce one `PortResult` per port and round; the aggregator merges
/// them round by round, and the finished campaign turns into a
/// `CampaignReport` that is logged grouped by port and optionally written as
/// JSON.
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use uuid::Uuid;

use super::port::PortId;

/// Timestamp format used in results and logs.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[default]
    Pass,
    Fail,
}

impl Verdict {
    pub fn is_fail(self) -> bool {
        self == Verdict::Fail
    }

    /// Fail wins.
    pub fn and(self, other: Verdict) -> Verdict {
        if self.is_fail() || other.is_fail() {
            Verdict::Fail
        } else {
            Verdict::Pass
        }
    }

    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a PortResult>) -> Verdict {
        results
            .into_iter()
            .fold(Verdict::Pass, |acc, result| acc.and(result.verdict()))
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Fail => write!(f, "fail"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultContent {
    #[default]
    Empty,
    /// Mean current per motor (mA).
    Currents(Vec<f64>),
    /// Motor name to `[start, end]` current (mA).
    MotorCurrents(BTreeMap<String, [f64; 2]>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureResult {
    pub timestamp: String,
    pub description: String,
    pub expected: Vec<u16>,
    pub content: ResultContent,
    pub verdict: Verdict,
    pub comment: String,
}

impl GestureResult {
    /// A passing result stamped with the current local time.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp_now(),
            description: description.into(),
            expected: Vec::new(),
            content: ResultContent::Empty,
            verdict: Verdict::Pass,
            comment: String::new(),
        }
    }

    pub fn with_expected(mut self, expected: Vec<u16>) -> Self {
        self.expected = expected;
        self
    }

    pub fn with_content(mut self, content: ResultContent) -> Self {
        self.content = content;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn fail(mut self, comment: impl Into<String>) -> Self {
        self.verdict = Verdict::Fail;
        self.comment = comment.into();
        self
    }

    pub fn is_fail(&self) -> bool {
        self.verdict.is_fail()
    }

    /// One log line: verdict, then expected values and content when present.
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "[{}] {}: {}",
            self.timestamp, self.description, self.verdict
        );
        if !self.expected.is_empty() {
            line.push_str(&format!(", expected {:?}", self.expected));
        }
        match &self.content {
            ResultContent::Empty => {}
            ResultContent::Currents(currents) => line.push_str(&format!(", currents {currents:?}")),
            ResultContent::MotorCurrents(currents) => {
                line.push_str(&format!(", currents {currents:?}"))
            }
        }
        if !self.comment.is_empty() {
            line.push_str(&format!(" ({})", self.comment));
        }
        line
    }
}

/// Everything one port produced in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortResult {
    pub port: PortId,
    pub connected: bool,
    pub round: u32,
    pub gestures: Vec<GestureResult>,
}

impl PortResult {
    pub fn new(port: PortId, round: u32) -> Self {
        Self {
            port,
            connected: false,
            round,
            gestures: Vec::new(),
        }
    }

    pub fn verdict(&self) -> Verdict {
        if self.gestures.iter().any(GestureResult::is_fail) {
            Verdict::Fail
        } else {
            Verdict::Pass
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: u32,
    pub verdict: Verdict,
    pub ports: usize,
    pub started_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    DeadlineReached,
    Stopped,
    NoTestableDevices,
    RoundLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            StopReason::DeadlineReached => "deadline reached",
            StopReason::Stopped => "stopped by control signal",
            StopReason::NoTestableDevices => "no testable devices",
            StopReason::RoundLimit => "round limit reached",
        };
        write!(f, "{text}")
    }
}

/// Collects port results across rounds.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    results: Vec<PortResult>,
    rounds: Vec<RoundSummary>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one round's results and return the round verdict.
    pub fn merge_round(
        &mut self,
        round: u32,
        started_at: DateTime<Local>,
        results: Vec<PortResult>,
    ) -> Verdict {
        let verdict = Verdict::from_results(&results);
        self.rounds.push(RoundSummary {
            round,
            verdict,
            ports: results.len(),
            started_at,
        });
        self.results.extend(results);
        verdict
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::from_results(&self.results)
    }

    pub fn rounds(&self) -> &[RoundSummary] {
        &self.rounds
    }

    pub fn results(&self) -> &[PortResult] {
        &self.results
    }

    pub fn into_parts(self) -> (Vec<RoundSummary>, Vec<PortResult>) {
        (self.rounds, self.results)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub id: Uuid,
    pub title: String,
    pub program: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub rounds: Vec<RoundSummary>,
    pub results: Vec<PortResult>,
    pub verdict: Verdict,
    pub show_current: bool,
    pub quarantined: Vec<PortId>,
    pub stop_reason: StopReason,
}

impl CampaignReport {
    /// Rounds actually dispatched; paused polls are not counted.
    pub fn round_count(&self) -> u32 {
        self.rounds.len() as u32
    }

    /// Results grouped by port, rounds in order.
    pub fn by_port(&self) -> BTreeMap<&PortId, Vec<&PortResult>> {
        let mut grouped: BTreeMap<&PortId, Vec<&PortResult>> = BTreeMap::new();
        for result in &self.results {
            grouped.entry(&result.port).or_default().push(result);
        }
        for results in grouped.values_mut() {
            results.sort_by_key(|r| r.round);
        }
        grouped
    }

    pub fn log_summary(&self) {
        log::info!(
            "{} ({}) finished after {} round(s): {} [{}]",
            self.title,
            self.program,
            self.round_count(),
            self.verdict,
            self.stop_reason
        );

        for (port, results) in self.by_port() {
            log::info!("Port {port}:");
            for result in results {
                log::info!(
                    "  round {} ({}): {}",
                    result.round,
                    if result.connected {
                        "connected"
                    } else {
                        "not connected"
                    },
                    result.verdict()
                );
                for gesture in &result.gestures {
                    log::info!("    {}", gesture.summary_line());
                }
            }
        }

        if !self.quarantined.is_empty() {
            let ports = self
                .quarantined
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            log::warn!("Quarantined ports: {ports}");
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize campaign report")
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        Ok(path.to_path_buf())
    }
}
