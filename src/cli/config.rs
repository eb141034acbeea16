use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    api::hand::{SimulatedDriver, SimulatedHandSpec},
    core::{
        control::DEFAULT_CONTROL_FILE,
        port::{PortId, DEFAULT_NODE_ID},
        program::RunSettings,
        scheduler::{CampaignConfig, QuarantinePolicy, DEFAULT_MAX_WORKERS},
        timing::Timing,
        verifier::ToleranceConfig,
    },
    programs::ProgramKind,
};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// One simulated hand bound to a port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedHandEntry {
    pub port: PortId,
    #[serde(flatten)]
    pub spec: SimulatedHandSpec,
}

/// Simulated fleet the campaign runs against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Behaviour of every port without an entry in `hands`.
    pub default: SimulatedHandSpec,
    pub hands: Vec<SimulatedHandEntry>,
}

impl SimulationConfig {
    pub fn driver(&self) -> SimulatedDriver {
        self.hands.iter().fold(
            SimulatedDriver::new().with_default(self.default.clone()),
            |driver, entry| driver.with_hand(entry.port.clone(), entry.spec.clone()),
        )
    }
}

/// Campaign configuration file (`.json` or `.toml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignFile {
    pub program: ProgramKind,
    pub ports: Vec<PortId>,
    pub duration_hours: f64,
    pub max_rounds: Option<u32>,
    pub max_workers: usize,
    pub pause_interval_ms: u64,
    pub control_file: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub log_dir: PathBuf,
    pub timing: Timing,
    pub tolerance: ToleranceConfig,
    pub quarantine: QuarantinePolicy,
    pub simulation: SimulationConfig,
}

impl Default for CampaignFile {
    fn default() -> Self {
        Self {
            program: ProgramKind::Aging,
            ports: vec![PortId::new("PCAN_USBBUS1", DEFAULT_NODE_ID)],
            duration_hours: 1.5,
            max_rounds: None,
            max_workers: DEFAULT_MAX_WORKERS,
            pause_interval_ms: 2000,
            control_file: Some(PathBuf::from(DEFAULT_CONTROL_FILE)),
            report_path: None,
            log_dir: PathBuf::from("./log"),
            timing: Timing::default(),
            tolerance: ToleranceConfig::default(),
            quarantine: QuarantinePolicy::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl CampaignFile {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse JSON campaign file")
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse TOML campaign file")
    }

    /// Load by extension: `.toml` is TOML, anything else JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read campaign file {}", path.display()))?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let parsed = if is_toml {
            Self::from_toml(&text)
        } else {
            Self::from_json(&text)
        };
        parsed.with_context(|| format!("Invalid campaign file {}", path.display()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize campaign file")
    }

    /// Command line values win over file values.
    pub fn apply_matches(&mut self, matches: &ArgMatches) -> Result<()> {
        if let Some(program) = matches.get_one::<String>("program") {
            self.program = program
                .parse()
                .map_err(|_| anyhow!("Unknown program '{program}'"))?;
        }
        if let Some(ports) = matches.get_many::<String>("port") {
            self.ports = ports
                .map(|spec| spec.parse::<PortId>())
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(hours) = matches.get_one::<f64>("duration-hours") {
            self.duration_hours = *hours;
        }
        if let Some(rounds) = matches.get_one::<u32>("max-rounds") {
            self.max_rounds = Some(*rounds);
        }
        if let Some(path) = matches.get_one::<String>("control-file") {
            self.control_file = Some(PathBuf::from(path));
        }
        if let Some(path) = matches.get_one::<String>("report") {
            self.report_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = matches.get_one::<String>("log-dir") {
            self.log_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.ports.is_empty() {
            return Err(anyhow!("No ports configured"));
        }
        for port in &self.ports {
            port.channel_index()
                .with_context(|| format!("Invalid port {port}"))?;
        }
        if !self.duration_hours.is_finite() || self.duration_hours < 0.0 {
            return Err(anyhow!(
                "Invalid duration {} hours, must be a non-negative number",
                self.duration_hours
            ));
        }
        if self.max_workers == 0 {
            return Err(anyhow!("max_workers must be at least 1"));
        }
        Ok(())
    }

    pub fn duration(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.duration_hours * SECONDS_PER_HOUR)
            .map_err(|err| anyhow!("Invalid duration {} hours: {err}", self.duration_hours))
    }

    pub fn campaign_config(&self) -> Result<CampaignConfig> {
        Ok(CampaignConfig::default()
            .with_duration(self.duration()?)
            .with_max_rounds(self.max_rounds)
            .with_max_workers(self.max_workers)
            .with_pause_interval(Duration::from_millis(self.pause_interval_ms))
            .with_quarantine(self.quarantine))
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            timing: self.timing.clone(),
            tolerance: self.tolerance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parse_args_from;
    use uuid::Uuid;

    #[test]
    fn test_toml_campaign_file() -> Result<()> {
        let file = CampaignFile::from_toml(
            r#"
program = "gesture-stress"
duration_hours = 0.5
max_rounds = 4

[[ports]]
channel = "PCAN_USBBUS2"
node_id = 3

[timing]
base_delay_ms = 0

[quarantine]
connect_failures_before_quarantine = 2

[[simulation.hands]]
port = { channel = "PCAN_USBBUS2", node_id = 3 }
connect_fails = true
"#,
        )?;

        assert_eq!(file.program, ProgramKind::GestureStress);
        assert_eq!(file.ports, vec![PortId::new("PCAN_USBBUS2", 3)]);
        assert_eq!(file.max_rounds, Some(4));
        assert_eq!(file.timing.base_delay_ms, 0);
        assert_eq!(file.timing.command_timeout_ms, 255);
        assert_eq!(file.quarantine.connect_failures_before_quarantine, 2);
        assert!(!file.quarantine.quarantine_broken);
        assert_eq!(file.tolerance, ToleranceConfig::default());
        assert!(file.simulation.hands[0].spec.connect_fails);
        assert_eq!(file.simulation.hands[0].spec.currents_ma, [40; 6]);
        assert_eq!(file.duration()?, Duration::from_secs(1800));
        file.validate()
    }

    #[test]
    fn test_json_file_round_trip() -> Result<()> {
        let path = std::env::temp_dir().join(format!("handbench_{}.json", Uuid::new_v4()));
        let mut file = CampaignFile::default();
        file.program = ProgramKind::MotorCurrent;
        std::fs::write(&path, file.to_json()?)?;

        let loaded = CampaignFile::load(&path)?;
        std::fs::remove_file(&path)?;
        assert_eq!(loaded, file);
        Ok(())
    }

    #[test]
    fn test_command_line_overrides() -> Result<()> {
        let matches = parse_args_from([
            "handbench",
            "--program",
            "motor-current",
            "--port",
            "PCAN_USBBUS3:4",
            "--port",
            "PCAN_USBBUS5",
            "--duration-hours",
            "0",
            "--report",
            "out/report.json",
        ])?;
        let mut file = CampaignFile::default();
        file.apply_matches(&matches)?;

        assert_eq!(file.program, ProgramKind::MotorCurrent);
        assert_eq!(
            file.ports,
            vec![PortId::new("PCAN_USBBUS3", 4), PortId::new("PCAN_USBBUS5", 2)]
        );
        assert_eq!(file.duration_hours, 0.0);
        assert_eq!(file.report_path, Some(PathBuf::from("out/report.json")));
        file.validate()
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut file = CampaignFile {
            ports: vec![PortId::new("PCAN_USBBUS17", 2)],
            ..CampaignFile::default()
        };
        assert!(file.validate().is_err());

        file.ports = vec![PortId::new("PCAN_USBBUS1", 2)];
        file.duration_hours = -1.0;
        assert!(file.validate().is_err());

        assert!(CampaignFile::from_json(r#"{"program": "burn-in"}"#).is_err());
    }
}
