use std::{path::PathBuf, process::Command};

use uuid::Uuid;

fn handbench() -> Command {
    Command::new(env!("CARGO_BIN_EXE_handbench"))
}

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("handbench_cli_{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("Failed to create scratch dir");
    dir
}

/// Basic smoke tests for CLI functionality
#[test]
fn test_cli_help() {
    let output = handbench()
        .arg("--help")
        .output()
        .expect("Failed to execute handbench binary");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage: handbench"));
}

#[test]
fn test_cli_list_programs() {
    let output = handbench()
        .arg("--list-programs")
        .output()
        .expect("Failed to execute handbench binary");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for program in ["aging", "gesture-stress", "motor-current"] {
        assert!(stdout.contains(program), "missing {program}");
    }
}

#[test]
fn test_cli_print_config_applies_overrides() {
    let output = handbench()
        .args(["--print-config", "--program", "gesture-stress"])
        .args(["--port", "PCAN_USBBUS4:7"])
        .output()
        .expect("Failed to execute handbench binary");

    assert!(output.status.success());
    let config: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("print-config emits JSON");
    assert_eq!(config["program"], "gesture-stress");
    assert_eq!(config["ports"][0]["channel"], "PCAN_USBBUS4");
    assert_eq!(config["ports"][0]["node_id"], 7);
}

#[test]
fn test_cli_rejects_unknown_program() {
    let output = handbench()
        .args(["--print-config", "--program", "burn-in"])
        .output()
        .expect("Failed to execute handbench binary");
    assert!(!output.status.success());
}

#[test]
fn test_cli_simulated_campaign_writes_report() {
    let dir = scratch_dir();
    let config_path = dir.join("campaign.json");
    let report_path = dir.join("report.json");
    let config = serde_json::json!({
        "program": "aging",
        "ports": [
            { "channel": "PCAN_USBBUS1", "node_id": 2 },
            { "channel": "PCAN_USBBUS2", "node_id": 2 }
        ],
        "max_rounds": 2,
        "control_file": null,
        "log_dir": dir.join("log"),
        "timing": { "base_delay_ms": 0, "current_dwell_ms": 0 }
    });
    std::fs::write(&config_path, config.to_string()).expect("Failed to write config");

    let output = handbench()
        .arg("--config")
        .arg(&config_path)
        .arg("--report")
        .arg(&report_path)
        .output()
        .expect("Failed to execute handbench binary");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).expect("report written"))
            .expect("report is JSON");
    assert_eq!(report["verdict"], "pass");
    assert_eq!(report["stop_reason"], "round_limit");
    assert_eq!(report["results"].as_array().map(Vec::len), Some(4));

    let logs = std::fs::read_dir(dir.join("log"))
        .expect("log dir created")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("AgingTest_log_"))
        .count();
    assert_eq!(logs, 1);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_cli_failing_fleet_exits_non_zero() {
    let dir = scratch_dir();
    let config_path = dir.join("campaign.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
program = "aging"
log_dir = "{}"
max_rounds = 3

[[ports]]
channel = "PCAN_USBBUS1"
node_id = 2

[timing]
base_delay_ms = 0

[simulation.default]
connect_fails = true
"#,
            dir.join("log").display().to_string().replace('\\', "/")
        ),
    )
    .expect("Failed to write config");

    let output = handbench()
        .arg("--config")
        .arg(&config_path)
        .arg("--control-file")
        .arg(dir.join("shared_data.json"))
        .output()
        .expect("Failed to execute handbench binary");
    assert!(!output.status.success());

    std::fs::remove_dir_all(&dir).ok();
}
