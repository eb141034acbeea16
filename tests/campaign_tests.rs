use std::{sync::Arc, time::Duration};

use anyhow::Result;
use handbench::{
    api::hand::{SimulatedDriver, SimulatedHandSpec},
    core::{
        report::ResultContent, Campaign, CampaignConfig, PortId, QuarantineRegistry, RunSettings,
        SharedControl, StopReason, Timing, Verdict,
    },
    programs::ProgramKind,
};

fn fast_settings() -> RunSettings {
    RunSettings {
        timing: Timing::instant(),
        ..RunSettings::default()
    }
}

fn config(max_rounds: u32) -> CampaignConfig {
    CampaignConfig::default()
        .with_duration(Duration::from_secs(3600))
        .with_max_rounds(Some(max_rounds))
        .with_pause_interval(Duration::ZERO)
}

fn ports(count: u8) -> Vec<PortId> {
    (1..=count)
        .map(|idx| PortId::new(format!("PCAN_USBBUS{idx}"), 2))
        .collect()
}

#[tokio::test]
async fn test_mixed_fleet_aging_campaign() {
    let ports = ports(4);
    let driver = SimulatedDriver::new()
        .with_hand(ports[1].clone(), SimulatedHandSpec::unreachable())
        .with_hand(ports[2].clone(), SimulatedHandSpec::default().with_offset(3, 600))
        .with_hand(
            ports[3].clone(),
            SimulatedHandSpec::default().with_currents([30, 30, 30, 30, 30, 180]),
        );

    let report = Campaign::new(
        ports.clone(),
        Arc::new(driver.clone()),
        ProgramKind::Aging.build(),
    )
    .with_settings(fast_settings())
    .with_config(config(2).with_max_workers(2))
    .run()
    .await;

    assert_eq!(report.stop_reason, StopReason::RoundLimit);
    assert_eq!(report.round_count(), 2);
    assert_eq!(report.verdict, Verdict::Fail);
    assert_eq!(report.quarantined, vec![ports[1].clone()]);
    // 4 results in round 1, 3 in round 2
    assert_eq!(report.results.len(), 7);

    let by_port = report.by_port();
    assert!(by_port[&ports[0]]
        .iter()
        .all(|r| r.verdict() == Verdict::Pass));
    assert_eq!(by_port[&ports[1]].len(), 1);
    assert!(!by_port[&ports[1]][0].connected);
    assert!(by_port[&ports[2]]
        .iter()
        .all(|r| r.gestures[0].comment == "finger abnormal"));
    assert!(by_port[&ports[3]]
        .iter()
        .all(|r| r.gestures[0].comment == "current above standard"));

    // every opened session was released
    for port in [&ports[0], &ports[2], &ports[3]] {
        let stats = driver.stats(port);
        assert_eq!(stats.connect_attempts, 2);
        assert_eq!(stats.shutdowns, 2);
    }
}

#[tokio::test]
async fn test_gesture_stress_report_serializes() -> Result<()> {
    let report = Campaign::new(
        ports(2),
        Arc::new(SimulatedDriver::new()),
        ProgramKind::GestureStress.build(),
    )
    .with_settings(fast_settings())
    .with_config(config(1))
    .run()
    .await;

    assert_eq!(report.verdict, Verdict::Pass);
    assert_eq!(report.results.len(), 2);
    assert!(report.results.iter().all(|r| r.gestures.len() == 28));

    let value: serde_json::Value = serde_json::from_str(&report.to_json()?)?;
    assert_eq!(value["program"], "gesture-stress");
    assert_eq!(value["rounds"].as_array().map(Vec::len), Some(1));
    assert_eq!(value["results"][0]["gestures"][5]["verdict"], "pass");
    Ok(())
}

#[tokio::test]
async fn test_motor_current_campaign_runs_once() {
    let report = Campaign::new(
        ports(1),
        Arc::new(
            SimulatedDriver::new()
                .with_default(SimulatedHandSpec::default().with_currents([5, 6, 7, 8, 9, 10])),
        ),
        ProgramKind::MotorCurrent.build(),
    )
    .with_settings(fast_settings())
    .with_config(CampaignConfig::default().with_duration(Duration::from_secs(3600)))
    .run()
    .await;

    assert_eq!(report.round_count(), 1);
    assert_eq!(report.verdict, Verdict::Pass);
    match &report.results[0].gestures[0].content {
        ResultContent::MotorCurrents(currents) => {
            assert_eq!(currents["middle"], [7.0, 7.0]);
            assert_eq!(currents["thumb_root"], [10.0, 10.0]);
        }
        other => panic!("unexpected content {other:?}"),
    }
}

#[tokio::test]
async fn test_shared_quarantine_carries_across_campaigns() {
    let ports = ports(2);
    let driver = SimulatedDriver::new().with_hand(ports[0].clone(), SimulatedHandSpec::unreachable());
    let registry = QuarantineRegistry::new();

    let first = Campaign::new(ports.clone(), Arc::new(driver.clone()), ProgramKind::Aging.build())
        .with_settings(fast_settings())
        .with_config(config(1))
        .with_quarantine(registry.clone())
        .run()
        .await;
    assert_eq!(first.verdict, Verdict::Fail);
    assert!(registry.is_excluded(&ports[0]));

    let second = Campaign::new(ports.clone(), Arc::new(driver.clone()), ProgramKind::Aging.build())
        .with_settings(fast_settings())
        .with_config(config(1))
        .with_quarantine(registry)
        .run()
        .await;
    assert_eq!(second.verdict, Verdict::Pass);
    assert_eq!(driver.stats(&ports[0]).connect_attempts, 1);
}

#[tokio::test]
async fn test_stop_request_between_rounds() {
    let control = SharedControl::new();
    let campaign = Campaign::new(
        ports(1),
        Arc::new(SimulatedDriver::new()),
        ProgramKind::Aging.build(),
    )
    .with_settings(fast_settings())
    .with_config(
        CampaignConfig::default()
            .with_duration(Duration::from_secs(3600))
            .with_pause_interval(Duration::ZERO),
    )
    .with_control(Arc::new(control.clone()));

    let handle = tokio::spawn(campaign.run());
    tokio::time::sleep(Duration::from_millis(20)).await;
    control.request_stop();
    let report = handle.await.expect("campaign task");

    assert_eq!(report.stop_reason, StopReason::Stopped);
    assert_eq!(report.verdict, Verdict::Pass);
}
