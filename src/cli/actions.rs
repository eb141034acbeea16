use anyhow::{Context, Result};
use clap::ArgMatches;
use std::sync::Arc;
use strum::IntoEnumIterator;

use super::config::CampaignFile;
use crate::{
    core::{
        control::{AnyControl, ControlChannel, FileControlChannel, SharedControl},
        report::CampaignReport,
        scheduler::Campaign,
    },
    programs::ProgramKind,
};

/// Campaign file plus command line overrides.
pub fn load_campaign_file(matches: &ArgMatches) -> Result<CampaignFile> {
    let mut file = match matches.get_one::<String>("config") {
        Some(path) => CampaignFile::load(path)?,
        None => CampaignFile::default(),
    };
    file.apply_matches(matches)?;
    file.validate()?;
    Ok(file)
}

/// Handle flags that print something and exit. Returns true if one ran.
pub fn run_one_shot_actions(matches: &ArgMatches) -> Result<bool> {
    if matches.get_flag("list-programs") {
        for kind in ProgramKind::iter() {
            println!("{kind:<16} {}", kind.summary());
        }
        return Ok(true);
    }

    if matches.get_flag("print-config") {
        println!("{}", load_campaign_file(matches)?.to_json()?);
        return Ok(true);
    }

    Ok(false)
}

/// Stop requests from the control file and from Ctrl-C.
fn control_channel(file: &CampaignFile) -> Result<Arc<dyn ControlChannel>> {
    let interrupt = SharedControl::new();
    let handler = interrupt.clone();
    ctrlc::set_handler(move || {
        log::warn!("Interrupt received, stopping after the current round");
        handler.request_stop();
    })
    .context("Failed to install Ctrl-C handler")?;

    let mut control = AnyControl::new().with(Arc::new(interrupt));
    if let Some(path) = &file.control_file {
        control = control.with(Arc::new(FileControlChannel::new(path)));
    }
    Ok(Arc::new(control))
}

/// Run the configured campaign against the simulated fleet.
pub async fn run_campaign(file: &CampaignFile) -> Result<CampaignReport> {
    let program = file.program.build();
    let campaign = Campaign::new(
        file.ports.clone(),
        Arc::new(file.simulation.driver()),
        program,
    )
    .with_config(file.campaign_config()?)
    .with_settings(file.run_settings())
    .with_control(control_channel(file)?);

    let report = campaign.run().await;
    report.log_summary();

    if let Some(path) = &file.report_path {
        let path = report.save_json(path)?;
        log::info!("Report written to {}", path.display());
    }
    Ok(report)
}
