use anyhow::Result;
use std::process::ExitCode;

use handbench::{boot, cli, core::report::Verdict};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let matches = cli::parse_args();

    if cli::actions::run_one_shot_actions(&matches)? {
        return Ok(ExitCode::SUCCESS);
    }

    let file = cli::actions::load_campaign_file(&matches)?;
    if let Err(err) = boot::init_logger(&file.log_dir, file.program.log_prefix()) {
        boot::init_stdout_logger();
        log::warn!("File logging disabled: {err:#}");
    }

    let report = cli::actions::run_campaign(&file).await?;
    Ok(match report.verdict {
        Verdict::Pass => ExitCode::SUCCESS,
        Verdict::Fail => ExitCode::FAILURE,
    })
}
