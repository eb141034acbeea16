pub mod actions;
pub mod config;

use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use std::ffi::OsString;

fn command() -> Command {
    Command::new("handbench")
        .about("Endurance and stress test runner for CAN-connected dexterous hands")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Campaign file (.json or .toml)")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("program")
                .long("program")
                .short('p')
                .help("Test program: aging, gesture-stress, motor-current")
                .value_name("PROGRAM"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .help("Hand under test as CHANNEL:NODE, e.g. PCAN_USBBUS1:2 (repeatable)")
                .value_name("PORT")
                .action(clap::ArgAction::Append),
        )
        .arg(
            Arg::new("duration-hours")
                .long("duration-hours")
                .help("Campaign duration in hours")
                .value_name("HOURS")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("max-rounds")
                .long("max-rounds")
                .help("Stop after this many rounds")
                .value_name("ROUNDS")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("control-file")
                .long("control-file")
                .help("JSON file with stop_test / pause_test flags")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("report")
                .long("report")
                .help("Write the campaign report as JSON to this file")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("log-dir")
                .long("log-dir")
                .help("Directory for per-run log files")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .help("Print the effective campaign configuration as JSON and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list-programs")
                .long("list-programs")
                .short('l')
                .help("List available test programs and exit")
                .action(clap::ArgAction::SetTrue),
        )
}

/// Parse command line arguments and return ArgMatches.
pub fn parse_args() -> ArgMatches {
    command().get_matches()
}

/// Parse an explicit argument list.
pub fn parse_args_from<I, T>(args: I) -> Result<ArgMatches>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    command()
        .try_get_matches_from(args)
        .map_err(|err| anyhow!("{err}"))
}
