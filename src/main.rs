use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use log::error;

use yabthreads::cli::Cli;
use yabthreads::config::load_config;
use yabthreads::harness::run_stress;
use yabthreads::logging::init_logging;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let config = cli.merge_into_config(config)?;
    init_logging(config.log_level);

    let report = run_stress(&config, &cli.plan())?;
    println!(
        "sent {} received {} missing {} duplicated {} overlaps {} in {:?}",
        report.sent,
        report.received,
        report.missing,
        report.duplicated,
        report.overlaps,
        report.elapsed
    );

    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("stress run was not clean");
        Ok(ExitCode::FAILURE)
    }
}
