use anyhow::{Context, ensure};
use clap::Parser;
use ebus::load_config;
use ebus_logger::Logger;
use ebus_stress::{Cli, StressConfig, run};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg: StressConfig =
        load_config(cli.config.as_deref()).context("Critical: Configuration is malformed")?;
    cli.apply(&mut cfg);

    let _log = Logger::from_settings(env!("CARGO_PKG_NAME"), &cfg.logging)?;

    let report = run(&cfg)?;
    ensure!(
        report.violations == 0,
        "{} handler invocations observed after disconnect returned",
        report.violations
    );
    Ok(())
}
