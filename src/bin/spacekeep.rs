//! Spacekeep CLI Binary

use clap::Parser;
use spacekeep::config::ConfigLoader;
use spacekeep::logging::init_logging;
use spacekeep::tooling::cli::{Cli, CliContext};
use std::process;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ConfigLoader::load_with_file(&cli.space, cli.config.as_deref())?;

    // Flags beat every config layer except the SPACEKEEP_LOG* shortcuts.
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
    if let Some(output) = &cli.log_output {
        config.logging.output = output.clone();
    }
    if let Some(file) = &cli.log_file {
        config.logging.file = Some(file.clone());
    }
    init_logging(Some(&config.logging))?;

    let context = CliContext::with_config(cli.space.clone(), config)?;
    let output = context.execute(&cli.command)?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
