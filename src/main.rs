//! jarcov: offline coverage instrumentation and reporting for JVM class files.
//!
//! The binary parses the command line, loads `Jarcov.toml` (or the file given
//! with `--config`), sets up logging and hands off to [`jarcov_core::cli::run`].
//! Log verbosity follows `RUST_LOG`; without it, `info` is used, or `debug`
//! when `--verbose` or `general.verbose` is set.

use anyhow::Context;
use clap::Parser;
use jarcov_core::cli::{self, Cli};
use jarcov_core::config::{JarcovConfig, load_config};
use jarcov_core::error::JarcovError;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install the tracing subscriber")?;
    Ok(())
}

fn try_main(cli: &Cli) -> anyhow::Result<()> {
    let loaded = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let (config_path, config) = match loaded {
        Some((path, config)) => (Some(path), config),
        None => (None, JarcovConfig::default()),
    };

    init_tracing(cli.verbose || config.general.verbose)?;
    if let Some(path) = config_path {
        tracing::debug!(path = %path.display(), "Loaded configuration");
    }

    cli::run(cli, &config)?;
    Ok(())
}

fn main() -> ExitCode {
    if let Err(err) = color_eyre::install() {
        eprintln!("Failed to install error report handler: {err}");
    }

    let cli = Cli::parse();
    match try_main(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(jarcov_err) = err.chain().find_map(|e| e.downcast_ref::<JarcovError>()) {
                for suggestion in jarcov_err.suggestions() {
                    eprintln!("  - {suggestion}");
                }
            }
            ExitCode::FAILURE
        }
    }
}
