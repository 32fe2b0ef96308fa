//! Tabular model metadata CLI.

use std::io::{self, IsTerminal};

use anyhow::Result;
use clap::{ColorChoice, Parser};
use tabular_cli::logging::{LogConfig, LogFormat, init_logging};
use tracing::level_filters::LevelFilter;

mod cli;
mod commands;

use crate::cli::{Cli, Command, LogFormatArg, LogLevelArg};
use crate::commands::{run_delete, run_deps, run_inspect, run_refresh, run_rename};

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let exit_code = match &cli.command {
        Command::Inspect(args) => exit_code(run_inspect(args)),
        Command::Deps(args) => exit_code(run_deps(args).map(|()| true)),
        Command::Rename(args) => exit_code(run_rename(args)),
        Command::Delete(args) => exit_code(run_delete(args)),
        Command::Refresh(args) => exit_code(run_refresh(args).map(|()| true)),
    };
    std::process::exit(exit_code);
}

/// 0 on success, 1 when the command ran but reported a problem, 2 on error.
fn exit_code(result: Result<bool>) -> i32 {
    match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(error) => {
            eprintln!("error: {error:#}");
            2
        }
    }
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
