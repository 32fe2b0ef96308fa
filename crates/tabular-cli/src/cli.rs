//! CLI argument definitions for the `tabular` tool.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "tabular",
    version,
    about = "Inspect and edit tabular model metadata",
    long_about = "Inspect and edit tabular model metadata stored as JSON.\n\n\
                  Renames and deletions propagate through every dependent \
                  expression, relationship, hierarchy and security entry."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List every object with its dependencies and error state.
    Inspect(InspectArgs),

    /// Show what an object uses and what uses it.
    Deps(DepsArgs),

    /// Rename an object and rewrite the expressions that refer to it.
    Rename(RenameArgs),

    /// Delete an object and everything it owns.
    Delete(DeleteArgs),

    /// Add columns found in a table's CSV source.
    Refresh(RefreshArgs),
}

/// Options shared by every command that opens a model.
#[derive(Args)]
pub struct ModelArgs {
    /// Path to the model document (JSON).
    #[arg(value_name = "MODEL")]
    pub model: PathBuf,

    /// Leave dependent expressions untouched on rename.
    #[arg(long = "no-fixup")]
    pub no_fixup: bool,

    /// Override the compatibility level declared by the model.
    #[arg(long = "compatibility-level", value_name = "LEVEL")]
    pub compatibility_level: Option<u32>,
}

/// Where an edited model is written.
#[derive(Args)]
pub struct SaveArgs {
    /// Write the edited model back to MODEL.
    #[arg(long = "in-place", conflicts_with = "output")]
    pub in_place: bool,

    /// Write the edited model to PATH.
    #[arg(long = "output", short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Parser)]
pub struct InspectArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Print the report as JSON.
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Parser)]
pub struct DepsArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Object path, e.g. `Sales`, `'Order Lines'[Amount]` or `[Total]`.
    #[arg(value_name = "OBJECT")]
    pub object: String,
}

#[derive(Parser)]
pub struct RenameArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    #[arg(value_name = "OBJECT")]
    pub object: String,

    #[arg(value_name = "NEW_NAME")]
    pub new_name: String,

    #[command(flatten)]
    pub save: SaveArgs,
}

#[derive(Parser)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    #[arg(value_name = "OBJECT")]
    pub object: String,

    /// Delete even when other objects still refer to it.
    #[arg(long = "force")]
    pub force: bool,

    #[command(flatten)]
    pub save: SaveArgs,
}

#[derive(Parser)]
pub struct RefreshArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Table whose first partition names the CSV source.
    #[arg(value_name = "TABLE")]
    pub table: String,

    /// Base directory for relative data sources (default: the model's folder).
    #[arg(long = "root", value_name = "DIR")]
    pub root: Option<PathBuf>,

    #[command(flatten)]
    pub save: SaveArgs,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
