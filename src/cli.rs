// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Flags are command-scoped and strict: unknown flags fail parsing, and
//! clap's usage-error exit code (2) lines up with the argument-error
//! category below.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::errors::EngineError;

/// Canonical exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_VALIDATION_ERROR: i32 = 1;
pub const EXIT_WORKSPACE_ERROR: i32 = 2;
pub const EXIT_EXECUTION_ERROR: i32 = 3;
pub const EXIT_PLUGIN_ERROR: i32 = 4;

#[derive(Debug, Parser)]
#[command(
    name = "taskweave",
    version,
    about = "Run task graphs deterministically, with reproducible traces and resumable runs.",
    long_about = None
)]
pub struct Cli {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKWEAVE_LOG` or a default level is used.
    #[arg(long, value_enum, global = true, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse and validate a graph definition, without executing it.
    Validate {
        /// Path to the graph definition (JSON).
        #[arg(long, value_name = "PATH")]
        graph: PathBuf,
    },

    /// Print the content hash of a graph definition.
    ///
    /// The output depends only on the graph body, never on any
    /// working-directory flag.
    Hash {
        /// Path to the graph definition (JSON).
        #[arg(long, value_name = "PATH")]
        graph: PathBuf,
    },

    /// Execute a graph.
    Run(RunArgs),

    /// Resume a previously failed run, reusing checkpointed work.
    Resume(ResumeArgs),

    /// Inspect plugins.
    Plugins {
        #[command(subcommand)]
        command: PluginsCommand,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Workspace directory. Required.
    #[arg(long, value_name = "DIR")]
    pub workdir: PathBuf,

    /// Graph definition path; relative paths resolve under the workdir.
    #[arg(long, value_name = "PATH")]
    pub graph: PathBuf,

    /// Cache directory; defaults to `<workdir>/.taskweave/cache`.
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Output directory to prepare (cleared of stale entries) before the run.
    #[arg(long, value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Execution mode.
    #[arg(long, value_enum, default_value_t = Mode::Clean)]
    pub mode: Mode,

    /// Number of parallel workers (1 = serial).
    #[arg(long, default_value_t = 1, value_name = "N")]
    pub jobs: usize,

    /// Emit the canonical execution trace to stderr.
    #[arg(long)]
    pub trace: bool,

    /// Write the canonical execution trace to a file instead of stderr.
    #[arg(long, value_name = "PATH")]
    pub trace_out: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ResumeArgs {
    /// Workspace directory. Required.
    #[arg(long, value_name = "DIR")]
    pub workdir: PathBuf,

    /// Graph definition path; must hash to the previous run's graph hash.
    #[arg(long, value_name = "PATH")]
    pub graph: PathBuf,

    /// Identifier of the run to resume. Required.
    #[arg(long, value_name = "ID")]
    pub previous_run_id: String,

    /// Narrow re-execution to work the prior run did not complete.
    #[arg(long)]
    pub retry_failed_only: bool,

    /// Number of parallel workers (1 = serial).
    #[arg(long, default_value_t = 1, value_name = "N")]
    pub jobs: usize,

    /// Emit the canonical execution trace to stderr.
    #[arg(long)]
    pub trace: bool,

    /// Write the canonical execution trace to a file instead of stderr.
    #[arg(long, value_name = "PATH")]
    pub trace_out: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum PluginsCommand {
    /// Print deterministic plugin status lines.
    List {
        /// Workspace directory; defaults to the current directory.
        #[arg(long, value_name = "DIR", default_value = ".")]
        workdir: PathBuf,
    },
}

/// Execution mode as exposed on the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Execute every task; never read the cache. Results are still
    /// written through so a later incremental run can reuse them.
    Clean,
    /// Probe the content-addressed cache and reuse prior results.
    Incremental,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Resolve a path under the workdir unless it is already absolute.
pub fn resolve_under_workdir(work_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        work_dir.join(path)
    }
}

/// Map an engine error to its canonical exit code.
pub fn exit_code_for(err: &EngineError) -> i32 {
    match err {
        EngineError::Parse(_)
        | EngineError::Schema(_)
        | EngineError::Structural { .. }
        | EngineError::Semantic(_) => EXIT_VALIDATION_ERROR,
        EngineError::Workspace(_)
        | EngineError::Cache(_)
        | EngineError::System(_)
        | EngineError::StateMachine { .. }
        | EngineError::Io(_) => EXIT_WORKSPACE_ERROR,
        EngineError::Execution(_) | EngineError::Cancelled => EXIT_EXECUTION_ERROR,
    }
}

/// Convenience wrapper around `Cli::parse()`.
pub fn parse() -> Cli {
    Cli::parse()
}
