use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Automatic time-slot scheduler for a ranked task list.
///
/// Reads tasks from a JSON snapshot, places each one into free working-hour
/// slots and writes the chosen windows back to the same file.
#[derive(Parser, Debug)]
#[command(name = "taskslot", version, about = "Automatic time-slot task scheduler")]
pub struct CliArgs {
    /// JSON file holding the task records
    #[arg(long, env = "TASKSLOT_TASKS")]
    pub tasks: PathBuf,

    /// TOML config file (default: environment variables and .env)
    #[arg(long, env = "TASKSLOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// How to run the scheduler
    #[arg(long, value_enum, default_value_t = RunMode::Continuous)]
    pub mode: RunMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Run a cycle every configured interval until Ctrl-C
    Continuous,
    /// Run a single cycle and exit
    Once,
    /// Single cycle with dry run forced on
    Test,
}

impl RunMode {
    pub fn is_single_cycle(self) -> bool {
        !matches!(self, RunMode::Continuous)
    }
}
