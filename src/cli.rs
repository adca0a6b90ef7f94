use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "owner-audit",
    version,
    about = "Resolve file owners to directory accounts and write an ownership report"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(long, global = true, help = "JSON config file (defaults apply when omitted)")]
    pub config: Option<PathBuf>,
    #[arg(short, long, global = true, action = ArgAction::Count, help = "More log output (-v debug, -vv trace)")]
    pub verbose: u8,
    #[arg(long, global = true, help = "Log to stderr only")]
    pub no_log_file: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full audit: owners, directory lookup, report.
    Run(RunArgs),
    /// Resolve owners only and print `path<TAB>identifier`.
    Owner {
        #[arg(required = true)]
        paths: Vec<String>,
        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Inspect or prune the identity cache.
    Cache {
        #[arg(long, help = "Cache file (overrides config)")]
        cache: Option<PathBuf>,
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    #[arg(long, help = "Input list, one path per line")]
    pub input: Option<PathBuf>,
    #[arg(long, help = "Report file")]
    pub output: Option<PathBuf>,
    #[arg(long, help = "Identity cache file")]
    pub cache: Option<PathBuf>,
    #[arg(long)]
    pub workers: Option<usize>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub batch_concurrency: Option<usize>,
    #[arg(long)]
    pub batch_timeout_secs: Option<u64>,
    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(Args, Debug, Default)]
pub struct BackendArgs {
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
    #[arg(long, help = "Directory fixture for the fixture backend")]
    pub fixture: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    Stats,
    Show {
        sid: String,
    },
    Prune {
        #[arg(long, value_enum, default_value_t = PruneScope::NotFound)]
        status: PruneScope,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Powershell,
    Fixture,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PruneScope {
    NotFound,
    Found,
    All,
}
