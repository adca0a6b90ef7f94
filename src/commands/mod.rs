//! Command handler layer.
//!
//! Handlers resolve the effective configuration, call into `services/*` and
//! print results. Each `handle_*` returns `Ok(false)` when the command is not
//! theirs.
//!
//! ## Files
//! - `audit.rs`: `run` and `owner`.
//! - `cache.rs`: `cache stats|show|prune`.

pub mod audit;
pub mod cache;

pub use audit::handle_audit_commands;
pub use cache::handle_cache_commands;

use crate::cli::{Cli, Commands};
use crate::services::config::AuditConfig;

/// Config file (or defaults), then command-line overrides. Validation is left
/// to the caller so a rejected config can still be logged.
pub fn effective_config(cli: &Cli) -> anyhow::Result<AuditConfig> {
    let mut config = AuditConfig::load(cli.config.as_deref())?;
    match &cli.command {
        Commands::Run(args) => config.apply_run_args(args),
        Commands::Owner { backend, .. } => config.apply_backend_args(backend),
        Commands::Cache { cache, .. } => {
            if let Some(path) = cache {
                config.cache = path.clone();
            }
        }
    }
    Ok(config)
}
