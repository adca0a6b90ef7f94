use clap::Parser;

mod cli;
mod commands;
mod domain;
mod services;

use cli::Cli;
use services::config::AuditConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = commands::effective_config(&cli);
    // An unreadable config still gets logged, to the default destinations.
    let log_settings = config.as_ref().ok().cloned().unwrap_or_default();
    let log_dir = (!cli.no_log_file).then_some(log_settings.log_dir.as_path());
    services::logging::init(&log_settings.log_level, cli.verbose, log_dir)?;

    let result = config.and_then(|config| {
        config.validate()?;
        dispatch(&cli, &config)
    });
    if let Err(err) = &result {
        tracing::error!(error = %format!("{err:#}"), "aborted");
    }
    result
}

fn dispatch(cli: &Cli, config: &AuditConfig) -> anyhow::Result<()> {
    if commands::handle_audit_commands(cli, config)? {
        return Ok(());
    }
    commands::handle_cache_commands(cli, config)?;
    Ok(())
}
