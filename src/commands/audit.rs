use crate::cli::{Cli, Commands};
use crate::domain::models::{OwnerLine, PathEntry, RunSummary};
use crate::services::backend;
use crate::services::cache::IdentifierCache;
use crate::services::config::AuditConfig;
use crate::services::output::{print_one, print_out};
use crate::services::pipeline::Pipeline;
use crate::services::progress::{Bars, Progress, Silent};
use crate::services::report;

pub fn handle_audit_commands(cli: &Cli, config: &AuditConfig) -> anyhow::Result<bool> {
    match &cli.command {
        Commands::Run(_) => run(cli, config)?,
        Commands::Owner { paths, .. } => owner(cli, config, paths)?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn run(cli: &Cli, config: &AuditConfig) -> anyhow::Result<()> {
    tracing::info!(
        input = %config.input.display(),
        output = %config.output.display(),
        backend = ?config.backend,
        "ownership audit started"
    );
    let entries = report::read_path_list(&config.input)?;
    let backends = backend::build(config)?;
    let mut cache = IdentifierCache::open(&config.cache);
    if !cache.is_empty() {
        tracing::info!(entries = cache.len(), "identity cache loaded");
    }

    let bars = Bars::default();
    let progress: &dyn Progress = if cli.json { &Silent } else { &bars };
    let outcome = Pipeline::new(
        backends.owners.as_ref(),
        backends.directory.as_ref(),
        config.pipeline_settings(),
    )
    .with_progress(progress)
    .run(&entries, &mut cache)?;

    let mut summary = outcome.summary;
    summary.cache_saved = match cache.save() {
        Ok(()) => {
            tracing::info!(entries = cache.len(), path = %cache.path().display(), "identity cache saved");
            true
        }
        Err(err) => {
            tracing::error!(error = %err, "identity cache not saved");
            false
        }
    };
    report::write_report(&config.output, &outcome.rows)?;
    summary.report = config.output.clone();
    summary.cache = config.cache.clone();

    tracing::info!(
        paths = summary.paths,
        found = summary.found,
        not_found = summary.not_found,
        errors = summary.errors,
        failed_batches = summary.failed_batches,
        "ownership audit finished"
    );
    print_one(cli.json, summary, summary_text)
}

fn summary_text(s: &RunSummary) -> String {
    let mut lines = vec![
        format!("report: {}", s.report.display()),
        format!(
            "paths: {} (owners resolved {}, not found {}, translate errors {}, query errors {})",
            s.paths,
            s.owners_resolved,
            s.owner_failures.not_found,
            s.owner_failures.translate_error,
            s.owner_failures.query_error
        ),
        format!(
            "identifiers: {} unique, {} from cache, {} queried in {} batches",
            s.unique_identifiers, s.cache_hits, s.queried, s.batches
        ),
        format!(
            "accounts: {} found, {} not found, {} errors",
            s.found, s.not_found, s.errors
        ),
    ];
    if s.failed_batches > 0 {
        lines.push(format!("failed batches: {}", s.failed_batches));
    }
    if !s.cache_saved {
        lines.push(format!("warning: cache {} was not saved", s.cache.display()));
    }
    lines.join("\n")
}

fn owner(cli: &Cli, config: &AuditConfig, paths: &[String]) -> anyhow::Result<()> {
    let backends = backend::build(config)?;
    let entries: Vec<PathEntry> = paths
        .iter()
        .map(|p| PathEntry { path: p.clone() })
        .collect();
    let results = Pipeline::new(
        backends.owners.as_ref(),
        backends.directory.as_ref(),
        config.pipeline_settings(),
    )
    .resolve_owners(&entries)?;
    let lines: Vec<OwnerLine> = results
        .into_iter()
        .map(|r| OwnerLine {
            identifier: r.identifier.as_str().to_string(),
            path: r.path,
        })
        .collect();
    print_out(cli.json, &lines, |l| format!("{}\t{}", l.path, l.identifier))
}
