use crate::cli::{CacheCommands, Cli, Commands, PruneScope};
use crate::domain::models::{AccountRecord, LookupStatus, PruneReport};
use crate::services::cache::IdentifierCache;
use crate::services::config::AuditConfig;
use crate::services::output::print_one;

pub fn handle_cache_commands(cli: &Cli, config: &AuditConfig) -> anyhow::Result<bool> {
    let Commands::Cache { command, .. } = &cli.command else {
        return Ok(false);
    };
    let mut cache = IdentifierCache::open(&config.cache);

    match command {
        CacheCommands::Stats => {
            print_one(cli.json, cache.stats(), |s| {
                format!(
                    "{}\tentries={} found={} not_found={} via_history={}",
                    s.path.display(),
                    s.entries,
                    s.found,
                    s.not_found,
                    s.via_history
                )
            })?;
        }
        CacheCommands::Show { sid } => {
            let Some(record) = cache.get(sid.trim()).cloned() else {
                anyhow::bail!("{} is not in cache {}", sid, config.cache.display());
            };
            print_one(cli.json, record, record_text)?;
        }
        CacheCommands::Prune { status } => {
            let scope = *status;
            let removed = cache.retain(|r| !matches_scope(scope, r.status));
            if removed > 0 {
                cache.save()?;
            }
            tracing::info!(removed, remaining = cache.len(), scope = ?scope, "cache pruned");
            let report = PruneReport {
                removed,
                remaining: cache.len(),
            };
            print_one(cli.json, report, |r| {
                format!("removed {} entries, {} remain", r.removed, r.remaining)
            })?;
        }
    }

    Ok(true)
}

fn matches_scope(scope: PruneScope, status: LookupStatus) -> bool {
    match scope {
        PruneScope::All => true,
        PruneScope::NotFound => status == LookupStatus::NotFound,
        PruneScope::Found => status == LookupStatus::Found,
    }
}

fn record_text(r: &AccountRecord) -> String {
    let mut lines = vec![
        format!("sid: {}", r.identifier),
        format!("status: {:?}", r.status),
        format!("name: {}", r.report_name()),
        format!("account: {}", r.account_name),
        format!("mail: {}", r.email),
        format!("enabled: {}", r.enabled),
    ];
    if !r.distinguished_name.is_empty() {
        lines.push(format!("dn: {}", r.distinguished_name));
    }
    if !r.object_class.is_empty() {
        lines.push(format!("class: {}", r.object_class));
    }
    if r.via_history {
        lines.push("matched via sid history".to_string());
    }
    lines.join("\n")
}
