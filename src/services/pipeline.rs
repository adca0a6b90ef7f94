use crate::domain::models::{
    AccountRecord, FailureMarker, LookupStatus, OwnerIdentifier, OwnershipResult, PathEntry,
    ReportRow, RunSummary,
};
use crate::services::cache::IdentifierCache;
use crate::services::directory::{BatchError, DirectoryBatchLookup, DirectoryService};
use crate::services::owner::{OwnerQuery, OwnerResolver};
use crate::services::progress::{Progress, Silent, Stage};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub workers: usize,
    pub batch_size: usize,
    pub batch_concurrency: usize,
    pub batch_timeout: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("cannot start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug)]
pub struct AuditOutcome {
    pub rows: Vec<ReportRow>,
    pub summary: RunSummary,
}

type BatchOutcome = Result<BTreeMap<String, AccountRecord>, BatchError>;

/// Resolve owners, resolve identities through the cache, emit rows. Stages run in
/// order; the cache is only written on the calling thread.
pub struct Pipeline<'a> {
    owners: &'a dyn OwnerQuery,
    directory: &'a dyn DirectoryService,
    settings: PipelineSettings,
    progress: &'a dyn Progress,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        owners: &'a dyn OwnerQuery,
        directory: &'a dyn DirectoryService,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            owners,
            directory,
            settings,
            progress: &Silent,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(
        &self,
        entries: &[PathEntry],
        cache: &mut IdentifierCache,
    ) -> Result<AuditOutcome, PipelineError> {
        let mut summary = RunSummary {
            paths: entries.len(),
            ..RunSummary::default()
        };

        tracing::info!(
            paths = entries.len(),
            workers = self.settings.workers,
            "stage 1/3: resolving file owners"
        );
        let owners = self.resolve_owners(entries)?;
        for r in &owners {
            match r.identifier {
                OwnerIdentifier::Sid(_) => summary.owners_resolved += 1,
                OwnerIdentifier::Failed(FailureMarker::NotFound) => {
                    summary.owner_failures.not_found += 1
                }
                OwnerIdentifier::Failed(FailureMarker::TranslateError) => {
                    summary.owner_failures.translate_error += 1
                }
                OwnerIdentifier::Failed(FailureMarker::QueryError) => {
                    summary.owner_failures.query_error += 1
                }
            }
        }

        let unique = unique_identifiers(&owners);
        summary.unique_identifiers = unique.len();
        tracing::info!(
            unique = unique.len(),
            cached = cache.len(),
            "stage 2/3: resolving identities"
        );
        let run_errors = self.resolve_identities(&unique, cache, &mut summary)?;

        for sid in &unique {
            match lookup_record(sid, cache, &run_errors).map(|r| r.status) {
                Some(LookupStatus::Found) => summary.found += 1,
                Some(LookupStatus::NotFound) => summary.not_found += 1,
                Some(LookupStatus::Error) | None => summary.errors += 1,
            }
        }

        tracing::info!(rows = owners.len(), "stage 3/3: building report");
        let rows = self.build_rows(&owners, cache, &run_errors);
        summary.cache_entries = cache.len();
        Ok(AuditOutcome { rows, summary })
    }

    /// Stage 1. Results come back in input order whatever order workers finish in.
    pub fn resolve_owners(
        &self,
        entries: &[PathEntry],
    ) -> Result<Vec<OwnershipResult>, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.workers.max(1))
            .thread_name(|i| format!("owner-{i}"))
            .build()?;
        let resolver = OwnerResolver::new(self.owners);

        self.progress.start(Stage::Owners, entries.len());
        let results = pool.install(|| {
            entries
                .par_iter()
                .map(|entry| {
                    let identifier = resolver.resolve(&entry.path);
                    self.progress.advance(Stage::Owners);
                    OwnershipResult {
                        path: entry.path.clone(),
                        identifier,
                    }
                })
                .collect()
        });
        self.progress.finish(Stage::Owners);
        Ok(results)
    }

    /// Stage 2. Returns the records that failed this run; those never enter the cache.
    fn resolve_identities(
        &self,
        unique: &BTreeSet<String>,
        cache: &mut IdentifierCache,
        summary: &mut RunSummary,
    ) -> Result<BTreeMap<String, AccountRecord>, PipelineError> {
        let pending: BTreeSet<String> = unique
            .iter()
            .filter(|sid| !cache.contains(sid))
            .cloned()
            .collect();
        summary.cache_hits = unique.len() - pending.len();
        summary.queried = pending.len();

        let lookup = DirectoryBatchLookup::new(
            self.directory,
            self.settings.batch_size,
            self.settings.batch_timeout,
        );
        let batches = lookup.batches(&pending);
        summary.batches = batches.len();
        if batches.is_empty() {
            tracing::info!(hits = summary.cache_hits, "all identifiers served from cache");
            return Ok(BTreeMap::new());
        }

        self.progress.start(Stage::Identities, batches.len());
        let run_batch = |batch: &Vec<String>| -> BatchOutcome {
            let outcome = lookup.resolve_batch(batch);
            self.progress.advance(Stage::Identities);
            outcome
        };
        let outcomes: Vec<BatchOutcome> = if self.settings.batch_concurrency > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.settings.batch_concurrency)
                .thread_name(|i| format!("directory-{i}"))
                .build()?;
            pool.install(|| batches.par_iter().map(run_batch).collect())
        } else {
            batches.iter().map(run_batch).collect()
        };
        self.progress.finish(Stage::Identities);

        let mut run_errors = BTreeMap::new();
        let total = batches.len();
        for (index, (batch, outcome)) in batches.iter().zip(outcomes).enumerate() {
            match outcome {
                Ok(records) => {
                    let found = records
                        .values()
                        .filter(|r| r.status == LookupStatus::Found)
                        .count();
                    tracing::info!(
                        batch = index + 1,
                        of = total,
                        found,
                        size = batch.len(),
                        "directory batch resolved"
                    );
                    for record in records.into_values() {
                        if record.status == LookupStatus::Error {
                            tracing::warn!(
                                sid = %record.identifier,
                                error = record.error.as_deref().unwrap_or(""),
                                "identity lookup failed"
                            );
                            run_errors.insert(record.identifier.clone(), record);
                        } else {
                            cache.insert(record);
                        }
                    }
                }
                Err(err) => {
                    summary.failed_batches += 1;
                    tracing::error!(
                        batch = index + 1,
                        of = total,
                        size = batch.len(),
                        error = %err,
                        "directory batch failed"
                    );
                    for sid in batch {
                        run_errors.insert(sid.clone(), AccountRecord::error(sid, err.to_string()));
                    }
                }
            }
        }
        Ok(run_errors)
    }

    fn build_rows(
        &self,
        owners: &[OwnershipResult],
        cache: &IdentifierCache,
        run_errors: &BTreeMap<String, AccountRecord>,
    ) -> Vec<ReportRow> {
        self.progress.start(Stage::Report, owners.len());
        let rows = owners
            .iter()
            .map(|r| {
                let record = r
                    .identifier
                    .sid()
                    .and_then(|sid| lookup_record(sid, cache, run_errors));
                self.progress.advance(Stage::Report);
                ReportRow::new(r, record)
            })
            .collect();
        self.progress.finish(Stage::Report);
        rows
    }
}

fn lookup_record<'c>(
    sid: &str,
    cache: &'c IdentifierCache,
    run_errors: &'c BTreeMap<String, AccountRecord>,
) -> Option<&'c AccountRecord> {
    cache.get(sid).or_else(|| run_errors.get(sid))
}

/// Identifiers worth asking the directory about, deduplicated.
pub fn unique_identifiers(results: &[OwnershipResult]) -> BTreeSet<String> {
    results
        .iter()
        .filter_map(|r| r.identifier.sid())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::directory::tests::FakeDirectory;
    use crate::services::owner::OwnerQueryError;
    use crate::services::report::render_report;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;

    const JANE: &str = "S-1-5-21-111-222-333-1001";
    const BOB: &str = "S-1-5-21-111-222-333-1002";
    const OLD: &str = "S-1-5-21-999-888-777-1500";

    #[derive(Default)]
    struct FakeFiles {
        owners: HashMap<String, String>,
    }

    impl FakeFiles {
        fn file(mut self, path: &str, owner: &str) -> Self {
            self.owners.insert(path.to_string(), owner.to_string());
            self
        }
    }

    impl OwnerQuery for FakeFiles {
        fn owner_of(&self, path: &str) -> Result<Option<String>, OwnerQueryError> {
            Ok(self.owners.get(path).cloned())
        }

        fn translate(&self, principal: &str) -> Result<String, OwnerQueryError> {
            Err(OwnerQueryError::Translate {
                principal: principal.to_string(),
                message: "unknown".to_string(),
            })
        }
    }

    fn settings(batch_size: usize, batch_concurrency: usize) -> PipelineSettings {
        PipelineSettings {
            workers: 4,
            batch_size,
            batch_concurrency,
            batch_timeout: Duration::from_secs(5),
        }
    }

    fn entries(paths: &[&str]) -> Vec<PathEntry> {
        paths
            .iter()
            .map(|p| PathEntry {
                path: p.to_string(),
            })
            .collect()
    }

    #[test]
    fn example_report_matches_expected_output() {
        let files = FakeFiles::default().file("C:\\a.txt", JANE);
        let dir = FakeDirectory::default().user(JANE, "Jane Doe", "jdoe", "jdoe@x.com");
        let mut cache = IdentifierCache::default();

        let outcome = Pipeline::new(&files, &dir, settings(50, 1))
            .run(&entries(&["C:\\a.txt", "C:\\missing.txt"]), &mut cache)
            .expect("pipeline runs");

        assert_eq!(
            render_report(&outcome.rows),
            "\u{feff}File;SID;Name;SamAccountName;EmailAddress\n\
             C:\\a.txt;S-1-5-21-111-222-333-1001;Jane Doe;jdoe;jdoe@x.com\n\
             C:\\missing.txt;NOT_FOUND;;;\n"
        );
        assert_eq!(outcome.summary.owner_failures.not_found, 1);
        assert_eq!(outcome.summary.found, 1);
    }

    #[test]
    fn report_has_one_row_per_input_in_input_order() {
        let mut files = FakeFiles::default();
        let mut paths = Vec::new();
        for i in 0..200 {
            let path = format!("C:\\data\\f{i:03}.txt");
            if i % 7 != 0 {
                files = files.file(&path, if i % 2 == 0 { JANE } else { BOB });
            }
            paths.push(path);
        }
        // duplicates keep their own rows
        paths.push("C:\\data\\f001.txt".to_string());
        let dir = FakeDirectory::default()
            .user(JANE, "Jane Doe", "jdoe", "jdoe@x.com")
            .user(BOB, "Bob Roe", "broe", "broe@x.com");
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        let mut cache = IdentifierCache::default();

        let outcome = Pipeline::new(&files, &dir, settings(50, 1))
            .run(&entries(&refs), &mut cache)
            .expect("pipeline runs");

        assert_eq!(outcome.rows.len(), paths.len());
        for (row, path) in outcome.rows.iter().zip(&paths) {
            assert_eq!(&row.path, path);
        }
        assert_eq!(outcome.rows[0].identifier, "NOT_FOUND");
        assert_eq!(outcome.rows[1].account_name, "broe");
        assert_eq!(outcome.rows[200], outcome.rows[1]);
    }

    #[test]
    fn shared_owner_is_queried_once() {
        let files = FakeFiles::default()
            .file("C:\\a.txt", JANE)
            .file("C:\\b.txt", JANE);
        let dir = FakeDirectory::default().user(JANE, "Jane Doe", "jdoe", "jdoe@x.com");
        let mut cache = IdentifierCache::default();

        let outcome = Pipeline::new(&files, &dir, settings(50, 1))
            .run(&entries(&["C:\\a.txt", "C:\\b.txt"]), &mut cache)
            .expect("pipeline runs");

        assert_eq!(dir.queried(), vec![JANE.to_string()]);
        assert_eq!(outcome.summary.queried, 1);
        assert_eq!(outcome.rows[0].display_name, outcome.rows[1].display_name);
        assert_eq!(outcome.rows[0].email, outcome.rows[1].email);
    }

    #[test]
    fn second_run_is_served_from_cache() {
        let files = FakeFiles::default()
            .file("C:\\a.txt", JANE)
            .file("C:\\b.txt", BOB);
        let dir = FakeDirectory::default().user(JANE, "Jane Doe", "jdoe", "jdoe@x.com");
        let input = entries(&["C:\\a.txt", "C:\\b.txt", "C:\\gone.txt"]);
        let mut cache = IdentifierCache::default();
        let pipeline = Pipeline::new(&files, &dir, settings(50, 1));

        let first = pipeline.run(&input, &mut cache).expect("first run");
        let batches_after_first = dir.batches.load(Ordering::SeqCst);
        let second = pipeline.run(&input, &mut cache).expect("second run");

        assert_eq!(first.rows, second.rows);
        assert_eq!(second.summary.queried, 0);
        assert_eq!(second.summary.cache_hits, 2);
        assert_eq!(dir.batches.load(Ordering::SeqCst), batches_after_first);
        assert_eq!(second.rows[1].display_name, "NOT_FOUND");
    }

    #[test]
    fn historical_identifier_reports_fallback_account() {
        let files = FakeFiles::default().file("C:\\legacy.txt", OLD);
        let dir = FakeDirectory::default().migrated(OLD, "Jane Doe", "jdoe", "jdoe@x.com");
        let mut cache = IdentifierCache::default();

        let outcome = Pipeline::new(&files, &dir, settings(50, 1))
            .run(&entries(&["C:\\legacy.txt"]), &mut cache)
            .expect("pipeline runs");

        assert_eq!(outcome.rows[0].display_name, "Jane Doe");
        assert_eq!(outcome.rows[0].account_name, "jdoe");
        assert!(cache.get(OLD).map(|r| r.via_history).unwrap_or(false));
    }

    #[test]
    fn timed_out_batch_does_not_affect_siblings() {
        let files = FakeFiles::default()
            .file("C:\\a.txt", JANE)
            .file("C:\\b.txt", BOB)
            .file("C:\\c.txt", OLD);
        let mut dir = FakeDirectory::default()
            .user(JANE, "Jane Doe", "jdoe", "jdoe@x.com")
            .user(BOB, "Bob Roe", "broe", "broe@x.com")
            .migrated(OLD, "Old Account", "old", "old@x.com");
        dir.timeout_on.push(BOB.to_string());
        let mut cache = IdentifierCache::default();

        let outcome = Pipeline::new(&files, &dir, settings(1, 1))
            .run(
                &entries(&["C:\\a.txt", "C:\\b.txt", "C:\\c.txt"]),
                &mut cache,
            )
            .expect("pipeline runs");

        assert_eq!(outcome.summary.batches, 3);
        assert_eq!(outcome.summary.failed_batches, 1);
        assert_eq!(outcome.rows[0].account_name, "jdoe");
        assert_eq!(outcome.rows[1].display_name, "ERROR");
        assert_eq!(outcome.rows[1].account_name, "");
        assert_eq!(outcome.rows[2].account_name, "old");
        assert!(cache.contains(JANE));
        assert!(cache.contains(OLD));
        assert!(!cache.contains(BOB));
        assert_eq!(outcome.summary.errors, 1);
    }

    #[test]
    fn parallel_batches_match_sequential() {
        let mut files = FakeFiles::default();
        let mut dir = FakeDirectory::default();
        let mut paths = Vec::new();
        for i in 0..30 {
            let sid = format!("S-1-5-21-1-2-3-{}", 2000 + i);
            let path = format!("C:\\p{i}.txt");
            files = files.file(&path, &sid);
            if i % 3 != 0 {
                dir = dir.user(&sid, &format!("User {i}"), &format!("u{i}"), "");
            }
            paths.push(path);
        }
        dir.timeout_on.push("S-1-5-21-1-2-3-2005".to_string());
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();

        let mut seq_cache = IdentifierCache::default();
        let seq = Pipeline::new(&files, &dir, settings(4, 1))
            .run(&entries(&refs), &mut seq_cache)
            .expect("sequential run");
        let mut par_cache = IdentifierCache::default();
        let par = Pipeline::new(&files, &dir, settings(4, 3))
            .run(&entries(&refs), &mut par_cache)
            .expect("parallel run");

        assert_eq!(seq.rows, par.rows);
        assert_eq!(seq.summary.failed_batches, 1);
        assert_eq!(par.summary.failed_batches, 1);
        assert_eq!(seq_cache.len(), par_cache.len());
    }
}
