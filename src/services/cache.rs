use crate::domain::constants::{LEGACY_NAME_ERROR, LEGACY_NAME_NOT_FOUND};
use crate::domain::models::{AccountRecord, CacheStats, LookupStatus};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("cannot read cache {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed cache {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot write cache {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode cache: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Loads the persisted mapping. Missing or unreadable files yield an empty mapping.
pub fn load(path: &Path) -> BTreeMap<String, AccountRecord> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no identity cache yet, starting cold");
        return BTreeMap::new();
    }
    match try_load(path) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring identity cache");
            BTreeMap::new()
        }
    }
}

fn try_load(path: &Path) -> Result<BTreeMap<String, AccountRecord>, CacheError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CacheError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = raw.trim_start_matches('\u{feff}');
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let parsed: BTreeMap<String, AccountRecord> =
        serde_json::from_str(raw).map_err(|source| CacheError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut out = BTreeMap::new();
    for (sid, record) in parsed {
        if let Some(record) = normalize(&sid, record) {
            out.insert(sid, record);
        }
    }
    Ok(out)
}

/// First-generation caches marked failures with sentinel names and status `found`.
fn normalize(sid: &str, mut record: AccountRecord) -> Option<AccountRecord> {
    record.identifier = sid.to_string();
    let sentinel = record.status == LookupStatus::Found && record.account_name.is_empty();
    if record.status == LookupStatus::Error || (sentinel && record.display_name == LEGACY_NAME_ERROR)
    {
        return None;
    }
    if sentinel && record.display_name == LEGACY_NAME_NOT_FOUND {
        record.status = LookupStatus::NotFound;
        record.display_name.clear();
    }
    Some(record)
}

/// Writes through a temp file in the target directory, then renames over the old cache.
pub fn save(path: &Path, entries: &BTreeMap<String, AccountRecord>) -> Result<(), CacheError> {
    let durable: BTreeMap<&String, &AccountRecord> = entries
        .iter()
        .filter(|(_, r)| r.status != LookupStatus::Error)
        .collect();
    let body = serde_json::to_string_pretty(&durable)?;

    let save_err = |source: std::io::Error| CacheError::Save {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(save_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(save_err)?;
    tmp.write_all(body.as_bytes()).map_err(save_err)?;
    tmp.as_file().sync_all().map_err(save_err)?;
    tmp.persist(path).map_err(|e| save_err(e.error))?;
    Ok(())
}

/// The identity cache for one run: loaded at start, merged during stage 2, saved at end.
#[derive(Debug, Clone, Default)]
pub struct IdentifierCache {
    path: PathBuf,
    entries: BTreeMap<String, AccountRecord>,
}

impl IdentifierCache {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load(&path);
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, sid: &str) -> bool {
        self.entries.contains_key(sid)
    }

    pub fn get(&self, sid: &str) -> Option<&AccountRecord> {
        self.entries.get(sid)
    }

    /// Last write wins.
    pub fn insert(&mut self, record: AccountRecord) {
        self.entries.insert(record.identifier.clone(), record);
    }

    pub fn retain(&mut self, keep: impl Fn(&AccountRecord) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, r| keep(r));
        before - self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            path: self.path.clone(),
            entries: self.entries.len(),
            ..CacheStats::default()
        };
        for r in self.entries.values() {
            match r.status {
                LookupStatus::Found => stats.found += 1,
                LookupStatus::NotFound => stats.not_found += 1,
                LookupStatus::Error => {}
            }
            if r.via_history {
                stats.via_history += 1;
            }
        }
        stats
    }

    pub fn save(&self) -> Result<(), CacheError> {
        save(&self.path, &self.entries)
    }
}
