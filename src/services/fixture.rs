//! Offline backend. Directory content comes from a JSON document; path
//! existence and, when no owner is listed, the owner itself come from the
//! local filesystem.

use crate::domain::constants::ACCOUNT_OBJECT_CLASS;
use crate::services::directory::{
    AccountAttributes, BatchError, DirectoryBatch, DirectoryObject, DirectoryService,
    DirectorySnapshot, LookupError, SnapshotEntry,
};
use crate::services::owner::{OwnerQuery, OwnerQueryError};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum FixtureError {
    #[error("cannot read fixture {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed fixture {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureObject {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "sAMAccountName", default)]
    pub sam_account_name: String,
    #[serde(default)]
    pub mail: String,
    #[serde(default)]
    pub object_class: Vec<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub distinguished_name: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub sid_history: Vec<String>,
}

impl FixtureObject {
    fn is_account(&self) -> bool {
        self.object_class
            .iter()
            .any(|c| c.eq_ignore_ascii_case(ACCOUNT_OBJECT_CLASS))
    }

    fn attributes(&self) -> AccountAttributes {
        AccountAttributes {
            display_name: self.name.clone(),
            account_name: self.sam_account_name.clone(),
            email: self.mail.clone(),
            enabled: self.enabled,
            distinguished_name: self.distinguished_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    /// Path to owner principal (identifier or account name).
    #[serde(default)]
    pub owners: BTreeMap<String, String>,
    /// Account name to identifier.
    #[serde(default)]
    pub principals: BTreeMap<String, String>,
    #[serde(default)]
    pub objects: BTreeMap<String, FixtureObject>,
    #[serde(default)]
    pub denied_sids: BTreeSet<String>,
    #[serde(default)]
    pub history_error_sids: BTreeSet<String>,
    #[serde(default)]
    pub timeout_sids: BTreeSet<String>,
    #[serde(default)]
    pub query_errors: BTreeSet<String>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let raw = std::fs::read_to_string(path).map_err(|source| FixtureError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(raw.trim_start_matches('\u{feff}')).map_err(|source| {
            FixtureError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    fn lookup(&self, sid: &str) -> SnapshotEntry {
        let object = if self.denied_sids.contains(sid) {
            Err(LookupError::AccessDenied)
        } else {
            self.objects
                .get(sid)
                .map(|o| DirectoryObject {
                    display_name: o.name.clone(),
                    account_name: o.sam_account_name.clone(),
                    email: o.mail.clone(),
                    object_class: o.object_class.clone(),
                    distinguished_name: o.distinguished_name.clone(),
                    deleted: o.deleted,
                })
                .ok_or(LookupError::NotFound)
        };
        // Deleted accounts only answer the tombstone-aware object lookup.
        let account = match self.objects.get(sid) {
            Some(o) if o.is_account() && !o.deleted => Ok(o.attributes()),
            _ => Err(LookupError::NotFound),
        };
        let history = if self.history_error_sids.contains(sid) {
            Err(LookupError::Failed(
                "directory server unavailable".to_string(),
            ))
        } else {
            Ok(self
                .objects
                .values()
                .find(|o| o.is_account() && !o.deleted && o.sid_history.iter().any(|h| h == sid))
                .map(FixtureObject::attributes))
        };
        SnapshotEntry {
            object,
            account,
            history,
        }
    }
}

pub struct FixtureBackend {
    fixture: Fixture,
}

impl FixtureBackend {
    pub fn new(fixture: Fixture) -> Self {
        Self { fixture }
    }

    pub fn open(path: &Path) -> Result<Self, FixtureError> {
        let fixture = Fixture::load(path)?;
        tracing::info!(
            path = %path.display(),
            objects = fixture.objects.len(),
            owners = fixture.owners.len(),
            "loaded directory fixture"
        );
        Ok(Self::new(fixture))
    }
}

impl OwnerQuery for FixtureBackend {
    fn owner_of(&self, path: &str) -> Result<Option<String>, OwnerQueryError> {
        if self.fixture.query_errors.contains(path) {
            return Err(OwnerQueryError::PermissionDenied(format!(
                "cannot read security descriptor of {path}"
            )));
        }
        let fs_path = Path::new(path);
        if !fs_path.exists() {
            return Ok(None);
        }
        match self.fixture.owners.get(path) {
            Some(owner) => Ok(Some(owner.clone())),
            None => native_owner(fs_path).map(Some),
        }
    }

    fn translate(&self, principal: &str) -> Result<String, OwnerQueryError> {
        self.fixture
            .principals
            .get(principal)
            .cloned()
            .ok_or_else(|| OwnerQueryError::Translate {
                principal: principal.to_string(),
                message: "no mapping between account name and security identifier".to_string(),
            })
    }
}

impl DirectoryService for FixtureBackend {
    fn open_batch(
        &self,
        identifiers: &[String],
        timeout: Duration,
    ) -> Result<Box<dyn DirectoryBatch>, BatchError> {
        if identifiers
            .iter()
            .any(|sid| self.fixture.timeout_sids.contains(sid))
        {
            return Err(BatchError::Timeout(timeout));
        }
        let mut snapshot = DirectorySnapshot::default();
        for sid in identifiers {
            snapshot.insert(sid.clone(), self.fixture.lookup(sid));
        }
        Ok(Box::new(snapshot))
    }
}

/// Unix owners are reported in the `S-1-22-1-<uid>` form Samba uses for
/// unmapped users.
#[cfg(unix)]
fn native_owner(path: &Path) -> Result<String, OwnerQueryError> {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => OwnerQueryError::PermissionDenied(e.to_string()),
        _ => OwnerQueryError::Query(e.to_string()),
    })?;
    Ok(format!("S-1-22-1-{}", meta.uid()))
}

#[cfg(not(unix))]
fn native_owner(path: &Path) -> Result<String, OwnerQueryError> {
    Err(OwnerQueryError::Query(format!(
        "no owner listed in fixture for {}",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::LookupStatus;
    use crate::services::directory::DirectoryBatchLookup;
    use tempfile::TempDir;

    fn fixture() -> Fixture {
        serde_json::from_value(serde_json::json!({
            "principals": {"CONTOSO\\jdoe": "S-1-5-21-1-2-3-1001"},
            "objects": {
                "S-1-5-21-1-2-3-1001": {"name": "Jane Doe", "sAMAccountName": "jdoe",
                    "mail": "jdoe@x.com", "objectClass": ["top", "user"], "enabled": true,
                    "sidHistory": ["S-1-5-21-9-9-9-500"]},
                "S-1-5-21-1-2-3-1002": {"name": "Gone User", "sAMAccountName": "gone",
                    "objectClass": ["user"], "deleted": true}
            },
            "timeoutSids": ["S-1-5-21-1-2-3-1999"]
        }))
        .expect("fixture json")
    }

    #[test]
    fn history_and_tombstones_resolve_through_the_state_machine() {
        let backend = FixtureBackend::new(fixture());
        let lookup = DirectoryBatchLookup::new(&backend, 10, Duration::from_secs(1));
        let batch = vec![
            "S-1-5-21-1-2-3-1002".to_string(),
            "S-1-5-21-9-9-9-500".to_string(),
            "S-1-5-21-4-4-4-4".to_string(),
        ];
        let out = lookup.resolve_batch(&batch).expect("batch");
        let gone = &out["S-1-5-21-1-2-3-1002"];
        assert_eq!(gone.status, LookupStatus::Found);
        assert_eq!(gone.account_name, "gone");
        assert!(!gone.enabled);
        assert!(out["S-1-5-21-9-9-9-500"].via_history);
        assert_eq!(out["S-1-5-21-4-4-4-4"].status, LookupStatus::NotFound);
    }

    #[test]
    fn timeout_identifier_fails_its_batch() {
        let backend = FixtureBackend::new(fixture());
        let result = backend.open_batch(
            &["S-1-5-21-1-2-3-1999".to_string()],
            Duration::from_secs(3),
        );
        assert!(matches!(result, Err(BatchError::Timeout(_))));
    }

    #[test]
    fn owners_come_from_fixture_then_filesystem() {
        let tmp = TempDir::new().expect("temp dir");
        let listed = tmp.path().join("listed.txt");
        std::fs::write(&listed, "x").expect("write file");
        let listed = listed.to_string_lossy().into_owned();

        let mut fx = fixture();
        fx.owners.insert(listed.clone(), "CONTOSO\\jdoe".to_string());
        let backend = FixtureBackend::new(fx);

        assert_eq!(
            backend.owner_of(&listed).expect("owner"),
            Some("CONTOSO\\jdoe".to_string())
        );
        let missing = tmp.path().join("missing.txt");
        assert_eq!(
            backend
                .owner_of(&missing.to_string_lossy())
                .expect("missing path"),
            None
        );
        assert_eq!(
            backend.translate("CONTOSO\\jdoe").expect("translate"),
            "S-1-5-21-1-2-3-1001"
        );
    }

    #[cfg(unix)]
    #[test]
    fn unlisted_unix_file_gets_uid_identifier() {
        let tmp = TempDir::new().expect("temp dir");
        let file = tmp.path().join("plain.txt");
        std::fs::write(&file, "x").expect("write file");
        let backend = FixtureBackend::new(Fixture::default());
        let owner = backend
            .owner_of(&file.to_string_lossy())
            .expect("owner")
            .expect("file exists");
        assert!(owner.starts_with("S-1-22-1-"), "{owner}");
    }
}
