use crate::domain::constants::ACCOUNT_OBJECT_CLASS;
use crate::domain::models::{AccountRecord, LookupStatus};
use crate::services::sanitize::sanitize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

/// Attributes returned by a direct lookup, tombstoned objects included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryObject {
    pub display_name: String,
    pub account_name: String,
    pub email: String,
    pub object_class: Vec<String>,
    pub distinguished_name: String,
    pub deleted: bool,
}

impl DirectoryObject {
    pub fn is_account(&self) -> bool {
        self.object_class
            .iter()
            .any(|c| c.eq_ignore_ascii_case(ACCOUNT_OBJECT_CLASS))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountAttributes {
    pub display_name: String,
    pub account_name: String,
    pub email: String,
    pub enabled: bool,
    pub distinguished_name: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("object not found")]
    NotFound,
    #[error("access denied")]
    AccessDenied,
    #[error("identifier not recognized")]
    Unrecognized,
    #[error("{0}")]
    Failed(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("directory query timed out after {0:?}")]
    Timeout(Duration),
    #[error("directory query failed: {0}")]
    Failed(String),
}

/// Directory capability: one external round trip per batch.
pub trait DirectoryService: Send + Sync {
    fn open_batch(
        &self,
        identifiers: &[String],
        timeout: Duration,
    ) -> Result<Box<dyn DirectoryBatch>, BatchError>;
}

/// Per-identifier view over the answers fetched for one batch.
pub trait DirectoryBatch: Send {
    fn find_object(&self, sid: &str) -> Result<DirectoryObject, LookupError>;
    fn find_account(&self, sid: &str) -> Result<AccountAttributes, LookupError>;
    fn find_by_history(&self, sid: &str) -> Result<Option<AccountAttributes>, LookupError>;
}

/// Resolution progress of a single identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    Direct,
    AccountFetch(DirectoryObject),
    HistoricalFallback(LookupError),
    Done(AccountRecord),
}

impl IdentityState {
    pub fn step(self, sid: &str, batch: &dyn DirectoryBatch) -> IdentityState {
        match self {
            IdentityState::Direct => match batch.find_object(sid) {
                Ok(obj) if obj.is_account() => IdentityState::AccountFetch(obj),
                Ok(obj) => IdentityState::Done(record_from_object(sid, &obj)),
                Err(err) => IdentityState::HistoricalFallback(err),
            },
            IdentityState::AccountFetch(obj) => match batch.find_account(sid) {
                Ok(account) => {
                    let mut record = record_from_account(sid, &account, false);
                    record.object_class = sanitize(&obj.object_class.join(","));
                    IdentityState::Done(record)
                }
                Err(err) => {
                    // Tombstoned accounts are visible to the object lookup only.
                    tracing::debug!(sid, error = %err, deleted = obj.deleted, "account re-fetch failed");
                    IdentityState::Done(record_from_object(sid, &obj))
                }
            },
            IdentityState::HistoricalFallback(direct_err) => match batch.find_by_history(sid) {
                Ok(Some(account)) => IdentityState::Done(record_from_account(sid, &account, true)),
                Ok(None) => {
                    tracing::debug!(sid, direct = %direct_err, "identifier not in directory");
                    IdentityState::Done(AccountRecord::not_found(sid))
                }
                Err(err) => IdentityState::Done(AccountRecord::error(
                    sid,
                    sanitize(&format!("{direct_err}; history search: {err}")),
                )),
            },
            done @ IdentityState::Done(_) => done,
        }
    }
}

pub fn resolve_identifier(sid: &str, batch: &dyn DirectoryBatch) -> AccountRecord {
    let mut state = IdentityState::Direct;
    loop {
        state = match state {
            IdentityState::Done(record) => return record,
            other => other.step(sid, batch),
        };
    }
}

fn record_from_object(sid: &str, obj: &DirectoryObject) -> AccountRecord {
    AccountRecord {
        identifier: sid.to_string(),
        display_name: sanitize(&obj.display_name),
        account_name: if obj.is_account() {
            sanitize(&obj.account_name)
        } else {
            String::new()
        },
        email: if obj.is_account() {
            sanitize(&obj.email)
        } else {
            String::new()
        },
        enabled: false,
        distinguished_name: sanitize(&obj.distinguished_name),
        object_class: sanitize(&obj.object_class.join(",")),
        via_history: false,
        status: LookupStatus::Found,
        error: None,
    }
}

fn record_from_account(sid: &str, account: &AccountAttributes, via_history: bool) -> AccountRecord {
    AccountRecord {
        identifier: sid.to_string(),
        display_name: sanitize(&account.display_name),
        account_name: sanitize(&account.account_name),
        email: sanitize(&account.email),
        enabled: account.enabled,
        distinguished_name: sanitize(&account.distinguished_name),
        object_class: String::new(),
        via_history,
        status: LookupStatus::Found,
        error: None,
    }
}

/// Answers a backend collected for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub object: Result<DirectoryObject, LookupError>,
    pub account: Result<AccountAttributes, LookupError>,
    pub history: Result<Option<AccountAttributes>, LookupError>,
}

impl Default for SnapshotEntry {
    fn default() -> Self {
        Self {
            object: Err(LookupError::NotFound),
            account: Err(LookupError::NotFound),
            history: Ok(None),
        }
    }
}

/// A batch view backed by prefetched answers. Identifiers the backend never
/// answered for resolve to an error so they are retried on the next run.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    entries: HashMap<String, SnapshotEntry>,
}

impl DirectorySnapshot {
    pub fn insert(&mut self, sid: impl Into<String>, entry: SnapshotEntry) {
        self.entries.insert(sid.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn unanswered() -> LookupError {
        LookupError::Failed("no answer for identifier in directory response".to_string())
    }
}

impl DirectoryBatch for DirectorySnapshot {
    fn find_object(&self, sid: &str) -> Result<DirectoryObject, LookupError> {
        self.entries
            .get(sid)
            .map(|e| e.object.clone())
            .unwrap_or_else(|| Err(Self::unanswered()))
    }

    fn find_account(&self, sid: &str) -> Result<AccountAttributes, LookupError> {
        self.entries
            .get(sid)
            .map(|e| e.account.clone())
            .unwrap_or_else(|| Err(Self::unanswered()))
    }

    fn find_by_history(&self, sid: &str) -> Result<Option<AccountAttributes>, LookupError> {
        self.entries
            .get(sid)
            .map(|e| e.history.clone())
            .unwrap_or_else(|| Err(Self::unanswered()))
    }
}

pub struct DirectoryBatchLookup<'a> {
    service: &'a dyn DirectoryService,
    batch_size: usize,
    timeout: Duration,
}

impl<'a> DirectoryBatchLookup<'a> {
    pub fn new(service: &'a dyn DirectoryService, batch_size: usize, timeout: Duration) -> Self {
        Self {
            service,
            batch_size: batch_size.max(1),
            timeout,
        }
    }

    pub fn batches(&self, identifiers: &BTreeSet<String>) -> Vec<Vec<String>> {
        let all: Vec<String> = identifiers.iter().cloned().collect();
        all.chunks(self.batch_size).map(|c| c.to_vec()).collect()
    }

    /// One external query for the whole batch; failures below that are per identifier.
    pub fn resolve_batch(
        &self,
        batch: &[String],
    ) -> Result<BTreeMap<String, AccountRecord>, BatchError> {
        let view = self.service.open_batch(batch, self.timeout)?;
        Ok(batch
            .iter()
            .map(|sid| (sid.clone(), resolve_identifier(sid, view.as_ref())))
            .collect())
    }
}
