use crate::domain::constants::{
    MARKER_NOT_FOUND, MARKER_QUERY_ERROR, MARKER_TRANSLATE_ERROR, REPORT_NAME_ERROR,
    REPORT_NAME_NOT_FOUND,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

fn is_false(v: &bool) -> bool {
    !*v
}

/// Older caches stored raw directory output, where any attribute may be `null`.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

#[derive(Serialize)]
pub struct JsonOut<T: Serialize> {
    pub ok: bool,
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureMarker {
    NotFound,
    TranslateError,
    QueryError,
}

impl FailureMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureMarker::NotFound => MARKER_NOT_FOUND,
            FailureMarker::TranslateError => MARKER_TRANSLATE_ERROR,
            FailureMarker::QueryError => MARKER_QUERY_ERROR,
        }
    }
}

impl fmt::Display for FailureMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an owner lookup: a security identifier or one of the failure markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerIdentifier {
    Sid(String),
    Failed(FailureMarker),
}

impl OwnerIdentifier {
    pub fn as_str(&self) -> &str {
        match self {
            OwnerIdentifier::Sid(sid) => sid,
            OwnerIdentifier::Failed(marker) => marker.as_str(),
        }
    }

    pub fn sid(&self) -> Option<&str> {
        match self {
            OwnerIdentifier::Sid(sid) => Some(sid),
            OwnerIdentifier::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipResult {
    pub path: String,
    pub identifier: OwnerIdentifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    #[default]
    Found,
    NotFound,
    Error,
}

/// Directory attributes for one identifier. This is also the cache file entry, so
/// the attribute names follow the directory's own spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(rename = "sid", default)]
    pub identifier: String,
    #[serde(rename = "name", default, deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(
        rename = "sAMAccountName",
        default,
        deserialize_with = "null_as_default"
    )]
    pub account_name: String,
    #[serde(rename = "mail", default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub enabled: bool,
    #[serde(
        rename = "distinguishedName",
        default,
        deserialize_with = "null_as_default"
    )]
    pub distinguished_name: String,
    #[serde(
        rename = "objectClass",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub object_class: String,
    #[serde(rename = "viaHistory", default, skip_serializing_if = "is_false")]
    pub via_history: bool,
    #[serde(default)]
    pub status: LookupStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AccountRecord {
    pub fn not_found(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            status: LookupStatus::NotFound,
            ..Self::default()
        }
    }

    pub fn error(identifier: &str, message: impl Into<String>) -> Self {
        Self {
            identifier: identifier.to_string(),
            status: LookupStatus::Error,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Value for the report's Name column.
    pub fn report_name(&self) -> &str {
        match self.status {
            LookupStatus::Found => &self.display_name,
            LookupStatus::NotFound => REPORT_NAME_NOT_FOUND,
            LookupStatus::Error => REPORT_NAME_ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub path: String,
    pub identifier: String,
    pub display_name: String,
    pub account_name: String,
    pub email: String,
}

impl ReportRow {
    pub fn new(result: &OwnershipResult, record: Option<&AccountRecord>) -> Self {
        let (display_name, account_name, email) = match record {
            Some(r) => (
                r.report_name().to_string(),
                r.account_name.clone(),
                r.email.clone(),
            ),
            None => Default::default(),
        };
        Self {
            path: result.path.clone(),
            identifier: result.identifier.as_str().to_string(),
            display_name,
            account_name,
            email,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OwnerFailureCounts {
    pub not_found: usize,
    pub translate_error: usize,
    pub query_error: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub paths: usize,
    pub owners_resolved: usize,
    pub owner_failures: OwnerFailureCounts,
    pub unique_identifiers: usize,
    pub cache_hits: usize,
    pub queried: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub found: usize,
    pub not_found: usize,
    pub errors: usize,
    pub report: PathBuf,
    pub cache: PathBuf,
    pub cache_entries: usize,
    pub cache_saved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnerLine {
    pub path: String,
    pub identifier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub path: PathBuf,
    pub entries: usize,
    pub found: usize,
    pub not_found: usize,
    pub via_history: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PruneReport {
    pub removed: usize,
    pub remaining: usize,
}
