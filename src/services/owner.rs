use crate::domain::models::{FailureMarker, OwnerIdentifier};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Access-control capability the resolver needs from the operating system.
pub trait OwnerQuery: Send + Sync {
    /// Owner principal recorded in the path's security descriptor, `None` when the
    /// path does not exist.
    fn owner_of(&self, path: &str) -> Result<Option<String>, OwnerQueryError>;

    /// Maps an account name (`DOMAIN\user`) to its security identifier.
    fn translate(&self, principal: &str) -> Result<String, OwnerQueryError>;
}

#[derive(thiserror::Error, Debug)]
pub enum OwnerQueryError {
    #[error("access denied: {0}")]
    PermissionDenied(String),
    #[error("cannot translate {principal}: {message}")]
    Translate { principal: String, message: String },
    #[error("owner query timed out after {0:?}")]
    Timeout(Duration),
    #[error("owner query failed: {0}")]
    Query(String),
}

impl OwnerQueryError {
    pub fn marker(&self) -> FailureMarker {
        match self {
            OwnerQueryError::Translate { .. } => FailureMarker::TranslateError,
            _ => FailureMarker::QueryError,
        }
    }
}

fn canonical_sid() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^S-\d-\d+-(\d+-){1,14}\d+$").expect("static sid pattern"))
}

fn any_sid() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^S-\d+-\d+(-\d+)*$").expect("static sid pattern"))
}

/// Owner strings in this shape are taken as already resolved.
pub fn is_canonical_sid(value: &str) -> bool {
    canonical_sid().is_match(value)
}

/// Accepts short well-known identifiers (`S-1-5-18`) that translation can return.
pub fn is_sid(value: &str) -> bool {
    any_sid().is_match(value)
}

pub struct OwnerResolver<'a> {
    query: &'a dyn OwnerQuery,
}

impl<'a> OwnerResolver<'a> {
    pub fn new(query: &'a dyn OwnerQuery) -> Self {
        Self { query }
    }

    /// Never fails: every problem is folded into a failure marker and logged.
    pub fn resolve(&self, path: &str) -> OwnerIdentifier {
        let owner = match self.query.owner_of(path) {
            Ok(Some(owner)) => owner,
            Ok(None) => {
                tracing::debug!(path, "path does not exist");
                return OwnerIdentifier::Failed(FailureMarker::NotFound);
            }
            Err(err) => {
                tracing::warn!(path, error = %err, "owner query failed");
                return OwnerIdentifier::Failed(err.marker());
            }
        };

        let owner = owner.trim();
        if owner.is_empty() {
            tracing::warn!(path, "security descriptor has no owner");
            return OwnerIdentifier::Failed(FailureMarker::QueryError);
        }
        if is_canonical_sid(owner) {
            return OwnerIdentifier::Sid(owner.to_string());
        }

        match self.query.translate(owner) {
            Ok(sid) if is_sid(sid.trim()) => OwnerIdentifier::Sid(sid.trim().to_string()),
            Ok(other) => {
                tracing::warn!(path, owner, value = %other, "translation returned a non-identifier");
                OwnerIdentifier::Failed(FailureMarker::TranslateError)
            }
            Err(err) => {
                tracing::warn!(path, owner, error = %err, "owner translation failed");
                OwnerIdentifier::Failed(err.marker())
            }
        }
    }
}
