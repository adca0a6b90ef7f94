//! Shared data model layer (structs/constants only).
//!
//! ## Purpose
//! - Keep record/report structs in one place.
//! - Avoid cyclic imports between the resolver, lookup and pipeline services.
//! - Make JSON output and cache schema changes explicit and reviewable.
//!
//! ## Files
//! - `models.rs`: ownership results, account records, report rows, run summaries.
//! - `constants.rs`: report header, failure markers, configuration defaults.
//!
//! ## Rule of thumb
//! Domain types should be data-only: no filesystem or subprocess side effects.
//!
//! ## Compatibility note
//! `AccountRecord` is the on-disk cache format and must keep loading caches written by
//! earlier releases. Keep schema-impacting changes synchronized with `docs/contracts/*`.

pub mod constants;
pub mod models;
