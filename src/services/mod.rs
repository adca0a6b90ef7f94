//! Service layer containing the audit pipeline and its collaborators.
//!
//! ## Service map
//! - `pipeline.rs`: the three stages: owners, identities, report rows.
//! - `owner.rs`: path to owner identifier, failures folded into markers.
//! - `directory.rs`: batched identity lookup and the per-identifier state machine.
//! - `cache.rs`: persistent identifier cache.
//! - `powershell.rs` / `fixture.rs`: concrete backends; `backend.rs` picks one.
//! - `report.rs`: input list parsing and report rendering.
//! - `sanitize.rs`: cleanup of directory attribute values.
//! - `config.rs`, `logging.rs`, `progress.rs`, `output.rs`: run plumbing.
//!
//! ## Conventions
//! - The pipeline only sees the `OwnerQuery` and `DirectoryService` traits.
//! - Per-item failures are data, never errors.
//! - Keep command handlers thin; delegate to services.

pub mod backend;
pub mod cache;
pub mod config;
pub mod directory;
pub mod fixture;
pub mod logging;
pub mod output;
pub mod owner;
pub mod pipeline;
pub mod powershell;
pub mod progress;
pub mod report;
pub mod sanitize;
