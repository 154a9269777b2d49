//! Datagate Ingest
//!
//! The admission-control half of the pipeline: the durable approval
//! ledger with its HITL state machine, external file resolution and
//! loading, join-key normalization, and the join-admission engine that
//! decides whether an approved dataset's columns enter the fact table.
//!
//! ## Module Organization
//!
//! - `ledger` - Approval ledger, HITL modes, sticky `approval_gate`
//! - `loader` - Local file resolution + CSV/XLSX/ZIP loading
//! - `normalize` - Joinable-frame derivation (fips/year/county/state)
//! - `admission` - Per-entry join-admission engine and audit records

pub mod admission;
pub mod error;
pub mod ledger;
pub mod loader;
pub mod normalize;

pub use admission::{ingest_approved_datasets, IngestPolicy, JoinAuditRecord, JoinOutcome};
pub use error::{IngestError, IngestResult};
pub use ledger::{
    approval_gate, update_ledger_entry, ApprovalLedger, ApprovalRecord, ApprovalStatus, HitlMode,
};
pub use loader::{load_external_table, resolve_local_file};
