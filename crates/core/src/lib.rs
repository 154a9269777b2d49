//! Datagate Core
//!
//! Foundational types for the Datagate workspace: error types, the
//! append-only audit log, content-addressed payload hashing, the
//! minimal in-memory table model, and key-normalization helpers.
//! This crate has zero dependencies on the pipeline stages (research
//! retriever, approval ledger, join-admission engine).
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `audit` - Append-only JSONL audit log and event kinds
//! - `hash` - Canonical SHA-256 content addressing
//! - `table` - Row-major typed table (`Value`, `Table`)
//! - `text` - Slug, county-name, and FIPS normalization

pub mod audit;
pub mod error;
pub mod hash;
pub mod table;
pub mod text;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Audit Log ──────────────────────────────────────────────────────────
pub use audit::{AuditEvent, AuditEventKind, AuditLog};

// ── Content Addressing ─────────────────────────────────────────────────
pub use hash::hash_payload;

// ── Table Model ────────────────────────────────────────────────────────
pub use table::{csv_escape, Table, Value};

// ── Normalization Helpers ──────────────────────────────────────────────
pub use text::{normalize_county_name, pad_fips, slug};

/// Current UTC time as an RFC 3339 string, the timestamp format used
/// across the ledger and audit log.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}
