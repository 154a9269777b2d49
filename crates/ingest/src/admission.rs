//! Join-Admission Engine
//!
//! Walks the approval ledger in order and, for every entry marked
//! `approved`, decides whether that dataset's columns may be merged
//! into the fact table: key-policy check, file resolution, format
//! check, normalization, key-level match-rate computation, and the
//! final admission decision. Every outcome (blocked at any step, or
//! used) produces exactly one audit record and one audit-log event;
//! blocked entries never touch the fact table.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use datagate_core::audit::{AuditEventKind, AuditLog};
use datagate_core::{slug, Table};

use crate::ledger::{ApprovalLedger, ApprovalStatus};
use crate::loader::{extension_allowed, extension_of, load_external_table, resolve_local_file};
use crate::normalize::prepare_joinable;

/// Direct join-key requirement: geographic code plus year.
const DIRECT_KEYS: [&str; 2] = ["fips", "year"];

/// Composite alternative when permitted by policy.
const COMPOSITE_KEYS: [&str; 3] = ["county_name_norm", "state", "year"];

/// Ingestion policy for the admission engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestPolicy {
    /// Directory the operator populates with physical dataset files
    pub approved_data_dir: PathBuf,
    /// Minimum acceptable fraction of fact-table keys covered
    pub min_match_rate: f64,
    /// Whether county/state/year composite keys may replace fips/year
    pub allow_county_state_year: bool,
}

impl Default for IngestPolicy {
    fn default() -> Self {
        Self {
            approved_data_dir: PathBuf::from("data/raw/approved"),
            min_match_rate: 0.5,
            allow_county_state_year: true,
        }
    }
}

/// Final disposition of one approved ledger entry in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOutcome {
    Used,
    Blocked,
}

impl JoinOutcome {
    /// Stable snake_case name, as written to exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinOutcome::Used => "used",
            JoinOutcome::Blocked => "blocked",
        }
    }
}

/// Per-run, per-entry audit record. Created fresh each run, never
/// mutated after the entry is processed, never persisted back into the
/// ledger.
#[derive(Debug, Clone, Serialize)]
pub struct JoinAuditRecord {
    pub dataset_name: String,
    pub local_file: Option<String>,
    /// Declared keys until resolution, then the resolved concrete set
    pub join_keys: String,
    pub rows_external: u64,
    pub rows_fact: u64,
    pub matched_rows: u64,
    pub match_rate: f64,
    /// Empty iff the dataset was admitted
    pub blocked_reason: String,
    pub approval_status: ApprovalStatus,
    pub join_outcome: JoinOutcome,
}

impl JoinAuditRecord {
    fn new(name: &str, declared_keys: &[String], rows_fact: u64) -> Self {
        Self {
            dataset_name: name.to_string(),
            local_file: None,
            join_keys: declared_keys.join(","),
            rows_external: 0,
            rows_fact,
            matched_rows: 0,
            match_rate: 0.0,
            blocked_reason: String::new(),
            approval_status: ApprovalStatus::Approved,
            join_outcome: JoinOutcome::Blocked,
        }
    }
}

/// Pick the concrete join-key set for a declared key list, or explain
/// why none is acceptable.
fn choose_join_keys(declared: &[String], allow_composite: bool) -> Result<Vec<String>, String> {
    let normalized: HashSet<String> = declared
        .iter()
        .map(|k| k.trim().to_lowercase())
        .collect();
    if DIRECT_KEYS.iter().all(|k| normalized.contains(*k)) {
        return Ok(DIRECT_KEYS.iter().map(|k| k.to_string()).collect());
    }
    if allow_composite && COMPOSITE_KEYS.iter().all(|k| normalized.contains(*k)) {
        return Ok(COMPOSITE_KEYS.iter().map(|k| k.to_string()).collect());
    }
    if allow_composite {
        Err(
            "unsupported join keys: must include either [fips, year] or [county_name_norm, state, year]"
                .to_string(),
        )
    } else {
        Err("unsupported join keys: must include [fips, year] (county/state/year joins disabled by policy)"
            .to_string())
    }
}

/// Column indices for the named keys, or the list of missing names.
fn key_indices(table: &Table, keys: &[String]) -> Result<Vec<usize>, Vec<String>> {
    let mut indices = Vec::with_capacity(keys.len());
    let mut missing = Vec::new();
    for key in keys {
        match table.column_index(key) {
            Some(idx) => indices.push(idx),
            None => missing.push(key.clone()),
        }
    }
    if missing.is_empty() {
        Ok(indices)
    } else {
        Err(missing)
    }
}

/// Process every approved ledger entry against the fact table.
///
/// Returns the augmented fact table and one audit record per approved
/// entry, in ledger order. The fact table's row count and row identity
/// are invariant: admitted datasets only append namespaced columns.
pub fn ingest_approved_datasets(
    fact: &Table,
    ledger: &ApprovalLedger,
    policy: &IngestPolicy,
    audit: &AuditLog,
) -> (Table, Vec<JoinAuditRecord>) {
    let mut enriched = fact.clone();
    let mut records = Vec::new();

    for entry in &ledger.approved_datasets {
        if entry.status != ApprovalStatus::Approved {
            continue;
        }
        let record = admit_one(&mut enriched, entry, policy, audit, fact.n_rows() as u64);
        records.push(record);
    }
    (enriched, records)
}

fn admit_one(
    enriched: &mut Table,
    entry: &crate::ledger::ApprovalRecord,
    policy: &IngestPolicy,
    audit: &AuditLog,
    rows_fact: u64,
) -> JoinAuditRecord {
    let name = &entry.name;
    let mut record = JoinAuditRecord::new(name, &entry.join_keys, rows_fact);

    let block = |mut record: JoinAuditRecord,
                 reason: String,
                 match_rate: Option<f64>,
                 audit: &AuditLog| {
        tracing::warn!("external dataset blocked: {}: {}", record.dataset_name, reason);
        audit.append(AuditEventKind::ExternalIngestBlocked {
            dataset: record.dataset_name.clone(),
            reason: reason.clone(),
            match_rate,
        });
        record.blocked_reason = reason;
        record.join_outcome = JoinOutcome::Blocked;
        record
    };

    // 1. Key policy, before any file I/O.
    let keys = match choose_join_keys(&entry.join_keys, policy.allow_county_state_year) {
        Ok(keys) => keys,
        Err(reason) => return block(record, reason, None, audit),
    };
    record.join_keys = keys.join(",");

    // 2. File resolution.
    let local_file = match resolve_local_file(
        name,
        &policy.approved_data_dir,
        entry.local_file.as_deref(),
    ) {
        Some(path) => path,
        None => {
            let reason = format!(
                "no mapped local file in {}",
                policy.approved_data_dir.display()
            );
            return block(record, reason, None, audit);
        }
    };
    record.local_file = Some(local_file.display().to_string());

    // 3. Format allow-list.
    if !extension_allowed(&local_file) {
        let reason = format!(
            "unsupported extension .{}",
            extension_of(&local_file).unwrap_or_default()
        );
        return block(record, reason, None, audit);
    }

    // 4. Load + normalization.
    let external = match load_external_table(&local_file).and_then(|t| Ok(prepare_joinable(&t)?)) {
        Ok(table) => table,
        Err(e) => return block(record, format!("failed to load file: {}", e), None, audit),
    };

    let ext_keys = match key_indices(&external, &keys) {
        Ok(indices) => indices,
        Err(missing) => {
            let reason = format!("missing join columns: {}", missing.join(","));
            return block(record, reason, None, audit);
        }
    };
    let fact_keys = match key_indices(enriched, &keys) {
        Ok(indices) => indices,
        Err(missing) => {
            let reason = format!("fact table missing join columns: {}", missing.join(","));
            return block(record, reason, None, audit);
        }
    };

    // 5. Dedup + match rate over the fact table's distinct keys. The
    // question is population coverage, not external-row usefulness, so
    // external row cardinality never enters the denominator.
    let dedup = external.dedup_on(&ext_keys);
    let external_key_set: HashSet<Vec<String>> =
        dedup.distinct_keys(&ext_keys).into_iter().collect();
    let fact_distinct = enriched.distinct_keys(&fact_keys);
    let matched = fact_distinct
        .iter()
        .filter(|key| external_key_set.contains(*key))
        .count();
    let match_rate = if fact_distinct.is_empty() {
        0.0
    } else {
        matched as f64 / fact_distinct.len() as f64
    };

    record.rows_external = dedup.n_rows() as u64;
    record.matched_rows = matched as u64;
    record.match_rate = match_rate;

    // 6. Admission decision.
    if match_rate < policy.min_match_rate && !entry.allow_low_match_override {
        let reason = format!(
            "match_rate={:.3} below threshold={:.3}",
            match_rate, policy.min_match_rate
        );
        return block(record, reason, Some(match_rate), audit);
    }

    // 7. Namespace and merge.
    let prefix = format!("ext_{}__", slug(name));
    let mut renamed = dedup;
    let key_set: HashSet<usize> = ext_keys.iter().copied().collect();
    let renames: Vec<(String, String)> = renamed
        .columns()
        .iter()
        .enumerate()
        .filter(|(idx, _)| !key_set.contains(idx))
        .map(|(_, col)| (col.clone(), format!("{}{}", prefix, col)))
        .collect();
    for (from, to) in renames {
        renamed.rename_column(&from, to);
    }

    match enriched.left_join_unique(&renamed, &fact_keys, &ext_keys) {
        Ok(joined) => *enriched = joined,
        Err(e) => {
            return block(record, format!("merge failed: {}", e), Some(match_rate), audit)
        }
    }

    record.join_outcome = JoinOutcome::Used;
    audit.append(AuditEventKind::ExternalIngestUsed {
        dataset: name.clone(),
        local_file: record.local_file.clone().unwrap_or_default(),
        match_rate,
    });
    record
}
