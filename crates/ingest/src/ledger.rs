//! Approval Ledger and HITL State Machine
//!
//! The ledger is the sole source of truth for what may be joined into
//! the fact table. It is a YAML document with a top-level
//! `approved_datasets` list, one record per dataset name, persisted
//! across runs and rewritten atomically on every change.
//!
//! Admission decisions are sticky: once a name exists in the ledger it
//! is never reconsidered by the gate, regardless of mode, until an
//! operator changes it through the explicit update path.

use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use datagate_core::audit::{AuditEventKind, AuditLog};
use datagate_core::{now_iso, CoreError};
use datagate_research::RecommendedDataset;

use crate::error::IngestResult;

/// Approval status of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Cleared for ingestion
    Approved,
    /// Declined, or awaiting an out-of-band decision
    RejectedOrPending,
    /// Parked for an operator UI to decide
    PendingUserInput,
}

impl ApprovalStatus {
    /// Stable snake_case name, as written to exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::RejectedOrPending => "rejected_or_pending",
            ApprovalStatus::PendingUserInput => "pending_user_input",
        }
    }
}

/// Human-in-the-loop operating mode for the approval gate.
///
/// Parsed from a closed set of strings; anything else is a fatal
/// configuration error raised before any I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitlMode {
    /// Record every new recommendation as rejected_or_pending
    AutoReject,
    /// Record every new recommendation as pending_user_input for a
    /// separate operator surface
    NoninteractiveUi,
    /// Prompt on the terminal; falls back to `NoninteractiveUi` when
    /// stdin is not a TTY
    Interactive,
}

impl HitlMode {
    /// The canonical configuration string for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            HitlMode::AutoReject => "auto_reject",
            HitlMode::NoninteractiveUi => "noninteractive_ui",
            HitlMode::Interactive => "interactive",
        }
    }
}

impl FromStr for HitlMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto_reject" => Ok(HitlMode::AutoReject),
            // Accepted alias kept for existing configurations.
            "noninteractive_ui" | "noninteractive_prompt" => Ok(HitlMode::NoninteractiveUi),
            "interactive" => Ok(HitlMode::Interactive),
            other => Err(CoreError::config(format!(
                "unsupported hitl_mode: {} (expected auto_reject, noninteractive_ui, or interactive)",
                other
            ))),
        }
    }
}

/// One durable approval decision, keyed by dataset name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    /// Dataset name (unique within the ledger)
    pub name: String,
    /// First suggested source URL, if any
    #[serde(default)]
    pub source_url: Option<String>,
    /// Join keys copied from the recommendation at admission time
    pub join_keys: Vec<String>,
    /// Current status
    pub status: ApprovalStatus,
    /// Set iff status is `approved`
    #[serde(default)]
    pub approved_at: Option<String>,
    /// Operator-supplied mapping to a physical file
    #[serde(default)]
    pub local_file: Option<String>,
    /// Operator override for the minimum match-rate policy
    #[serde(default)]
    pub allow_low_match_override: bool,
}

impl ApprovalRecord {
    /// Build a record from a recommendation with normalized
    /// `approved_at`: timestamped iff approved.
    pub fn from_recommendation(item: &RecommendedDataset, status: ApprovalStatus) -> Self {
        let mut record = Self {
            name: item.name.clone(),
            source_url: item.suggested_sources.first().cloned(),
            join_keys: item.join_keys.clone(),
            status,
            approved_at: None,
            local_file: None,
            allow_low_match_override: false,
        };
        record.set_status(status);
        record
    }

    /// Transition to a new status, keeping `approved_at` consistent:
    /// set on entry to `approved`, cleared on any transition away.
    pub fn set_status(&mut self, status: ApprovalStatus) {
        self.status = status;
        self.approved_at = match status {
            ApprovalStatus::Approved => Some(now_iso()),
            _ => None,
        };
    }
}

/// The durable approval ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalLedger {
    #[serde(default)]
    pub approved_datasets: Vec<ApprovalRecord>,
}

impl ApprovalLedger {
    /// Load the ledger, treating a missing file as an empty ledger.
    pub fn load(path: &Path) -> IngestResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Rewrite the whole ledger atomically: serialize to a sibling
    /// temp file, then rename over the target so a crash mid-write
    /// cannot leave a half-updated file readable by the next run.
    pub fn save_atomic(&self, path: &Path) -> IngestResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = serde_yaml::to_string(self)?;
        let temp_path = path.with_extension("yaml.tmp");
        std::fs::write(&temp_path, text)?;
        // rename replaces the target in one step on Unix, so there is
        // no moment where the ledger is missing. The fallback covers
        // platforms where rename cannot replace an existing file.
        if std::fs::rename(&temp_path, path).is_err() {
            std::fs::remove_file(path).ok();
            std::fs::rename(&temp_path, path)?;
        }
        Ok(())
    }

    /// Whether a dataset name already has a decision.
    pub fn contains(&self, name: &str) -> bool {
        self.approved_datasets.iter().any(|r| r.name == name)
    }

    /// Look up a record by name.
    pub fn get(&self, name: &str) -> Option<&ApprovalRecord> {
        self.approved_datasets.iter().find(|r| r.name == name)
    }

    /// Mutable lookup by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ApprovalRecord> {
        self.approved_datasets.iter_mut().find(|r| r.name == name)
    }
}

/// Run the approval gate over a batch of recommendations.
///
/// Loads the ledger at `ledger_path`, appends one normalized entry per
/// not-yet-seen recommendation name (skipping nameless entries),
/// rewrites the whole file atomically on every call, and returns the
/// in-memory ledger. Existing entries are never removed, reordered, or
/// re-decided.
pub fn approval_gate(
    recommendations: &[RecommendedDataset],
    ledger_path: &Path,
    mode: HitlMode,
    audit: &AuditLog,
) -> IngestResult<ApprovalLedger> {
    audit.append(AuditEventKind::HitlModeSelected {
        mode: mode.as_str().to_string(),
    });

    let effective = match mode {
        HitlMode::Interactive if !std::io::stdin().is_terminal() => {
            tracing::info!("interactive mode without a TTY; parking new entries as pending");
            HitlMode::NoninteractiveUi
        }
        other => other,
    };

    let mut ledger = ApprovalLedger::load(ledger_path)?;
    for item in recommendations {
        if item.name.is_empty() || ledger.contains(&item.name) {
            continue;
        }
        let status = match effective {
            HitlMode::AutoReject => ApprovalStatus::RejectedOrPending,
            HitlMode::NoninteractiveUi => ApprovalStatus::PendingUserInput,
            HitlMode::Interactive => prompt_operator(item)?,
        };
        ledger
            .approved_datasets
            .push(ApprovalRecord::from_recommendation(item, status));
    }
    ledger.save_atomic(ledger_path)?;
    Ok(ledger)
}

/// Ask the operator for a yes/no decision on one recommendation.
fn prompt_operator(item: &RecommendedDataset) -> IngestResult<ApprovalStatus> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "Dataset recommendation: {}", item.name)?;
    writeln!(stdout, "Purpose: {}", item.purpose)?;
    write!(stdout, "Approve dataset for ingestion? [y/N]: ")?;
    stdout.flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    if answer.trim().eq_ignore_ascii_case("y") {
        Ok(ApprovalStatus::Approved)
    } else {
        Ok(ApprovalStatus::RejectedOrPending)
    }
}

/// Out-of-band operator edit of a single ledger entry by name.
///
/// This is the update path the external operator surface drives; it is
/// the only way an existing decision changes. Applies the same
/// `approved_at` normalization and atomic rewrite as the gate.
pub fn update_ledger_entry(
    ledger_path: &Path,
    name: &str,
    status: ApprovalStatus,
    local_file: Option<String>,
    allow_low_match_override: Option<bool>,
) -> IngestResult<ApprovalLedger> {
    let mut ledger = ApprovalLedger::load(ledger_path)?;
    let record = ledger.get_mut(name).ok_or_else(|| {
        CoreError::not_found(format!("no ledger entry named {}", name))
    })?;
    record.set_status(status);
    if local_file.is_some() {
        record.local_file = local_file;
    }
    if let Some(flag) = allow_low_match_override {
        record.allow_low_match_override = flag;
    }
    ledger.save_atomic(ledger_path)?;
    Ok(ledger)
}
