//! Append-Only Audit Log
//!
//! Structured forensic trail for a pipeline run: one JSON record per
//! line, each carrying a UTC timestamp and an internally tagged event
//! kind. The file is only ever appended to, never rewritten, so the
//! history of every admission decision and external-service failure
//! survives across runs.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Event kinds recorded in the audit log.
///
/// Serialized with an `event` tag in snake_case plus event-specific
/// fields, e.g. `{"event":"external_ingest_blocked","dataset":...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEventKind {
    /// A pipeline run started
    PipelineStart,
    /// A pipeline run completed all stages
    PipelineComplete,
    /// The research retriever returned a schema-valid object
    ResearchAgentSuccess { attempt: u32 },
    /// The research retriever got a parseable but schema-invalid reply
    ResearchAgentSchemaError { attempt: u32, errors: Vec<String> },
    /// The research retriever exhausted retries; raw response kept for
    /// forensic inspection
    ResearchAgentFailure { raw: String },
    /// The approval gate ran under the named HITL mode
    HitlModeSelected { mode: String },
    /// An approved dataset was blocked by the join-admission engine
    ExternalIngestBlocked {
        dataset: String,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        match_rate: Option<f64>,
    },
    /// An approved dataset was merged into the fact table
    ExternalIngestUsed {
        dataset: String,
        local_file: String,
        match_rate: f64,
    },
    /// A fact-table integrity check tripped
    IntegrityWarning { message: String },
}

/// A timestamped audit record as it appears on disk.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// RFC 3339 UTC timestamp
    pub ts: String,
    #[serde(flatten)]
    pub kind: AuditEventKind,
}

/// Handle to an append-only JSONL audit log file.
///
/// Appends are best-effort: a failed write is reported through
/// `tracing` and swallowed, because losing one forensic line must
/// never abort a run that is otherwise healthy.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Create a handle for the given log path. The file itself is
    /// created lazily on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event with the current timestamp.
    pub fn append(&self, kind: AuditEventKind) {
        let event = AuditEvent {
            ts: crate::now_iso(),
            kind,
        };
        if let Err(e) = self.append_record(&event) {
            tracing::warn!("audit log append failed ({}): {}", self.path.display(), e);
        }
    }

    fn append_record(&self, event: &AuditEvent) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let line = serde_json::to_string(event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_append_writes_tagged_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("run_log.jsonl"));
        log.append(AuditEventKind::PipelineStart);
        log.append(AuditEventKind::ExternalIngestBlocked {
            dataset: "Transport".to_string(),
            reason: "missing local file".to_string(),
            match_rate: None,
        });

        let lines = read_lines(log.path());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "pipeline_start");
        assert!(lines[0]["ts"].is_string());
        assert_eq!(lines[1]["event"], "external_ingest_blocked");
        assert_eq!(lines[1]["dataset"], "Transport");
        // match_rate omitted when absent
        assert!(lines[1].get("match_rate").is_none());
    }

    #[test]
    fn test_append_only_never_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("run_log.jsonl"));
        log.append(AuditEventKind::PipelineStart);
        log.append(AuditEventKind::PipelineComplete);
        let first = read_lines(log.path());

        // A second handle to the same file keeps the history.
        let log2 = AuditLog::new(log.path());
        log2.append(AuditEventKind::PipelineStart);
        let second = read_lines(log.path());
        assert_eq!(second.len(), first.len() + 1);
    }

    #[test]
    fn test_used_event_fields() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("log.jsonl"));
        log.append(AuditEventKind::ExternalIngestUsed {
            dataset: "Housing Cost".to_string(),
            local_file: "approved/housing_cost.csv".to_string(),
            match_rate: 0.667,
        });
        let lines = read_lines(log.path());
        assert_eq!(lines[0]["event"], "external_ingest_used");
        assert!((lines[0]["match_rate"].as_f64().unwrap() - 0.667).abs() < 1e-9);
    }
}
