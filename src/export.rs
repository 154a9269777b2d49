//! CSV Exports
//!
//! Hand-written CSV emitters for the run's tabular outputs: the
//! per-entry join audit, the combined provenance table, and the
//! enriched fact table itself.

use std::path::Path;

use datagate_core::{csv_escape, CoreResult, Table};
use datagate_ingest::{ApprovalLedger, JoinAuditRecord, JoinOutcome};

/// Write one row per join-audit record.
pub fn write_join_audit(records: &[JoinAuditRecord], path: &Path) -> CoreResult<()> {
    let mut out = String::from(
        "dataset_name,local_file,join_keys,rows_external,rows_fact,matched_rows,\
         match_rate,blocked_reason,approval_status,join_outcome\n",
    );
    for r in records {
        let cells = [
            csv_escape(&r.dataset_name),
            csv_escape(r.local_file.as_deref().unwrap_or("")),
            csv_escape(&r.join_keys),
            r.rows_external.to_string(),
            r.rows_fact.to_string(),
            r.matched_rows.to_string(),
            format!("{:.4}", r.match_rate),
            csv_escape(&r.blocked_reason),
            r.approval_status.as_str().to_string(),
            r.join_outcome.as_str().to_string(),
        ];
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    write_text(path, &out)
}

/// Write the provenance table: the run's provided base inputs, then
/// every ledger entry joined with this run's outcome for it, answering
/// what external data the run could have used and what happened to it.
///
/// `provided` is a (name, source path) pair per base input; those rows
/// carry status `provided` and empty outcome cells.
pub fn write_provenance(
    provided: &[(String, String)],
    ledger: &ApprovalLedger,
    records: &[JoinAuditRecord],
    path: &Path,
) -> CoreResult<()> {
    let mut out = String::from(
        "dataset_name,source_url,join_keys,status,approved_at,local_file,\
         join_outcome,match_rate,blocked_reason\n",
    );
    for (name, source) in provided {
        let cells = [
            csv_escape(name),
            csv_escape(source),
            String::new(),
            "provided".to_string(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ];
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    for entry in &ledger.approved_datasets {
        let outcome = records.iter().find(|r| r.dataset_name == entry.name);
        let cells = [
            csv_escape(&entry.name),
            csv_escape(entry.source_url.as_deref().unwrap_or("")),
            csv_escape(&entry.join_keys.join(",")),
            entry.status.as_str().to_string(),
            csv_escape(entry.approved_at.as_deref().unwrap_or("")),
            csv_escape(match outcome {
                Some(r) => r.local_file.as_deref().unwrap_or(""),
                None => entry.local_file.as_deref().unwrap_or(""),
            }),
            match outcome {
                Some(r) => r.join_outcome.as_str().to_string(),
                None => String::new(),
            },
            match outcome {
                Some(r) => format!("{:.4}", r.match_rate),
                None => String::new(),
            },
            csv_escape(outcome.map(|r| r.blocked_reason.as_str()).unwrap_or("")),
        ];
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    write_text(path, &out)
}

/// Write the enriched fact table.
pub fn write_enriched(table: &Table, path: &Path) -> CoreResult<()> {
    table.write_csv(path)
}

fn write_text(path: &Path, text: &str) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use datagate_ingest::{ApprovalRecord, ApprovalStatus};

    fn record(name: &str, outcome: JoinOutcome, reason: &str) -> JoinAuditRecord {
        JoinAuditRecord {
            dataset_name: name.to_string(),
            local_file: Some(format!("approved/{}.csv", name)),
            join_keys: "fips,year".to_string(),
            rows_external: 2,
            rows_fact: 3,
            matched_rows: 2,
            match_rate: 2.0 / 3.0,
            blocked_reason: reason.to_string(),
            approval_status: ApprovalStatus::Approved,
            join_outcome: outcome,
        }
    }

    fn entry(name: &str, status: ApprovalStatus) -> ApprovalRecord {
        ApprovalRecord {
            name: name.to_string(),
            source_url: Some("https://example.com/data".to_string()),
            join_keys: vec!["fips".to_string(), "year".to_string()],
            status,
            approved_at: None,
            local_file: None,
            allow_low_match_override: false,
        }
    }

    #[test]
    fn test_join_audit_csv_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("join_audit.csv");
        write_join_audit(&[record("housing", JoinOutcome::Used, "")], &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("dataset_name,local_file"));
        let row = lines.next().unwrap();
        assert!(row.contains("housing"));
        assert!(row.contains("0.6667"));
        assert!(row.ends_with("approved,used"));
    }

    #[test]
    fn test_blocked_reason_with_comma_is_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("join_audit.csv");
        write_join_audit(
            &[record(
                "t",
                JoinOutcome::Blocked,
                "missing join columns: fips,year",
            )],
            &path,
        )
        .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"missing join columns: fips,year\""));
    }

    #[test]
    fn test_provenance_covers_all_ledger_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provenance.csv");
        let ledger = ApprovalLedger {
            approved_datasets: vec![
                entry("housing", ApprovalStatus::Approved),
                entry("pending_one", ApprovalStatus::PendingUserInput),
            ],
        };
        let records = vec![record("housing", JoinOutcome::Used, "")];
        write_provenance(&[], &ledger, &records, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        // Entry without a run outcome still appears, with empty outcome cells.
        let pending = text.lines().find(|l| l.starts_with("pending_one")).unwrap();
        assert!(pending.contains("pending_user_input"));
        assert!(pending.ends_with(",,,"));
    }

    #[test]
    fn test_provenance_lists_provided_inputs_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provenance.csv");
        let provided = vec![
            ("fact_table".to_string(), "data/fact.csv".to_string()),
            ("instructions".to_string(), "docs/brief.txt".to_string()),
        ];
        let ledger = ApprovalLedger {
            approved_datasets: vec![entry("housing", ApprovalStatus::Approved)],
        };
        let records = vec![record("housing", JoinOutcome::Used, "")];
        write_provenance(&provided, &ledger, &records, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        // Base inputs come before any ledger entry, flagged `provided`.
        assert!(lines[1].starts_with("fact_table,data/fact.csv,,provided,"));
        assert!(lines[2].starts_with("instructions,docs/brief.txt,,provided,"));
        assert!(lines[3].starts_with("housing,"));
    }
}
