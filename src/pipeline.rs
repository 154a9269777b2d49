//! Pipeline Driver
//!
//! Wires one run end to end: load the fact table, check join-key
//! discipline, ask the retriever for recommendations, run the approval
//! gate, admit approved datasets, and write the exports. Every stage
//! reports into the append-only run log.

use anyhow::{Context, Result};
use serde_json::json;

use datagate_core::audit::{AuditEventKind, AuditLog};
use datagate_core::{Table, Value};
use datagate_ingest::{approval_gate, ingest_approved_datasets, JoinOutcome};
use datagate_research::run_research_agent;

use crate::config::PipelineConfig;
use crate::export;

/// What one run produced, for console reporting.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub fact_rows: usize,
    pub datasets_recommended: usize,
    pub ledger_entries: usize,
    pub datasets_used: usize,
    pub datasets_blocked: usize,
}

/// Run the full admission pipeline under one configuration.
pub async fn run_pipeline(config: &PipelineConfig) -> Result<RunSummary> {
    // Mode parse errors surface before any filesystem side effects.
    let mode = config.hitl_mode()?;
    std::fs::create_dir_all(&config.tables_dir)
        .with_context(|| format!("creating {}", config.tables_dir.display()))?;
    std::fs::create_dir_all(&config.logs_dir)
        .with_context(|| format!("creating {}", config.logs_dir.display()))?;

    let audit = AuditLog::new(config.run_log_path());
    audit.append(AuditEventKind::PipelineStart);

    let fact = Table::from_csv_path(&config.fact_table)
        .with_context(|| format!("loading fact table {}", config.fact_table.display()))?;
    tracing::info!(
        "fact table loaded: {} rows, {} columns",
        fact.n_rows(),
        fact.n_cols()
    );
    for warning in fact_integrity_warnings(&fact) {
        tracing::warn!("{}", warning);
        audit.append(AuditEventKind::IntegrityWarning { message: warning });
    }

    let excerpt = read_instructions(config);
    let summary = summarize_fact(&fact);
    let research = run_research_agent(&config.research, &excerpt, &summary, &audit).await;
    tracing::info!(
        "retriever returned {} dataset recommendations",
        research.recommended_datasets.len()
    );
    let transcript_path = config.logs_dir.join("research_output.json");
    if let Ok(text) = serde_json::to_string_pretty(&research) {
        if let Err(e) = std::fs::write(&transcript_path, text) {
            tracing::warn!(
                "failed to write retriever transcript {}: {}",
                transcript_path.display(),
                e
            );
        }
    }

    let ledger = approval_gate(&research.recommended_datasets, &config.ledger, mode, &audit)
        .with_context(|| format!("updating ledger {}", config.ledger.display()))?;

    let (enriched, records) = ingest_approved_datasets(&fact, &ledger, &config.ingest, &audit);

    let mut provided = vec![(
        "fact_table".to_string(),
        config.fact_table.display().to_string(),
    )];
    if let Some(instructions) = &config.instructions {
        provided.push(("instructions".to_string(), instructions.display().to_string()));
    }

    export::write_join_audit(&records, &config.tables_dir.join("join_audit.csv"))?;
    export::write_provenance(
        &provided,
        &ledger,
        &records,
        &config.tables_dir.join("provenance.csv"),
    )?;
    export::write_enriched(&enriched, &config.tables_dir.join("fact_enriched.csv"))?;

    audit.append(AuditEventKind::PipelineComplete);
    Ok(RunSummary {
        fact_rows: enriched.n_rows(),
        datasets_recommended: research.recommended_datasets.len(),
        ledger_entries: ledger.approved_datasets.len(),
        datasets_used: records
            .iter()
            .filter(|r| r.join_outcome == JoinOutcome::Used)
            .count(),
        datasets_blocked: records
            .iter()
            .filter(|r| r.join_outcome == JoinOutcome::Blocked)
            .count(),
    })
}

/// Join-key discipline checks on the fact table. Warnings, not errors:
/// a degraded fact table still runs, it just joins poorly.
fn fact_integrity_warnings(fact: &Table) -> Vec<String> {
    let mut warnings = Vec::new();
    let (fips, year) = match (fact.column_index("fips"), fact.column_index("year")) {
        (Some(f), Some(y)) => (f, y),
        _ => {
            warnings.push("fact table lacks fips/year join columns".to_string());
            return warnings;
        }
    };

    let mut bad_fips = 0usize;
    let mut bad_year = 0usize;
    for row in 0..fact.n_rows() {
        let code = fact.value(row, fips).key_repr();
        if code.len() != 5 || !code.chars().all(|c| c.is_ascii_digit()) {
            bad_fips += 1;
        }
        if fact.value(row, year).as_i64().is_none() {
            bad_year += 1;
        }
    }
    if bad_fips > 0 {
        warnings.push(format!("{} fips values are not 5-digit codes", bad_fips));
    }
    if bad_year > 0 {
        warnings.push(format!("{} year values are not integers", bad_year));
    }

    let distinct = fact.distinct_keys(&[fips, year]).len();
    if distinct < fact.n_rows() {
        warnings.push(format!(
            "{} duplicate (fips, year) keys in fact table",
            fact.n_rows() - distinct
        ));
    }
    warnings
}

/// Compact numeric summary sent to the retriever. Deterministic for a
/// fixed fact table: it feeds the content-addressed cache key.
fn summarize_fact(fact: &Table) -> serde_json::Value {
    let mut numeric = serde_json::Map::new();
    for (idx, name) in fact.columns().iter().enumerate() {
        let values: Vec<f64> = (0..fact.n_rows())
            .filter_map(|row| match fact.value(row, idx) {
                Value::Int(i) => Some(*i as f64),
                Value::Float(f) if f.is_finite() => Some(*f),
                _ => None,
            })
            .collect();
        if values.is_empty() {
            continue;
        }
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        numeric.insert(
            name.clone(),
            json!({"min": min, "max": max, "mean": mean, "count": values.len()}),
        );
    }

    let counties = fact
        .column_index("fips")
        .map(|f| fact.distinct_keys(&[f]).len());
    json!({
        "rows": fact.n_rows(),
        "columns": fact.columns(),
        "counties": counties,
        "numeric": numeric,
    })
}

/// Read the instructions-document excerpt; a missing document is not
/// an error, just an empty excerpt.
fn read_instructions(config: &PipelineConfig) -> String {
    match &config.instructions {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("instructions {} unreadable: {}", path.display(), e);
                String::new()
            }
        },
        None => String::new(),
    }
}
