//! End-to-end pipeline tests.
//!
//! Each test builds a complete working directory (fact table, ledger,
//! approved files, config) under a tempdir and runs the pipeline
//! without network access or credentials.

use std::path::Path;

use datagate::{run_pipeline, PipelineConfig};
use datagate_ingest::{ApprovalLedger, ApprovalRecord, ApprovalStatus};
use datagate_research::ResearchConfig;

const FACT_CSV: &str = "fips,year,county_name_norm,state,ALICE_pct\n\
                        13001,2023,appling,Georgia,0.31\n\
                        13003,2023,atkinson,Georgia,0.44\n\
                        13005,2023,bacon,Georgia,0.27\n";

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

fn approved_entry(name: &str, local_file: Option<&str>) -> ApprovalRecord {
    ApprovalRecord {
        name: name.to_string(),
        source_url: Some("https://example.com/source".to_string()),
        join_keys: vec!["fips".to_string(), "year".to_string()],
        status: ApprovalStatus::Approved,
        approved_at: Some("2026-01-01T00:00:00+00:00".to_string()),
        local_file: local_file.map(String::from),
        allow_low_match_override: false,
    }
}

/// Offline config rooted in a tempdir; the credential variable is
/// never set, so the retriever degrades to the cached fallback.
fn offline_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.fact_table = root.join("fact.csv");
    config.ledger = root.join("approval_ledger.yaml");
    config.tables_dir = root.join("out/tables");
    config.logs_dir = root.join("out/logs");
    config.hitl_mode = "auto_reject".to_string();
    config.research = ResearchConfig {
        cache_dir: root.join("cache"),
        api_key_env: "DATAGATE_INTEGRATION_UNSET_KEY".to_string(),
        ..ResearchConfig::default()
    };
    config.ingest.approved_data_dir = root.join("approved");
    config
}

#[tokio::test]
async fn test_offline_run_admits_preapproved_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    write(&config.fact_table, FACT_CSV);
    write(
        &config.ingest.approved_data_dir.join("housing_cost.csv"),
        "fips,year,median_rent\n13001,2023,900\n13003,2023,850\n",
    );
    let ledger = ApprovalLedger {
        approved_datasets: vec![approved_entry("Housing Cost", None)],
    };
    ledger.save_atomic(&config.ledger).unwrap();

    let summary = run_pipeline(&config).await.unwrap();
    assert_eq!(summary.fact_rows, 3);
    assert_eq!(summary.datasets_used, 1);
    assert_eq!(summary.datasets_blocked, 0);
    // Fallback retriever recommends nothing.
    assert_eq!(summary.datasets_recommended, 0);
    assert_eq!(summary.ledger_entries, 1);

    let enriched =
        std::fs::read_to_string(config.tables_dir.join("fact_enriched.csv")).unwrap();
    let header = enriched.lines().next().unwrap();
    assert!(header.contains("ext_housing_cost__median_rent"));
    assert_eq!(enriched.lines().count(), 4);

    let join_audit =
        std::fs::read_to_string(config.tables_dir.join("join_audit.csv")).unwrap();
    assert!(join_audit.contains("Housing Cost"));
    assert!(join_audit.contains(",used"));

    let provenance =
        std::fs::read_to_string(config.tables_dir.join("provenance.csv")).unwrap();
    // Header, the provided fact-table input, and the ledger entry.
    assert_eq!(provenance.lines().count(), 3);
    assert!(provenance
        .lines()
        .nth(1)
        .unwrap()
        .starts_with("fact_table,"));
    assert!(provenance.contains(",provided,"));

    let log = std::fs::read_to_string(config.run_log_path()).unwrap();
    for event in [
        "pipeline_start",
        "hitl_mode_selected",
        "external_ingest_used",
        "pipeline_complete",
    ] {
        assert!(log.contains(event), "run log missing {}", event);
    }

    // The credential fallback was cached.
    let cache_entries = std::fs::read_dir(&config.research.cache_dir).unwrap().count();
    assert_eq!(cache_entries, 1);
}

#[tokio::test]
async fn test_offline_run_blocks_low_match_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = offline_config(dir.path());
    config.ingest.min_match_rate = 0.9;
    write(&config.fact_table, FACT_CSV);
    write(
        &config.ingest.approved_data_dir.join("sparse.csv"),
        "fips,year,x\n13001,2023,1\n",
    );
    let ledger = ApprovalLedger {
        approved_datasets: vec![approved_entry("Sparse", None)],
    };
    ledger.save_atomic(&config.ledger).unwrap();

    let summary = run_pipeline(&config).await.unwrap();
    assert_eq!(summary.datasets_used, 0);
    assert_eq!(summary.datasets_blocked, 1);

    let enriched =
        std::fs::read_to_string(config.tables_dir.join("fact_enriched.csv")).unwrap();
    assert!(!enriched.contains("ext_"));
    assert_eq!(enriched.lines().count(), 4);

    let join_audit =
        std::fs::read_to_string(config.tables_dir.join("join_audit.csv")).unwrap();
    assert!(join_audit.contains("below threshold"));
    let log = std::fs::read_to_string(config.run_log_path()).unwrap();
    assert!(log.contains("external_ingest_blocked"));
}

#[tokio::test]
async fn test_repeat_runs_are_stable() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    write(&config.fact_table, FACT_CSV);
    write(
        &config.ingest.approved_data_dir.join("housing_cost.csv"),
        "fips,year,median_rent\n13001,2023,900\n",
    );
    let ledger = ApprovalLedger {
        approved_datasets: vec![approved_entry("Housing Cost", Some("housing_cost.csv"))],
    };
    ledger.save_atomic(&config.ledger).unwrap();

    let first = run_pipeline(&config).await.unwrap();
    let second = run_pipeline(&config).await.unwrap();
    assert_eq!(first.ledger_entries, second.ledger_entries);
    assert_eq!(first.datasets_used, second.datasets_used);

    // The second run hit the cache instead of creating a new entry,
    // and the ledger gained nothing.
    let cache_entries = std::fs::read_dir(&config.research.cache_dir).unwrap().count();
    assert_eq!(cache_entries, 1);
    let reloaded = ApprovalLedger::load(&config.ledger).unwrap();
    assert_eq!(reloaded.approved_datasets.len(), 1);
    assert_eq!(
        reloaded.approved_datasets[0].status,
        ApprovalStatus::Approved
    );
}

#[tokio::test]
async fn test_integrity_warnings_reach_run_log() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    // Duplicate (fips, year) key and a malformed code.
    write(
        &config.fact_table,
        "fips,year,x\n13001,2023,1\n13001,2023,2\nbad,2023,3\n",
    );
    ApprovalLedger::default().save_atomic(&config.ledger).unwrap();

    run_pipeline(&config).await.unwrap();
    let log = std::fs::read_to_string(config.run_log_path()).unwrap();
    assert!(log.contains("integrity_warning"));
    assert!(log.contains("duplicate (fips, year)"));
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        "fact_table: data/fact.csv\n\
         ledger: data/ledger.yaml\n\
         hitl_mode: interactive\n\
         ingest:\n  min_match_rate: 0.6\n\
         research:\n  max_retries: 1\n",
    )
    .unwrap();
    let config = PipelineConfig::load(&path).unwrap();
    assert_eq!(config.ingest.min_match_rate, 0.6);
    assert_eq!(config.research.max_retries, 1);
}
