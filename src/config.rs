//! Pipeline Configuration
//!
//! One YAML document drives a run: input paths, output directories,
//! the retriever section, the ingest policy, and the HITL mode. The
//! file is validated at load time; an unrecognized `hitl_mode` is a
//! fatal error, never a silent default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use datagate_core::{CoreError, CoreResult};
use datagate_ingest::{HitlMode, IngestPolicy};
use datagate_research::{Provider, ResearchConfig};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Prepared county/year fact table (CSV)
    pub fact_table: PathBuf,
    /// Instructions document fed to the retriever as an excerpt
    pub instructions: Option<PathBuf>,
    /// Durable approval ledger (YAML)
    pub ledger: PathBuf,
    /// Directory for tabular exports
    pub tables_dir: PathBuf,
    /// Directory for the run log and retriever transcript
    pub logs_dir: PathBuf,
    /// Approval-gate operating mode (closed string set)
    pub hitl_mode: String,
    /// Retriever section
    pub research: ResearchConfig,
    /// Join-admission policy section
    pub ingest: IngestPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fact_table: PathBuf::from("data/processed/fact_table.csv"),
            instructions: None,
            ledger: PathBuf::from("data/approval_ledger.yaml"),
            tables_dir: PathBuf::from("output/tables"),
            logs_dir: PathBuf::from("output/logs"),
            hitl_mode: "auto_reject".to_string(),
            research: ResearchConfig::default(),
            ingest: IngestPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&text)
            .map_err(|e| CoreError::config(format!("invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Startup-time validation of values serde cannot reject.
    pub fn validate(&self) -> CoreResult<()> {
        self.hitl_mode()?;
        if self.research.provider == Provider::Azure && self.research.azure_endpoint.is_none() {
            return Err(CoreError::config(
                "research.provider is azure but research.azure_endpoint is unset",
            ));
        }
        if !(0.0..=1.0).contains(&self.ingest.min_match_rate) {
            return Err(CoreError::config(format!(
                "ingest.min_match_rate must be within [0, 1], got {}",
                self.ingest.min_match_rate
            )));
        }
        Ok(())
    }

    /// The parsed HITL mode.
    pub fn hitl_mode(&self) -> CoreResult<HitlMode> {
        self.hitl_mode.parse()
    }

    /// Path of the append-only run log.
    pub fn run_log_path(&self) -> PathBuf {
        self.logs_dir.join("run_log.jsonl")
    }
}
