//! Datagate - Admission Pipeline Library
//!
//! The root crate wires the workspace stages into one operator-run
//! pipeline:
//! - Configuration loading and validation
//! - The run driver (retriever, approval gate, join admission)
//! - CSV exports (join audit, provenance, enriched fact table)

pub mod config;
pub mod export;
pub mod pipeline;

pub use config::PipelineConfig;
pub use pipeline::{run_pipeline, RunSummary};
