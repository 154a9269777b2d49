//! Datagate Research
//!
//! The recommendation retriever: asks an external reasoning service
//! which publicly available datasets could enrich the fact table,
//! enforces a strict output schema with bounded repair retries, and
//! caches validated responses by content hash so an identical request
//! never re-invokes the service.
//!
//! The retriever never fails: missing credentials, unreachable
//! services, and irreparably malformed output all degrade to an
//! empty-but-valid fallback object plus an audit-log event.

pub mod agent;
pub mod cache;
pub mod types;

pub use agent::run_research_agent;
pub use cache::ResponseCache;
pub use types::{
    MappingGuidance, Provider, RecommendedDataset, RecommendedMethod, ResearchConfig,
    ResearchOutput,
};
