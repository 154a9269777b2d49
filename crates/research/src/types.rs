//! Research Output Schema and Retriever Configuration
//!
//! The structured contract between the external reasoning service and
//! the pipeline. The JSON Schema embedded in the request payload is
//! derived from these types with schemars, and the response is
//! validated by strict deserialization into them.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One externally recommended dataset.
///
/// Every field except `name` defaults to empty: the service omitting a
/// field is never fatal. Entries with an empty `name` are dropped by
/// the approval gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RecommendedDataset {
    /// Unique identifier within a run; ledger foreign key
    pub name: String,
    /// What the dataset would add to the analysis
    pub purpose: String,
    /// Candidate source URLs, best first
    pub suggested_sources: Vec<String>,
    /// Column names the dataset can be joined on
    pub join_keys: Vec<String>,
    /// Row granularity (e.g. "county-year")
    pub granularity: String,
    /// Suggested ingestion priority
    pub priority: String,
    /// Known caveats
    pub risks_or_limitations: String,
    /// Supporting URLs
    pub citations: Vec<String>,
}

/// An analysis method the service recommends applying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RecommendedMethod {
    pub method: String,
    pub why: String,
    pub how_to_apply: String,
    pub citations: Vec<String>,
}

/// Guidance for mapping an external dataset onto the fact table keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MappingGuidance {
    pub approach: String,
    pub steps: String,
    pub citations: Vec<String>,
}

/// The full structured reply expected from the reasoning service.
///
/// All four top-level collections are required and unknown fields are
/// rejected; a reply failing this shape triggers a repair retry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ResearchOutput {
    pub recommended_datasets: Vec<RecommendedDataset>,
    pub recommended_methods: Vec<RecommendedMethod>,
    pub mapping_guidance: Vec<MappingGuidance>,
    pub questions_for_user: Vec<String>,
}

impl ResearchOutput {
    /// The empty-but-valid fallback shape, carrying one human-readable
    /// guidance message instead of recommendations.
    pub fn fallback(message: impl Into<String>) -> Self {
        Self {
            questions_for_user: vec![message.into()],
            ..Self::default()
        }
    }

    /// The JSON Schema for this type, as embedded in request payloads.
    pub fn schema_json() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(ResearchOutput)).unwrap_or_default()
    }
}

/// Which reasoning-service API surface to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Azure,
}

impl Default for Provider {
    fn default() -> Self {
        Provider::OpenAi
    }
}

/// Retriever configuration, deserialized from the pipeline config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// API surface to use
    pub provider: Provider,
    /// Model identifier sent with each request
    pub model: String,
    /// Override for the OpenAI endpoint (testing, gateways)
    pub base_url: Option<String>,
    /// Azure resource endpoint, required when provider = azure
    pub azure_endpoint: Option<String>,
    /// Azure API version query parameter
    pub azure_api_version: String,
    /// Web-search tool type injected into the request; defaults per
    /// provider when unset
    pub web_search_tool_type: Option<String>,
    /// Additional repair attempts after the first call
    pub max_retries: u32,
    /// Environment variable holding the service credential
    pub api_key_env: String,
    /// Directory for the content-addressed response cache
    pub cache_dir: PathBuf,
    /// Excerpt budget (chars) for the instructions document
    pub excerpt_max_chars: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            model: "gpt-4.1-mini".to_string(),
            base_url: None,
            azure_endpoint: None,
            azure_api_version: "2024-10-01-preview".to_string(),
            web_search_tool_type: None,
            max_retries: 2,
            api_key_env: "OPENAI_API_KEY".to_string(),
            cache_dir: PathBuf::from("cache/research"),
            excerpt_max_chars: 5000,
        }
    }
}

impl ResearchConfig {
    /// Effective web-search tool type: the configured value, or the
    /// provider-specific default.
    pub fn tool_type(&self) -> &str {
        match &self.web_search_tool_type {
            Some(t) => t.as_str(),
            None => match self.provider {
                Provider::Azure => "web_search_preview",
                Provider::OpenAi => "web_search",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_fields_default_to_empty() {
        let ds: RecommendedDataset =
            serde_json::from_str(r#"{"name": "Housing Cost"}"#).unwrap();
        assert_eq!(ds.name, "Housing Cost");
        assert!(ds.join_keys.is_empty());
        assert!(ds.purpose.is_empty());
    }

    #[test]
    fn test_output_requires_all_top_level_fields() {
        let missing = r#"{"recommended_datasets": []}"#;
        assert!(serde_json::from_str::<ResearchOutput>(missing).is_err());
    }

    #[test]
    fn test_output_rejects_unknown_fields() {
        let extra = r#"{
            "recommended_datasets": [],
            "recommended_methods": [],
            "mapping_guidance": [],
            "questions_for_user": [],
            "surprise": true
        }"#;
        assert!(serde_json::from_str::<ResearchOutput>(extra).is_err());
    }

    #[test]
    fn test_fallback_is_schema_valid() {
        let fb = ResearchOutput::fallback("set the key");
        let round: ResearchOutput =
            serde_json::from_value(serde_json::to_value(&fb).unwrap()).unwrap();
        assert_eq!(round.questions_for_user, vec!["set the key".to_string()]);
        assert!(round.recommended_datasets.is_empty());
    }

    #[test]
    fn test_schema_json_is_object() {
        let schema = ResearchOutput::schema_json();
        assert!(schema.is_object());
        assert!(schema.to_string().contains("recommended_datasets"));
    }

    #[test]
    fn test_tool_type_defaults_per_provider() {
        let mut cfg = ResearchConfig::default();
        assert_eq!(cfg.tool_type(), "web_search");
        cfg.provider = Provider::Azure;
        assert_eq!(cfg.tool_type(), "web_search_preview");
        cfg.web_search_tool_type = Some("custom".to_string());
        assert_eq!(cfg.tool_type(), "custom");
    }
}
