//! Research Retriever
//!
//! Issues the recommendation request against the reasoning service:
//! cache lookup by content hash, credential check with offline
//! fallback, then a bounded attempt loop of call, parse, and strict
//! schema validation, reframing the prompt as a repair request after
//! each schema failure. Exhaustion degrades to the fallback shape and
//! leaves the last raw response in the audit log.

use serde_json::{json, Value};

use datagate_core::audit::{AuditEventKind, AuditLog};
use datagate_core::hash_payload;

use crate::cache::ResponseCache;
use crate::types::{Provider, ResearchConfig, ResearchOutput};

/// Default OpenAI responses endpoint
const OPENAI_API_URL: &str = "https://api.openai.com/v1/responses";

/// Retrieve dataset recommendations for the given document excerpt and
/// compact numeric summary.
///
/// Cache-through and idempotent for a fixed payload; never returns an
/// error. Every degradation (missing credential, transport failure,
/// schema failure after retries) yields a schema-valid fallback object
/// and an audit-log event instead.
pub async fn run_research_agent(
    cfg: &ResearchConfig,
    document_excerpt: &str,
    summary: &Value,
    audit: &AuditLog,
) -> ResearchOutput {
    let excerpt = truncate(document_excerpt, cfg.excerpt_max_chars);
    let schema = ResearchOutput::schema_json();
    let payload = json!({
        "document_excerpt": excerpt,
        "summary": summary,
        "schema": schema,
        "tool_type": cfg.tool_type(),
        "provider": cfg.provider,
        "model": cfg.model,
    });
    let cache_key = hash_payload(&payload);
    let cache = ResponseCache::new(&cfg.cache_dir);
    if let Some(cached) = cache.get(&cache_key) {
        tracing::debug!("research cache hit: {}", cache_key);
        return cached;
    }

    let api_key = match std::env::var(&cfg.api_key_env) {
        Ok(k) if !k.trim().is_empty() => k,
        _ => {
            let fallback = ResearchOutput::fallback(format!(
                "Set {} to enable external research recommendations.",
                cfg.api_key_env
            ));
            cache.put(&cache_key, &fallback);
            return fallback;
        }
    };

    let client = reqwest::Client::new();
    let initial_prompt = build_prompt(&schema, excerpt, summary);
    let mut prompt = initial_prompt;
    let mut last_raw = String::new();

    // First call plus max_retries repair attempts.
    for attempt in 1..=cfg.max_retries + 1 {
        let raw = match issue_request(&client, cfg, &api_key, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("research request attempt {} failed: {}", attempt, e);
                continue;
            }
        };
        last_raw = raw.clone();

        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(_) => {
                // Not even JSON; retry with the repair framing.
                prompt = repair_prompt(&last_raw);
                continue;
            }
        };
        match serde_json::from_value::<ResearchOutput>(parsed) {
            Ok(output) => {
                cache.put(&cache_key, &output);
                audit.append(AuditEventKind::ResearchAgentSuccess { attempt });
                return output;
            }
            Err(e) => {
                audit.append(AuditEventKind::ResearchAgentSchemaError {
                    attempt,
                    errors: vec![e.to_string()],
                });
                prompt = repair_prompt(&last_raw);
            }
        }
    }

    // Exhausted. The failure fallback is deliberately not cached so a
    // later run against a healthier service can retry the same payload.
    audit.append(AuditEventKind::ResearchAgentFailure { raw: last_raw });
    ResearchOutput::fallback(
        "Research output invalid after retries; inspect the run log raw response.",
    )
}

/// POST one request and extract the model's output text.
async fn issue_request(
    client: &reqwest::Client,
    cfg: &ResearchConfig,
    api_key: &str,
    prompt: &str,
) -> Result<String, String> {
    let body = json!({
        "model": cfg.model,
        "input": prompt,
        "tools": [{"type": cfg.tool_type()}],
    });

    let request = match cfg.provider {
        Provider::Azure => {
            let endpoint = cfg
                .azure_endpoint
                .as_deref()
                .ok_or_else(|| "azure provider requires azure_endpoint".to_string())?;
            let url = format!(
                "{}/openai/responses?api-version={}",
                endpoint.trim_end_matches('/'),
                cfg.azure_api_version
            );
            client.post(url).header("api-key", api_key)
        }
        Provider::OpenAi => {
            let url = cfg.base_url.as_deref().unwrap_or(OPENAI_API_URL);
            client.post(url).bearer_auth(api_key)
        }
    };

    let response = request
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("transport error: {}", e))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| format!("body read error: {}", e))?;
    if !status.is_success() {
        return Err(format!("HTTP {}: {}", status, truncate(&text, 500)));
    }
    let envelope: Value =
        serde_json::from_str(&text).map_err(|e| format!("response not JSON: {}", e))?;
    Ok(extract_output_text(&envelope))
}

/// Pull the concatenated output text out of a responses-API envelope.
fn extract_output_text(envelope: &Value) -> String {
    if let Some(text) = envelope.get("output_text").and_then(Value::as_str) {
        return text.to_string();
    }
    let mut chunks: Vec<&str> = Vec::new();
    if let Some(items) = envelope.get("output").and_then(Value::as_array) {
        for item in items {
            if let Some(contents) = item.get("content").and_then(Value::as_array) {
                for content in contents {
                    if content.get("type").and_then(Value::as_str) == Some("output_text") {
                        if let Some(t) = content.get("text").and_then(Value::as_str) {
                            chunks.push(t);
                        }
                    }
                }
            }
        }
    }
    chunks.join("")
}

fn build_prompt(schema: &Value, excerpt: &str, summary: &Value) -> String {
    format!(
        "You are a research agent. Use the web search tool and return ONLY valid JSON \
         matching the schema. Do not include markdown. Do not invent numeric facts. \
         Include URL citations in the citation arrays.\n\
         Schema: {}\n\
         Document excerpt: {}\n\
         Summary: {}",
        schema, excerpt, summary
    )
}

fn repair_prompt(last_raw: &str) -> String {
    format!(
        "Repair the JSON to satisfy the schema. Return only JSON. Previous:\n{}",
        last_raw
    )
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
