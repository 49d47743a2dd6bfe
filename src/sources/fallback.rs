//! Generative fallback knowledge source.
//!
//! An OpenRouter-backed LLM queried only when the authoritative sources
//! are silent or weak. It answers with a structured medication record (or
//! an explicit "not a medication" verdict) against a JSON schema, and its
//! confidence is computed compositionally from answer completeness, capped
//! strictly below what corroborated authoritative data can reach — model
//! output must never look more trustworthy than cross-verified databases.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, info};

use super::{MedicationSource, SourceId};
use crate::schema::{MedicationFields, SourceResult};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Hard ceiling on fallback confidence. Authoritative merges cap at 0.95.
pub const FALLBACK_CEILING: f64 = 0.75;

pub struct FallbackSource {
    client: Client,
    api_key: String,
    model: String,
}

impl FallbackSource {
    /// Reads `OPENROUTER_API_KEY`; callers treat a missing key as "no
    /// fallback configured" rather than a boot failure.
    pub fn from_env(client: Client, model: impl Into<String>) -> Result<Self> {
        let api_key = env::var("OPENROUTER_API_KEY")
            .context("OPENROUTER_API_KEY environment variable not set")?;
        Ok(Self {
            client,
            api_key,
            model: model.into(),
        })
    }

    async fn ask(&self, name: &str) -> Result<FallbackAnswer> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system",
                    content: "You are a conservative pharmacology reference. Given a string \
                              read off a medication label by OCR, decide whether it names a \
                              real medication (possibly misspelled) and if so return its \
                              standard reference information. Leave fields you are not sure \
                              about empty."
                        .to_string(),
                },
                Message {
                    role: "user",
                    content: format!("Label text: {name}"),
                },
            ],
            max_tokens: Some(1024),
            response_format: ResponseFormat::JsonSchema {
                json_schema: JsonSchemaFormat {
                    name: "medication_record".to_string(),
                    schema: answer_schema(),
                },
            },
        };

        let response = self
            .client
            .post(OPENROUTER_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("failed to send request to OpenRouter")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenRouter API error ({}): {}", status, error_text);
        }

        let response: ChatCompletionResponse = response
            .json()
            .await
            .context("failed to parse OpenRouter response")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        info!(
            "fallback response for '{}': {} tokens",
            name, response.usage.total_tokens
        );

        serde_json::from_str(&content).context("failed to parse fallback answer as JSON")
    }
}

// ── Request/response types ──────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormat {
    JsonSchema { json_schema: JsonSchemaFormat },
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: String,
    schema: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u32,
}

/// The structured answer contract.
#[derive(Debug, Deserialize)]
struct FallbackAnswer {
    is_medication: bool,
    #[serde(default)]
    corrected_name: Option<String>,
    #[serde(default)]
    generic_name: Option<String>,
    #[serde(default)]
    brand_names: Vec<String>,
    #[serde(default)]
    used_for: Option<String>,
    #[serde(default)]
    side_effects: Option<String>,
    #[serde(default)]
    warnings: Option<String>,
    #[serde(default)]
    dosage_form: Option<String>,
    #[serde(default)]
    schedule: Option<String>,
    #[serde(default)]
    strength: Option<String>,
}

fn answer_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "is_medication": { "type": "boolean" },
            "corrected_name": { "type": ["string", "null"] },
            "generic_name": { "type": ["string", "null"] },
            "brand_names": { "type": "array", "items": { "type": "string" } },
            "used_for": { "type": ["string", "null"] },
            "side_effects": { "type": ["string", "null"] },
            "warnings": { "type": ["string", "null"] },
            "dosage_form": { "type": ["string", "null"] },
            "schedule": { "type": ["string", "null"] },
            "strength": { "type": ["string", "null"] }
        },
        "required": ["is_medication"]
    })
}

// ── Adapter ─────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MedicationSource for FallbackSource {
    fn id(&self) -> SourceId {
        SourceId::AiFallback
    }

    async fn lookup(&self, name: &str) -> Result<Option<SourceResult>> {
        let answer = self.ask(name).await?;
        if !answer.is_medication {
            debug!("fallback: '{}' judged not a medication", name);
            return Ok(None);
        }

        let corrected_name = answer
            .corrected_name
            .map(|c| c.to_lowercase())
            .filter(|c| !c.is_empty() && c != name);

        let fields = MedicationFields {
            generic_name: answer.generic_name.map(|s| s.to_lowercase()),
            brand_names: answer.brand_names,
            used_for: answer.used_for,
            side_effects: answer.side_effects,
            warnings: answer.warnings,
            dosage_form: answer.dosage_form,
            schedule: answer.schedule,
            strength: answer.strength,
        };
        if fields.is_empty() {
            return Ok(None);
        }

        let confidence = fallback_confidence(&fields);
        debug!("fallback: '{}' answered (confidence {:.2})", name, confidence);

        Ok(Some(SourceResult {
            source: SourceId::AiFallback,
            fields,
            confidence,
            corrected_name,
        }))
    }
}

/// Compositional confidence: a bounded increment for each present,
/// non-trivial field. Longer narrative fields earn the full increment only
/// past a minimum length, so one-word filler doesn't score.
fn fallback_confidence(fields: &MedicationFields) -> f64 {
    fn text_increment(value: &Option<String>) -> f64 {
        match value.as_deref().map(str::trim) {
            Some(v) if v.len() >= 20 => 0.1,
            Some(v) if !v.is_empty() => 0.05,
            _ => 0.0,
        }
    }

    let mut score: f64 = 0.2;
    if fields.generic_name.is_some() {
        score += 0.1;
    }
    if !fields.brand_names.is_empty() {
        score += 0.05;
    }
    score += text_increment(&fields.used_for);
    score += text_increment(&fields.side_effects);
    score += text_increment(&fields.warnings);
    if fields.dosage_form.is_some() {
        score += 0.05;
    }
    if fields.schedule.is_some() {
        score += 0.05;
    }
    if fields.strength.is_some() {
        score += 0.05;
    }
    score.min(FALLBACK_CEILING)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_grows_with_completeness() {
        let sparse = MedicationFields {
            generic_name: Some("ibuprofen".to_string()),
            ..MedicationFields::default()
        };
        let full = MedicationFields {
            generic_name: Some("ibuprofen".to_string()),
            brand_names: vec!["Advil".to_string()],
            used_for: Some("relief of mild to moderate pain and fever".to_string()),
            side_effects: Some("stomach upset, heartburn, dizziness".to_string()),
            warnings: Some("do not exceed the recommended daily dose".to_string()),
            dosage_form: Some("tablet".to_string()),
            schedule: Some("otc".to_string()),
            strength: Some("200 mg".to_string()),
        };

        assert!(fallback_confidence(&sparse) < fallback_confidence(&full));
    }

    #[test]
    fn test_confidence_never_exceeds_ceiling() {
        let full = MedicationFields {
            generic_name: Some("x".to_string()),
            brand_names: vec!["y".to_string()],
            used_for: Some("a".repeat(50)),
            side_effects: Some("b".repeat(50)),
            warnings: Some("c".repeat(50)),
            dosage_form: Some("tablet".to_string()),
            schedule: Some("ii".to_string()),
            strength: Some("5 mg".to_string()),
        };
        assert!(fallback_confidence(&full) <= FALLBACK_CEILING);
    }

    #[test]
    fn test_short_filler_scores_less_than_real_text() {
        let filler = MedicationFields {
            used_for: Some("pain".to_string()),
            ..MedicationFields::default()
        };
        let real = MedicationFields {
            used_for: Some("relief of mild to moderate pain".to_string()),
            ..MedicationFields::default()
        };
        assert!(fallback_confidence(&filler) < fallback_confidence(&real));
    }
}
