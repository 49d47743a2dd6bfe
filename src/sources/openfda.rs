//! openFDA drug label adapter — the primary regulatory source.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use super::{join_fragments, MedicationSource, SourceId};
use crate::schema::{MedicationFields, SourceResult};

const LABEL_URL: &str = "https://api.fda.gov/drug/label.json";

pub struct OpenFdaSource {
    client: reqwest::Client,
}

impl OpenFdaSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

// ── openFDA response types ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct LabelResponse {
    #[serde(default)]
    results: Vec<LabelResult>,
}

#[derive(Deserialize)]
struct LabelResult {
    #[serde(default)]
    purpose: Vec<String>,
    #[serde(default)]
    indications_and_usage: Vec<String>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    adverse_reactions: Vec<String>,
    #[serde(default)]
    openfda: OpenFdaMeta,
}

#[derive(Deserialize, Default)]
struct OpenFdaMeta {
    #[serde(default)]
    brand_name: Vec<String>,
    #[serde(default)]
    generic_name: Vec<String>,
}

// ── Adapter ─────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MedicationSource for OpenFdaSource {
    fn id(&self) -> SourceId {
        SourceId::OpenFda
    }

    async fn lookup(&self, name: &str) -> Result<Option<SourceResult>> {
        // Match either the generic or the brand name; openFDA treats the
        // space-separated clauses as OR.
        let search = format!("openfda.generic_name:\"{name}\" openfda.brand_name:\"{name}\"");
        let resp = self
            .client
            .get(LABEL_URL)
            .query(&[("search", search.as_str()), ("limit", "1")])
            .send()
            .await
            .context("openFDA label request failed")?;

        // openFDA answers 404 for "no matches", which is data, not an error.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("openFDA: no label match for '{}'", name);
            return Ok(None);
        }
        if !resp.status().is_success() {
            anyhow::bail!("openFDA label API error: {}", resp.status());
        }

        let body: LabelResponse = resp
            .json()
            .await
            .context("failed to decode openFDA label response")?;
        let Some(label) = body.results.into_iter().next() else {
            return Ok(None);
        };

        let fields = MedicationFields {
            generic_name: label
                .openfda
                .generic_name
                .first()
                .map(|s| s.to_lowercase()),
            brand_names: label.openfda.brand_name,
            used_for: join_fragments(&label.indications_and_usage)
                .or_else(|| join_fragments(&label.purpose)),
            side_effects: join_fragments(&label.adverse_reactions),
            warnings: join_fragments(&label.warnings),
            dosage_form: None,
            schedule: None,
            strength: None,
        };
        if fields.is_empty() {
            return Ok(None);
        }

        let confidence = super::completeness_confidence(&fields);
        debug!("openFDA: matched '{}' (confidence {:.2})", name, confidence);

        Ok(Some(SourceResult {
            source: SourceId::OpenFda,
            fields,
            confidence,
            corrected_name: None,
        }))
    }
}
