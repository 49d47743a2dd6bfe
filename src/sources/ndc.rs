//! openFDA NDC directory adapter — regulatory cross-reference.
//!
//! The NDC directory is thin on narrative text but is the best source for
//! dosage form, strength and DEA schedule, which the label API omits.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use super::{MedicationSource, SourceId};
use crate::schema::{MedicationFields, SourceResult};

const NDC_URL: &str = "https://api.fda.gov/drug/ndc.json";

pub struct NdcDirectorySource {
    client: reqwest::Client,
}

impl NdcDirectorySource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

// ── NDC response types ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct NdcResponse {
    #[serde(default)]
    results: Vec<NdcResult>,
}

#[derive(Deserialize)]
struct NdcResult {
    #[serde(default)]
    generic_name: Option<String>,
    #[serde(default)]
    brand_name: Option<String>,
    #[serde(default)]
    dosage_form: Option<String>,
    #[serde(default)]
    dea_schedule: Option<String>,
    #[serde(default)]
    active_ingredients: Vec<ActiveIngredient>,
}

#[derive(Deserialize)]
struct ActiveIngredient {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    strength: Option<String>,
}

// ── Adapter ─────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MedicationSource for NdcDirectorySource {
    fn id(&self) -> SourceId {
        SourceId::NdcDirectory
    }

    async fn lookup(&self, name: &str) -> Result<Option<SourceResult>> {
        let search = format!("generic_name:\"{name}\" brand_name:\"{name}\"");
        let resp = self
            .client
            .get(NDC_URL)
            .query(&[("search", search.as_str()), ("limit", "1")])
            .send()
            .await
            .context("NDC directory request failed")?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("NDC directory: no match for '{}'", name);
            return Ok(None);
        }
        if !resp.status().is_success() {
            anyhow::bail!("NDC directory API error: {}", resp.status());
        }

        let body: NdcResponse = resp
            .json()
            .await
            .context("failed to decode NDC directory response")?;
        let Some(entry) = body.results.into_iter().next() else {
            return Ok(None);
        };

        let strength = entry
            .active_ingredients
            .iter()
            .filter_map(|i| match (&i.name, &i.strength) {
                (Some(n), Some(s)) => Some(format!("{n} {s}")),
                (None, Some(s)) => Some(s.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("; ");

        let fields = MedicationFields {
            generic_name: entry.generic_name.map(|s| s.to_lowercase()),
            brand_names: entry.brand_name.into_iter().collect(),
            used_for: None,
            side_effects: None,
            warnings: None,
            dosage_form: entry.dosage_form,
            schedule: entry.dea_schedule,
            strength: (!strength.is_empty()).then_some(strength),
        };
        if fields.is_empty() {
            return Ok(None);
        }

        let confidence = super::completeness_confidence(&fields);
        debug!("NDC directory: matched '{}' (confidence {:.2})", name, confidence);

        Ok(Some(SourceResult {
            source: SourceId::NdcDirectory,
            fields,
            confidence,
            corrected_name: None,
        }))
    }
}
