//! RxNav/RxNorm adapter — the national drug-concept and naming database.
//!
//! RxNorm is the naming authority: it resolves a candidate string to a
//! concept (rxcui), supplies the canonical generic name and related brand
//! names, and via approximate matching can recover a likely-intended name
//! from OCR garble the static correction table doesn't know.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use super::{MedicationSource, SourceId};
use crate::schema::{MedicationFields, SourceResult};

const RXNAV_BASE: &str = "https://rxnav.nlm.nih.gov/REST";

pub struct RxNormSource {
    client: reqwest::Client,
}

impl RxNormSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Exact name → rxcui, if RxNorm knows the string verbatim.
    async fn find_rxcui(&self, name: &str) -> Result<Option<String>> {
        let url = format!("{RXNAV_BASE}/rxcui.json");
        let resp: RxcuiResponse = self
            .client
            .get(url)
            .query(&[("name", name), ("search", "1")])
            .send()
            .await
            .context("RxNorm rxcui request failed")?
            .error_for_status()
            .context("RxNorm rxcui API error")?
            .json()
            .await
            .context("failed to decode RxNorm rxcui response")?;

        Ok(resp.id_group.rxnorm_id.into_iter().next())
    }

    /// Spelling-tolerant match. Returns (rxcui, matched name) so the
    /// resolver can surface the correction.
    async fn approximate_match(&self, name: &str) -> Result<Option<(String, String)>> {
        let url = format!("{RXNAV_BASE}/approximateTerm.json");
        let resp: ApproximateResponse = self
            .client
            .get(url)
            .query(&[("term", name), ("maxEntries", "1")])
            .send()
            .await
            .context("RxNorm approximate request failed")?
            .error_for_status()
            .context("RxNorm approximate API error")?
            .json()
            .await
            .context("failed to decode RxNorm approximate response")?;

        Ok(resp
            .approximate_group
            .candidate
            .into_iter()
            .find_map(|c| match (c.rxcui, c.name) {
                (Some(rxcui), Some(name)) => Some((rxcui, name)),
                _ => None,
            }))
    }

    /// Brand names (TTY=BN) related to a concept.
    async fn brand_names(&self, rxcui: &str) -> Result<Vec<String>> {
        let url = format!("{RXNAV_BASE}/rxcui/{rxcui}/related.json");
        let resp: RelatedResponse = self
            .client
            .get(url)
            .query(&[("tty", "BN")])
            .send()
            .await
            .context("RxNorm related request failed")?
            .error_for_status()
            .context("RxNorm related API error")?
            .json()
            .await
            .context("failed to decode RxNorm related response")?;

        Ok(resp
            .related_group
            .concept_group
            .into_iter()
            .flat_map(|g| g.concept_properties)
            .filter_map(|p| p.name)
            .collect())
    }
}

// ── RxNav response types ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RxcuiResponse {
    #[serde(rename = "idGroup", default)]
    id_group: IdGroup,
}

#[derive(Deserialize, Default)]
struct IdGroup {
    #[serde(rename = "rxnormId", default)]
    rxnorm_id: Vec<String>,
}

#[derive(Deserialize)]
struct ApproximateResponse {
    #[serde(rename = "approximateGroup", default)]
    approximate_group: ApproximateGroup,
}

#[derive(Deserialize, Default)]
struct ApproximateGroup {
    #[serde(default)]
    candidate: Vec<ApproximateCandidate>,
}

#[derive(Deserialize)]
struct ApproximateCandidate {
    #[serde(default)]
    rxcui: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RelatedResponse {
    #[serde(rename = "relatedGroup", default)]
    related_group: RelatedGroup,
}

#[derive(Deserialize, Default)]
struct RelatedGroup {
    #[serde(rename = "conceptGroup", default)]
    concept_group: Vec<ConceptGroup>,
}

#[derive(Deserialize)]
struct ConceptGroup {
    #[serde(rename = "conceptProperties", default)]
    concept_properties: Vec<ConceptProperty>,
}

#[derive(Deserialize)]
struct ConceptProperty {
    #[serde(default)]
    name: Option<String>,
}

// ── Adapter ─────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MedicationSource for RxNormSource {
    fn id(&self) -> SourceId {
        SourceId::RxNorm
    }

    async fn lookup(&self, name: &str) -> Result<Option<SourceResult>> {
        let (rxcui, corrected_name) = match self.find_rxcui(name).await? {
            Some(rxcui) => (rxcui, None),
            None => match self.approximate_match(name).await? {
                Some((rxcui, matched)) => {
                    let corrected = (!matched.eq_ignore_ascii_case(name))
                        .then(|| matched.to_lowercase());
                    (rxcui, corrected)
                }
                None => {
                    debug!("RxNorm: no concept for '{}'", name);
                    return Ok(None);
                }
            },
        };

        let brand_names = self.brand_names(&rxcui).await.unwrap_or_default();
        let generic = corrected_name.clone().unwrap_or_else(|| name.to_string());

        let fields = MedicationFields {
            generic_name: Some(generic),
            brand_names,
            ..MedicationFields::default()
        };

        let confidence = super::completeness_confidence(&fields);
        debug!(
            "RxNorm: '{}' -> rxcui {} (confidence {:.2})",
            name, rxcui, confidence
        );

        Ok(Some(SourceResult {
            source: SourceId::RxNorm,
            fields,
            confidence,
            corrected_name,
        }))
    }
}
