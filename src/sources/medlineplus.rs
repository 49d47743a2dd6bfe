//! MedlinePlus Connect adapter — health-topic reference.
//!
//! Contributes consumer-readable "what is this for" text; the other fields
//! stay empty and the reconciler's field merge treats it like any other
//! partial source.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use super::{MedicationSource, SourceId};
use crate::schema::{MedicationFields, SourceResult};

const CONNECT_URL: &str = "https://connect.medlineplus.gov/service";
/// RxNorm code system OID, required by the Connect protocol even for
/// display-name-only queries.
const RXNORM_CS: &str = "2.16.840.1.113883.6.88";

pub struct MedlinePlusSource {
    client: reqwest::Client,
}

impl MedlinePlusSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

// ── Connect response types (Atom-as-JSON) ───────────────────────────────────

#[derive(Deserialize)]
struct ConnectResponse {
    #[serde(default)]
    feed: Feed,
}

#[derive(Deserialize, Default)]
struct Feed {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Deserialize)]
struct Entry {
    #[serde(default)]
    title: Option<TextValue>,
    #[serde(default)]
    summary: Option<TextValue>,
}

#[derive(Deserialize)]
struct TextValue {
    #[serde(rename = "_value", default)]
    value: String,
}

// ── Adapter ─────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MedicationSource for MedlinePlusSource {
    fn id(&self) -> SourceId {
        SourceId::MedlinePlus
    }

    async fn lookup(&self, name: &str) -> Result<Option<SourceResult>> {
        let resp = self
            .client
            .get(CONNECT_URL)
            .query(&[
                ("mainSearchCriteria.v.cs", RXNORM_CS),
                ("mainSearchCriteria.v.dn", name),
                ("knowledgeResponseType", "application/json"),
            ])
            .send()
            .await
            .context("MedlinePlus Connect request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("MedlinePlus Connect API error: {}", resp.status());
        }

        let body: ConnectResponse = resp
            .json()
            .await
            .context("failed to decode MedlinePlus Connect response")?;
        let Some(entry) = body.feed.entry.into_iter().next() else {
            debug!("MedlinePlus: no health topic for '{}'", name);
            return Ok(None);
        };

        let used_for = entry
            .summary
            .map(|s| strip_tags(&s.value))
            .filter(|s| !s.is_empty());
        if used_for.is_none() {
            return Ok(None);
        }

        let fields = MedicationFields {
            generic_name: entry
                .title
                .map(|t| t.value.trim().to_lowercase())
                .filter(|t| !t.is_empty()),
            used_for,
            ..MedicationFields::default()
        };

        let confidence = super::completeness_confidence(&fields);
        debug!("MedlinePlus: matched '{}' (confidence {:.2})", name, confidence);

        Ok(Some(SourceResult {
            source: SourceId::MedlinePlus,
            fields,
            confidence,
            corrected_name: None,
        }))
    }
}

/// Connect summaries arrive as HTML snippets; keep just the text.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
