//! Medication information sources.
//!
//! Every provider — the four authoritative databases and the generative
//! fallback — sits behind the same [`MedicationSource`] trait with a fixed
//! reliability weight, so the resolver fans out and the reconciler merges
//! over a uniform source list. Adapters map their raw responses into the
//! common [`SourceResult`] shape and absorb their own failures: `Ok(None)`
//! means "this source has nothing", `Err` is transport-level and is
//! converted to a typed outcome at the resolver boundary.

pub mod fallback;
pub mod medlineplus;
pub mod ndc;
pub mod openfda;
pub mod rxnorm;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::schema::SourceResult;

/// Identity and trust ordering of every known source. Declaration order is
/// the reconciler's tie-break order: primary regulatory first, generative
/// fallback last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// openFDA drug label API — primary regulatory database.
    OpenFda,
    /// RxNav/RxNorm — national drug-concept and naming database.
    RxNorm,
    /// openFDA NDC directory — regulatory cross-reference.
    NdcDirectory,
    /// MedlinePlus Connect — health-topic reference.
    MedlinePlus,
    /// Generative knowledge source, consulted only when the others are
    /// silent or weak.
    AiFallback,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenFda => "openfda",
            Self::RxNorm => "rxnorm",
            Self::NdcDirectory => "ndc_directory",
            Self::MedlinePlus => "medlineplus",
            Self::AiFallback => "ai_fallback",
        }
    }

    /// Fixed trust weight used in confidence blending.
    pub fn reliability(&self) -> f64 {
        match self {
            Self::OpenFda => 1.0,
            Self::RxNorm => 0.9,
            Self::NdcDirectory => 0.85,
            Self::MedlinePlus => 0.75,
            Self::AiFallback => 0.3,
        }
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provider of medication information, queried by name.
#[async_trait::async_trait]
pub trait MedicationSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// Look a medication up by (normalized) name. `Ok(None)` means the
    /// source knows nothing about it; `Err` is a transport/decode failure.
    async fn lookup(&self, name: &str) -> Result<Option<SourceResult>>;
}

/// Settled outcome of one source query. Failures are values here, not
/// exceptions — the resolver records one of these per source regardless of
/// what happened, and none of them cancels a sibling query.
#[derive(Debug)]
pub enum SourceOutcome {
    Found(SourceResult),
    NoData(SourceId),
    Failed { source: SourceId, reason: String },
    TimedOut(SourceId),
}

impl SourceOutcome {
    pub fn into_result(self) -> Option<SourceResult> {
        match self {
            Self::Found(result) => Some(result),
            _ => None,
        }
    }
}

/// Confidence of one authoritative result, computed from how many of the
/// common fields the source actually filled in. Bounded well below 1.0;
/// corroboration across sources is what raises the merged confidence.
pub(crate) fn completeness_confidence(fields: &crate::schema::MedicationFields) -> f64 {
    let present = [
        fields.generic_name.is_some(),
        !fields.brand_names.is_empty(),
        fields.used_for.is_some(),
        fields.side_effects.is_some(),
        fields.warnings.is_some(),
        fields.dosage_form.is_some(),
        fields.schedule.is_some(),
        fields.strength.is_some(),
    ]
    .iter()
    .filter(|p| **p)
    .count();

    (0.4 + present as f64 * 0.07).min(0.9)
}

/// Join a list of free-text fragments into one field value, skipping
/// empties. Several sources deliver arrays of paragraphs.
pub(crate) fn join_fragments(fragments: &[String]) -> Option<String> {
    let joined = fragments
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}
