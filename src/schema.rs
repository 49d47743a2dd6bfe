//! Medication scan data model.
//!
//! Confidence scales: `RecognitionResult.confidence` is the raw 0–100 engine
//! scale; everything downstream of the result selector is 0–1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One enhanced copy of the input image, tagged with its recipe name.
/// Lives only until recognition for the request completes.
#[derive(Debug, Clone)]
pub struct ImageVariant {
    pub label: &'static str,
    pub image: image::GrayImage,
}

/// Output of one recognition pass over one variant. Never mutated.
#[derive(Debug, Clone)]
pub struct RecognitionResult {
    pub text: String,
    /// Raw engine confidence, 0–100.
    pub confidence: f64,
    pub variant_label: &'static str,
}

/// A provisional medication name pulled out of recognized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicationCandidate {
    /// The string as it appeared in the OCR text.
    pub raw_text: String,
    /// Lowercased, punctuation-stripped, spell-corrected name.
    pub normalized_name: String,
}

/// The common field shape every source maps its response into.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MedicationFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generic_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub brand_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_for: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side_effects: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dosage_form: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<String>,
}

impl MedicationFields {
    pub fn is_empty(&self) -> bool {
        self.generic_name.is_none()
            && self.brand_names.is_empty()
            && self.used_for.is_none()
            && self.side_effects.is_none()
            && self.warnings.is_none()
            && self.dosage_form.is_none()
            && self.schedule.is_none()
            && self.strength.is_none()
    }
}

/// What one source said about one candidate. Produced by exactly one query.
#[derive(Debug, Clone)]
pub struct SourceResult {
    pub source: crate::sources::SourceId,
    pub fields: MedicationFields,
    /// 0–1.
    pub confidence: f64,
    /// Set when the source recognized the input as a misspelling.
    pub corrected_name: Option<String>,
}

/// The merged, provenance-tracked record for one medication name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciledRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_name: Option<String>,
    #[serde(flatten)]
    pub fields: MedicationFields,
    /// 0–1.
    pub confidence: f64,
    pub sources: Vec<String>,
    pub data_source: String,
    pub searched_at: DateTime<Utc>,
}

impl ReconciledRecord {
    /// The hard-coded record returned when nothing, not even the fallback,
    /// had anything to say about a name.
    pub fn default_for(name: &str) -> Self {
        Self {
            name: name.to_string(),
            corrected_name: None,
            fields: MedicationFields::default(),
            confidence: 0.1,
            sources: Vec::new(),
            data_source: "fallback_system".to_string(),
            searched_at: Utc::now(),
        }
    }
}

/// Qualitative confidence bucket reported alongside the raw numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBucket {
    High,
    Medium,
    Low,
}

/// Full response for one scanned image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub scan_id: String,
    pub medications: Vec<ReconciledRecord>,
    /// All variants' text, sentinel-delimited.
    pub recognized_text: String,
    /// Best-by-score variant confidence, 0–1.
    pub recognition_confidence: f64,
    pub confidence_bucket: ConfidenceBucket,
}

impl ScanResponse {
    pub fn new(
        medications: Vec<ReconciledRecord>,
        recognized_text: String,
        recognition_confidence: f64,
    ) -> Self {
        let confidence_bucket = bucket_for(&recognized_text);
        Self {
            scan_id: format!("scan_{}", Uuid::new_v4().simple()),
            medications,
            recognized_text,
            recognition_confidence,
            confidence_bucket,
        }
    }
}

/// Derive the qualitative bucket from text length and structural cues:
/// dosage-looking tokens ("500mg") and schedule-looking tokens ("twice daily").
pub fn bucket_for(text: &str) -> ConfidenceBucket {
    let lower = text.to_lowercase();
    let has_dosage = lower
        .split_whitespace()
        .any(|w| w.chars().next().is_some_and(|c| c.is_ascii_digit())
            && (w.contains("mg") || w.contains("mcg") || w.contains("ml")));
    let has_schedule = ["daily", "twice", "hours", "weekly", "bedtime"]
        .iter()
        .any(|t| lower.contains(t));

    let cues = usize::from(has_dosage) + usize::from(has_schedule);
    if text.len() >= 40 && cues == 2 {
        ConfidenceBucket::High
    } else if text.len() >= 20 && cues >= 1 {
        ConfidenceBucket::Medium
    } else {
        ConfidenceBucket::Low
    }
}
