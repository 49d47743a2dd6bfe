//! Recognition result selection and merging.
//!
//! The "best" variant is the one maximizing `confidence * ln(len + 1)`:
//! certainty weighted by information volume, with the logarithm damping the
//! bias toward longer-but-noisier text. Downstream extraction still gets
//! the concatenation of every variant's text so names the best variant
//! missed can be scavenged from the others.

use crate::schema::RecognitionResult;

/// Delimiter between per-variant text blocks in the merged output.
pub const VARIANT_DELIMITER: &str = "\n=====\n";

/// Merged recognition output for one image.
#[derive(Debug, Clone)]
pub struct MergedRecognition {
    /// All variants' text, in variant order, sentinel-delimited.
    pub text: String,
    /// Best-by-score variant's confidence, normalized to 0–1.
    pub confidence: f64,
    pub best_variant: &'static str,
}

fn score(result: &RecognitionResult) -> f64 {
    result.confidence * ((result.text.len() + 1) as f64).ln()
}

/// Merge an ordered, non-empty sequence of recognition results.
/// Ties on score go to the earlier variant.
pub fn merge_results(results: &[RecognitionResult]) -> Option<MergedRecognition> {
    let best = results.iter().fold(None::<&RecognitionResult>, |acc, r| {
        match acc {
            Some(current) if score(current) >= score(r) => Some(current),
            _ => Some(r),
        }
    })?;

    let text = results
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join(VARIANT_DELIMITER);

    Some(MergedRecognition {
        text,
        // Raw engine scale is 0–100; everything downstream is 0–1.
        confidence: (best.confidence / 100.0).clamp(0.0, 1.0),
        best_variant: best.variant_label,
    })
}
