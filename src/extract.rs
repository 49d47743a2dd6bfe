//! Medication candidate extraction from recognized text.
//!
//! An ordered table of compiled regex rules is evaluated deterministically
//! over the merged OCR text; every raw match is normalized (lowercase,
//! punctuation stripped), run through the static correction table, then
//! filtered by shape and against the exclusion vocabulary. First-seen wins
//! on duplicates and the output is capped, so rule order is part of the
//! contract: more specific rules run first.

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::lexicon;
use crate::schema::MedicationCandidate;

/// Drug-class suffixes recognizable even when the stem is garbled.
const PHARMA_SUFFIXES: &str = "cillin|mycin|floxacin|cycline|azole|prazole|sartan|statin|olol|\
pril|dipine|formin|azepam|oxetine|aline|tidine|triptan|profen|setron|gliptin|glitazone|\
dronate|parin|vir|mab|nib";

struct CompiledRule {
    id: &'static str,
    regex: Regex,
}

/// Ordered, pre-compiled extraction rule table.
pub struct CandidateExtractor {
    rules: Vec<CompiledRule>,
    max_candidates: usize,
}

impl CandidateExtractor {
    pub fn new(max_candidates: usize) -> Self {
        // Rule order: pharmacologic suffixes, then name+dosage pairs, then
        // the known-medication list, then the capitalized-word heuristic.
        // The patterns are static, so compilation cannot fail at runtime.
        let table: [(&'static str, String); 4] = [
            (
                "pharma_suffix",
                format!(r"\b([A-Za-z]{{2,}}(?:{PHARMA_SUFFIXES}))\b"),
            ),
            (
                "name_dosage",
                r"\b([A-Za-z]{4,})\s*\d+(?:\.\d+)?\s*(?:mg|mcg|g|ml|iu)\b".to_string(),
            ),
            ("known_medication", known_medication_pattern()),
            ("capitalized_word", r"\b([A-Z][A-Za-z]{3,})\b".to_string()),
        ];

        let rules = table
            .into_iter()
            .map(|(id, pattern)| CompiledRule {
                id,
                regex: RegexBuilder::new(&pattern)
                    .case_insensitive(id != "capitalized_word")
                    .build()
                    .expect("static extraction pattern must compile"),
            })
            .collect();

        Self {
            rules,
            max_candidates,
        }
    }

    /// Extract a deduplicated, ordered, bounded candidate set.
    pub fn extract(&self, text: &str) -> Vec<MedicationCandidate> {
        let cleaned = normalize_whitespace(text);
        let mut candidates: Vec<MedicationCandidate> = Vec::new();

        for rule in &self.rules {
            for cap in rule.regex.captures_iter(&cleaned) {
                let raw = cap
                    .get(1)
                    .or_else(|| cap.get(0))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                if raw.is_empty() {
                    continue;
                }

                let normalized = lexicon::correct(&normalize_name(raw)).to_string();
                if !passes_shape_checks(&normalized) {
                    continue;
                }
                if candidates
                    .iter()
                    .any(|c| c.normalized_name == normalized)
                {
                    continue;
                }

                debug!("rule '{}' matched '{}' -> '{}'", rule.id, raw, normalized);
                candidates.push(MedicationCandidate {
                    raw_text: raw.to_string(),
                    normalized_name: normalized,
                });
                if candidates.len() >= self.max_candidates {
                    return candidates;
                }
            }
        }

        candidates
    }
}

/// Normalize a free-form name the way extraction rules would, for direct
/// (non-OCR) lookups. Returns `None` when the input fails the shape checks.
pub fn normalize_candidate(raw: &str) -> Option<MedicationCandidate> {
    let normalized = lexicon::correct(&normalize_name(raw)).to_string();
    if !passes_shape_checks(&normalized) {
        return None;
    }
    Some(MedicationCandidate {
        raw_text: raw.to_string(),
        normalized_name: normalized,
    })
}

/// Collapse runs of whitespace and strip OCR punctuation noise
/// (repeated dots/dashes from label borders).
fn normalize_whitespace(text: &str) -> String {
    let stripped: String = text
        .chars()
        .map(|c| match c {
            '|' | '•' | '·' => ' ',
            _ => c,
        })
        .collect();
    let collapsed = stripped
        .split_whitespace()
        .filter(|token| !token.chars().all(|c| c.is_ascii_punctuation()))
        .collect::<Vec<_>>()
        .join(" ");
    collapsed
}

/// Lowercase and keep letters only. Digits and punctuation are OCR
/// artifacts at this point; dosage numbers were consumed by the rule.
fn normalize_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_lowercase()
}

fn passes_shape_checks(normalized: &str) -> bool {
    normalized.len() >= 4
        && normalized.len() <= 30
        && normalized.chars().all(|c| c.is_ascii_lowercase())
        && !lexicon::is_excluded_word(normalized)
}

/// Word-bounded alternation over the known-medication table.
fn known_medication_pattern() -> String {
    format!(r"\b({})\b", lexicon::KNOWN_MEDICATIONS.join("|"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> CandidateExtractor {
        CandidateExtractor::new(5)
    }

    fn names(candidates: &[MedicationCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.normalized_name.as_str()).collect()
    }

    #[test]
    fn test_suffix_rule_catches_garbled_stem() {
        let found = extractor().extract("Take Flumoxicillin as directed");
        assert_eq!(names(&found), vec!["flumoxicillin"]);
    }

    #[test]
    fn test_dosage_rule_with_correction() {
        // Misspelled OCR output plus a dosage token must still yield the
        // canonical name.
        let found = extractor().extract("Amoriedlin 500mg twice daily");
        assert_eq!(names(&found), vec!["amoxicillin"]);
    }

    #[test]
    fn test_brand_name_is_canonicalized() {
        let found = extractor().extract("TYLENOL Extra Strength 500 mg caplets");
        assert!(names(&found).contains(&"acetaminophen"));
        assert!(!names(&found).contains(&"tylenol"));
    }

    #[test]
    fn test_known_list_matches_lowercase_text() {
        let found = extractor().extract("contains metformin hydrochloride");
        assert!(names(&found).contains(&"metformin"));
    }

    #[test]
    fn test_exclusion_and_shape_filters() {
        let found = extractor().extract("WARNING Keep Tablets Away From Children");
        assert!(found.is_empty());
    }

    #[test]
    fn test_dedup_is_case_insensitive_first_seen_wins() {
        let found = extractor().extract("Ibuprofen 200mg ... IBUPROFEN ... ibuprofen tablets");
        assert_eq!(names(&found), vec!["ibuprofen"]);
        assert_eq!(found[0].raw_text, "Ibuprofen");
    }

    #[test]
    fn test_output_is_capped() {
        let ex = CandidateExtractor::new(2);
        let found = ex.extract("aspirin metformin warfarin ibuprofen");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_normalized_shape_invariants() {
        let found = extractor().extract("Lisinopril 10mg and Losartan, 50mg daily");
        assert!(!found.is_empty());
        for c in &found {
            assert_eq!(c.normalized_name, c.normalized_name.to_lowercase());
            assert!(c.normalized_name.chars().all(|ch| ch.is_ascii_lowercase()));
            assert!(c.normalized_name.len() >= 4 && c.normalized_name.len() <= 30);
        }
    }

    #[test]
    fn test_normalize_candidate_direct_lookup() {
        let c = normalize_candidate("Tylenol").unwrap();
        assert_eq!(c.normalized_name, "acetaminophen");
        assert_eq!(c.raw_text, "Tylenol");
        assert!(normalize_candidate("ab").is_none());
        assert!(normalize_candidate("warning").is_none());
    }

    #[test]
    fn test_whitespace_and_border_noise_normalization() {
        let cleaned = normalize_whitespace("Aspirin   |  .... 81mg \n\n ---- daily");
        assert_eq!(cleaned, "Aspirin 81mg daily");
    }
}
