//! Multi-source reconciliation.
//!
//! Merges whatever the sources returned for one candidate into exactly one
//! [`ReconciledRecord`]. The field merge is explicit and typed: per field,
//! the longest non-placeholder value wins, ties broken by source
//! reliability order, so precedence is auditable instead of hidden in a
//! dynamic object merge. The fallback source is consulted only when the
//! authoritative results are absent or uniformly weak.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::schema::{MedicationCandidate, MedicationFields, ReconciledRecord, SourceResult};
use crate::sources::{MedicationSource, SourceId};

/// No merged record is fully certain, however many sources agree.
pub const AUTHORITATIVE_CEILING: f64 = 0.95;
/// Below this, authoritative results are considered weak and the fallback
/// is consulted for a hybrid.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.4;
/// Fallback answers below this are discarded entirely.
pub const MIN_FALLBACK_CONFIDENCE: f64 = 0.3;
/// Hybrid records cap below the pure-fallback ceiling (0.75).
pub const HYBRID_CAP: f64 = 0.7;
/// Records at or below this are not worth caching.
pub const CACHE_WRITE_THRESHOLD: f64 = 0.3;

/// Extra credit per corroborating source, capped at +20% overall.
const CORROBORATION_STEP: f64 = 0.1;
const CORROBORATION_CAP: f64 = 1.2;

pub struct Reconciler {
    fallback: Option<Arc<dyn MedicationSource>>,
    /// Bound on one fallback query; the same budget every authoritative
    /// source query gets at the resolver boundary.
    fallback_timeout: Duration,
}

impl Reconciler {
    pub fn new(fallback: Option<Arc<dyn MedicationSource>>, fallback_timeout: Duration) -> Self {
        Self {
            fallback,
            fallback_timeout,
        }
    }

    /// Merge the collected authoritative results (possibly empty) into one
    /// record, consulting the fallback source per policy.
    pub async fn reconcile(
        &self,
        candidate: &MedicationCandidate,
        results: Vec<SourceResult>,
    ) -> ReconciledRecord {
        let name = &candidate.normalized_name;

        if results.is_empty() {
            return match self.query_fallback(name).await {
                Some(fb) if fb.confidence >= MIN_FALLBACK_CONFIDENCE => {
                    info!("'{}': fallback-only record ({:.2})", name, fb.confidence);
                    fallback_record(name, fb)
                }
                _ => {
                    info!("'{}': no data from any source", name);
                    ReconciledRecord::default_for(name)
                }
            };
        }

        let authoritative = merge_authoritative(name, &results);

        let all_weak = results
            .iter()
            .all(|r| r.confidence < LOW_CONFIDENCE_THRESHOLD);
        if all_weak {
            if let Some(fb) = self.query_fallback(name).await {
                if fb.confidence > authoritative.confidence {
                    info!(
                        "'{}': weak authoritative data ({:.2}), hybridizing with fallback ({:.2})",
                        name, authoritative.confidence, fb.confidence
                    );
                    return build_hybrid(authoritative, fb);
                }
            }
        }

        authoritative
    }

    async fn query_fallback(&self, name: &str) -> Option<SourceResult> {
        let fallback = self.fallback.as_ref()?;
        match tokio::time::timeout(self.fallback_timeout, fallback.lookup(name)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                // Transport, auth and rate-limit failures are all the same
                // thing here: no usable fallback data.
                warn!("fallback query for '{}' failed: {:#}", name, e);
                None
            }
            Err(_) => {
                warn!("fallback query for '{}' timed out", name);
                None
            }
        }
    }
}

// ============================================================================
// Merge functions
// ============================================================================

/// Merge authoritative results: per-field longest non-placeholder value,
/// reliability-weighted average confidence with a corroboration boost.
fn merge_authoritative(name: &str, results: &[SourceResult]) -> ReconciledRecord {
    // Reliability order drives every tie-break below.
    let mut ranked: Vec<&SourceResult> = results.iter().collect();
    ranked.sort_by_key(|r| r.source);

    let fields = merge_fields(&ranked);
    let n = ranked.len() as f64;
    let weighted_sum: f64 = ranked
        .iter()
        .map(|r| r.source.reliability() * r.confidence)
        .sum();
    let corroboration = (1.0 + CORROBORATION_STEP * (n - 1.0)).min(CORROBORATION_CAP);
    let confidence = (weighted_sum / n * corroboration).min(AUTHORITATIVE_CEILING);

    let mut sources: Vec<String> = ranked.iter().map(|r| r.source.to_string()).collect();
    sources.dedup();
    let data_source = if sources.len() > 1 {
        "multiple_authoritative_sources"
    } else {
        "authoritative_source"
    };

    debug!(
        "'{}': merged {} authoritative sources -> {:.3}",
        name,
        sources.len(),
        confidence
    );

    ReconciledRecord {
        name: name.to_string(),
        corrected_name: ranked.iter().find_map(|r| r.corrected_name.clone()),
        fields,
        confidence,
        sources,
        data_source: data_source.to_string(),
        searched_at: Utc::now(),
    }
}

/// A usable fallback answer standing alone.
fn fallback_record(name: &str, fb: SourceResult) -> ReconciledRecord {
    ReconciledRecord {
        name: name.to_string(),
        corrected_name: fb.corrected_name,
        fields: fb.fields,
        confidence: fb.confidence,
        sources: vec![fb.source.to_string()],
        data_source: "ai_fallback".to_string(),
        searched_at: Utc::now(),
    }
}

/// Weak authoritative data enriched with a stronger fallback answer:
/// field-wise most complete value from either branch, blended confidence.
fn build_hybrid(authoritative: ReconciledRecord, fb: SourceResult) -> ReconciledRecord {
    let confidence =
        (0.7 * authoritative.confidence + 0.3 * fb.confidence).min(HYBRID_CAP);

    let fields = MedicationFields {
        generic_name: more_complete(authoritative.fields.generic_name, fb.fields.generic_name),
        brand_names: if fb.fields.brand_names.len() > authoritative.fields.brand_names.len() {
            fb.fields.brand_names
        } else {
            authoritative.fields.brand_names
        },
        used_for: more_complete(authoritative.fields.used_for, fb.fields.used_for),
        side_effects: more_complete(authoritative.fields.side_effects, fb.fields.side_effects),
        warnings: more_complete(authoritative.fields.warnings, fb.fields.warnings),
        dosage_form: more_complete(authoritative.fields.dosage_form, fb.fields.dosage_form),
        schedule: more_complete(authoritative.fields.schedule, fb.fields.schedule),
        strength: more_complete(authoritative.fields.strength, fb.fields.strength),
    };

    let mut sources = authoritative.sources;
    sources.push(fb.source.to_string());

    ReconciledRecord {
        name: authoritative.name,
        corrected_name: authoritative.corrected_name.or(fb.corrected_name),
        fields,
        confidence,
        sources,
        data_source: "hybrid_authoritative_fallback".to_string(),
        searched_at: Utc::now(),
    }
}

/// Typed per-field merge over rank-sorted results.
fn merge_fields(ranked: &[&SourceResult]) -> MedicationFields {
    let mut brand_names: Vec<String> = Vec::new();
    for result in ranked {
        for brand in &result.fields.brand_names {
            if !brand_names.iter().any(|b| b.eq_ignore_ascii_case(brand)) {
                brand_names.push(brand.clone());
            }
        }
    }

    MedicationFields {
        generic_name: pick_field(ranked, |f| f.generic_name.as_deref()),
        brand_names,
        used_for: pick_field(ranked, |f| f.used_for.as_deref()),
        side_effects: pick_field(ranked, |f| f.side_effects.as_deref()),
        warnings: pick_field(ranked, |f| f.warnings.as_deref()),
        dosage_form: pick_field(ranked, |f| f.dosage_form.as_deref()),
        schedule: pick_field(ranked, |f| f.schedule.as_deref()),
        strength: pick_field(ranked, |f| f.strength.as_deref()),
    }
}

/// Longest non-placeholder value; `ranked` is already in reliability order
/// so a strict `>` keeps the more reliable source on equal length.
fn pick_field<'a>(
    ranked: &[&'a SourceResult],
    accessor: impl Fn(&'a MedicationFields) -> Option<&'a str>,
) -> Option<String> {
    let mut best: Option<&str> = None;
    for result in ranked {
        if let Some(value) = accessor(&result.fields) {
            if is_placeholder(value) {
                continue;
            }
            if best.map_or(true, |b| value.len() > b.len()) {
                best = Some(value);
            }
        }
    }
    best.map(str::to_string)
}

fn more_complete(a: Option<String>, b: Option<String>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) => {
            let a_len = if is_placeholder(&a) { 0 } else { a.len() };
            let b_len = if is_placeholder(&b) { 0 } else { b.len() };
            Some(if b_len > a_len { b } else { a })
        }
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || matches!(
            trimmed.to_lowercase().as_str(),
            "unknown" | "n/a" | "na" | "none" | "not available" | "not applicable"
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn candidate(name: &str) -> MedicationCandidate {
        MedicationCandidate {
            raw_text: name.to_string(),
            normalized_name: name.to_string(),
        }
    }

    fn result(source: SourceId, confidence: f64, fields: MedicationFields) -> SourceResult {
        SourceResult {
            source,
            fields,
            confidence,
            corrected_name: None,
        }
    }

    /// Canned fallback source for reconciler tests.
    struct FakeFallback {
        answer: Option<SourceResult>,
    }

    #[async_trait::async_trait]
    impl MedicationSource for FakeFallback {
        fn id(&self) -> SourceId {
            SourceId::AiFallback
        }
        async fn lookup(&self, _name: &str) -> Result<Option<SourceResult>> {
            Ok(self.answer.clone())
        }
    }

    fn reconciler_with(answer: Option<SourceResult>) -> Reconciler {
        Reconciler::new(
            Some(Arc::new(FakeFallback { answer })),
            Duration::from_secs(1),
        )
    }

    fn reconciler_without_fallback() -> Reconciler {
        Reconciler::new(None, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_no_results_and_rejecting_fallback_yields_default() {
        let rec = reconciler_with(None)
            .reconcile(&candidate("notadrug"), Vec::new())
            .await;
        assert_eq!(rec.confidence, 0.1);
        assert!(rec.sources.is_empty());
        assert_eq!(rec.data_source, "fallback_system");
    }

    #[tokio::test]
    async fn test_no_results_without_fallback_configured_yields_default() {
        let rec = reconciler_without_fallback()
            .reconcile(&candidate("notadrug"), Vec::new())
            .await;
        assert_eq!(rec.data_source, "fallback_system");
    }

    #[tokio::test]
    async fn test_two_source_corroboration_formula() {
        // ((1.0*0.8) + (0.85*0.8)) / 2 = 0.74, times the two-source
        // multiplier 1.1 -> 0.814.
        let results = vec![
            result(SourceId::OpenFda, 0.8, MedicationFields::default()),
            result(SourceId::NdcDirectory, 0.8, MedicationFields::default()),
        ];
        let rec = reconciler_without_fallback()
            .reconcile(&candidate("ibuprofen"), results)
            .await;

        assert!((rec.confidence - 0.814).abs() < 1e-9);
        assert!(rec.confidence < AUTHORITATIVE_CEILING);
        assert_eq!(rec.data_source, "multiple_authoritative_sources");
        assert_eq!(rec.sources, vec!["openfda", "ndc_directory"]);
    }

    #[tokio::test]
    async fn test_confidence_capped_at_ceiling() {
        let results = vec![
            result(SourceId::OpenFda, 1.0, MedicationFields::default()),
            result(SourceId::RxNorm, 1.0, MedicationFields::default()),
            result(SourceId::NdcDirectory, 1.0, MedicationFields::default()),
        ];
        let rec = reconciler_without_fallback()
            .reconcile(&candidate("aspirin"), results)
            .await;
        assert!(rec.confidence <= AUTHORITATIVE_CEILING);
    }

    #[tokio::test]
    async fn test_field_merge_prefers_longest_non_placeholder() {
        let results = vec![
            result(
                SourceId::OpenFda,
                0.8,
                MedicationFields {
                    used_for: Some("pain".to_string()),
                    warnings: Some("unknown".to_string()),
                    ..MedicationFields::default()
                },
            ),
            result(
                SourceId::MedlinePlus,
                0.6,
                MedicationFields {
                    used_for: Some("relief of mild to moderate pain and fever".to_string()),
                    warnings: Some("may cause stomach bleeding".to_string()),
                    ..MedicationFields::default()
                },
            ),
        ];
        let rec = reconciler_without_fallback()
            .reconcile(&candidate("ibuprofen"), results)
            .await;

        assert_eq!(
            rec.fields.used_for.as_deref(),
            Some("relief of mild to moderate pain and fever")
        );
        // Placeholder from the more reliable source loses to real text.
        assert_eq!(
            rec.fields.warnings.as_deref(),
            Some("may cause stomach bleeding")
        );
    }

    #[tokio::test]
    async fn test_equal_length_tie_goes_to_more_reliable_source() {
        let results = vec![
            result(
                SourceId::RxNorm,
                0.7,
                MedicationFields {
                    dosage_form: Some("syrup".to_string()),
                    ..MedicationFields::default()
                },
            ),
            result(
                SourceId::OpenFda,
                0.7,
                MedicationFields {
                    dosage_form: Some("table".to_string()),
                    ..MedicationFields::default()
                },
            ),
        ];
        let rec = reconciler_without_fallback()
            .reconcile(&candidate("x"), results)
            .await;
        assert_eq!(rec.fields.dosage_form.as_deref(), Some("table"));
    }

    #[tokio::test]
    async fn test_brand_names_union_dedup() {
        let results = vec![
            result(
                SourceId::OpenFda,
                0.8,
                MedicationFields {
                    brand_names: vec!["Advil".to_string(), "Motrin".to_string()],
                    ..MedicationFields::default()
                },
            ),
            result(
                SourceId::RxNorm,
                0.8,
                MedicationFields {
                    brand_names: vec!["ADVIL".to_string(), "Nurofen".to_string()],
                    ..MedicationFields::default()
                },
            ),
        ];
        let rec = reconciler_without_fallback()
            .reconcile(&candidate("ibuprofen"), results)
            .await;
        assert_eq!(rec.fields.brand_names, vec!["Advil", "Motrin", "Nurofen"]);
    }

    #[tokio::test]
    async fn test_weak_results_hybridize_with_stronger_fallback() {
        let weak = vec![result(
            SourceId::MedlinePlus,
            0.2,
            MedicationFields {
                used_for: Some("pain".to_string()),
                ..MedicationFields::default()
            },
        )];
        let fb = SourceResult {
            source: SourceId::AiFallback,
            fields: MedicationFields {
                used_for: Some("relief of mild to moderate pain".to_string()),
                dosage_form: Some("tablet".to_string()),
                ..MedicationFields::default()
            },
            confidence: 0.6,
            corrected_name: None,
        };

        let rec = reconciler_with(Some(fb))
            .reconcile(&candidate("ibuprofen"), weak)
            .await;

        assert_eq!(rec.data_source, "hybrid_authoritative_fallback");
        assert!(rec.sources.contains(&"ai_fallback".to_string()));
        assert!(rec.sources.contains(&"medlineplus".to_string()));
        // 0.7 * (0.75 * 0.2) + 0.3 * 0.6 = 0.285, under the hybrid cap.
        assert!(rec.confidence <= HYBRID_CAP);
        assert_eq!(
            rec.fields.used_for.as_deref(),
            Some("relief of mild to moderate pain")
        );
        assert_eq!(rec.fields.dosage_form.as_deref(), Some("tablet"));
    }

    #[tokio::test]
    async fn test_strong_results_skip_fallback() {
        let strong = vec![result(
            SourceId::OpenFda,
            0.8,
            MedicationFields {
                generic_name: Some("ibuprofen".to_string()),
                ..MedicationFields::default()
            },
        )];
        // A fallback that would "win" if it were consulted.
        let fb = SourceResult {
            source: SourceId::AiFallback,
            fields: MedicationFields {
                generic_name: Some("wrong".to_string()),
                ..MedicationFields::default()
            },
            confidence: 0.75,
            corrected_name: None,
        };

        let rec = reconciler_with(Some(fb))
            .reconcile(&candidate("ibuprofen"), strong)
            .await;
        assert_eq!(rec.data_source, "authoritative_source");
        assert_eq!(rec.fields.generic_name.as_deref(), Some("ibuprofen"));
    }

    #[tokio::test]
    async fn test_usable_fallback_alone_becomes_record() {
        let fb = SourceResult {
            source: SourceId::AiFallback,
            fields: MedicationFields {
                generic_name: Some("dextromethorphan".to_string()),
                used_for: Some("cough suppression in colds and flu".to_string()),
                ..MedicationFields::default()
            },
            confidence: 0.55,
            corrected_name: Some("dextromethorphan".to_string()),
        };
        let rec = reconciler_with(Some(fb))
            .reconcile(&candidate("dextrometorfan"), Vec::new())
            .await;

        assert_eq!(rec.data_source, "ai_fallback");
        assert_eq!(rec.sources, vec!["ai_fallback"]);
        assert_eq!(rec.confidence, 0.55);
        assert_eq!(rec.corrected_name.as_deref(), Some("dextromethorphan"));
    }

    #[tokio::test]
    async fn test_hung_fallback_is_bounded_by_timeout() {
        struct HangingFallback;

        #[async_trait::async_trait]
        impl MedicationSource for HangingFallback {
            fn id(&self) -> SourceId {
                SourceId::AiFallback
            }
            async fn lookup(&self, _name: &str) -> Result<Option<SourceResult>> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(None)
            }
        }

        let reconciler = Reconciler::new(
            Some(Arc::new(HangingFallback)),
            Duration::from_millis(50),
        );
        // Must come back as the default record within the budget, not block
        // for the fallback's full 60 s.
        let rec = tokio::time::timeout(
            Duration::from_secs(2),
            reconciler.reconcile(&candidate("mystery"), Vec::new()),
        )
        .await
        .expect("reconcile must settle once the fallback timeout elapses");

        assert_eq!(rec.confidence, 0.1);
        assert_eq!(rec.data_source, "fallback_system");
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(is_placeholder(""));
        assert!(is_placeholder("  "));
        assert!(is_placeholder("N/A"));
        assert!(is_placeholder("Unknown"));
        assert!(!is_placeholder("tablet"));
    }

    #[test]
    fn test_reconciled_confidence_always_in_unit_interval() {
        for (w, c, n) in [(1.0, 1.0, 5.0), (0.3, 0.1, 1.0)] {
            let corroboration = (1.0 + CORROBORATION_STEP * (n - 1.0)).min(CORROBORATION_CAP);
            let conf: f64 = (w * c * corroboration).min(AUTHORITATIVE_CEILING);
            assert!((0.0..=1.0).contains(&conf));
        }
    }
}
