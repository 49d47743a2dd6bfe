//! The scan pipeline: image bytes in, medication list out.
//!
//! image → enhancement variants → concurrent recognition → best-result
//! selection/merge → candidate extraction → per-candidate resolution
//! (cache, sources, reconciliation) → assembled response. Candidates are
//! resolved sequentially; the heavy fan-out happens inside each resolution.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::ScanError;
use crate::extract::{self, CandidateExtractor};
use crate::recognition::RecognitionEngine;
use crate::resolver::SourceResolver;
use crate::schema::{ReconciledRecord, ScanResponse};
use crate::selector::merge_results;
use crate::variants::generate_variants;

pub struct ScanPipeline {
    engine: RecognitionEngine,
    extractor: CandidateExtractor,
    resolver: Arc<SourceResolver>,
}

impl ScanPipeline {
    pub fn new(
        engine: RecognitionEngine,
        extractor: CandidateExtractor,
        resolver: Arc<SourceResolver>,
    ) -> Self {
        Self {
            engine,
            extractor,
            resolver,
        }
    }

    /// Run the full pipeline on one uploaded image.
    pub async fn scan(&self, image_bytes: &[u8]) -> Result<ScanResponse, ScanError> {
        let image = image::load_from_memory(image_bytes)
            .map_err(|e| ScanError::Preprocessing(e.to_string()))?;
        debug!(
            "decoded {}x{} image ({} bytes)",
            image.width(),
            image.height(),
            image_bytes.len()
        );

        let variants = generate_variants(&image);
        let results = self.engine.recognize_all(variants).await?;

        let attempted = results.len();
        let merged = merge_results(&results)
            .ok_or(ScanError::RecognitionExhausted { attempted })?;
        info!(
            "recognition done: best variant '{}' ({:.2}), {} chars merged",
            merged.best_variant,
            merged.confidence,
            merged.text.len()
        );

        let candidates = self.extractor.extract(&merged.text);
        info!(
            "extracted {} candidates: {:?}",
            candidates.len(),
            candidates
                .iter()
                .map(|c| c.normalized_name.as_str())
                .collect::<Vec<_>>()
        );

        let mut medications = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            medications.push(self.resolver.resolve(candidate).await);
        }

        Ok(ScanResponse::new(
            medications,
            merged.text,
            merged.confidence,
        ))
    }

    /// Resolve a single typed-in name, skipping the image stages.
    /// `None` means the input doesn't look like a medication name at all.
    pub async fn lookup(&self, raw_name: &str) -> Option<ReconciledRecord> {
        let candidate = extract::normalize_candidate(raw_name)?;
        Some(self.resolver.resolve(&candidate).await)
    }
}
