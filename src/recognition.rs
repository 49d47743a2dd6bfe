//! Text recognition over image variants.
//!
//! Defines the [`TextRecognizer`] trait so the engine can run against a
//! test double, plus the Tesseract-backed implementation used in
//! production. All variants are recognized concurrently; one variant
//! failing is logged and skipped, and the request only fails when every
//! variant fails.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result};
use leptess::{LepTess, Variable};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::ScanError;
use crate::schema::{ImageVariant, RecognitionResult};

/// Characters Tesseract is allowed to emit. Restricting the alphabet to
/// what appears on medication packaging cuts down on symbol hallucinations.
const CHAR_WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789 .,:;()/%-+";

/// Page segmentation strategy for one pass. The variant set alternates
/// between the two to hedge against layout variance: boxes read best as a
/// full page, blister packs as a single text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationMode {
    /// Tesseract PSM 3: fully automatic page segmentation.
    WholeImage,
    /// Tesseract PSM 6: assume a single uniform block of text.
    SingleBlock,
}

impl SegmentationMode {
    pub fn for_variant_index(index: usize) -> Self {
        if index % 2 == 0 {
            Self::WholeImage
        } else {
            Self::SingleBlock
        }
    }

    fn psm_value(self) -> &'static str {
        match self {
            Self::WholeImage => "3",
            Self::SingleBlock => "6",
        }
    }
}

/// One recognition pass over one variant.
#[async_trait::async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(
        &self,
        variant: ImageVariant,
        mode: SegmentationMode,
    ) -> Result<RecognitionResult>;
}

/// Tesseract-backed recognizer (via leptess). A fresh engine instance is
/// created per pass; instances are not Sync and passes run on the blocking
/// pool anyway.
pub struct TesseractRecognizer;

#[async_trait::async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(
        &self,
        variant: ImageVariant,
        mode: SegmentationMode,
    ) -> Result<RecognitionResult> {
        tokio::task::spawn_blocking(move || recognize_blocking(&variant, mode))
            .await
            .context("recognition task panicked")?
    }
}

fn recognize_blocking(variant: &ImageVariant, mode: SegmentationMode) -> Result<RecognitionResult> {
    let mut tess = LepTess::new(None, "eng")
        .context("failed to initialize Tesseract; is tesseract installed?")?;

    tess.set_variable(Variable::TesseditCharWhitelist, CHAR_WHITELIST)
        .context("failed to set character whitelist")?;
    tess.set_variable(Variable::TesseditPagesegMode, mode.psm_value())
        .context("failed to set page segmentation mode")?;

    // leptess wants encoded bytes, not a raw buffer.
    let mut png_bytes = Vec::new();
    variant
        .image
        .write_to(&mut Cursor::new(&mut png_bytes), image::ImageFormat::Png)
        .context("failed to encode variant as PNG")?;

    tess.set_image_from_mem(&png_bytes)
        .context("failed to load variant into Tesseract")?;
    tess.set_source_resolution(300);

    let text = tess
        .get_utf8_text()
        .context("text extraction failed")?
        .trim()
        .to_string();
    let confidence = f64::from(tess.mean_text_conf());

    debug!(
        "variant '{}' ({:?}): {} chars, confidence {:.0}",
        variant.label,
        mode,
        text.len(),
        confidence
    );

    Ok(RecognitionResult {
        text,
        confidence,
        variant_label: variant.label,
    })
}

/// Fans recognition out across all variants and settles every outcome.
pub struct RecognitionEngine {
    recognizer: Arc<dyn TextRecognizer>,
}

impl RecognitionEngine {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self { recognizer }
    }

    pub fn tesseract() -> Self {
        Self::new(Arc::new(TesseractRecognizer))
    }

    /// Recognize every variant concurrently. Results come back in
    /// variant-generation order regardless of completion order, since the
    /// selector's tie-break depends on it. Fails only if all variants fail.
    pub async fn recognize_all(
        &self,
        variants: Vec<ImageVariant>,
    ) -> Result<Vec<RecognitionResult>, ScanError> {
        let attempted = variants.len();
        let mut join_set = JoinSet::new();

        for (index, variant) in variants.into_iter().enumerate() {
            let recognizer = Arc::clone(&self.recognizer);
            let mode = SegmentationMode::for_variant_index(index);
            let label = variant.label;
            join_set.spawn(async move {
                let outcome = recognizer.recognize(variant, mode).await;
                (index, label, outcome)
            });
        }

        let mut slots: Vec<Option<RecognitionResult>> = (0..attempted).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, _, Ok(result))) => slots[index] = Some(result),
                Ok((_, label, Err(e))) => {
                    warn!("recognition failed for variant '{}': {:#}", label, e);
                }
                Err(e) => {
                    warn!("recognition task join error: {}", e);
                }
            }
        }

        let results: Vec<RecognitionResult> = slots.into_iter().flatten().collect();
        if results.is_empty() {
            return Err(ScanError::RecognitionExhausted { attempted });
        }
        Ok(results)
    }
}
