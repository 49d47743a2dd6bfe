//! Request-level error taxonomy.
//!
//! Only two failures reach the caller: an unreadable input image and a
//! recognition stage where every variant failed. Everything below that
//! (single-variant OCR errors, source timeouts, malformed source payloads,
//! fallback rejections) is absorbed into "no data" values where it occurs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    /// The uploaded image could not be decoded. Fatal, no partial result.
    #[error("failed to decode input image: {0}")]
    Preprocessing(String),

    /// Every enhancement variant failed text recognition.
    #[error("text recognition failed on all {attempted} image variants")]
    RecognitionExhausted { attempted: usize },
}
