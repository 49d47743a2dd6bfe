//! Runtime settings, read once at startup from the environment
//! (`.env` is loaded in `main` via dotenvy).

use std::env;
use std::time::Duration;

/// Tunables for the scan pipeline. Everything has a default so the service
/// boots with no environment at all; the generative fallback source
/// additionally needs `OPENROUTER_API_KEY` and stays disabled without it.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Per-source query timeout.
    pub source_timeout: Duration,
    /// Cache entries older than this behave as misses.
    pub cache_ttl: Duration,
    /// Upper bound on candidates extracted from one image.
    pub max_candidates: usize,
    /// Model used by the generative fallback source.
    pub fallback_model: String,
}

const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 4;
const DEFAULT_CACHE_TTL_HOURS: u64 = 24;
const DEFAULT_MAX_CANDIDATES: usize = 5;
const DEFAULT_FALLBACK_MODEL: &str = "google/gemini-3-flash-preview";

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            source_timeout: Duration::from_secs(DEFAULT_SOURCE_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_HOURS * 3600),
            max_candidates: DEFAULT_MAX_CANDIDATES,
            fallback_model: DEFAULT_FALLBACK_MODEL.to_string(),
        }
    }
}

impl ScanConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            source_timeout: env_secs("MEDSCAN_SOURCE_TIMEOUT_SECS")
                .unwrap_or(defaults.source_timeout),
            cache_ttl: env_secs("MEDSCAN_CACHE_TTL_SECS").unwrap_or(defaults.cache_ttl),
            max_candidates: env::var("MEDSCAN_MAX_CANDIDATES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_candidates),
            fallback_model: env::var("MEDSCAN_FALLBACK_MODEL")
                .unwrap_or(defaults.fallback_model),
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    env::var(key).ok()?.parse().ok().map(Duration::from_secs)
}
