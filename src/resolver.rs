//! Per-candidate source resolution.
//!
//! Cache first; on miss, every authoritative source is queried
//! concurrently with its own timeout, every outcome is settled as a typed
//! value (found / no data / failed / timed out — none cancels a sibling),
//! and the reconciler turns the survivors into one record, which is cached
//! when it is worth keeping.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::MedicationCache;
use crate::reconcile::{Reconciler, CACHE_WRITE_THRESHOLD};
use crate::schema::{MedicationCandidate, ReconciledRecord};
use crate::sources::{MedicationSource, SourceOutcome};

pub struct SourceResolver {
    cache: MedicationCache,
    sources: Vec<Arc<dyn MedicationSource>>,
    reconciler: Reconciler,
    timeout: Duration,
}

impl SourceResolver {
    pub fn new(
        cache: MedicationCache,
        sources: Vec<Arc<dyn MedicationSource>>,
        reconciler: Reconciler,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            sources,
            reconciler,
            timeout,
        }
    }

    /// Resolve one candidate to a reconciled record.
    pub async fn resolve(&self, candidate: &MedicationCandidate) -> ReconciledRecord {
        let name = &candidate.normalized_name;

        if let Some(hit) = self.cache.get(name) {
            debug!("'{}' served from cache", name);
            return hit;
        }

        let outcomes = self.query_all(name).await;
        let results = outcomes
            .into_iter()
            .filter_map(SourceOutcome::into_result)
            .collect();

        let record = self.reconciler.reconcile(candidate, results).await;

        // Only genuinely sourced records are worth remembering; default and
        // near-default records should be retried on the next request.
        if record.confidence > CACHE_WRITE_THRESHOLD && !record.sources.is_empty() {
            self.cache.set(name, record.clone());
        }

        record
    }

    /// Fan out to every authoritative source and settle all outcomes.
    async fn query_all(&self, name: &str) -> Vec<SourceOutcome> {
        let mut join_set = JoinSet::new();
        for source in &self.sources {
            let source = Arc::clone(source);
            let name = name.to_string();
            let timeout = self.timeout;
            join_set.spawn(async move {
                let id = source.id();
                match tokio::time::timeout(timeout, source.lookup(&name)).await {
                    Ok(Ok(Some(result))) => SourceOutcome::Found(result),
                    Ok(Ok(None)) => SourceOutcome::NoData(id),
                    Ok(Err(e)) => SourceOutcome::Failed {
                        source: id,
                        reason: format!("{e:#}"),
                    },
                    Err(_) => SourceOutcome::TimedOut(id),
                }
            });
        }

        let mut outcomes = Vec::with_capacity(self.sources.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => {
                    match &outcome {
                        SourceOutcome::Found(r) => {
                            debug!("{} answered for '{}' ({:.2})", r.source, name, r.confidence)
                        }
                        SourceOutcome::NoData(id) => debug!("{} has no data for '{}'", id, name),
                        SourceOutcome::Failed { source, reason } => {
                            warn!("{} failed for '{}': {}", source, name, reason)
                        }
                        SourceOutcome::TimedOut(id) => {
                            warn!("{} timed out for '{}'", id, name)
                        }
                    }
                    outcomes.push(outcome);
                }
                Err(e) => warn!("source query task join error: {}", e),
            }
        }

        let found = outcomes
            .iter()
            .filter(|o| matches!(o, SourceOutcome::Found(_)))
            .count();
        info!(
            "'{}': {}/{} sources answered",
            name,
            found,
            self.sources.len()
        );
        outcomes
    }
}
