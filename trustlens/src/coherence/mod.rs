// trustlens/src/coherence/mod.rs
//
// Identity coherence engine.
//
//   caller → Aggregator → sources (parallel) → resolver → rules → risk → report
//
// Only aggregate() suspends. Everything after the join is synchronous and
// pure over the aggregated snapshot, so the same snapshot always yields the
// same score, flags and status.

pub mod aggregator;
pub mod metrics;
pub mod resolver;
pub mod risk;
pub mod rules;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::CoherenceConfig;
use crate::error::EngineResult;
use crate::records::CoherenceReport;
use crate::sources::{ActivitySource, IdentityStore};

use aggregator::{Aggregation, Aggregator};
use rules::RuleContext;

pub struct CoherenceEngine {
    aggregator: Aggregator,
    cfg:        CoherenceConfig,
}

impl CoherenceEngine {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        sources: Vec<Arc<dyn ActivitySource>>,
        cfg: CoherenceConfig,
    ) -> Self {
        let default_timeout = Duration::from_millis(cfg.default_source_timeout_ms);
        Self { aggregator: Aggregator::new(identities, sources, default_timeout), cfg }
    }

    pub async fn report(&self, identity_id: &str) -> EngineResult<CoherenceReport> {
        let agg = self.aggregator.aggregate(identity_id).await?;
        let report = score(&agg, &self.cfg, Utc::now())?;
        info!(
            identity_id,
            score    = report.score,
            status   = %report.status,
            flags    = report.flags.len(),
            degraded = report.degraded_sources.len(),
            "coherence report"
        );
        Ok(report)
    }
}

/// Score one aggregated snapshot. Pure apart from the supplied timestamp.
pub fn score(agg: &Aggregation, cfg: &CoherenceConfig, generated_at: DateTime<Utc>) -> EngineResult<CoherenceReport> {
    let attrs = resolver::resolve(&agg.identity, &agg.records, cfg);
    let outcome = rules::run(&RuleContext {
        identity: &agg.identity,
        records:  &agg.records,
        attrs:    &attrs,
        degraded: &agg.degraded,
        cfg,
    })?;
    let assessment = risk::classify(outcome.score);

    Ok(CoherenceReport {
        identity_id:      agg.identity.id.clone(),
        score:            outcome.score,
        status:           assessment.status,
        profile_risk:     assessment.profile_risk,
        flags:            outcome.flags(),
        checks_performed: outcome.checks_performed,
        metrics:          metrics::compute(&agg.identity, &agg.records),
        degraded_sources: agg.degraded.iter().copied().collect(),
        generated_at,
    })
}
