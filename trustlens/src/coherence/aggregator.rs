// trustlens/src/coherence/aggregator.rs
//
// Fan-out / fan-in over every activity source for one identity.
//
//   1. canonical identity lookup (absent → NotFound, nothing dispatched)
//   2. one JoinSet task per source, each under that source's own timeout
//   3. wait for all to settle; failures become empty + degraded
//
// The JoinSet is owned by the aggregate() future. If the caller drops that
// future the set is dropped with it and every still-running read is aborted.
// There is no aggregate-level timeout: a slow source delays only the join.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult, SourceError};
use crate::records::{ActivityRecord, Identity, SourceType};
use crate::sources::{ActivitySource, IdentityStore};

/// Everything the resolver and rule pipeline need for one identity.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub identity: Identity,
    pub records:  Vec<ActivityRecord>,
    /// Sources whose read failed or timed out. Their contribution is empty.
    pub degraded: BTreeSet<SourceType>,
}

impl Aggregation {
    pub fn is_degraded(&self, source: SourceType) -> bool {
        self.degraded.contains(&source)
    }
}

type SourceOutcome = (usize, Result<Vec<ActivityRecord>, SourceError>);

pub struct Aggregator {
    identities:      Arc<dyn IdentityStore>,
    sources:         Vec<Arc<dyn ActivitySource>>,
    default_timeout: Duration,
}

impl Aggregator {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        sources: Vec<Arc<dyn ActivitySource>>,
        default_timeout: Duration,
    ) -> Self {
        Self { identities, sources, default_timeout }
    }

    pub async fn aggregate(&self, identity_id: &str) -> EngineResult<Aggregation> {
        let identity = self.identities.get(identity_id).await?
            .ok_or_else(|| EngineError::not_found(identity_id))?;

        let mut set: JoinSet<SourceOutcome> = JoinSet::new();
        for (idx, source) in self.sources.iter().enumerate() {
            let source  = Arc::clone(source);
            let id      = identity_id.to_string();
            let after   = source.timeout().unwrap_or(self.default_timeout);
            set.spawn(async move {
                let source_type = source.source_type();
                let outcome = match tokio::time::timeout(after, source.list(&id)).await {
                    Ok(res) => res,
                    Err(_)  => Err(SourceError::Timeout { source_type, after }),
                };
                (idx, outcome)
            });
        }

        // Settled slots; a slot still None after the join belongs to a task
        // that panicked (JoinError carries no payload we can route back).
        let mut settled: Vec<Option<Result<Vec<ActivityRecord>, SourceError>>> =
            vec![None; self.sources.len()];

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => settled[idx] = Some(outcome),
                Err(e) => debug!(identity_id, "source task ended abnormally: {e}"),
            }
        }

        let mut records  = Vec::new();
        let mut degraded = BTreeSet::new();
        for (idx, slot) in settled.into_iter().enumerate() {
            let source_type = self.sources[idx].source_type();
            let outcome = slot.unwrap_or(Err(SourceError::Panicked { source_type }));
            match outcome {
                Ok(mut recs) => {
                    debug!(identity_id, source = %source_type, n = recs.len(), "source read");
                    records.append(&mut recs);
                }
                Err(e) => {
                    warn!(identity_id, source = %source_type, "partial source failure: {e}");
                    degraded.insert(source_type);
                }
            }
        }

        Ok(Aggregation { identity, records, degraded })
    }
}
