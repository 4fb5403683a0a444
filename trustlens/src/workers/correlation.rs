// trustlens/src/workers/correlation.rs
//
// Request/event correlation. A real browser emits client-side events for
// the pages it loads; a scraper issues requests and emits nothing.
//
//   correlation = clamp(events / requests, 0, 1)    (1.0 with no requests)
//
// Below min_requests_for_correlation the ratio is too noisy to count as
// evidence: the score is still reported but never flags the session.

use crate::config::{Heuristic, SessionConfig};
use crate::state::window::SessionWindow;

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationSignal {
    pub correlation_score:  f64,
    pub is_low_correlation: bool,
    /// Enough requests for the ratio to count.
    pub is_conclusive:      bool,
    pub evidence:           Vec<String>,
}

pub fn ratio(requests: usize, events: usize) -> f64 {
    if requests == 0 {
        return 1.0;
    }
    (events as f64 / requests as f64).clamp(0.0, 1.0)
}

pub fn analyze(window: &SessionWindow, cfg: &SessionConfig) -> CorrelationSignal {
    let requests = window.requests.len();
    let events   = window.events.len();
    let score    = ratio(requests, events);

    let is_conclusive      = requests as f64 >= cfg.threshold(Heuristic::MinRequestsForCorrelation);
    let is_low_correlation = is_conclusive && score < cfg.threshold(Heuristic::LowCorrelation);

    let mut evidence = Vec::new();
    if is_low_correlation {
        evidence.push(format!("low_correlation:{events}ev/{requests}req"));
    }
    CorrelationSignal { correlation_score: score, is_low_correlation, is_conclusive, evidence }
}
