// trustlens/src/engine/dispatcher.rs
//
// Turns abusive session profiles into fraud signals and appends them to the
// signal store. Review tooling reads them back and resolves them.
//
// Signal ids are derived from (ip, visit_id, signal_type), so re-scanning the
// same session never raises a second signal for it. Severity is re-derived
// only when a signal is first raised.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};

use crate::config::SignalConfig;
use crate::error::EngineResult;
use crate::events::{Classification, FraudSignal, SessionFraudProfile, Severity};
use crate::sources::SignalStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub raised:        usize,
    pub already_known: usize,
}

pub fn signal_type(class: Classification) -> Option<&'static str> {
    match class {
        Classification::Bot        => Some("bot_detected"),
        Classification::Scraper    => Some("scraper_detected"),
        Classification::Suspicious => Some("suspicious_session"),
        Classification::Converter | Classification::Engaged => None,
    }
}

pub fn severity(score: u8, cfg: &SignalConfig) -> Severity {
    if score >= cfg.critical_score {
        Severity::Critical
    } else if score >= cfg.high_score {
        Severity::High
    } else if score >= cfg.medium_score {
        Severity::Medium
    } else {
        Severity::Low
    }
}

pub struct Dispatcher {
    store: Arc<dyn SignalStore>,
    cfg:   SignalConfig,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn SignalStore>, cfg: SignalConfig) -> Self {
        Self { store, cfg }
    }

    /// None for non-abusive sessions.
    pub fn build_signal(&self, p: &SessionFraudProfile, detected_at: DateTime<Utc>) -> Option<FraudSignal> {
        let kind = signal_type(p.classification)?;
        Some(FraudSignal {
            id:          FraudSignal::derive_id(&p.ip, &p.visit_id, kind),
            ip:          p.ip.clone(),
            visit_id:    p.visit_id.clone(),
            signal_type: kind.to_string(),
            severity:    severity(p.fraud_score, &self.cfg),
            score:       p.fraud_score,
            evidence: json!({
                "classification":      p.classification,
                "requests_per_minute": p.requests_per_minute,
                "correlation_score":   p.correlation_score,
                "request_count":       p.request_count,
                "event_count":         p.event_count,
                "is_likely_bot":       p.is_likely_bot,
                "is_velocity_abuse":   p.is_velocity_abuse,
                "is_low_correlation":  p.is_low_correlation,
                "user_agent":          p.user_agent,
                "identity_id":         p.identity_id,
                "reasons":             p.evidence,
            }),
            detected_at,
            resolved:    false,
            resolved_at: None,
        })
    }

    pub async fn dispatch(&self, profiles: &[SessionFraudProfile]) -> EngineResult<DispatchSummary> {
        let now = Utc::now();
        let mut summary = DispatchSummary::default();
        for p in profiles {
            let Some(signal) = self.build_signal(p, now) else { continue };
            let (id, sev, kind) = (signal.id.clone(), signal.severity, signal.signal_type.clone());
            if self.store.append(signal).await? {
                summary.raised += 1;
                info!(ip = %p.ip, visit_id = %p.visit_id, score = p.fraud_score, "{} {} id={}", sev, kind, id);
            } else {
                summary.already_known += 1;
                debug!(id = %id, "signal already recorded");
            }
        }
        Ok(summary)
    }
}
