// trustlens/src/engine/scanner.rs
//
// Periodic pull-and-recompute over the raw request/event log.
//
//   sessions(range) → one JoinSet task per (ip, visit_id)
//                   → window(key, range) under window_timeout_ms
//                   → SessionClassifier::classify
//   → aggregate_by_ip → detect_patterns → (scan only) dispatch signals
//
// Tasks are independent and read-only against the raw log store. A window
// that fails to load is skipped with a warning; a task that panics fails the
// whole pass, so no partial profile set is ever returned as complete.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{IpRiskProfile, SessionFraudProfile, SessionKey, SuspiciousPattern};
use crate::sources::{RawLogStore, TimeRange};

use super::dispatcher::{DispatchSummary, Dispatcher};
use super::fusion::SessionClassifier;
use super::{ip_risk, patterns};

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub range:       TimeRange,
    pub profiles:    Vec<SessionFraudProfile>,
    pub ip_profiles: Vec<IpRiskProfile>,
    pub patterns:    Vec<SuspiciousPattern>,
    pub skipped:     usize,
    pub dispatch:    DispatchSummary,
    pub finished_at: DateTime<Utc>,
}

pub struct Scanner {
    raw_logs:   Arc<dyn RawLogStore>,
    classifier: Arc<SessionClassifier>,
    dispatcher: Dispatcher,
    cfg:        EngineConfig,
    last_scan:  RwLock<Option<DateTime<Utc>>>,
}

impl Scanner {
    pub fn new(
        raw_logs: Arc<dyn RawLogStore>,
        classifier: Arc<SessionClassifier>,
        dispatcher: Dispatcher,
        cfg: EngineConfig,
    ) -> Self {
        Self { raw_logs, classifier, dispatcher, cfg, last_scan: RwLock::new(None) }
    }

    /// When the last dispatching pass finished, if any has.
    pub fn last_scan(&self) -> Option<DateTime<Utc>> {
        *self.last_scan.read()
    }

    pub fn lookback(&self) -> TimeRange {
        TimeRange::last_hours(self.cfg.session.lookback_hours)
    }

    /// Classify every session with activity in `range`. Sorted by fraud
    /// score descending, then (ip, visit_id).
    pub async fn profiles(&self, range: TimeRange) -> EngineResult<(Vec<SessionFraudProfile>, usize)> {
        let keys = self.raw_logs.sessions(range).await?;
        let timeout = Duration::from_millis(self.cfg.session.window_timeout_ms);

        let mut set: JoinSet<Result<Option<SessionFraudProfile>, (SessionKey, String)>> = JoinSet::new();
        for key in keys {
            let store      = Arc::clone(&self.raw_logs);
            let classifier = Arc::clone(&self.classifier);
            set.spawn(async move {
                let read = tokio::time::timeout(timeout, store.window(&key, range)).await;
                match read {
                    Ok(Ok(window)) => Ok(classifier.classify(&window)),
                    Ok(Err(e))     => Err((key, e.to_string())),
                    Err(_)         => Err((key, format!("window read timed out after {timeout:?}"))),
                }
            });
        }

        let mut out = Vec::new();
        let mut skipped = 0usize;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(Some(profile))) => out.push(profile),
                Ok(Ok(None))          => {}
                Ok(Err((key, reason))) => {
                    warn!(session = %key, "skipping session: {reason}");
                    skipped += 1;
                }
                Err(e) => {
                    error!("session classification task failed: {e}");
                    return Err(EngineError::Internal(format!("session classification task failed: {e}")));
                }
            }
        }

        out.sort_by(|a, b| {
            b.fraud_score.cmp(&a.fraud_score)
                .then_with(|| a.ip.cmp(&b.ip))
                .then_with(|| a.visit_id.cmp(&b.visit_id))
        });
        Ok((out, skipped))
    }

    /// Profiles, per-IP aggregates and patterns, without raising signals.
    pub async fn analyze(&self, range: TimeRange) -> EngineResult<ScanReport> {
        let (profiles, skipped) = self.profiles(range).await?;
        let ip_profiles = ip_risk::aggregate_by_ip(&profiles, &self.cfg.ip_risk);
        let patterns    = patterns::detect_patterns(&profiles, &self.cfg.patterns);
        Ok(ScanReport {
            range,
            profiles,
            ip_profiles,
            patterns,
            skipped,
            dispatch: DispatchSummary::default(),
            finished_at: Utc::now(),
        })
    }

    /// One full pass over the look-back window, dispatching signals.
    pub async fn scan_once(&self) -> EngineResult<ScanReport> {
        let mut report = self.analyze(self.lookback()).await?;
        report.dispatch = self.dispatcher.dispatch(&report.profiles).await?;
        report.finished_at = Utc::now();
        *self.last_scan.write() = Some(report.finished_at);

        let abusive = report.profiles.iter().filter(|p| p.classification.is_abusive()).count();
        info!(
            sessions = report.profiles.len(),
            abusive,
            ips      = report.ip_profiles.len(),
            patterns = report.patterns.len(),
            raised   = report.dispatch.raised,
            skipped  = report.skipped,
            "scan complete"
        );
        Ok(report)
    }

    /// Scan every `scan_interval_secs` until the task is dropped.
    pub async fn run(self: Arc<Self>) {
        let every = Duration::from_secs(self.cfg.session.scan_interval_secs.max(1));
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Scanner every {:?} over the last {}h", every, self.cfg.session.lookback_hours);
        loop {
            tick.tick().await;
            if let Err(e) = self.scan_once().await {
                error!("scan failed: {e}");
            }
        }
    }
}
