// trustlens/src/engine/fusion.rs
//
// Session signal fusion → fraud score → classification.
//
// fraud_score = round(100 · min(1, Σ wᵢ·xᵢ)) over:
//   LikelyBot           0.45  · is_likely_bot
//   VelocityAbuse       0.15  · is_velocity_abuse
//   VelocityIntensity   0.15  · min(rpm / saturation, 1)
//   LowCorrelation      0.10  · is_low_correlation
//   CorrelationDeficit  0.15  · (1 − correlation)   only when conclusive
//
// Weights sum: 0.45+0.15+0.15+0.10+0.15 = 1.00
//
// SUSPICIOUS = low correlation, or fraud_score ≥ suspicious_score (25). With
// default weights a session with no bot or velocity-abuse flag tops out at
// 28, so the cutoff sits below that.
//
// Every term is non-negative and non-decreasing in its signal, so the score
// is monotonic. Classification precedence is one explicit match:
// BOT > SCRAPER > SUSPICIOUS > CONVERTER > ENGAGED.

use std::sync::Arc;

use crate::config::{Heuristic, SessionConfig, SignalWeight};
use crate::events::{Classification, EventKind, SessionFraudProfile};
use crate::state::window::SessionWindow;
use crate::workers::bot::BotDetector;
use crate::workers::{self, SessionSignals};

pub fn fraud_score(signals: &SessionSignals, cfg: &SessionConfig) -> u8 {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    let corr = &signals.correlation;

    let terms = [
        (SignalWeight::LikelyBot,          flag(signals.bot.is_likely_bot)),
        (SignalWeight::VelocityAbuse,      flag(signals.velocity.is_velocity_abuse)),
        (SignalWeight::VelocityIntensity,  signals.velocity.intensity.clamp(0.0, 1.0)),
        (SignalWeight::LowCorrelation,     flag(corr.is_low_correlation)),
        (SignalWeight::CorrelationDeficit,
            if corr.is_conclusive { (1.0 - corr.correlation_score).clamp(0.0, 1.0) } else { 0.0 }),
    ];
    let sum: f64 = terms.iter().map(|(w, x)| cfg.weight(*w) * x).sum();
    (100.0 * sum.clamp(0.0, 1.0)).round() as u8
}

/// The four facts classification depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub bot:        bool,
    pub velocity:   bool,
    pub suspicious: bool,
    pub converted:  bool,
}

pub fn classify(v: Verdict) -> Classification {
    match (v.bot, v.velocity, v.suspicious, v.converted) {
        (true, _, _, _)              => Classification::Bot,
        (false, true, _, _)          => Classification::Scraper,
        (false, false, true, _)      => Classification::Suspicious,
        (false, false, false, true)  => Classification::Converter,
        (false, false, false, false) => Classification::Engaged,
    }
}

pub struct SessionClassifier {
    cfg:      SessionConfig,
    detector: Arc<dyn BotDetector>,
}

impl SessionClassifier {
    pub fn new(cfg: SessionConfig, detector: Arc<dyn BotDetector>) -> Self {
        Self { cfg, detector }
    }

    /// None for a window with no requests and no events.
    pub fn classify(&self, window: &SessionWindow) -> Option<SessionFraudProfile> {
        let first_seen = window.first_seen()?;
        let last_seen  = window.last_seen()?;

        let signals = workers::run_all(window, &self.cfg, self.detector.as_ref());
        let score   = fraud_score(&signals, &self.cfg);

        let suspicious = signals.correlation.is_low_correlation
            || f64::from(score) >= self.cfg.threshold(Heuristic::SuspiciousScore);
        let classification = classify(Verdict {
            bot:       signals.bot.is_likely_bot,
            velocity:  signals.velocity.is_velocity_abuse,
            suspicious,
            converted: window.has_event(EventKind::Conversion),
        });

        Some(SessionFraudProfile {
            ip:                  window.key.ip.clone(),
            visit_id:            window.key.visit_id.clone(),
            identity_id:         window.linked_identity(),
            request_count:       window.requests.len(),
            event_count:         window.events.len(),
            correlation_score:   (signals.correlation.correlation_score * 10000.0).round() / 10000.0,
            fraud_score:         score,
            classification,
            requests_per_minute: (signals.velocity.requests_per_minute * 100.0).round() / 100.0,
            is_likely_bot:       signals.bot.is_likely_bot,
            is_velocity_abuse:   signals.velocity.is_velocity_abuse,
            is_low_correlation:  signals.correlation.is_low_correlation,
            device_signature:    window.dominant_device(),
            user_agent:          window.dominant_user_agent(),
            evidence:            signals.evidence(),
            first_seen,
            last_seen,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::bot::BotVerdict;
    use crate::workers::correlation::CorrelationSignal;
    use crate::workers::velocity::VelocitySignal;

    fn signals(bot: bool, rpm: f64, corr: f64, requests: usize) -> SessionSignals {
        let cfg = SessionConfig::default();
        let conclusive = requests as f64 >= cfg.threshold(Heuristic::MinRequestsForCorrelation);
        SessionSignals {
            velocity: VelocitySignal {
                requests_per_minute: rpm,
                is_velocity_abuse: rpm > cfg.threshold(Heuristic::VelocityRpm),
                intensity: (rpm / cfg.threshold(Heuristic::VelocitySaturationRpm)).min(1.0),
                evidence: vec![],
            },
            correlation: CorrelationSignal {
                correlation_score: corr,
                is_low_correlation: conclusive && corr < cfg.threshold(Heuristic::LowCorrelation),
                is_conclusive: conclusive,
                evidence: vec![],
            },
            bot: BotVerdict { is_likely_bot: bot, evidence: vec![] },
        }
    }

    #[test]
    fn everything_bad_is_max() {
        assert_eq!(fraud_score(&signals(true, 300.0, 0.0, 50), &SessionConfig::default()), 100);
    }

    #[test]
    fn clean_session_is_zero() {
        assert_eq!(fraud_score(&signals(false, 0.0, 1.0, 50), &SessionConfig::default()), 0);
    }

    #[test]
    fn monotonic_in_each_signal() {
        let cfg = SessionConfig::default();
        let rpms  = [0.0, 10.0, 59.0, 61.0, 150.0, 300.0, 900.0];
        let corrs = [1.0, 0.8, 0.5, 0.21, 0.19, 0.05, 0.0];
        for bot in [false, true] {
            for w in rpms.windows(2) {
                for c in corrs {
                    let lo = fraud_score(&signals(bot, w[0], c, 20), &cfg);
                    let hi = fraud_score(&signals(bot, w[1], c, 20), &cfg);
                    assert!(hi >= lo, "rpm {} → {}: {lo} > {hi}", w[0], w[1]);
                }
            }
            for w in corrs.windows(2) {
                for r in rpms {
                    let lo = fraud_score(&signals(bot, r, w[0], 20), &cfg);
                    let hi = fraud_score(&signals(bot, r, w[1], 20), &cfg);
                    assert!(hi >= lo, "corr {} → {}: {lo} > {hi}", w[0], w[1]);
                }
            }
        }
        for r in rpms {
            for c in corrs {
                let off = fraud_score(&signals(false, r, c, 20), &cfg);
                let on  = fraud_score(&signals(true,  r, c, 20), &cfg);
                assert!(on >= off);
            }
        }
    }

    #[test]
    fn precedence() {
        let all = Verdict { bot: true, velocity: true, suspicious: true, converted: true };
        assert_eq!(classify(all), Classification::Bot);
        assert_eq!(classify(Verdict { bot: false, ..all }), Classification::Scraper);
        assert_eq!(classify(Verdict { bot: false, velocity: false, ..all }), Classification::Suspicious);
        let clean = Verdict { bot: false, velocity: false, suspicious: false, converted: true };
        assert_eq!(classify(clean), Classification::Converter);
        assert_eq!(classify(Verdict { converted: false, ..clean }), Classification::Engaged);
    }
}
