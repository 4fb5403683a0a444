// trustlens/src/workers/velocity.rs
//
// Velocity worker: requests per minute over the session's request span.
//
//   is_velocity_abuse  rpm > velocity_rpm
//   intensity          min(rpm / velocity_saturation_rpm, 1), graded input
//                      to the fraud score so faster is never cheaper

use crate::config::{Heuristic, SessionConfig};
use crate::state::window::SessionWindow;

#[derive(Debug, Clone, PartialEq)]
pub struct VelocitySignal {
    pub requests_per_minute: f64,
    pub is_velocity_abuse:   bool,
    pub intensity:           f64,
    pub evidence:            Vec<String>,
}

pub fn analyze(window: &SessionWindow, cfg: &SessionConfig) -> VelocitySignal {
    let rpm        = window.requests_per_minute();
    let limit      = cfg.threshold(Heuristic::VelocityRpm);
    let saturation = cfg.threshold(Heuristic::VelocitySaturationRpm).max(f64::EPSILON);

    let is_velocity_abuse = rpm > limit;
    let intensity = (rpm / saturation).clamp(0.0, 1.0);

    let mut evidence = Vec::new();
    if is_velocity_abuse {
        evidence.push(format!("high_velocity:{rpm:.0}rpm"));
    }
    let ias = window.interarrivals();
    if ias.len() >= 3 {
        let mean = ias.iter().sum::<f64>() / ias.len() as f64;
        let std  = (ias.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / ias.len() as f64).sqrt();
        let cv   = if mean > 0.0 { std / mean } else { 0.0 };
        if mean > 0.0 && cv < 0.15 {
            evidence.push(format!("scripted_timing:cv={cv:.2}"));
        }
    }

    VelocitySignal { requests_per_minute: rpm, is_velocity_abuse, intensity, evidence }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{RawRequest, SessionKey};
    use chrono::{Duration, TimeZone, Utc};

    fn window(n: i64, every_ms: i64) -> SessionWindow {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut w = SessionWindow::new(SessionKey::new("10.0.0.1", "v1"));
        for i in 0..n {
            w.ingest_request(RawRequest {
                ip: "10.0.0.1".into(),
                visit_id: "v1".into(),
                timestamp: t0 + Duration::milliseconds(i * every_ms),
                path: "/".into(),
                user_agent: None,
                duration_ms: None,
                status: None,
                identity_id: None,
                device: None,
            });
        }
        w.seal()
    }

    #[test]
    fn burst_is_abuse_and_saturates() {
        let sig = analyze(&window(300, 100), &SessionConfig::default());
        assert!(sig.is_velocity_abuse);
        assert_eq!(sig.intensity, 1.0);
        assert!(sig.evidence.iter().any(|e| e.starts_with("scripted_timing")));
    }

    #[test]
    fn slow_browsing_is_not_abuse() {
        let sig = analyze(&window(10, 30_000), &SessionConfig::default());
        assert!(!sig.is_velocity_abuse);
        assert!(sig.intensity < 0.1);
    }

    #[test]
    fn empty_window_is_no_evidence() {
        let sig = analyze(&window(0, 0), &SessionConfig::default());
        assert_eq!(sig.requests_per_minute, 0.0);
        assert!(!sig.is_velocity_abuse);
        assert!(sig.evidence.is_empty());
    }
}
