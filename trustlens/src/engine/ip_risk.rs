// trustlens/src/engine/ip_risk.rs
//
// Per-IP aggregation of session fraud profiles.
//
// risk_level is the first tier, top-down, whose cutoff is reached by the
// average OR the maximum fraud score:
//   CRITICAL  avg ≥ 70 or max ≥ 90
//   HIGH      avg ≥ 50 or max ≥ 70
//   MEDIUM    avg ≥ 30 or max ≥ 50
//   LOW       otherwise

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{IpRiskConfig, RiskCutoff};
use crate::events::{Classification, IpRiskProfile, RiskLevel, SessionFraudProfile};

pub fn risk_level(avg: f64, max: u8, cfg: &IpRiskConfig) -> RiskLevel {
    let reached = |c: &RiskCutoff| avg >= c.avg || max >= c.max;
    if reached(&cfg.critical) {
        RiskLevel::Critical
    } else if reached(&cfg.high) {
        RiskLevel::High
    } else if reached(&cfg.medium) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Aggregate the profiles of a single IP. None for an empty slice.
pub fn aggregate_ip(ip: &str, profiles: &[&SessionFraudProfile], cfg: &IpRiskConfig) -> Option<IpRiskProfile> {
    let first_seen = profiles.iter().map(|p| p.first_seen).min()?;
    let last_seen  = profiles.iter().map(|p| p.last_seen).max()?;

    let n   = profiles.len();
    let sum: u32 = profiles.iter().map(|p| u32::from(p.fraud_score)).sum();
    let avg = (f64::from(sum) / n as f64 * 100.0).round() / 100.0;
    let max = profiles.iter().map(|p| p.fraud_score).max().unwrap_or(0);

    let count = |c: Classification| profiles.iter().filter(|p| p.classification == c).count();
    let visits: BTreeSet<&str> = profiles.iter().map(|p| p.visit_id.as_str()).collect();

    Some(IpRiskProfile {
        ip:               ip.to_string(),
        total_visits:     visits.len(),
        session_count:    n,
        avg_fraud_score:  avg,
        max_fraud_score:  max,
        bot_count:        count(Classification::Bot),
        scraper_count:    count(Classification::Scraper),
        suspicious_count: count(Classification::Suspicious),
        converter_count:  count(Classification::Converter),
        engaged_count:    count(Classification::Engaged),
        risk_level:       risk_level(avg, max, cfg),
        first_seen,
        last_seen,
    })
}

/// One profile per IP, riskiest first (risk level, then max score, then ip).
pub fn aggregate_by_ip(profiles: &[SessionFraudProfile], cfg: &IpRiskConfig) -> Vec<IpRiskProfile> {
    let mut by_ip: BTreeMap<&str, Vec<&SessionFraudProfile>> = BTreeMap::new();
    for p in profiles {
        by_ip.entry(p.ip.as_str()).or_default().push(p);
    }
    let mut out: Vec<IpRiskProfile> = by_ip.into_iter()
        .filter_map(|(ip, ps)| aggregate_ip(ip, &ps, cfg))
        .collect();
    out.sort_by(|a, b| {
        b.risk_level.cmp(&a.risk_level)
            .then_with(|| b.max_fraud_score.cmp(&a.max_fraud_score))
            .then_with(|| a.ip.cmp(&b.ip))
    });
    out
}
