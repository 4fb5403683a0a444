// trustlens/src/config.rs
//
// Engine configuration, injected at construction time.
//
// All penalties, thresholds and weights live here as explicit maps so that
// tuning and test doubles never require code edits:
//
//   coherence.penalties   {CheckId   → penalty points}
//   session.thresholds    {Heuristic → threshold}
//   session.weights       {SignalWeight → weight in the fraud score sum}
//
// A JSON file can override any subset; missing keys fall back to defaults.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

// ── Coherence ─────────────────────────────────────────────────────────────────

/// Identity coherence checks, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckId {
    EmailDivergence,
    PhoneDivergence,
    NameDivergence,
    LocationMismatch,
    DeviceDiversity,
    TemporalAnomaly,
    ApplicationSessionGap,
    MessageSenderMismatch,
    PaymentIdentityMismatch,
    IpDiversity,
}

impl CheckId {
    pub const ALL: [CheckId; 10] = [
        Self::EmailDivergence,
        Self::PhoneDivergence,
        Self::NameDivergence,
        Self::LocationMismatch,
        Self::DeviceDiversity,
        Self::TemporalAnomaly,
        Self::ApplicationSessionGap,
        Self::MessageSenderMismatch,
        Self::PaymentIdentityMismatch,
        Self::IpDiversity,
    ];

    pub fn default_penalty(self) -> u32 {
        match self {
            Self::EmailDivergence         => 20,
            Self::PhoneDivergence         => 15,
            Self::NameDivergence          => 15,
            Self::LocationMismatch        => 10,
            Self::DeviceDiversity         => 5,
            Self::TemporalAnomaly         => 25,
            Self::ApplicationSessionGap   => 10,
            Self::MessageSenderMismatch   => 15,
            Self::PaymentIdentityMismatch => 20,
            Self::IpDiversity             => 5,
        }
    }
}

impl std::fmt::Display for CheckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::EmailDivergence         => "email_divergence",
            Self::PhoneDivergence         => "phone_divergence",
            Self::NameDivergence          => "name_divergence",
            Self::LocationMismatch        => "location_mismatch",
            Self::DeviceDiversity         => "device_diversity",
            Self::TemporalAnomaly         => "temporal_anomaly",
            Self::ApplicationSessionGap   => "application_session_gap",
            Self::MessageSenderMismatch   => "message_sender_mismatch",
            Self::PaymentIdentityMismatch => "payment_identity_mismatch",
            Self::IpDiversity             => "ip_diversity",
        };
        f.write_str(s)
    }
}

/// How full names are compared for divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMatch {
    /// Exact string equality after trimming.
    Literal,
    /// Trim, lower-case, collapse inner whitespace.
    CaseInsensitive,
}

/// How phone numbers are compared for divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneMatch {
    /// Exact string equality after trimming.
    Literal,
    /// Compare ASCII digits only ("514-555-0100" == "(514) 555 0100").
    DigitsOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoherenceConfig {
    pub penalties: BTreeMap<CheckId, u32>,
    pub max_device_signatures: usize,
    pub max_ip_hashes: usize,
    pub name_match: NameMatch,
    pub phone_match: PhoneMatch,
    pub default_source_timeout_ms: u64,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self {
            penalties: CheckId::ALL.iter().map(|c| (*c, c.default_penalty())).collect(),
            max_device_signatures: 5,
            max_ip_hashes: 10,
            name_match: NameMatch::CaseInsensitive,
            phone_match: PhoneMatch::Literal,
            default_source_timeout_ms: 5_000,
        }
    }
}

impl CoherenceConfig {
    pub fn penalty(&self, check: CheckId) -> u32 {
        self.penalties.get(&check).copied().unwrap_or_else(|| check.default_penalty())
    }
}

// ── Session fraud ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heuristic {
    /// requests/minute above which a session is velocity abuse.
    VelocityRpm,
    /// requests/minute at which the graded velocity component saturates.
    VelocitySaturationRpm,
    /// correlation score below which a session is low-correlation.
    LowCorrelation,
    /// requests needed before correlation counts as evidence.
    MinRequestsForCorrelation,
    /// fraud score at or above which a session is SUSPICIOUS.
    SuspiciousScore,
}

impl Heuristic {
    pub const ALL: [Heuristic; 5] = [
        Self::VelocityRpm,
        Self::VelocitySaturationRpm,
        Self::LowCorrelation,
        Self::MinRequestsForCorrelation,
        Self::SuspiciousScore,
    ];

    pub fn default_threshold(self) -> f64 {
        match self {
            Self::VelocityRpm               => 60.0,
            Self::VelocitySaturationRpm     => 300.0,
            Self::LowCorrelation            => 0.20,
            Self::MinRequestsForCorrelation => 5.0,
            Self::SuspiciousScore           => 25.0,
        }
    }
}

/// Components of the fraud score weighted sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalWeight {
    LikelyBot,
    VelocityAbuse,
    VelocityIntensity,
    LowCorrelation,
    CorrelationDeficit,
}

impl SignalWeight {
    pub const ALL: [SignalWeight; 5] = [
        Self::LikelyBot,
        Self::VelocityAbuse,
        Self::VelocityIntensity,
        Self::LowCorrelation,
        Self::CorrelationDeficit,
    ];

    // Sum = 1.00
    pub fn default_weight(self) -> f64 {
        match self {
            Self::LikelyBot          => 0.45,
            Self::VelocityAbuse      => 0.15,
            Self::VelocityIntensity  => 0.15,
            Self::LowCorrelation     => 0.10,
            Self::CorrelationDeficit => 0.15,
        }
    }
}

/// Ten years. Keeps `now - lookback` inside chrono's range.
pub const MAX_LOOKBACK_HOURS: i64 = 10 * 366 * 24;
/// One day.
pub const MAX_SCAN_INTERVAL_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub thresholds: BTreeMap<Heuristic, f64>,
    pub weights: BTreeMap<SignalWeight, f64>,
    pub lookback_hours: i64,
    pub scan_interval_secs: u64,
    pub window_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            thresholds: Heuristic::ALL.iter().map(|h| (*h, h.default_threshold())).collect(),
            weights: SignalWeight::ALL.iter().map(|w| (*w, w.default_weight())).collect(),
            lookback_hours: 7 * 24,
            scan_interval_secs: 300,
            window_timeout_ms: 5_000,
        }
    }
}

impl SessionConfig {
    pub fn threshold(&self, h: Heuristic) -> f64 {
        self.thresholds.get(&h).copied().unwrap_or_else(|| h.default_threshold())
    }

    pub fn weight(&self, w: SignalWeight) -> f64 {
        self.weights.get(&w).copied().unwrap_or_else(|| w.default_weight())
    }
}

// ── IP risk ───────────────────────────────────────────────────────────────────

/// A tier is reached when either the average or the maximum reaches its cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskCutoff {
    pub avg: f64,
    pub max: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpRiskConfig {
    pub critical: RiskCutoff,
    pub high: RiskCutoff,
    pub medium: RiskCutoff,
}

impl Default for IpRiskConfig {
    fn default() -> Self {
        Self {
            critical: RiskCutoff { avg: 70.0, max: 90 },
            high:     RiskCutoff { avg: 50.0, max: 70 },
            medium:   RiskCutoff { avg: 30.0, max: 50 },
        }
    }
}

// ── Patterns ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub shared_device_min_ips: usize,
    pub visitor_fan_out_min_visits: usize,
    pub subnet_cluster_min_ips: usize,
    pub linked_cluster_min_ips: usize,
    pub sample_size: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            shared_device_min_ips:      3,
            visitor_fan_out_min_visits: 4,
            subnet_cluster_min_ips:     3,
            linked_cluster_min_ips:     3,
            sample_size:                5,
        }
    }
}

// ── Signals ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub critical_score: u8,
    pub high_score: u8,
    pub medium_score: u8,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self { critical_score: 80, high_score: 60, medium_score: 40 }
    }
}

// ── Root ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub coherence: CoherenceConfig,
    pub session: SessionConfig,
    pub ip_risk: IpRiskConfig,
    pub patterns: PatternConfig,
    pub signals: SignalConfig,
}

impl EngineConfig {
    /// Load from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> EngineResult<Self> {
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        let cfg: Self = serde_json::from_str(&raw)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> EngineResult<()> {
        for (check, penalty) in &self.coherence.penalties {
            if *penalty > 100 {
                return Err(EngineError::Config(format!("penalty for {check} exceeds 100: {penalty}")));
            }
        }
        for (h, v) in &self.session.thresholds {
            if !v.is_finite() || *v < 0.0 {
                return Err(EngineError::Config(format!("threshold {h:?} must be a non-negative number")));
            }
        }
        for (w, v) in &self.session.weights {
            if !v.is_finite() || *v < 0.0 {
                return Err(EngineError::Config(format!("weight {w:?} must be a non-negative number")));
            }
        }
        if self.session.threshold(Heuristic::VelocitySaturationRpm) <= 0.0 {
            return Err(EngineError::Config("velocity_saturation_rpm must be positive".into()));
        }
        if !(1..=MAX_LOOKBACK_HOURS).contains(&self.session.lookback_hours) {
            return Err(EngineError::Config(format!("lookback_hours must be in 1..={MAX_LOOKBACK_HOURS}")));
        }
        if self.session.scan_interval_secs > MAX_SCAN_INTERVAL_SECS {
            return Err(EngineError::Config(format!("scan_interval_secs must be at most {MAX_SCAN_INTERVAL_SECS}")));
        }

        let r = &self.ip_risk;
        let ordered = r.critical.avg >= r.high.avg && r.high.avg >= r.medium.avg
            && r.critical.max >= r.high.max && r.high.max >= r.medium.max;
        if !ordered {
            return Err(EngineError::Config("ip risk cutoffs must satisfy critical ≥ high ≥ medium".into()));
        }

        let s = &self.signals;
        if !(s.critical_score >= s.high_score && s.high_score >= s.medium_score) {
            return Err(EngineError::Config("signal severity cutoffs must be descending".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn default_weights_sum_to_one() {
        let sum: f64 = SignalWeight::ALL.iter().map(|w| w.default_weight()).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: EngineConfig = serde_json::from_str(
            r#"{ "coherence": { "penalties": { "email_divergence": 30 } } }"#,
        ).unwrap();
        assert_eq!(cfg.coherence.penalty(CheckId::EmailDivergence), 30);
        assert_eq!(cfg.coherence.penalty(CheckId::TemporalAnomaly), 25);
        assert_eq!(cfg.session.threshold(Heuristic::VelocityRpm), 60.0);
    }

    #[test]
    fn inverted_ip_cutoffs_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.ip_risk.high.avg = 95.0;
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn unbounded_scan_window_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.session.lookback_hours = i64::MAX;
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));

        cfg.session.lookback_hours = MAX_LOOKBACK_HOURS;
        assert!(cfg.validate().is_ok());

        cfg.session.scan_interval_secs = u64::MAX;
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn suspicious_cutoff_reachable_without_abuse() {
        // low correlation plus full deficit, no bot, no velocity abuse
        let cfg = SessionConfig::default();
        let reachable = cfg.weight(SignalWeight::LowCorrelation) + cfg.weight(SignalWeight::CorrelationDeficit);
        assert!(100.0 * reachable >= cfg.threshold(Heuristic::SuspiciousScore));
    }

    #[test]
    fn negative_weight_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.session.weights.insert(SignalWeight::LikelyBot, -0.1);
        assert!(cfg.validate().is_err());
    }
}
