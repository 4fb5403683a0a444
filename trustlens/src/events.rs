// trustlens/src/events.rs
//
// Network-side domain types: raw request/event log entries, the per-session
// fraud profile derived from them, per-IP risk aggregates, cross-session
// patterns, and the fraud signals handed to review tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::records::DeviceSignature;

// ── Raw log entries ───────────────────────────────────────────────────────────

/// One HTTP request captured by the request logger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRequest {
    pub ip: String,
    pub visit_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub identity_id: Option<String>,
    #[serde(default)]
    pub device: Option<DeviceSignature>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PageView,
    Interaction, // click, scroll, form focus …
    Conversion,  // form submitted, application started
}

/// One client-side telemetry event emitted by a real browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub ip: String,
    pub visit_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    #[serde(default)]
    pub name: String,
}

/// (ip, visit_id): one network session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub ip: String,
    pub visit_id: String,
}

impl SessionKey {
    pub fn new(ip: impl Into<String>, visit_id: impl Into<String>) -> Self {
        Self { ip: ip.into(), visit_id: visit_id.into() }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.ip, self.visit_id)
    }
}

// ── Session classification ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Bot,
    Scraper,
    Suspicious,
    Converter,
    Engaged,
}

impl Classification {
    /// True for the three abuse classes.
    pub fn is_abusive(self) -> bool {
        matches!(self, Self::Bot | Self::Scraper | Self::Suspicious)
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bot        => write!(f, "BOT"),
            Self::Scraper    => write!(f, "SCRAPER"),
            Self::Suspicious => write!(f, "SUSPICIOUS"),
            Self::Converter  => write!(f, "CONVERTER"),
            Self::Engaged    => write!(f, "ENGAGED"),
        }
    }
}

impl std::str::FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BOT"        => Ok(Self::Bot),
            "SCRAPER"    => Ok(Self::Scraper),
            "SUSPICIOUS" => Ok(Self::Suspicious),
            "CONVERTER"  => Ok(Self::Converter),
            "ENGAGED"    => Ok(Self::Engaged),
            other        => Err(format!("unknown classification '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFraudProfile {
    pub ip: String,
    pub visit_id: String,
    pub identity_id: Option<String>,
    pub request_count: usize,
    pub event_count: usize,
    pub correlation_score: f64,
    pub fraud_score: u8,
    pub classification: Classification,
    pub requests_per_minute: f64,
    pub is_likely_bot: bool,
    pub is_velocity_abuse: bool,
    pub is_low_correlation: bool,
    pub device_signature: Option<String>,
    pub user_agent: Option<String>,
    pub evidence: Vec<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

// ── Per-IP aggregate ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low      => write!(f, "LOW"),
            Self::Medium   => write!(f, "MEDIUM"),
            Self::High     => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpRiskProfile {
    pub ip: String,
    pub total_visits: usize,
    pub session_count: usize,
    pub avg_fraud_score: f64,
    pub max_fraud_score: u8,
    pub bot_count: usize,
    pub scraper_count: usize,
    pub suspicious_count: usize,
    pub converter_count: usize,
    pub engaged_count: usize,
    pub risk_level: RiskLevel,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

// ── Cross-session patterns ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    SharedDevice,
    VisitorFanOut,
    SubnetBotCluster,
    LinkedIpCluster,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspiciousPattern {
    pub kind: PatternKind,
    pub pattern: String,
    pub occurrences: usize,
    pub sample_ips: Vec<String>,
}

// ── Fraud signals ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low      => write!(f, "low"),
            Self::Medium   => write!(f, "medium"),
            Self::High     => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low"      => Ok(Self::Low),
            "medium"   => Ok(Self::Medium),
            "high"     => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other      => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Raised by the classifier, resolved only by an explicit reviewer action.
/// `resolved` goes false → true exactly once and never back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudSignal {
    pub id: String,
    pub ip: String,
    pub visit_id: String,
    pub signal_type: String,
    pub severity: Severity,
    pub score: u8,
    pub evidence: serde_json::Value,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl FraudSignal {
    /// Deterministic id: SHA256[:16] over ip|visit_id|signal_type.
    pub fn derive_id(ip: &str, visit_id: &str, signal_type: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut h = Sha256::new();
        h.update(ip.as_bytes());
        h.update(b"|");
        h.update(visit_id.as_bytes());
        h.update(b"|");
        h.update(signal_type.as_bytes());
        hex::encode(&h.finalize()[..16])
    }
}

/// Filter accepted by the signal store's `list`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalFilter {
    pub resolved: Option<bool>,
    pub severity: Option<Severity>,
}

impl SignalFilter {
    pub fn unresolved() -> Self {
        Self { resolved: Some(false), severity: None }
    }

    pub fn matches(&self, signal: &FraudSignal) -> bool {
        self.resolved.map_or(true, |r| signal.resolved == r)
            && self.severity.map_or(true, |s| signal.severity == s)
    }
}
