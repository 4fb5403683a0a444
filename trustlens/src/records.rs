// trustlens/src/records.rs
//
// Identity-side domain types: the canonical person record, the normalized
// activity observations gathered from every source, and the coherence
// report computed over them.
//
// Everything here is read-only to the engine. Records are captured by their
// owning collaborators and never mutated after that.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Canonical identity ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub primary_email: Option<String>,
    #[serde(default)]
    pub primary_phone: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub address: Address,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            primary_email: None,
            primary_phone: None,
            full_name: None,
            date_of_birth: None,
            address: Address::default(),
            created_at,
        }
    }

    /// Lower-cased primary email, if one is on file and non-empty.
    pub fn normalized_email(&self) -> Option<String> {
        non_empty(self.primary_email.as_deref()).map(|e| e.to_lowercase())
    }
}

// ── Activity sources ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Message,        // contact form / inbound messages
    Application,    // loan applications
    Transaction,    // payment processor transactions
    Ticket,         // support tickets
    Email,          // email threads
    Session,        // analytics sessions
    TelemetryEvent, // client telemetry events
}

impl SourceType {
    pub const ALL: [SourceType; 7] = [
        Self::Message,
        Self::Application,
        Self::Transaction,
        Self::Ticket,
        Self::Email,
        Self::Session,
        Self::TelemetryEvent,
    ];
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message        => write!(f, "message"),
            Self::Application    => write!(f, "application"),
            Self::Transaction    => write!(f, "transaction"),
            Self::Ticket         => write!(f, "ticket"),
            Self::Email          => write!(f, "email"),
            Self::Session        => write!(f, "session"),
            Self::TelemetryEvent => write!(f, "telemetry_event"),
        }
    }
}

/// (device type, browser, OS) as reported by the analytics layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceSignature {
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
}

impl DeviceSignature {
    pub fn new(device_type: &str, browser: &str, os: &str) -> Self {
        Self {
            device_type: Some(device_type.to_string()),
            browser: Some(browser.to_string()),
            os: Some(os.to_string()),
        }
    }

    /// True when no component carries a value.
    pub fn is_blank(&self) -> bool {
        [&self.device_type, &self.browser, &self.os]
            .iter()
            .all(|c| non_empty(c.as_deref()).is_none())
    }

    /// Canonical `type|browser|os` key; missing parts render as `?`.
    pub fn key(&self) -> String {
        let part = |c: &Option<String>| non_empty(c.as_deref()).unwrap_or("?").to_lowercase();
        format!("{}|{}|{}", part(&self.device_type), part(&self.browser), part(&self.os))
    }
}

/// One normalized observation from one source. Which optional fields are
/// populated depends on `source_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub source_type: SourceType,
    pub identity_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub device: Option<DeviceSignature>,
    #[serde(default)]
    pub ip_hash: Option<String>,
}

impl ActivityRecord {
    pub fn new(source_type: SourceType, identity_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            source_type,
            identity_id: identity_id.into(),
            timestamp,
            email: None,
            phone: None,
            name: None,
            city: None,
            device: None,
            ip_hash: None,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_city(mut self, city: &str) -> Self {
        self.city = Some(city.to_string());
        self
    }

    pub fn with_device(mut self, device: DeviceSignature) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_ip_hash(mut self, ip_hash: &str) -> Self {
        self.ip_hash = Some(ip_hash.to_string());
        self
    }
}

// ── Coherence report ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoherenceStatus {
    Critical,
    Concerning,
    Good,
    Excellent,
}

impl std::fmt::Display for CoherenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excellent  => write!(f, "excellent"),
            Self::Good       => write!(f, "good"),
            Self::Concerning => write!(f, "concerning"),
            Self::Critical   => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileRisk {
    Low,
    High,
}

impl std::fmt::Display for ProfileRisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low  => write!(f, "low"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Unified per-identity activity metrics carried alongside the score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMetrics {
    pub records_by_source: BTreeMap<SourceType, usize>,
    pub engagement_score: u8,
    pub data_completeness: u8,
    pub first_activity: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoherenceReport {
    pub identity_id: String,
    pub score: u8,
    pub status: CoherenceStatus,
    pub profile_risk: ProfileRisk,
    pub flags: Vec<String>,
    pub checks_performed: usize,
    pub metrics: IdentityMetrics,
    pub degraded_sources: Vec<SourceType>,
    pub generated_at: DateTime<Utc>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Trimmed value, or None when absent or blank.
pub fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}
