// trustlens/src/sources/mod.rs
//
// Read-only collaborator seams.
//
//   IdentityStore   canonical identity lookup
//   ActivitySource  one per SourceType; list(identity) → records
//   RawLogStore     raw request/event log windows per (ip, visit_id)
//   SignalStore     append-only fraud signals + reviewer resolution
//
// The engine only ever reads through these. Nothing here mutates activity
// or identity data.

pub mod jsonl;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineResult, SourceError};
use crate::events::{FraudSignal, SessionKey, SignalFilter};
use crate::records::{ActivityRecord, Identity, SourceType};
use crate::state::window::SessionWindow;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// `Ok(None)` when the identity does not exist.
    async fn get(&self, identity_id: &str) -> EngineResult<Option<Identity>>;
}

#[async_trait]
pub trait ActivitySource: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// This source's own read timeout. `None` → the configured default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Records for one identity. "No data" is an empty Vec, never an error;
    /// errors are reserved for transient failures.
    async fn list(&self, identity_id: &str) -> Result<Vec<ActivityRecord>, SourceError>;
}

/// Half-open time range [start, end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `hours` leading up to now.
    pub fn last_hours(hours: i64) -> Self {
        let end = Utc::now();
        Self { start: end - chrono::Duration::hours(hours), end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

#[async_trait]
pub trait RawLogStore: Send + Sync {
    /// Every (ip, visit_id) with at least one request or event in range.
    async fn sessions(&self, range: TimeRange) -> EngineResult<Vec<SessionKey>>;

    async fn window(&self, key: &SessionKey, range: TimeRange) -> EngineResult<SessionWindow>;
}

#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Append a new signal. Returns false when a signal with the same id is
    /// already stored (the stored one is left untouched).
    async fn append(&self, signal: FraudSignal) -> EngineResult<bool>;

    async fn list(&self, filter: SignalFilter) -> EngineResult<Vec<FraudSignal>>;

    /// Reviewer action: unresolved → resolved. Resolving an already
    /// resolved signal is a no-op; unknown ids are UnknownSignal.
    async fn resolve(&self, signal_id: &str) -> EngineResult<FraudSignal>;
}
