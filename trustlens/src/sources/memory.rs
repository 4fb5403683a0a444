// trustlens/src/sources/memory.rs
//
// In-memory collaborator implementations.
// Stores are DashMap-backed and shared across tasks behind Arc.
//
// These back the JSONL data directory loader and every test.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::info;

use super::{ActivitySource, IdentityStore, RawLogStore, SignalStore, TimeRange};
use crate::error::{EngineError, EngineResult, SourceError};
use crate::events::{FraudSignal, RawEvent, RawRequest, SessionKey, SignalFilter};
use crate::records::{ActivityRecord, Identity, SourceType};
use crate::state::window::SessionWindow;

// ── Identities ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryIdentityStore {
    identities: DashMap<String, Identity>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identity: Identity) {
        self.identities.insert(identity.id.clone(), identity);
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get(&self, identity_id: &str) -> EngineResult<Option<Identity>> {
        Ok(self.identities.get(identity_id).map(|i| i.clone()))
    }
}

// ── Activity ──────────────────────────────────────────────────────────────────

/// One source's records keyed by identity id.
pub struct MemoryActivitySource {
    source_type: SourceType,
    records:     DashMap<String, Vec<ActivityRecord>>,
}

impl MemoryActivitySource {
    pub fn new(source_type: SourceType) -> Self {
        Self { source_type, records: DashMap::new() }
    }

    /// Records whose `source_type` differs from this source are ignored.
    pub fn insert(&self, record: ActivityRecord) -> bool {
        if record.source_type != self.source_type {
            return false;
        }
        self.records.entry(record.identity_id.clone()).or_default().push(record);
        true
    }
}

#[async_trait]
impl ActivitySource for MemoryActivitySource {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    async fn list(&self, identity_id: &str) -> Result<Vec<ActivityRecord>, SourceError> {
        Ok(self.records.get(identity_id).map(|r| r.clone()).unwrap_or_default())
    }
}

/// One empty in-memory source per SourceType.
pub fn empty_sources() -> HashMap<SourceType, Arc<MemoryActivitySource>> {
    SourceType::ALL.iter()
        .map(|t| (*t, Arc::new(MemoryActivitySource::new(*t))))
        .collect()
}

// ── Raw logs ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryRawLogStore {
    requests: DashMap<SessionKey, Vec<RawRequest>>,
    events:   DashMap<SessionKey, Vec<RawEvent>>,
}

impl MemoryRawLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_request(&self, req: RawRequest) {
        let key = SessionKey::new(req.ip.clone(), req.visit_id.clone());
        self.requests.entry(key).or_default().push(req);
    }

    pub fn push_event(&self, ev: RawEvent) {
        let key = SessionKey::new(ev.ip.clone(), ev.visit_id.clone());
        self.events.entry(key).or_default().push(ev);
    }
}

#[async_trait]
impl RawLogStore for MemoryRawLogStore {
    async fn sessions(&self, range: TimeRange) -> EngineResult<Vec<SessionKey>> {
        let mut keys: BTreeSet<SessionKey> = BTreeSet::new();
        for entry in self.requests.iter() {
            if entry.value().iter().any(|r| range.contains(r.timestamp)) {
                keys.insert(entry.key().clone());
            }
        }
        for entry in self.events.iter() {
            if entry.value().iter().any(|e| range.contains(e.timestamp)) {
                keys.insert(entry.key().clone());
            }
        }
        Ok(keys.into_iter().collect())
    }

    async fn window(&self, key: &SessionKey, range: TimeRange) -> EngineResult<SessionWindow> {
        let mut w = SessionWindow::new(key.clone());
        if let Some(reqs) = self.requests.get(key) {
            for r in reqs.iter().filter(|r| range.contains(r.timestamp)) {
                w.ingest_request(r.clone());
            }
        }
        if let Some(evs) = self.events.get(key) {
            for e in evs.iter().filter(|e| range.contains(e.timestamp)) {
                w.ingest_event(e.clone());
            }
        }
        Ok(w.seal())
    }
}

// ── Signals ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySignalStore {
    signals: DashMap<String, FraudSignal>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Restore a signal verbatim (replay from an audit log).
    pub(crate) fn restore(&self, signal: FraudSignal) {
        self.signals.insert(signal.id.clone(), signal);
    }

    pub(crate) fn get(&self, signal_id: &str) -> Option<FraudSignal> {
        self.signals.get(signal_id).map(|s| s.clone())
    }

    /// Replay a recorded resolution. Never un-resolves.
    pub(crate) fn restore_resolution(&self, signal_id: &str, at: chrono::DateTime<Utc>) {
        if let Some(mut s) = self.signals.get_mut(signal_id) {
            if !s.resolved {
                s.resolved    = true;
                s.resolved_at = Some(at);
            }
        }
    }
}

#[async_trait]
impl SignalStore for MemorySignalStore {
    async fn append(&self, signal: FraudSignal) -> EngineResult<bool> {
        use dashmap::mapref::entry::Entry;
        match self.signals.entry(signal.id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(v) => {
                v.insert(signal);
                Ok(true)
            }
        }
    }

    async fn list(&self, filter: SignalFilter) -> EngineResult<Vec<FraudSignal>> {
        let mut out: Vec<FraudSignal> = self.signals.iter()
            .filter(|s| filter.matches(s.value()))
            .map(|s| s.value().clone())
            .collect();
        out.sort_by(|a, b| b.detected_at.cmp(&a.detected_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn resolve(&self, signal_id: &str) -> EngineResult<FraudSignal> {
        let mut entry = self.signals.get_mut(signal_id)
            .ok_or_else(|| EngineError::UnknownSignal { signal_id: signal_id.to_string() })?;
        if !entry.resolved {
            entry.resolved    = true;
            entry.resolved_at = Some(Utc::now());
            info!(signal_id, ip = %entry.ip, "fraud signal resolved");
        }
        Ok(entry.clone())
    }
}
