// trustlens/src/state/window.rs
//
// Per-session raw log window: everything one (ip, visit_id) did inside the
// scan range, plus the derived rates the workers need.
//
// Windows are rebuilt from the raw log store on every scan and never
// mutated incrementally; `ingest_*` is only used while building one.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::events::{EventKind, RawEvent, RawRequest, SessionKey};

#[derive(Debug, Clone)]
pub struct SessionWindow {
    pub key:      SessionKey,
    pub requests: Vec<RawRequest>,
    pub events:   Vec<RawEvent>,
}

impl SessionWindow {
    pub fn new(key: SessionKey) -> Self {
        Self { key, requests: Vec::new(), events: Vec::new() }
    }

    pub fn ingest_request(&mut self, req: RawRequest) {
        self.requests.push(req);
    }

    pub fn ingest_event(&mut self, ev: RawEvent) {
        self.events.push(ev);
    }

    /// Sort both streams chronologically. Called once after building.
    pub fn seal(mut self) -> Self {
        self.requests.sort_by_key(|r| r.timestamp);
        self.events.sort_by_key(|e| e.timestamp);
        self
    }

    pub fn first_seen(&self) -> Option<DateTime<Utc>> {
        let r = self.requests.iter().map(|r| r.timestamp).min();
        let e = self.events.iter().map(|e| e.timestamp).min();
        r.into_iter().chain(e).min()
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        let r = self.requests.iter().map(|r| r.timestamp).max();
        let e = self.events.iter().map(|e| e.timestamp).max();
        r.into_iter().chain(e).max()
    }

    /// Requests per minute over the request span. Spans shorter than one
    /// minute count as one minute, so a burst of N requests reads as N rpm.
    pub fn requests_per_minute(&self) -> f64 {
        let n = self.requests.len();
        if n == 0 { return 0.0; }
        let first = self.requests.iter().map(|r| r.timestamp).min();
        let last  = self.requests.iter().map(|r| r.timestamp).max();
        let span_secs = match (first, last) {
            (Some(f), Some(l)) => (l - f).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        };
        let minutes = (span_secs / 60.0).max(1.0);
        n as f64 / minutes
    }

    /// Gaps between consecutive requests, in seconds.
    pub fn interarrivals(&self) -> Vec<f64> {
        self.requests
            .windows(2)
            .map(|w| (w[1].timestamp - w[0].timestamp).num_milliseconds() as f64 / 1000.0)
            .collect()
    }

    pub fn has_event(&self, kind: EventKind) -> bool {
        self.events.iter().any(|e| e.kind == kind)
    }

    pub fn unique_paths(&self) -> usize {
        self.requests.iter().map(|r| r.path.as_str()).collect::<BTreeSet<_>>().len()
    }

    /// Most frequent user agent (ties → lexicographically smallest).
    pub fn dominant_user_agent(&self) -> Option<String> {
        dominant(self.requests.iter().filter_map(|r| r.user_agent.as_deref()))
    }

    /// Most frequent non-blank device signature key.
    pub fn dominant_device(&self) -> Option<String> {
        let keys: Vec<String> = self.requests.iter()
            .filter_map(|r| r.device.as_ref())
            .filter(|d| !d.is_blank())
            .map(|d| d.key())
            .collect();
        dominant(keys.iter().map(|s| s.as_str()))
    }

    /// First identity the session was linked to, if any.
    pub fn linked_identity(&self) -> Option<String> {
        self.requests.iter().find_map(|r| r.identity_id.clone())
    }

    /// Durations of requests that carry one.
    pub fn durations_ms(&self) -> Vec<u64> {
        self.requests.iter().filter_map(|r| r.duration_ms).collect()
    }
}

fn dominant<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values {
        let v = v.trim();
        if !v.is_empty() {
            *counts.entry(v).or_default() += 1;
        }
    }
    // max_by_key keeps the last max; iterate reversed so ties resolve to the smallest key
    counts.into_iter().rev().max_by_key(|(_, c)| *c).map(|(v, _)| v.to_string())
}

/// IPv4 /24 prefix ("a.b.c"); None for anything else.
pub fn subnet_of(ip: &str) -> Option<String> {
    let p: Vec<&str> = ip.split('.').collect();
    if p.len() == 4 && p.iter().all(|o| o.parse::<u8>().is_ok()) {
        Some(format!("{}.{}.{}", p[0], p[1], p[2]))
    } else {
        None
    }
}
