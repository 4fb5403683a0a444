// trustlens/src/sources/jsonl.rs
//
// JSONL data directory, one JSON object per line.
//
//   identities.jsonl  Identity
//   activity.jsonl    ActivityRecord (split per source_type)
//   requests.jsonl    RawRequest
//   events.jsonl      RawEvent
//   signals.jsonl     append-only signal audit log (written by us)
//
// Unparseable lines are logged and skipped. Missing files are empty sources.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::memory::{empty_sources, MemoryIdentityStore, MemoryRawLogStore, MemorySignalStore};
use super::{ActivitySource, SignalStore};
use crate::error::{EngineError, EngineResult};
use crate::events::{FraudSignal, RawEvent, RawRequest, SignalFilter};
use crate::records::{ActivityRecord, Identity, SourceType};

pub const IDENTITIES_FILE: &str = "identities.jsonl";
pub const ACTIVITY_FILE:   &str = "activity.jsonl";
pub const REQUESTS_FILE:   &str = "requests.jsonl";
pub const EVENTS_FILE:     &str = "events.jsonl";
pub const SIGNALS_FILE:    &str = "signals.jsonl";

/// Every store, loaded from one directory.
pub struct DataDir {
    pub root:       PathBuf,
    pub identities: Arc<MemoryIdentityStore>,
    pub sources:    Vec<Arc<dyn ActivitySource>>,
    pub raw_logs:   Arc<MemoryRawLogStore>,
    pub signals:    Arc<JsonlSignalStore>,
}

impl DataDir {
    pub async fn load(root: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(root).await?;

        let identities = Arc::new(MemoryIdentityStore::new());
        for identity in read_jsonl::<Identity>(&root.join(IDENTITIES_FILE)).await? {
            identities.insert(identity);
        }

        let by_source = empty_sources();
        let mut n_activity = 0usize;
        for record in read_jsonl::<ActivityRecord>(&root.join(ACTIVITY_FILE)).await? {
            if let Some(src) = by_source.get(&record.source_type) {
                if src.insert(record) { n_activity += 1; }
            }
        }
        let sources: Vec<Arc<dyn ActivitySource>> = SourceType::ALL.iter()
            .filter_map(|t| by_source.get(t).cloned())
            .map(|s| s as Arc<dyn ActivitySource>)
            .collect();

        let raw_logs = Arc::new(MemoryRawLogStore::new());
        let requests = read_jsonl::<RawRequest>(&root.join(REQUESTS_FILE)).await?;
        let events   = read_jsonl::<RawEvent>(&root.join(EVENTS_FILE)).await?;
        let (n_req, n_ev) = (requests.len(), events.len());
        for r in requests { raw_logs.push_request(r); }
        for e in events   { raw_logs.push_event(e); }

        let signals = Arc::new(JsonlSignalStore::open(root.join(SIGNALS_FILE)).await?);

        info!(
            identities = identities.len(),
            activity   = n_activity,
            requests   = n_req,
            events     = n_ev,
            "Loaded data directory {}", root.display()
        );

        Ok(Self { root: root.to_path_buf(), identities, sources, raw_logs, signals })
    }
}

async fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !tokio::fs::try_exists(path).await? {
        info!("{} not present, treating as empty", path.display());
        return Ok(Vec::new());
    }
    let content = tokio::fs::read_to_string(path).await?;
    let mut out = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() { continue; }
        match serde_json::from_str::<T>(line) {
            Ok(v)  => out.push(v),
            Err(e) => warn!("{}:{} parse error: {}", path.display(), n + 1, e),
        }
    }
    Ok(out)
}

// ── Signal audit log ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum AuditLine {
    Signal { signal: FraudSignal },
    Resolution { id: String, resolved_at: DateTime<Utc> },
}

/// Signal store persisted as an append-only JSONL log. State is the replay
/// of every `signal` and `resolution` line; nothing is ever rewritten.
pub struct JsonlSignalStore {
    path:   PathBuf,
    inner:  MemorySignalStore,
    writer: tokio::sync::Mutex<()>,
}

impl JsonlSignalStore {
    pub async fn open(path: PathBuf) -> Result<Self> {
        let inner = MemorySignalStore::new();
        let mut resolutions: Vec<(String, DateTime<Utc>)> = Vec::new();

        for line in read_jsonl::<AuditLine>(&path).await? {
            match line {
                AuditLine::Signal { signal }              => inner.restore(signal),
                AuditLine::Resolution { id, resolved_at } => resolutions.push((id, resolved_at)),
            }
        }
        let restored = inner.len();
        for (id, at) in resolutions {
            inner.restore_resolution(&id, at);
        }
        if restored > 0 {
            info!("Restored {} fraud signals from {}", restored, path.display());
        }

        Ok(Self { path, inner, writer: tokio::sync::Mutex::new(()) })
    }

    /// Append one audit line. Callers hold `writer` so the file and the
    /// in-memory state change under the same lock.
    async fn write(&self, line: &AuditLine) -> EngineResult<()> {
        let mut json = serde_json::to_string(line)
            .map_err(|e| EngineError::Internal(format!("signal serialization: {e}")))?;
        json.push('\n');

        let mut f = OpenOptions::new().create(true).append(true)
            .open(&self.path).await
            .map_err(|e| EngineError::Internal(format!("{}: {e}", self.path.display())))?;
        f.write_all(json.as_bytes()).await
            .map_err(|e| EngineError::Internal(format!("{}: {e}", self.path.display())))?;
        f.flush().await
            .map_err(|e| EngineError::Internal(format!("{}: {e}", self.path.display())))?;
        Ok(())
    }
}

#[async_trait]
impl SignalStore for JsonlSignalStore {
    async fn append(&self, signal: FraudSignal) -> EngineResult<bool> {
        let _guard = self.writer.lock().await;
        if self.inner.get(&signal.id).is_some() {
            return Ok(false);
        }
        self.write(&AuditLine::Signal { signal: signal.clone() }).await?;
        self.inner.append(signal).await
    }

    async fn list(&self, filter: SignalFilter) -> EngineResult<Vec<FraudSignal>> {
        self.inner.list(filter).await
    }

    async fn resolve(&self, signal_id: &str) -> EngineResult<FraudSignal> {
        let _guard = self.writer.lock().await;
        let current = self.inner.get(signal_id)
            .ok_or_else(|| EngineError::UnknownSignal { signal_id: signal_id.to_string() })?;
        if current.resolved {
            return Ok(current);
        }

        let resolved_at = Utc::now();
        self.write(&AuditLine::Resolution { id: current.id.clone(), resolved_at }).await?;
        self.inner.restore_resolution(signal_id, resolved_at);
        info!(signal_id, ip = %current.ip, "fraud signal resolved");
        self.inner.get(signal_id)
            .ok_or_else(|| EngineError::UnknownSignal { signal_id: signal_id.to_string() })
    }
}
