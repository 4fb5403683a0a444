// trustlens/src/api.rs
//
// Query surface.
//
//   coherence-report  {identity_id}                  → CoherenceReport
//   fraud-profiles    {classification?, min_score?}  → profiles, ip risk,
//                                                      patterns, unresolved
//                                                      signals, stats
//   resolve-signal    {signal_id}                    → FraudSignal
//
// Status codes: 200 ok, 400 invalid input, 404 unknown identity or signal,
// 500 internal. Input is validated before any computation starts.
//
// Served as length-prefixed JSON over TCP:
//   [4 bytes little-endian length] [JSON payload]
// Each request frame gets exactly one response frame.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::coherence::CoherenceEngine;
use crate::engine::scanner::Scanner;
use crate::error::{EngineError, EngineResult};
use crate::events::{
    Classification, FraudSignal, IpRiskProfile, RiskLevel, SessionFraudProfile, SignalFilter,
    SuspiciousPattern,
};
use crate::records::CoherenceReport;
use crate::sources::SignalStore;

const MAX_FRAME: usize = 1_048_576;

// ── Requests / responses ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum QueryRequest {
    CoherenceReport {
        #[serde(default)]
        identity_id: Option<String>,
    },
    FraudProfiles {
        #[serde(default)]
        classification: Option<String>,
        #[serde(default)]
        min_score: Option<i64>,
    },
    ResolveSignal {
        #[serde(default)]
        signal_id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub status: u16,
    pub body:   Value,
}

impl QueryResponse {
    fn ok<T: Serialize>(body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status: 200, body },
            Err(e)   => Self::error(&EngineError::Internal(format!("response serialization: {e}"))),
        }
    }

    fn error(e: &EngineError) -> Self {
        let kind = match e {
            EngineError::NotFound { .. }      => "not_found",
            EngineError::UnknownSignal { .. } => "not_found",
            EngineError::InvalidInput(_)      => "invalid_input",
            EngineError::Config(_)            => "internal",
            EngineError::Internal(_)          => "internal",
        };
        Self { status: e.status(), body: json!({ "error": kind, "message": e.to_string() }) }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FraudStats {
    pub total_sessions:     usize,
    pub total_detections:   usize,
    pub critical_ips:       usize,
    pub high_ips:           usize,
    pub by_classification:  BTreeMap<Classification, usize>,
    pub unresolved_signals: usize,
    pub avg_fraud_score:    f64,
    pub last_scan_at:       Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudProfilesResponse {
    pub profiles:           Vec<SessionFraudProfile>,
    pub ip_risk_profiles:   Vec<IpRiskProfile>,
    pub patterns:           Vec<SuspiciousPattern>,
    pub unresolved_signals: Vec<FraudSignal>,
    pub stats:              FraudStats,
}

// ── Service ───────────────────────────────────────────────────────────────────

pub struct QueryService {
    coherence: Arc<CoherenceEngine>,
    scanner:   Arc<Scanner>,
    signals:   Arc<dyn SignalStore>,
}

fn required(v: Option<&str>, name: &str) -> EngineResult<String> {
    v.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| EngineError::InvalidInput(format!("missing {name}")))
}

impl QueryService {
    pub fn new(coherence: Arc<CoherenceEngine>, scanner: Arc<Scanner>, signals: Arc<dyn SignalStore>) -> Self {
        Self { coherence, scanner, signals }
    }

    pub async fn coherence_report(&self, identity_id: Option<&str>) -> EngineResult<CoherenceReport> {
        let id = required(identity_id, "identity_id")?;
        self.coherence.report(&id).await
    }

    pub async fn fraud_profiles(
        &self,
        classification: Option<&str>,
        min_score: Option<i64>,
    ) -> EngineResult<FraudProfilesResponse> {
        let class = classification
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<Classification>().map_err(EngineError::InvalidInput))
            .transpose()?;
        let min_score = match min_score {
            None => 0u8,
            Some(s) if (0..=100).contains(&s) => s as u8,
            Some(s) => return Err(EngineError::InvalidInput(format!("min_score must be within 0..=100, got {s}"))),
        };

        let scan = self.scanner.analyze(self.scanner.lookback()).await?;
        let unresolved = self.signals.list(SignalFilter::unresolved()).await?;

        let mut stats = stats(&scan.profiles, &scan.ip_profiles, unresolved.len());
        stats.last_scan_at = self.scanner.last_scan();
        let profiles = scan.profiles.into_iter()
            .filter(|p| class.map_or(true, |c| p.classification == c))
            .filter(|p| p.fraud_score >= min_score)
            .collect();

        Ok(FraudProfilesResponse {
            profiles,
            ip_risk_profiles:   scan.ip_profiles,
            patterns:           scan.patterns,
            unresolved_signals: unresolved,
            stats,
        })
    }

    pub async fn resolve_signal(&self, signal_id: Option<&str>) -> EngineResult<FraudSignal> {
        let id = required(signal_id, "signal_id")?;
        self.signals.resolve(&id).await
    }

    pub async fn handle(&self, req: QueryRequest) -> QueryResponse {
        let resp = match &req {
            QueryRequest::CoherenceReport { identity_id } =>
                self.coherence_report(identity_id.as_deref()).await.map(|r| QueryResponse::ok(&r)),
            QueryRequest::FraudProfiles { classification, min_score } =>
                self.fraud_profiles(classification.as_deref(), *min_score).await.map(|r| QueryResponse::ok(&r)),
            QueryRequest::ResolveSignal { signal_id } =>
                self.resolve_signal(signal_id.as_deref()).await.map(|r| QueryResponse::ok(&r)),
        };
        resp.unwrap_or_else(|e| {
            debug!(status = e.status(), "query rejected: {e}");
            QueryResponse::error(&e)
        })
    }
}

fn stats(profiles: &[SessionFraudProfile], ips: &[IpRiskProfile], unresolved: usize) -> FraudStats {
    let mut by_classification = BTreeMap::new();
    for p in profiles {
        *by_classification.entry(p.classification).or_insert(0usize) += 1;
    }
    let avg = if profiles.is_empty() {
        0.0
    } else {
        let sum: u64 = profiles.iter().map(|p| u64::from(p.fraud_score)).sum();
        (sum as f64 / profiles.len() as f64 * 100.0).round() / 100.0
    };
    FraudStats {
        total_sessions:     profiles.len(),
        total_detections:   profiles.iter().filter(|p| p.classification.is_abusive()).count(),
        critical_ips:       ips.iter().filter(|i| i.risk_level == RiskLevel::Critical).count(),
        high_ips:           ips.iter().filter(|i| i.risk_level == RiskLevel::High).count(),
        by_classification,
        unresolved_signals: unresolved,
        avg_fraud_score:    avg,
        last_scan_at:       None,
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

pub struct QueryServer {
    service: Arc<QueryService>,
    addr:    SocketAddr,
}

impl QueryServer {
    pub fn new(service: Arc<QueryService>, addr: SocketAddr) -> Self {
        Self { service, addr }
    }

    pub async fn serve(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Query API listening on {}", self.addr);
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve_on(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let srv = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = srv.handle_connection(stream).await {
                    warn!("Query API connection error from {}: {}", peer, e);
                }
            });
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        loop {
            let mut len_buf = [0u8; 4];
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_FRAME { anyhow::bail!("frame too large: {} bytes", len); }

            let mut body = vec![0u8; len];
            stream.read_exact(&mut body).await?;

            let resp = match serde_json::from_slice::<QueryRequest>(&body) {
                Ok(req) => self.service.handle(req).await,
                Err(e)  => QueryResponse::error(&EngineError::InvalidInput(format!("malformed request: {e}"))),
            };
            write_frame(&mut stream, &resp).await?;
        }
        Ok(())
    }
}

pub async fn write_frame<T: Serialize>(stream: &mut TcpStream, msg: &T) -> Result<()> {
    let bytes = serde_json::to_vec(msg)?;
    let len = u32::try_from(bytes.len())?;
    stream.write_all(&len.to_le_bytes()).await?;
    stream.write_all(&bytes).await?;
    Ok(())
}

pub async fn read_frame<T: serde::de::DeserializeOwned>(stream: &mut TcpStream) -> Result<T> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME { anyhow::bail!("frame too large: {} bytes", len); }
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(serde_json::from_slice(&body)?)
}
