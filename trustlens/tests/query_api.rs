// Query surface: validation, status codes, signal resolution, TCP framing.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};

use trustlens::api::{read_frame, write_frame, QueryRequest, QueryResponse, QueryServer, QueryService};
use trustlens::coherence::CoherenceEngine;
use trustlens::config::EngineConfig;
use trustlens::engine::dispatcher::Dispatcher;
use trustlens::engine::fusion::SessionClassifier;
use trustlens::engine::scanner::Scanner;
use trustlens::error::EngineError;
use trustlens::events::{Classification, RawRequest, SignalFilter};
use trustlens::records::{ActivityRecord, Identity, SourceType};
use trustlens::sources::memory::{MemoryActivitySource, MemoryIdentityStore, MemoryRawLogStore, MemorySignalStore};
use trustlens::sources::{ActivitySource, SignalStore};
use trustlens::workers::bot::UserAgentBotDetector;

struct Harness {
    service: QueryService,
    signals: Arc<MemorySignalStore>,
    scanner: Arc<Scanner>,
}

fn harness() -> Harness {
    let cfg = EngineConfig::default();

    let identities = Arc::new(MemoryIdentityStore::new());
    let mut id = Identity::new("c1", Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
    id.primary_email = Some("a@x.com".into());
    identities.insert(id);
    let sessions = Arc::new(MemoryActivitySource::new(SourceType::Session));
    sessions.insert(
        ActivityRecord::new(SourceType::Session, "c1", Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap())
            .with_email("b@x.com"),
    );
    let sources: Vec<Arc<dyn ActivitySource>> = vec![sessions];
    let coherence = Arc::new(CoherenceEngine::new(identities, sources, cfg.coherence.clone()));

    // One bot session and one quiet browser session.
    let logs = Arc::new(MemoryRawLogStore::new());
    let t = Utc::now() - Duration::hours(2);
    for i in 0..200 {
        logs.push_request(RawRequest {
            ip:          "10.1.1.1".into(),
            visit_id:    "bot".into(),
            timestamp:   t + Duration::milliseconds(i * 250),
            path:        "/".into(),
            user_agent:  Some("curl/8.4.0".into()),
            duration_ms: Some(0),
            status:      Some(200),
            identity_id: None,
            device:      None,
        });
    }
    logs.push_request(RawRequest {
        ip:          "10.2.2.2".into(),
        visit_id:    "human".into(),
        timestamp:   t,
        path:        "/".into(),
        user_agent:  Some("Mozilla/5.0 (Macintosh) Safari/605.1.15".into()),
        duration_ms: Some(420),
        status:      Some(200),
        identity_id: Some("c1".into()),
        device:      None,
    });

    let signals    = Arc::new(MemorySignalStore::new());
    let detector   = Arc::new(UserAgentBotDetector::new().unwrap());
    let classifier = Arc::new(SessionClassifier::new(cfg.session.clone(), detector));
    let dispatcher = Dispatcher::new(signals.clone(), cfg.signals.clone());
    let scanner    = Arc::new(Scanner::new(logs, classifier, dispatcher, cfg));

    let service = QueryService::new(coherence, Arc::clone(&scanner), signals.clone());
    Harness { service, signals, scanner }
}

#[tokio::test]
async fn coherence_report_requires_an_identity_id() {
    let h = harness();
    assert!(matches!(h.service.coherence_report(None).await, Err(EngineError::InvalidInput(_))));
    assert!(matches!(h.service.coherence_report(Some("  ")).await, Err(EngineError::InvalidInput(_))));

    let resp = h.service.handle(QueryRequest::CoherenceReport { identity_id: None }).await;
    assert_eq!(resp.status, 400);
    assert_eq!(resp.body["error"], "invalid_input");
}

#[tokio::test]
async fn coherence_report_status_codes() {
    let h = harness();
    let missing = h.service.handle(QueryRequest::CoherenceReport { identity_id: Some("ghost".into()) }).await;
    assert_eq!(missing.status, 404);
    assert_eq!(missing.body["error"], "not_found");

    let ok = h.service.handle(QueryRequest::CoherenceReport { identity_id: Some("c1".into()) }).await;
    assert_eq!(ok.status, 200);
    assert_eq!(ok.body["score"], 80);
    assert_eq!(ok.body["status"], "good");
}

#[tokio::test]
async fn min_score_outside_range_is_rejected() {
    let h = harness();
    for bad in [-1, 101, 1_000] {
        let err = h.service.fraud_profiles(None, Some(bad)).await.unwrap_err();
        assert_eq!(err.status(), 400);
    }
    let err = h.service.fraud_profiles(Some("ROBOT"), None).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn fraud_profiles_filters_and_reports_stats() {
    let h = harness();

    let all = h.service.fraud_profiles(None, None).await.unwrap();
    assert_eq!(all.profiles.len(), 2);
    assert_eq!(all.stats.total_sessions, 2);
    assert_eq!(all.stats.total_detections, 1);
    assert_eq!(all.stats.critical_ips, 1);
    assert_eq!(all.stats.by_classification.get(&Classification::Bot), Some(&1));
    assert!(all.unresolved_signals.is_empty());

    let bots = h.service.fraud_profiles(Some("bot"), Some(90)).await.unwrap();
    assert_eq!(bots.profiles.len(), 1);
    assert_eq!(bots.profiles[0].ip, "10.1.1.1");
    assert_eq!(bots.profiles[0].classification, Classification::Bot);
    assert_eq!(bots.ip_risk_profiles.len(), 2);

    let none = h.service.fraud_profiles(Some("CONVERTER"), Some(0)).await.unwrap();
    assert!(none.profiles.is_empty());
}

#[tokio::test]
async fn resolving_is_idempotent_and_unknown_ids_are_404() {
    let h = harness();
    assert!(h.service.fraud_profiles(None, None).await.unwrap().stats.last_scan_at.is_none());
    h.scanner.scan_once().await.unwrap();

    let open = h.signals.list(SignalFilter::unresolved()).await.unwrap();
    assert_eq!(open.len(), 1);
    let id = open[0].id.clone();

    let listed = h.service.fraud_profiles(None, None).await.unwrap();
    assert_eq!(listed.unresolved_signals.len(), 1);
    assert_eq!(listed.stats.unresolved_signals, 1);
    assert!(listed.stats.last_scan_at.is_some());

    let first = h.service.resolve_signal(Some(&id)).await.unwrap();
    assert!(first.resolved);
    let at = first.resolved_at;
    assert!(at.is_some());

    let again = h.service.resolve_signal(Some(&id)).await.unwrap();
    assert!(again.resolved);
    assert_eq!(again.resolved_at, at);

    assert!(h.signals.list(SignalFilter::unresolved()).await.unwrap().is_empty());

    let unknown = h.service.handle(QueryRequest::ResolveSignal { signal_id: Some("nope".into()) }).await;
    assert_eq!(unknown.status, 404);
    let blank = h.service.handle(QueryRequest::ResolveSignal { signal_id: None }).await;
    assert_eq!(blank.status, 400);
}

#[tokio::test]
async fn framed_requests_over_tcp() {
    let h = harness();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(QueryServer::new(Arc::new(h.service), addr));
    tokio::spawn(server.serve_on(listener));

    let mut stream = TcpStream::connect(addr).await.unwrap();

    write_frame(&mut stream, &json!({ "method": "coherence-report", "identity_id": "c1" })).await.unwrap();
    let resp: QueryResponse = read_frame(&mut stream).await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body["identity_id"], "c1");

    write_frame(&mut stream, &json!({ "method": "fraud-profiles", "min_score": 500 })).await.unwrap();
    let resp: QueryResponse = read_frame(&mut stream).await.unwrap();
    assert_eq!(resp.status, 400);

    write_frame(&mut stream, &json!({ "method": "drop-tables" })).await.unwrap();
    let resp: QueryResponse = read_frame(&mut stream).await.unwrap();
    assert_eq!(resp.status, 400);
    assert_eq!(resp.body["error"], "invalid_input");
}
