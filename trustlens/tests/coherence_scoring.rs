// Identity coherence scoring end to end, through the in-memory stores.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use trustlens::coherence::CoherenceEngine;
use trustlens::config::CoherenceConfig;
use trustlens::records::{
    ActivityRecord, CoherenceStatus, DeviceSignature, Identity, ProfileRisk, SourceType,
};
use trustlens::sources::memory::{empty_sources, MemoryActivitySource, MemoryIdentityStore};
use trustlens::sources::ActivitySource;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

struct Fixture {
    identities: Arc<MemoryIdentityStore>,
    sources:    HashMap<SourceType, Arc<MemoryActivitySource>>,
}

impl Fixture {
    fn new(identity: Identity) -> Self {
        let identities = Arc::new(MemoryIdentityStore::new());
        identities.insert(identity);
        Self { identities, sources: empty_sources() }
    }

    fn add(&self, record: ActivityRecord) {
        assert!(self.sources[&record.source_type].insert(record));
    }

    fn engine(&self) -> CoherenceEngine {
        let sources: Vec<Arc<dyn ActivitySource>> = SourceType::ALL.iter()
            .map(|t| Arc::clone(&self.sources[t]) as Arc<dyn ActivitySource>)
            .collect();
        CoherenceEngine::new(self.identities.clone(), sources, CoherenceConfig::default())
    }
}

fn identity(email: Option<&str>, city: Option<&str>) -> Identity {
    let mut id = Identity::new("c1", t0());
    id.primary_email = email.map(String::from);
    id.address.city  = city.map(String::from);
    id
}

fn session(days: i64) -> ActivityRecord {
    ActivityRecord::new(SourceType::Session, "c1", t0() + Duration::days(days))
}

#[tokio::test]
async fn single_email_divergence_scores_good() {
    let f = Fixture::new(identity(Some("a@x.com"), None));
    f.add(session(1).with_email("b@x.com"));

    let r = f.engine().report("c1").await.unwrap();
    assert_eq!(r.score, 80);
    assert_eq!(r.status, CoherenceStatus::Good);
    assert_eq!(r.profile_risk, ProfileRisk::Low);
    assert_eq!(r.flags, vec!["Multiple emails detected: a@x.com, b@x.com".to_string()]);
    assert_eq!(r.checks_performed, 10);
}

#[tokio::test]
async fn pre_creation_activity_stacks_with_divergence() {
    let f = Fixture::new(identity(Some("a@x.com"), None));
    f.add(session(1).with_email("b@x.com"));
    f.add(session(-1));

    let r = f.engine().report("c1").await.unwrap();
    assert_eq!(r.score, 55);
    assert_eq!(r.status, CoherenceStatus::Concerning);
    assert_eq!(r.profile_risk, ProfileRisk::High);
    assert_eq!(r.flags.len(), 2);
    assert!(r.flags.iter().any(|f| f == "1 activities recorded before identity creation"));
}

#[tokio::test]
async fn location_mismatch_lands_on_excellent_boundary() {
    let f = Fixture::new(identity(None, Some("Montreal")));
    for d in 1..=3 {
        f.add(session(d).with_city("Toronto"));
    }

    let r = f.engine().report("c1").await.unwrap();
    assert_eq!(r.score, 90);
    assert_eq!(r.status, CoherenceStatus::Excellent);
    assert_eq!(r.flags, vec!["Location mismatch: identity in montreal, sessions from toronto".to_string()]);
}

#[tokio::test]
async fn identity_without_activity_is_fully_coherent() {
    let f = Fixture::new(identity(Some("a@x.com"), Some("Montreal")));
    let r = f.engine().report("c1").await.unwrap();
    assert_eq!(r.score, 100);
    assert_eq!(r.status, CoherenceStatus::Excellent);
    assert!(r.flags.is_empty());
    assert_eq!(r.checks_performed, 10);
    assert!(r.degraded_sources.is_empty());
}

#[tokio::test]
async fn same_snapshot_same_report() {
    let f = Fixture::new(identity(Some("a@x.com"), Some("Montreal")));
    f.add(session(1).with_email("b@x.com").with_city("Laval"));
    f.add(ActivityRecord::new(SourceType::Application, "c1", t0() + Duration::days(3)).with_phone("555"));
    let engine = f.engine();

    let a = engine.report("c1").await.unwrap();
    let b = engine.report("c1").await.unwrap();
    assert_eq!(a.score, b.score);
    assert_eq!(a.flags, b.flags);
    assert_eq!(a.status, b.status);
    assert_eq!(a.metrics, b.metrics);
}

#[tokio::test]
async fn adding_divergent_records_never_raises_the_score() {
    let f = Fixture::new(identity(Some("a@x.com"), Some("Montreal")));
    let engine = f.engine();
    let mut last = engine.report("c1").await.unwrap().score;

    let steps = vec![
        session(1).with_email("b@x.com"),
        session(2).with_city("Toronto"),
        ActivityRecord::new(SourceType::Application, "c1", t0() + Duration::days(9)).with_name("Someone Else"),
        ActivityRecord::new(SourceType::Message, "c1", t0() + Duration::days(4)).with_email("c@x.com"),
        ActivityRecord::new(SourceType::Transaction, "c1", t0() + Duration::days(5)).with_email("d@x.com"),
        session(-3),
    ];
    for record in steps {
        f.add(record);
        let score = engine.report("c1").await.unwrap().score;
        assert!(score <= last, "score rose from {last} to {score}");
        last = score;
    }
    assert!(last < 50);
}

#[tokio::test]
async fn every_check_firing_clamps_at_zero() {
    let f = Fixture::new({
        let mut id = identity(Some("a@x.com"), Some("Montreal"));
        id.primary_phone = Some("111".into());
        id.full_name     = Some("Ana Silva".into());
        id
    });
    for i in 0..12 {
        f.add(session(i - 1)
            .with_city("Toronto")
            .with_ip_hash(&format!("h{i}"))
            .with_device(DeviceSignature::new("desktop", &format!("b{i}"), "linux")));
    }
    f.add(ActivityRecord::new(SourceType::Application, "c1", t0() + Duration::days(40))
        .with_phone("222").with_name("Bruno Costa"));
    f.add(ActivityRecord::new(SourceType::Message, "c1", t0() + Duration::days(2)).with_email("m@x.com"));
    f.add(ActivityRecord::new(SourceType::Transaction, "c1", t0() + Duration::days(2)).with_email("p@x.com"));

    let r = f.engine().report("c1").await.unwrap();
    assert_eq!(r.flags.len(), 10);
    assert_eq!(r.score, 0);
    assert_eq!(r.status, CoherenceStatus::Critical);
}

#[tokio::test]
async fn metrics_travel_with_the_report() {
    let f = Fixture::new(identity(Some("a@x.com"), None));
    f.add(session(1));
    f.add(session(2));
    f.add(ActivityRecord::new(SourceType::Message, "c1", t0() + Duration::days(3)).with_email("a@x.com"));

    let r = f.engine().report("c1").await.unwrap();
    assert_eq!(r.metrics.records_by_source.get(&SourceType::Session), Some(&2));
    assert_eq!(r.metrics.records_by_source.get(&SourceType::Message), Some(&1));
    assert_eq!(r.metrics.first_activity, Some(t0() + Duration::days(1)));
    assert_eq!(r.metrics.last_activity, Some(t0() + Duration::days(3)));
    assert!(r.metrics.engagement_score > 0);
}
