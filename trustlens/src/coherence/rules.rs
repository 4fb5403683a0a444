// trustlens/src/coherence/rules.rs
//
// Ordered coherence rule pipeline.
//
// Every rule is a pure fn(&RuleContext) -> Option<flag>. The pipeline folds
// them left to right over an initial score of 100, subtracting the configured
// penalty for each rule that fires. New rules are appended to PIPELINE; the
// existing ones are never touched.
//
// Missing data never fires a rule. A rule whose evidence is the *absence* of
// records from a source is skipped when that source's read failed.

use std::collections::BTreeSet;

use crate::config::{CheckId, CoherenceConfig};
use crate::error::{EngineError, EngineResult};
use crate::records::{ActivityRecord, Identity, SourceType};

use super::resolver::{normalize_email, AttributeSets};

pub const INITIAL_SCORE: u32 = 100;

pub struct RuleContext<'a> {
    pub identity: &'a Identity,
    pub records:  &'a [ActivityRecord],
    pub attrs:    &'a AttributeSets,
    pub degraded: &'a BTreeSet<SourceType>,
    pub cfg:      &'a CoherenceConfig,
}

fn from_source(records: &[ActivityRecord], source: SourceType) -> impl Iterator<Item = &ActivityRecord> {
    records.iter().filter(move |r| r.source_type == source)
}

pub type RuleFn = fn(&RuleContext<'_>) -> Option<String>;

#[derive(Clone, Copy)]
pub struct Rule {
    pub id:    CheckId,
    pub check: RuleFn,
}

pub const PIPELINE: [Rule; 10] = [
    Rule { id: CheckId::EmailDivergence,         check: email_divergence },
    Rule { id: CheckId::PhoneDivergence,         check: phone_divergence },
    Rule { id: CheckId::NameDivergence,          check: name_divergence },
    Rule { id: CheckId::LocationMismatch,        check: location_mismatch },
    Rule { id: CheckId::DeviceDiversity,         check: device_diversity },
    Rule { id: CheckId::TemporalAnomaly,         check: temporal_anomaly },
    Rule { id: CheckId::ApplicationSessionGap,   check: application_session_gap },
    Rule { id: CheckId::MessageSenderMismatch,   check: message_sender_mismatch },
    Rule { id: CheckId::PaymentIdentityMismatch, check: payment_identity_mismatch },
    Rule { id: CheckId::IpDiversity,             check: ip_diversity },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub check:   CheckId,
    pub penalty: u32,
    pub flag:    String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub score:            u8,
    pub findings:         Vec<Finding>,
    pub checks_performed: usize,
}

impl PipelineOutcome {
    pub fn flags(&self) -> Vec<String> {
        self.findings.iter().map(|f| f.flag.clone()).collect()
    }
}

/// Run every rule in order. All-or-nothing: an arithmetic failure anywhere
/// returns Internal and no partial score.
pub fn run(ctx: &RuleContext<'_>) -> EngineResult<PipelineOutcome> {
    run_rules(&PIPELINE, ctx)
}

pub fn run_rules(rules: &[Rule], ctx: &RuleContext<'_>) -> EngineResult<PipelineOutcome> {
    let mut findings = Vec::new();
    let mut deducted: u32 = 0;

    for rule in rules {
        if let Some(flag) = (rule.check)(ctx) {
            let penalty = ctx.cfg.penalty(rule.id);
            deducted = deducted.checked_add(penalty).ok_or_else(|| {
                EngineError::Internal(format!("penalty sum overflowed at {}", rule.id))
            })?;
            findings.push(Finding { check: rule.id, penalty, flag });
        }
    }

    let score = INITIAL_SCORE.saturating_sub(deducted).min(100);
    let score = u8::try_from(score)
        .map_err(|_| EngineError::Internal(format!("score {score} out of range")))?;

    Ok(PipelineOutcome { score, findings, checks_performed: rules.len() })
}

fn join(values: &BTreeSet<String>) -> String {
    values.iter().cloned().collect::<Vec<_>>().join(", ")
}

// ── Rules ─────────────────────────────────────────────────────────────────────

fn email_divergence(ctx: &RuleContext<'_>) -> Option<String> {
    let e = &ctx.attrs.emails;
    (e.len() > 1).then(|| format!("Multiple emails detected: {}", join(e)))
}

fn phone_divergence(ctx: &RuleContext<'_>) -> Option<String> {
    let p = &ctx.attrs.phones;
    (p.len() > 1).then(|| format!("Multiple phones detected: {}", join(p)))
}

fn name_divergence(ctx: &RuleContext<'_>) -> Option<String> {
    let n = &ctx.attrs.names;
    (n.len() > 1).then(|| format!("Multiple names detected: {}", join(n)))
}

/// Substring match in either direction counts as the same place
/// ("montreal" vs "montreal-nord").
fn location_mismatch(ctx: &RuleContext<'_>) -> Option<String> {
    let home     = ctx.attrs.canonical_city.as_deref()?;
    let observed = &ctx.attrs.session_cities;
    if observed.is_empty() {
        return None;
    }
    let matched = observed.iter().any(|c| c.contains(home) || home.contains(c.as_str()));
    (!matched).then(|| format!("Location mismatch: identity in {home}, sessions from {}", join(observed)))
}

fn device_diversity(ctx: &RuleContext<'_>) -> Option<String> {
    let n = ctx.attrs.devices.len();
    (n > ctx.cfg.max_device_signatures)
        .then(|| format!("High device diversity: {n} distinct device/browser/os combinations"))
}

fn temporal_anomaly(ctx: &RuleContext<'_>) -> Option<String> {
    let created = ctx.identity.created_at;
    let n = ctx.records.iter().filter(|r| r.timestamp < created).count();
    (n > 0).then(|| format!("{n} activities recorded before identity creation"))
}

/// Application days (UTC) with no session on the same day.
fn application_session_gap(ctx: &RuleContext<'_>) -> Option<String> {
    if ctx.degraded.contains(&SourceType::Session) {
        return None;
    }
    let session_days: BTreeSet<_> = from_source(ctx.records, SourceType::Session)
        .map(|r| r.timestamp.date_naive())
        .collect();
    let n = from_source(ctx.records, SourceType::Application)
        .filter(|r| !session_days.contains(&r.timestamp.date_naive()))
        .count();
    (n > 0).then(|| format!("{n} applications without a same-day analytics session"))
}

fn message_sender_mismatch(ctx: &RuleContext<'_>) -> Option<String> {
    let primary = ctx.identity.normalized_email()?;
    let n = from_source(ctx.records, SourceType::Message)
        .filter_map(|r| normalize_email(r.email.as_deref()))
        .filter(|e| *e != primary)
        .count();
    (n > 0).then(|| format!("{n} messages with sender email mismatch"))
}

fn payment_identity_mismatch(ctx: &RuleContext<'_>) -> Option<String> {
    let primary = ctx.identity.normalized_email()?;
    let foreign: BTreeSet<String> = from_source(ctx.records, SourceType::Transaction)
        .filter_map(|r| normalize_email(r.email.as_deref()))
        .filter(|e| *e != primary)
        .collect();
    (!foreign.is_empty()).then(|| format!("Transactions use a different email: {}", join(&foreign)))
}

fn ip_diversity(ctx: &RuleContext<'_>) -> Option<String> {
    let n = ctx.attrs.ip_hashes.len();
    (n > ctx.cfg.max_ip_hashes).then(|| format!("High IP diversity: {n} distinct IP addresses"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coherence::resolver::resolve;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn identity() -> Identity {
        let mut id = Identity::new("c1", t0());
        id.primary_email = Some("a@x.com".into());
        id.address.city  = Some("Montreal".into());
        id
    }

    fn outcome(identity: &Identity, records: &[ActivityRecord], degraded: &BTreeSet<SourceType>) -> PipelineOutcome {
        let cfg   = CoherenceConfig::default();
        let attrs = resolve(identity, records, &cfg);
        run(&RuleContext { identity, records, attrs: &attrs, degraded, cfg: &cfg }).unwrap()
    }

    fn rec(src: SourceType, hours: i64) -> ActivityRecord {
        ActivityRecord::new(src, "c1", t0() + Duration::hours(hours))
    }

    #[test]
    fn empty_input_scores_full_marks() {
        let out = outcome(&identity(), &[], &BTreeSet::new());
        assert_eq!(out.score, 100);
        assert!(out.findings.is_empty());
        assert_eq!(out.checks_performed, 10);
    }

    #[test]
    fn city_substring_either_direction_matches() {
        let records = vec![rec(SourceType::Session, 1).with_city("Montreal-Nord")];
        assert!(outcome(&identity(), &records, &BTreeSet::new()).findings.is_empty());

        let records = vec![rec(SourceType::Session, 1).with_city("real")];
        assert!(outcome(&identity(), &records, &BTreeSet::new()).findings.is_empty());
    }

    #[test]
    fn application_without_session_fires_unless_sessions_degraded() {
        let records = vec![rec(SourceType::Application, 1)];
        let out = outcome(&identity(), &records, &BTreeSet::new());
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.findings[0].check, CheckId::ApplicationSessionGap);
        assert_eq!(out.score, 90);

        let degraded: BTreeSet<_> = [SourceType::Session].into_iter().collect();
        assert_eq!(outcome(&identity(), &records, &degraded).score, 100);
    }

    #[test]
    fn same_day_session_closes_the_gap() {
        let records = vec![rec(SourceType::Application, 1), rec(SourceType::Session, 3)];
        assert_eq!(outcome(&identity(), &records, &BTreeSet::new()).score, 100);
    }

    #[test]
    fn message_mismatch_also_counts_as_divergence() {
        let records = vec![rec(SourceType::Message, 1).with_email("b@x.com")];
        let out = outcome(&identity(), &records, &BTreeSet::new());
        let checks: Vec<_> = out.findings.iter().map(|f| f.check).collect();
        assert_eq!(checks, vec![CheckId::EmailDivergence, CheckId::MessageSenderMismatch]);
        assert_eq!(out.score, 65);
    }

    #[test]
    fn payment_mismatch_is_case_insensitive() {
        let records = vec![rec(SourceType::Transaction, 1).with_email("A@X.COM")];
        assert_eq!(outcome(&identity(), &records, &BTreeSet::new()).score, 100);

        let records = vec![rec(SourceType::Transaction, 1).with_email("pay@y.com")];
        let out = outcome(&identity(), &records, &BTreeSet::new());
        assert_eq!(out.findings[0].check, CheckId::PaymentIdentityMismatch);
        assert_eq!(out.score, 80);
    }

    #[test]
    fn no_primary_email_means_no_sender_checks() {
        let mut id = identity();
        id.primary_email = None;
        let records = vec![
            rec(SourceType::Message, 1).with_email("b@x.com"),
            rec(SourceType::Transaction, 1).with_email("c@x.com"),
        ];
        let out = outcome(&id, &records, &BTreeSet::new());
        let checks: Vec<_> = out.findings.iter().map(|f| f.check).collect();
        assert_eq!(checks, vec![CheckId::EmailDivergence]);
    }

    #[test]
    fn everything_firing_clamps_at_zero() {
        let mut cfg = CoherenceConfig::default();
        for p in cfg.penalties.values_mut() { *p = 100; }
        let id = identity();
        let records = vec![rec(SourceType::Session, -1).with_email("z@x.com")];
        let attrs = resolve(&id, &records, &cfg);
        let degraded = BTreeSet::new();
        let out = run(&RuleContext { identity: &id, records: &records, attrs: &attrs, degraded: &degraded, cfg: &cfg }).unwrap();
        assert_eq!(out.score, 0);
    }

    #[test]
    fn penalty_overflow_is_internal_error() {
        let mut cfg = CoherenceConfig::default();
        cfg.penalties.insert(CheckId::EmailDivergence, u32::MAX);
        cfg.penalties.insert(CheckId::TemporalAnomaly, u32::MAX);
        let id = identity();
        let records = vec![rec(SourceType::Session, -1).with_email("z@x.com")];
        let attrs = resolve(&id, &records, &cfg);
        let degraded = BTreeSet::new();
        let res = run(&RuleContext { identity: &id, records: &records, attrs: &attrs, degraded: &degraded, cfg: &cfg });
        assert!(matches!(res, Err(EngineError::Internal(_))));
    }
}
