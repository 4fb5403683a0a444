// trustlens/src/coherence/metrics.rs
//
// Unified per-identity activity metrics.
//
//   engagement   = min(100, messages·10 + applications·25 + sessions·2 + tickets·5)
//   completeness = % of the 8 canonical identity fields that are filled

use std::collections::BTreeMap;

use crate::records::{non_empty, ActivityRecord, Identity, IdentityMetrics, SourceType};

const ENGAGEMENT_WEIGHTS: &[(SourceType, usize)] = &[
    (SourceType::Message,     10),
    (SourceType::Application, 25),
    (SourceType::Session,      2),
    (SourceType::Ticket,       5),
];

pub fn compute(identity: &Identity, records: &[ActivityRecord]) -> IdentityMetrics {
    let mut by_source: BTreeMap<SourceType, usize> = SourceType::ALL.iter().map(|s| (*s, 0)).collect();
    for r in records {
        *by_source.entry(r.source_type).or_default() += 1;
    }

    let engagement = ENGAGEMENT_WEIGHTS.iter()
        .map(|(src, w)| by_source.get(src).copied().unwrap_or(0).saturating_mul(*w))
        .fold(0usize, usize::saturating_add)
        .min(100) as u8;

    IdentityMetrics {
        records_by_source: by_source,
        engagement_score:  engagement,
        data_completeness: completeness(identity),
        first_activity:    records.iter().map(|r| r.timestamp).min(),
        last_activity:     records.iter().map(|r| r.timestamp).max(),
    }
}

fn completeness(identity: &Identity) -> u8 {
    let a = &identity.address;
    let fields = [
        non_empty(identity.full_name.as_deref()).is_some(),
        non_empty(identity.primary_email.as_deref()).is_some(),
        non_empty(identity.primary_phone.as_deref()).is_some(),
        identity.date_of_birth.is_some(),
        non_empty(a.line1.as_deref()).is_some(),
        non_empty(a.city.as_deref()).is_some(),
        non_empty(a.region.as_deref()).is_some(),
        non_empty(a.postal_code.as_deref()).is_some(),
    ];
    let filled = fields.iter().filter(|f| **f).count();
    ((filled * 100 + fields.len() / 2) / fields.len()) as u8
}
