// trustlens/src/coherence/resolver.rs
//
// Attribute extraction. For each attribute family, the set of distinct
// normalized values observed on the canonical identity plus every record
// whose source exposes that field:
//
//   email    identity, message, application, session   (lower-cased)
//   phone    identity, application                      (PhoneMatch)
//   name     identity, application, message             (NameMatch)
//   city     identity (canonical) / session (observed)  (lower-cased)
//   device   session                                    (type|browser|os key)
//   ip hash  session
//
// Blank and absent values never enter a set. Pure; no I/O.

use std::collections::BTreeSet;

use crate::config::{CoherenceConfig, NameMatch, PhoneMatch};
use crate::records::{non_empty, ActivityRecord, Identity, SourceType};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSets {
    pub emails:          BTreeSet<String>,
    pub phones:          BTreeSet<String>,
    pub names:           BTreeSet<String>,
    pub canonical_city:  Option<String>,
    pub session_cities:  BTreeSet<String>,
    pub devices:         BTreeSet<String>,
    pub ip_hashes:       BTreeSet<String>,
}

fn exposes_email(s: SourceType) -> bool {
    matches!(s, SourceType::Message | SourceType::Application | SourceType::Session)
}

fn exposes_name(s: SourceType) -> bool {
    matches!(s, SourceType::Application | SourceType::Message)
}

pub fn normalize_email(raw: Option<&str>) -> Option<String> {
    non_empty(raw).map(str::to_lowercase)
}

pub fn normalize_city(raw: Option<&str>) -> Option<String> {
    non_empty(raw).map(str::to_lowercase)
}

pub fn normalize_phone(raw: Option<&str>, mode: PhoneMatch) -> Option<String> {
    let v = non_empty(raw)?;
    match mode {
        PhoneMatch::Literal    => Some(v.to_string()),
        PhoneMatch::DigitsOnly => {
            let digits: String = v.chars().filter(|c| c.is_ascii_digit()).collect();
            (!digits.is_empty()).then_some(digits)
        }
    }
}

pub fn normalize_name(raw: Option<&str>, mode: NameMatch) -> Option<String> {
    let v = non_empty(raw)?;
    match mode {
        NameMatch::Literal         => Some(v.to_string()),
        NameMatch::CaseInsensitive => Some(v.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()),
    }
}

pub fn resolve(identity: &Identity, records: &[ActivityRecord], cfg: &CoherenceConfig) -> AttributeSets {
    let mut sets = AttributeSets {
        canonical_city: normalize_city(identity.address.city.as_deref()),
        ..Default::default()
    };

    sets.emails.extend(normalize_email(identity.primary_email.as_deref()));
    sets.phones.extend(normalize_phone(identity.primary_phone.as_deref(), cfg.phone_match));
    sets.names.extend(normalize_name(identity.full_name.as_deref(), cfg.name_match));

    for r in records {
        let src = r.source_type;
        if exposes_email(src) {
            sets.emails.extend(normalize_email(r.email.as_deref()));
        }
        if exposes_name(src) {
            sets.names.extend(normalize_name(r.name.as_deref(), cfg.name_match));
        }
        match src {
            SourceType::Application => {
                sets.phones.extend(normalize_phone(r.phone.as_deref(), cfg.phone_match));
            }
            SourceType::Session => {
                sets.session_cities.extend(normalize_city(r.city.as_deref()));
                if let Some(d) = r.device.as_ref().filter(|d| !d.is_blank()) {
                    sets.devices.insert(d.key());
                }
                sets.ip_hashes.extend(non_empty(r.ip_hash.as_deref()).map(str::to_string));
            }
            _ => {}
        }
    }
    sets
}
