// trustlens/src/engine/patterns.rs
//
// Cross-session pattern detection. Independent of per-session and per-IP
// scoring; works only on which attributes the profiles share.
//
//   shared_device       one device signature under ≥ N distinct IPs
//   visitor_fan_out     one IP carrying ≥ N distinct visit ids
//   subnet_bot_cluster  ≥ N BOT/SCRAPER IPs inside one IPv4 /24
//   linked_ip_cluster   connected component of IPs joined by a shared
//                       device or a shared linked identity, ≥ N members
//
// Output order: occurrences descending, then pattern name.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::unionfind::UnionFind;

use crate::config::PatternConfig;
use crate::events::{Classification, PatternKind, SessionFraudProfile, SuspiciousPattern};
use crate::state::window::subnet_of;

fn sample(ips: &BTreeSet<&str>, n: usize) -> Vec<String> {
    ips.iter().take(n).map(|s| s.to_string()).collect()
}

fn shared_devices(profiles: &[SessionFraudProfile], cfg: &PatternConfig) -> Vec<SuspiciousPattern> {
    let mut by_device: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for p in profiles {
        if let Some(dev) = p.device_signature.as_deref() {
            by_device.entry(dev).or_default().insert(p.ip.as_str());
        }
    }
    by_device.into_iter()
        .filter(|(_, ips)| ips.len() >= cfg.shared_device_min_ips)
        .map(|(dev, ips)| SuspiciousPattern {
            kind:        PatternKind::SharedDevice,
            pattern:     format!("shared_device:{dev}"),
            occurrences: ips.len(),
            sample_ips:  sample(&ips, cfg.sample_size),
        })
        .collect()
}

fn visitor_fan_out(profiles: &[SessionFraudProfile], cfg: &PatternConfig) -> Vec<SuspiciousPattern> {
    let mut by_ip: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for p in profiles {
        by_ip.entry(p.ip.as_str()).or_default().insert(p.visit_id.as_str());
    }
    by_ip.into_iter()
        .filter(|(_, visits)| visits.len() >= cfg.visitor_fan_out_min_visits)
        .map(|(ip, visits)| SuspiciousPattern {
            kind:        PatternKind::VisitorFanOut,
            pattern:     format!("visitor_fan_out:{ip}"),
            occurrences: visits.len(),
            sample_ips:  vec![ip.to_string()],
        })
        .collect()
}

fn subnet_bot_clusters(profiles: &[SessionFraudProfile], cfg: &PatternConfig) -> Vec<SuspiciousPattern> {
    let mut by_subnet: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for p in profiles {
        if !matches!(p.classification, Classification::Bot | Classification::Scraper) {
            continue;
        }
        if let Some(subnet) = subnet_of(&p.ip) {
            by_subnet.entry(subnet).or_default().insert(p.ip.as_str());
        }
    }
    by_subnet.into_iter()
        .filter(|(_, ips)| ips.len() >= cfg.subnet_cluster_min_ips)
        .map(|(subnet, ips)| SuspiciousPattern {
            kind:        PatternKind::SubnetBotCluster,
            pattern:     format!("subnet_bot_cluster:{subnet}.0/24"),
            occurrences: ips.len(),
            sample_ips:  sample(&ips, cfg.sample_size),
        })
        .collect()
}

fn linked_ip_clusters(profiles: &[SessionFraudProfile], cfg: &PatternConfig) -> Vec<SuspiciousPattern> {
    let ips: Vec<&str> = profiles.iter()
        .map(|p| p.ip.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let index: BTreeMap<&str, usize> = ips.iter().enumerate().map(|(i, ip)| (*ip, i)).collect();

    // First IP seen per shared attribute; every later IP is unioned with it.
    let mut uf = UnionFind::<usize>::new(ips.len());
    let mut anchor: BTreeMap<(u8, &str), usize> = BTreeMap::new();
    for p in profiles {
        let Some(&node) = index.get(p.ip.as_str()) else { continue };
        let attrs = [(0u8, p.device_signature.as_deref()), (1u8, p.identity_id.as_deref())];
        for (tag, value) in attrs {
            if let Some(v) = value {
                let first = *anchor.entry((tag, v)).or_insert(node);
                uf.union(first, node);
            }
        }
    }

    let mut components: BTreeMap<usize, BTreeSet<&str>> = BTreeMap::new();
    for (i, ip) in ips.iter().enumerate() {
        components.entry(uf.find(i)).or_default().insert(*ip);
    }
    components.into_values()
        .filter(|members| members.len() >= cfg.linked_cluster_min_ips)
        .filter_map(|members| {
            let head = *members.iter().next()?;
            Some(SuspiciousPattern {
                kind:        PatternKind::LinkedIpCluster,
                pattern:     format!("linked_ip_cluster:{head}"),
                occurrences: members.len(),
                sample_ips:  sample(&members, cfg.sample_size),
            })
        })
        .collect()
}

pub fn detect_patterns(profiles: &[SessionFraudProfile], cfg: &PatternConfig) -> Vec<SuspiciousPattern> {
    let mut out = Vec::new();
    out.extend(shared_devices(profiles, cfg));
    out.extend(visitor_fan_out(profiles, cfg));
    out.extend(subnet_bot_clusters(profiles, cfg));
    out.extend(linked_ip_clusters(profiles, cfg));
    out.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then_with(|| a.pattern.cmp(&b.pattern)));
    out
}
