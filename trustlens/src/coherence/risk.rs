// trustlens/src/coherence/risk.rs
//
// Score → status tier. Depends on nothing but the clamped score.
//
//   ≥ 90  excellent
//   ≥ 70  good
//   ≥ 50  concerning
//   else  critical
//
// profile_risk is high for concerning and critical.

use crate::records::{CoherenceStatus, ProfileRisk};

pub const EXCELLENT: u8 = 90;
pub const GOOD:      u8 = 70;
pub const CONCERNING: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskAssessment {
    pub status:       CoherenceStatus,
    pub profile_risk: ProfileRisk,
}

pub fn classify(score: u8) -> RiskAssessment {
    let status = match score {
        s if s >= EXCELLENT  => CoherenceStatus::Excellent,
        s if s >= GOOD       => CoherenceStatus::Good,
        s if s >= CONCERNING => CoherenceStatus::Concerning,
        _                    => CoherenceStatus::Critical,
    };
    let profile_risk = match status {
        CoherenceStatus::Concerning | CoherenceStatus::Critical => ProfileRisk::High,
        CoherenceStatus::Good | CoherenceStatus::Excellent      => ProfileRisk::Low,
    };
    RiskAssessment { status, profile_risk }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries() {
        assert_eq!(classify(100).status, CoherenceStatus::Excellent);
        assert_eq!(classify(90).status,  CoherenceStatus::Excellent);
        assert_eq!(classify(89).status,  CoherenceStatus::Good);
        assert_eq!(classify(70).status,  CoherenceStatus::Good);
        assert_eq!(classify(69).status,  CoherenceStatus::Concerning);
        assert_eq!(classify(50).status,  CoherenceStatus::Concerning);
        assert_eq!(classify(49).status,  CoherenceStatus::Critical);
        assert_eq!(classify(0).status,   CoherenceStatus::Critical);
    }

    #[test]
    fn status_never_improves_as_score_drops() {
        let mut prev = classify(100).status;
        for s in (0..=100u8).rev() {
            let cur = classify(s).status;
            assert!(cur <= prev);
            prev = cur;
        }
    }

    #[test]
    fn profile_risk_follows_status() {
        assert_eq!(classify(70).profile_risk, ProfileRisk::Low);
        assert_eq!(classify(69).profile_risk, ProfileRisk::High);
        assert_eq!(classify(10).profile_risk, ProfileRisk::High);
    }
}
