// trustlens/src/workers/bot.rs
//
// Bot detection, pluggable behind the BotDetector trait.
//
// The default detector flags a session when any of these hold:
//   - user agent matches an automation token (Aho-Corasick, case-insensitive)
//   - more than half of the timed requests took 0 ms (nothing rendered)
//   - average duration under 10 ms across more than 5 timed requests
//   - one path requested more than 20 times and nothing else (crawl loop)
//
// Sessions without user agents or durations are simply not evidence.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

use crate::error::{EngineError, EngineResult};
use crate::state::window::SessionWindow;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotVerdict {
    pub is_likely_bot: bool,
    pub evidence:      Vec<String>,
}

pub trait BotDetector: Send + Sync {
    fn detect(&self, window: &SessionWindow) -> BotVerdict;
}

// Pattern → label pairs
const UA_PATTERNS: &[(&str, &str)] = &[
    ("bot",             "bot"),
    ("crawler",         "crawler"),
    ("spider",          "spider"),
    ("headlesschrome",  "headless"),
    ("headless",        "headless"),
    ("phantomjs",       "headless"),
    ("puppeteer",       "automation"),
    ("playwright",      "automation"),
    ("selenium",        "automation"),
    ("python-requests", "script_client"),
    ("python-urllib",   "script_client"),
    ("curl/",           "script_client"),
    ("wget/",           "script_client"),
    ("go-http-client",  "script_client"),
    ("scrapy",          "script_client"),
    ("okhttp",          "script_client"),
];

const ZERO_DURATION_SHARE: f64   = 0.5;
const FAST_AVG_MS:         f64   = 10.0;
const FAST_MIN_TIMED:      usize = 5;
const LOOP_MIN_REQUESTS:   usize = 20;

pub struct UserAgentBotDetector {
    ac:     AhoCorasick,
    labels: Vec<&'static str>,
}

impl UserAgentBotDetector {
    pub fn new() -> EngineResult<Self> {
        let patterns: Vec<&str> = UA_PATTERNS.iter().map(|(p, _)| *p).collect();
        let labels:   Vec<&str> = UA_PATTERNS.iter().map(|(_, l)| *l).collect();
        let ac = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostFirst)
            .build(&patterns)
            .map_err(|e| EngineError::Config(format!("user agent automaton: {e}")))?;
        Ok(Self { ac, labels })
    }

    /// Label of the first automation token in `ua`, if any.
    pub fn match_user_agent(&self, ua: &str) -> Option<&'static str> {
        self.ac.find(ua).map(|m| self.labels[m.pattern().as_usize()])
    }
}

impl BotDetector for UserAgentBotDetector {
    fn detect(&self, window: &SessionWindow) -> BotVerdict {
        let mut evidence = Vec::new();

        if let Some(ua) = window.dominant_user_agent() {
            if let Some(label) = self.match_user_agent(&ua) {
                evidence.push(format!("bot_user_agent:{label}"));
            }
        }

        let durations = window.durations_ms();
        if !durations.is_empty() {
            let zero  = durations.iter().filter(|d| **d == 0).count();
            let share = zero as f64 / durations.len() as f64;
            if share > ZERO_DURATION_SHARE {
                evidence.push(format!("zero_duration:{:.0}%", share * 100.0));
            }
            let avg = durations.iter().sum::<u64>() as f64 / durations.len() as f64;
            if durations.len() > FAST_MIN_TIMED && avg < FAST_AVG_MS {
                evidence.push(format!("too_fast:avg={avg:.0}ms"));
            }
        }

        let n = window.requests.len();
        if n > LOOP_MIN_REQUESTS && window.unique_paths() == 1 {
            evidence.push(format!("single_page_loop:{n}req"));
        }

        BotVerdict { is_likely_bot: !evidence.is_empty(), evidence }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{RawRequest, SessionKey};
    use chrono::{Duration, TimeZone, Utc};

    fn window(reqs: Vec<(&str, Option<&str>, Option<u64>)>) -> SessionWindow {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut w = SessionWindow::new(SessionKey::new("10.0.0.1", "v1"));
        for (i, (path, ua, dur)) in reqs.into_iter().enumerate() {
            w.ingest_request(RawRequest {
                ip: "10.0.0.1".into(),
                visit_id: "v1".into(),
                timestamp: t0 + Duration::seconds(i as i64 * 20),
                path: path.into(),
                user_agent: ua.map(String::from),
                duration_ms: dur,
                status: Some(200),
                identity_id: None,
                device: None,
            });
        }
        w.seal()
    }

    #[test]
    fn crawler_user_agent() {
        let d = UserAgentBotDetector::new().unwrap();
        let w = window(vec![("/", Some("Mozilla/5.0 (compatible; Googlebot/2.1)"), Some(120))]);
        let v = d.detect(&w);
        assert!(v.is_likely_bot);
        assert_eq!(v.evidence, vec!["bot_user_agent:bot".to_string()]);
        assert_eq!(d.match_user_agent("HeadlessChrome/119.0"), Some("headless"));
    }

    #[test]
    fn ordinary_browser_is_clean() {
        let d = UserAgentBotDetector::new().unwrap();
        let ua = Some("Mozilla/5.0 (Macintosh) AppleWebKit/605.1.15 Safari/605.1.15");
        let w = window(vec![("/", ua, Some(340)), ("/pret", ua, Some(220)), ("/apply", ua, Some(410))]);
        assert_eq!(d.detect(&w), BotVerdict::default());
    }

    #[test]
    fn zero_duration_majority() {
        let d = UserAgentBotDetector::new().unwrap();
        let w = window(vec![("/a", None, Some(0)), ("/b", None, Some(0)), ("/c", None, Some(300))]);
        let v = d.detect(&w);
        assert!(v.is_likely_bot);
        assert!(v.evidence[0].starts_with("zero_duration"));
    }

    #[test]
    fn single_page_loop() {
        let d = UserAgentBotDetector::new().unwrap();
        let w = window((0..21).map(|_| ("/rates", None, None)).collect());
        assert!(d.detect(&w).is_likely_bot);

        let w = window((0..20).map(|_| ("/rates", None, None)).collect());
        assert!(!d.detect(&w).is_likely_bot);
    }

    #[test]
    fn missing_data_is_not_evidence() {
        let d = UserAgentBotDetector::new().unwrap();
        let w = window(vec![("/", None, None), ("/x", None, None)]);
        assert!(!d.detect(&w).is_likely_bot);
    }
}
