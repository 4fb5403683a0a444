// trustlens/src/workers/mod.rs
//
// Per-session detection workers. Each reads one sealed SessionWindow and
// returns its own signal; fusion into a fraud score happens in engine::fusion.

pub mod bot;
pub mod correlation;
pub mod velocity;

use crate::config::SessionConfig;
use crate::state::window::SessionWindow;

use bot::{BotDetector, BotVerdict};
use correlation::CorrelationSignal;
use velocity::VelocitySignal;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSignals {
    pub velocity:    VelocitySignal,
    pub correlation: CorrelationSignal,
    pub bot:         BotVerdict,
}

impl SessionSignals {
    /// Evidence from every worker, in worker order.
    pub fn evidence(&self) -> Vec<String> {
        self.bot.evidence.iter()
            .chain(&self.velocity.evidence)
            .chain(&self.correlation.evidence)
            .cloned()
            .collect()
    }
}

/// Run all workers over one window.
pub fn run_all(window: &SessionWindow, cfg: &SessionConfig, detector: &dyn BotDetector) -> SessionSignals {
    SessionSignals {
        velocity:    velocity::analyze(window, cfg),
        correlation: correlation::analyze(window, cfg),
        bot:         detector.detect(window),
    }
}
