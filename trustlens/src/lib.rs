// trustlens/src/lib.rs
//
// Trustlens: two independent risk engines over read-only activity data.
//
//   coherence  cross-source identity coherence score (0–100) per identity
//   engine     per-session fraud classification, per-IP risk, patterns,
//              and fraud signals for review tooling
//
// Everything the engines read comes through the traits in `sources`.

pub mod api;
pub mod coherence;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod records;
pub mod sources;
pub mod state;
pub mod workers;
