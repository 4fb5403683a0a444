// trustlens/src/main.rs
//
// Trustlens: identity coherence and session fraud classification.
//
// Subcommands:
//   report   score one identity and print its coherence report
//   scan     classify every session in the look-back window, raise signals
//   signals  list stored fraud signals
//   resolve  mark one fraud signal as reviewed
//   serve    query API + periodic scanner
//
// Usage:
//   trustlens --data ./data report --identity-id c42
//   trustlens --data ./data scan --once
//   trustlens --data ./data serve --addr 127.0.0.1:50051

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use trustlens::api::{QueryServer, QueryService};
use trustlens::coherence::CoherenceEngine;
use trustlens::config::EngineConfig;
use trustlens::engine::dispatcher::Dispatcher;
use trustlens::engine::fusion::SessionClassifier;
use trustlens::engine::scanner::{ScanReport, Scanner};
use trustlens::events::{Classification, RiskLevel, Severity, SignalFilter};
use trustlens::records::{CoherenceReport, CoherenceStatus};
use trustlens::sources::jsonl::DataDir;
use trustlens::sources::{IdentityStore, RawLogStore, SignalStore};
use trustlens::workers::bot::UserAgentBotDetector;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "trustlens",
    about   = "Cross-source identity coherence and session fraud classification",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(long, global = true, default_value = "./data", help = "JSONL data directory")]
    data: PathBuf,

    #[arg(long, global = true, help = "JSON engine config (defaults when absent)")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Coherence report for one identity.
    Report {
        #[arg(long)]
        identity_id: String,
        #[arg(long, help = "Print the raw JSON report")]
        json: bool,
    },
    /// Classify sessions and raise fraud signals.
    Scan {
        #[arg(long, help = "Run a single pass and exit")]
        once: bool,
    },
    /// List fraud signals.
    Signals {
        #[arg(long, help = "Include resolved signals")]
        all: bool,
        #[arg(long)]
        severity: Option<Severity>,
    },
    /// Resolve one fraud signal.
    Resolve {
        #[arg(long)]
        signal_id: String,
    },
    /// Serve the query API and scan periodically.
    Serve {
        #[arg(long, default_value = "127.0.0.1:50051")]
        addr: SocketAddr,
    },
}

// ── Wiring ────────────────────────────────────────────────────────────────────

struct App {
    coherence: Arc<CoherenceEngine>,
    scanner:   Arc<Scanner>,
    signals:   Arc<dyn SignalStore>,
}

impl App {
    async fn build(cli: &Cli) -> Result<Self> {
        let cfg = match &cli.config {
            Some(path) => EngineConfig::load(path)?,
            None       => EngineConfig::default(),
        };
        let data = DataDir::load(&cli.data).await?;

        let identities: Arc<dyn IdentityStore> = data.identities;
        let raw_logs:   Arc<dyn RawLogStore>   = data.raw_logs;
        let signals:    Arc<dyn SignalStore>   = data.signals;

        let detector   = Arc::new(UserAgentBotDetector::new()?);
        let classifier = Arc::new(SessionClassifier::new(cfg.session.clone(), detector));
        let dispatcher = Dispatcher::new(Arc::clone(&signals), cfg.signals.clone());

        Ok(Self {
            coherence: Arc::new(CoherenceEngine::new(identities, data.sources, cfg.coherence.clone())),
            scanner:   Arc::new(Scanner::new(raw_logs, classifier, dispatcher, cfg)),
            signals,
        })
    }
}

// ── Terminal output ───────────────────────────────────────────────────────────

fn print_banner() {
    println!("\x1b[1m  trustlens\x1b[0m \x1b[90mv{}\x1b[0m", env!("CARGO_PKG_VERSION"));
    println!("  \x1b[90midentity coherence | session fraud | fraud signals\x1b[0m\n");
}

fn print_report(r: &CoherenceReport) {
    let color = match r.status {
        CoherenceStatus::Excellent  => "\x1b[92m",
        CoherenceStatus::Good       => "\x1b[96m",
        CoherenceStatus::Concerning => "\x1b[93;1m",
        CoherenceStatus::Critical   => "\x1b[91;1m",
    };
    let reset = "\x1b[0m";
    println!("  Identity : {}", r.identity_id);
    println!("  Score    : {}{} ({}){}", color, r.score, r.status, reset);
    println!("  Risk     : {}", r.profile_risk);
    println!("  Checks   : {}", r.checks_performed);
    println!("  Engage   : {}  complete={}%", r.metrics.engagement_score, r.metrics.data_completeness);
    if !r.degraded_sources.is_empty() {
        let d: Vec<String> = r.degraded_sources.iter().map(|s| s.to_string()).collect();
        println!("  Degraded : \x1b[93m{}{}", d.join(", "), reset);
    }
    for flag in &r.flags {
        println!("  {}•{} {}", color, reset, flag);
    }
}

fn print_scan(r: &ScanReport) {
    let count = |c: Classification| r.profiles.iter().filter(|p| p.classification == c).count();
    println!(
        "\n\x1b[1m── scan  sessions={}  bot={}  scraper={}  suspicious={}  converter={}  engaged={}  skipped={} ──\x1b[0m",
        r.profiles.len(),
        count(Classification::Bot),
        count(Classification::Scraper),
        count(Classification::Suspicious),
        count(Classification::Converter),
        count(Classification::Engaged),
        r.skipped,
    );
    for ip in r.ip_profiles.iter().filter(|i| i.risk_level >= RiskLevel::High).take(10) {
        let color = if ip.risk_level == RiskLevel::Critical { "\x1b[91;1m" } else { "\x1b[93;1m" };
        println!(
            "  {}{:<8}\x1b[0m {:<16} avg={:.1} max={} sessions={}",
            color, ip.risk_level, ip.ip, ip.avg_fraud_score, ip.max_fraud_score, ip.session_count
        );
    }
    for p in r.patterns.iter().take(10) {
        println!("  \x1b[96mpattern\x1b[0m  {} ×{}  [{}]", p.pattern, p.occurrences, p.sample_ips.join(", "));
    }
    println!(
        "  signals raised={} already_known={}",
        r.dispatch.raised, r.dispatch.already_known
    );
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("trustlens=info".parse()?))
        .compact().init();

    let cli = Cli::parse();
    let app = App::build(&cli).await?;

    match cli.command {
        Command::Report { identity_id, json } => {
            let report = app.coherence.report(&identity_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_banner();
                print_report(&report);
            }
        }

        Command::Scan { once: true } => {
            print_banner();
            let report = app.scanner.scan_once().await?;
            print_scan(&report);
        }

        Command::Scan { once: false } => {
            print_banner();
            println!("  Press Ctrl+C to stop.\n");
            Arc::clone(&app.scanner).run().await;
        }

        Command::Signals { all, severity } => {
            let filter = SignalFilter { resolved: (!all).then_some(false), severity };
            for s in app.signals.list(filter).await? {
                println!("{}", serde_json::to_string(&s)?);
            }
        }

        Command::Resolve { signal_id } => {
            let signal = app.signals.resolve(&signal_id).await?;
            println!("{}", serde_json::to_string_pretty(&signal)?);
        }

        Command::Serve { addr } => {
            print_banner();
            tokio::spawn(Arc::clone(&app.scanner).run());

            let service = Arc::new(QueryService::new(app.coherence, app.scanner, app.signals));
            let server  = Arc::new(QueryServer::new(service, addr));
            println!("  Query API: \x1b[96m{}\x1b[0m", addr);
            println!("  Press Ctrl+C to stop.\n");

            tokio::select! {
                res = server.serve() => {
                    if let Err(e) = res { error!("query server stopped: {e}"); return Err(e); }
                }
                _ = tokio::signal::ctrl_c() => info!("shutting down"),
            }
        }
    }
    Ok(())
}
