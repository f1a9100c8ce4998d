use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initializes the process-wide `tracing` subscriber. `log_level` is the
/// config value (spec.md §6 `log_level`); it seeds the default filter but
/// `RUST_LOG` still wins if set, matching the teacher's env-driven logging
/// setup (`src/security/tls.rs` and friends use `tracing`/`log` macros
/// without a bespoke filter layer of their own).
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Process-wide counters, plus the process start time so the Adapter can
/// report an uptime gauge (spec.md §4.4). The original emits these to a
/// Dropsonde/metron sink (spec.md §1 telemetry emission plumbing, out of
/// scope); here they are plain atomics, bumped at each call site and
/// surfaced by `spawn_reporter` below rather than left as write-only state.
pub struct Metrics {
    pub register_messages: AtomicU64,
    pub unregister_messages: AtomicU64,
    pub dns_requests: AtomicU64,
    pub adapter_requests: AtomicU64,
    pub malformed_messages: AtomicU64,
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            register_messages: AtomicU64::new(0),
            unregister_messages: AtomicU64::new(0),
            dns_requests: AtomicU64::new(0),
            adapter_requests: AtomicU64::new(0),
            malformed_messages: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn incr_register(&self) {
        self.register_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_unregister(&self) {
        self.unregister_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_dns_request(&self) {
        self.dns_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_adapter_request(&self) {
        self.adapter_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_malformed(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns a background task that logs the counters (and uptime) every
/// `interval`, giving the "observable for metrics" counters (spec.md
/// §4.2/§4.3) and the Adapter's uptime metric (spec.md §4.4) an actual
/// observer now that the metron wire-emitter itself is out of scope
/// (spec.md §1). `role` tags the log line so Controller and Adapter
/// output is distinguishable when both run on the same host.
pub fn spawn_reporter(metrics: Arc<Metrics>, interval: Duration, role: &'static str) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            info!(
                role,
                register_messages = metrics.register_messages.load(Ordering::Relaxed),
                unregister_messages = metrics.unregister_messages.load(Ordering::Relaxed),
                dns_requests = metrics.dns_requests.load(Ordering::Relaxed),
                adapter_requests = metrics.adapter_requests.load(Ordering::Relaxed),
                malformed_messages = metrics.malformed_messages.load(Ordering::Relaxed),
                uptime_seconds = metrics.uptime_seconds(),
                "metrics report"
            );
        }
    });
}
