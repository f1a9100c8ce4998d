use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// A single live `(ip, lastUpdate)` pair for a hostname, in the order it
/// was first added (spec.md §3 "insertion order, preserved for
/// deterministic response ordering").
#[derive(Debug, Clone)]
struct Entry {
    ip: String,
    last_update: Instant,
}

/// Concurrent hostname -> live-IP table with TTL-based pruning and a
/// pause/resume discipline tied to bus connectivity (spec.md §4.1).
///
/// A single `tokio::sync::RwLock` guards the whole map: the spec only
/// requires that mutations across the hostnames named in one `Add`/
/// `Remove` call be atomic with respect to readers, and "a single
/// writer-side exclusion suffices" (spec.md §4.1) — matching the
/// coarse-grained `Arc<RwLock<HashMap<..>>>` the teacher uses for its own
/// hostname table (`src/core/dns/mod.rs`'s `DynamicDnsService`).
pub struct AddressTable {
    inner: RwLock<HashMap<String, Vec<Entry>>>,
    warm: AtomicBool,
    paused: AtomicBool,
    /// Instant before which the pruner must not act, set by `resume_pruning`
    /// to give emitters a grace window to re-register after a reconnect.
    resume_not_before: Mutex<Option<Instant>>,
    staleness_threshold: Duration,
    pruning_interval: Duration,
    resume_pruning_delay: Duration,
    pruner: Mutex<Option<JoinHandle<()>>>,
}

/// `hostname` normalized to its fully-qualified form: a trailing dot is
/// appended if absent. This is the table's only normalization rule
/// (spec.md §3 Hostname).
pub fn normalize_hostname(hostname: &str) -> String {
    if hostname.ends_with('.') {
        hostname.to_string()
    } else {
        format!("{hostname}.")
    }
}

impl AddressTable {
    pub fn new(
        staleness_threshold: Duration,
        pruning_interval: Duration,
        resume_pruning_delay: Duration,
    ) -> Arc<Self> {
        let table = Arc::new(Self {
            inner: RwLock::new(HashMap::new()),
            warm: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            resume_not_before: Mutex::new(None),
            staleness_threshold,
            pruning_interval,
            resume_pruning_delay,
            pruner: Mutex::new(None),
        });
        table.clone().spawn_pruner();
        table
    }

    fn spawn_pruner(self: Arc<Self>) {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.pruning_interval);
            loop {
                ticker.tick().await;
                self.prune_tick().await;
            }
        });
        // Only reachable once, right after construction; no lock contention.
        if let Ok(mut guard) = self.pruner.try_lock() {
            *guard = Some(handle);
        }
    }

    async fn prune_tick(&self) {
        if self.paused.load(Ordering::Acquire) {
            return;
        }
        {
            let grace = self.resume_not_before.lock().await;
            if let Some(not_before) = *grace {
                if Instant::now() < not_before {
                    return;
                }
            }
        }

        let now = Instant::now();
        let stale_threshold = self.staleness_threshold;

        // Phase 1: find candidate hostnames under a read lock.
        let candidates: Vec<String> = {
            let map = self.inner.read().await;
            map.iter()
                .filter(|(_, entries)| {
                    entries
                        .iter()
                        .any(|e| now.saturating_duration_since(e.last_update) > stale_threshold)
                })
                .map(|(h, _)| h.clone())
                .collect()
        };
        if candidates.is_empty() {
            return;
        }

        // Phase 2: re-evaluate freshness and rebuild under a write lock.
        // Entries can only have gotten fresher between the two phases.
        let mut map = self.inner.write().await;
        for hostname in candidates {
            if let Some(entries) = map.get_mut(&hostname) {
                entries.retain(|e| now.saturating_duration_since(e.last_update) <= stale_threshold);
                if entries.is_empty() {
                    map.remove(&hostname);
                }
            }
        }
    }

    /// Adds `ip` for every hostname in `hostnames`, refreshing `lastUpdate`
    /// if the `(hostname, ip)` pair already exists. Atomic across the
    /// whole batch with respect to readers.
    pub async fn add(&self, hostnames: &[String], ip: &str) {
        let now = Instant::now();
        let mut map = self.inner.write().await;
        for hostname in hostnames {
            let key = normalize_hostname(hostname);
            let entries = map.entry(key).or_default();
            match entries.iter_mut().find(|e| e.ip == ip) {
                Some(entry) => entry.last_update = now,
                None => entries.push(Entry {
                    ip: ip.to_string(),
                    last_update: now,
                }),
            }
        }
    }

    /// Removes `ip` from every hostname in `hostnames`. No-op for pairs
    /// that are absent; drops the hostname key entirely once its list is
    /// empty.
    pub async fn remove(&self, hostnames: &[String], ip: &str) {
        let mut map = self.inner.write().await;
        for hostname in hostnames {
            let key = normalize_hostname(hostname);
            if let Some(entries) = map.get_mut(&key) {
                entries.retain(|e| e.ip != ip);
                if entries.is_empty() {
                    map.remove(&key);
                }
            }
        }
    }

    /// Snapshot of the IPs for `hostname`, in first-add order. Empty when
    /// the hostname is absent.
    pub async fn lookup(&self, hostname: &str) -> Vec<String> {
        let key = normalize_hostname(hostname);
        let map = self.inner.read().await;
        map.get(&key)
            .map(|entries| entries.iter().map(|e| e.ip.clone()).collect())
            .unwrap_or_default()
    }

    /// Snapshot of the full table, used by `/routes`.
    pub async fn get_all_addresses(&self) -> HashMap<String, Vec<String>> {
        let map = self.inner.read().await;
        map.iter()
            .map(|(h, entries)| (h.clone(), entries.iter().map(|e| e.ip.clone()).collect()))
            .collect()
    }

    pub fn pause_pruning(&self) {
        self.paused.store(true, Ordering::Release);
        debug!("pruning paused");
    }

    /// Resumes pruning, deferred for `resume_pruning_delay` so emitters get
    /// a chance to refresh entries after a bus reconnect (spec.md §4.1).
    pub async fn resume_pruning(&self) {
        let not_before = Instant::now() + self.resume_pruning_delay;
        *self.resume_not_before.lock().await = Some(not_before);
        self.paused.store(false, Ordering::Release);
        debug!("pruning resumed, grace period active");
    }

    /// One-way: the table is warm once and never becomes un-warm again.
    pub fn set_warm(&self) {
        self.warm.store(true, Ordering::Release);
    }

    pub fn is_warm(&self) -> bool {
        self.warm.load(Ordering::Acquire)
    }

    /// Stops the pruner task. Idempotent: a second call finds no handle
    /// left to abort.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.pruner.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Arc<AddressTable> {
        AddressTable::new(Duration::from_secs(60), Duration::from_secs(10), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn add_then_lookup_round_trips() {
        let t = table();
        t.add(&["foo.com".to_string(), "bar.com".to_string()], "192.168.0.1")
            .await;
        assert_eq!(t.lookup("foo.com").await, vec!["192.168.0.1"]);
        assert_eq!(t.lookup("bar.com").await, vec!["192.168.0.1"]);
        t.shutdown().await;
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let t = table();
        t.add(&["foo.com".to_string()], "192.168.0.1").await;
        t.add(&["foo.com".to_string()], "192.168.0.1").await;
        assert_eq!(t.lookup("foo.com").await.len(), 1);
        t.shutdown().await;
    }

    #[tokio::test]
    async fn preserves_first_add_order() {
        let t = table();
        t.add(&["foo.com".to_string()], "192.168.0.1").await;
        t.add(&["foo.com".to_string()], "192.168.0.2").await;
        assert_eq!(
            t.lookup("foo.com").await,
            vec!["192.168.0.1".to_string(), "192.168.0.2".to_string()]
        );
        t.shutdown().await;
    }

    #[tokio::test]
    async fn remove_drops_single_ip_and_empties_hostname() {
        let t = table();
        t.add(&["foo.com".to_string()], "192.168.0.1").await;
        t.add(&["foo.com".to_string()], "192.168.0.2").await;
        t.remove(&["foo.com".to_string()], "192.168.0.1").await;
        assert_eq!(t.lookup("foo.com").await, vec!["192.168.0.2"]);

        t.remove(&["foo.com".to_string()], "192.168.0.2").await;
        assert!(t.lookup("foo.com").await.is_empty());
        assert!(!t.get_all_addresses().await.contains_key("foo.com."));
        t.shutdown().await;
    }

    #[tokio::test]
    async fn normalization_is_trailing_dot_only() {
        let t = table();
        t.add(&["foo.com".to_string()], "192.168.0.1").await;
        assert_eq!(t.lookup("foo.com").await, t.lookup("foo.com.").await);
        t.shutdown().await;
    }

    #[tokio::test]
    async fn warm_is_one_way() {
        let t = table();
        assert!(!t.is_warm());
        t.set_warm();
        assert!(t.is_warm());
        t.set_warm();
        assert!(t.is_warm());
        t.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pruner_removes_stale_entries() {
        let t = AddressTable::new(Duration::from_secs(5), Duration::from_secs(1), Duration::from_secs(0));
        t.add(&["foo.com".to_string()], "192.168.0.1").await;

        tokio::time::advance(Duration::from_secs(7)).await;
        // let the pruner task actually run now that time has moved.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(1)).await;
        tokio::task::yield_now().await;

        assert!(t.lookup("foo.com").await.is_empty());
        t.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn paused_table_never_prunes() {
        let t = AddressTable::new(Duration::from_secs(5), Duration::from_secs(1), Duration::from_secs(0));
        t.add(&["foo.com".to_string()], "192.168.0.1").await;
        t.pause_pruning();

        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;

        assert_eq!(t.lookup("foo.com").await, vec!["192.168.0.1"]);
        t.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn resume_applies_grace_period_before_pruning() {
        let t = AddressTable::new(Duration::from_secs(5), Duration::from_secs(1), Duration::from_secs(10));
        t.add(&["foo.com".to_string()], "192.168.0.1").await;
        t.pause_pruning();
        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        // Still paused: survives well past the staleness threshold.
        assert_eq!(t.lookup("foo.com").await, vec!["192.168.0.1"]);

        t.resume_pruning().await;
        // Within the grace period: still alive even though stale.
        tokio::time::advance(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        assert_eq!(t.lookup("foo.com").await, vec!["192.168.0.1"]);

        // Past the grace period: now eligible for pruning.
        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert!(t.lookup("foo.com").await.is_empty());
        t.shutdown().await;
    }
}
