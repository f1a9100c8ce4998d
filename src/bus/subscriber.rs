use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::bus::messages::{parse_register, parse_unregister, StartMessage};
use crate::error::SdError;
use crate::table::AddressTable;
use crate::telemetry::Metrics;

const START_SUBJECT: &str = "service-discovery.start";
const GREET_SUBJECT: &str = "service-discovery.greet";
const REGISTER_SUBJECT: &str = "service-discovery.register";
const UNREGISTER_SUBJECT: &str = "service-discovery.unregister";

/// Everything needed to build the subscriber's identity and the
/// start/greet-reply payload (spec.md §3 StartMessage / greet reply).
#[derive(Debug, Clone)]
pub struct SubscriberOptions {
    pub nats_urls: String,
    pub index: u32,
    pub host: String,
    pub minimum_register_interval_in_seconds: u64,
    pub prune_threshold_in_seconds: u64,
    pub warm_duration: Duration,
}

impl SubscriberOptions {
    /// "`id` uniquely identifies this Controller instance (configured index
    /// plus a random suffix)" — spec.md §3.
    fn generate_id(&self) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();
        format!("{}-{}", self.index, suffix)
    }
}

/// Owns the single bus connection and drives the address table from
/// register/unregister traffic (spec.md §4.2).
pub struct Subscriber {
    table: Arc<AddressTable>,
    opts: SubscriberOptions,
    metrics: Arc<Metrics>,
    id: String,
    client_slot: Arc<OnceCell<async_nats::Client>>,
    client: Mutex<Option<async_nats::Client>>,
    succeeded: AtomicBool,
    warmed_up: Arc<AtomicBool>,
    connected_before: Arc<AtomicBool>,
}

impl Subscriber {
    pub fn new(table: Arc<AddressTable>, opts: SubscriberOptions, metrics: Arc<Metrics>) -> Arc<Self> {
        let id = opts.generate_id();
        Arc::new(Self {
            table,
            opts,
            metrics,
            id,
            client_slot: Arc::new(OnceCell::new()),
            client: Mutex::new(None),
            succeeded: AtomicBool::new(false),
            warmed_up: Arc::new(AtomicBool::new(false)),
            connected_before: Arc::new(AtomicBool::new(false)),
        })
    }

    fn start_message(&self) -> StartMessage {
        StartMessage {
            id: self.id.clone(),
            host: self.opts.host.clone(),
            minimum_register_interval_in_seconds: self.opts.minimum_register_interval_in_seconds,
            prune_threshold_in_seconds: self.opts.prune_threshold_in_seconds,
        }
    }

    /// Connects, publishes the initial start message, subscribes to
    /// greet/register/unregister, and starts the warm-up timer. Idempotent:
    /// a call after a prior successful call is a no-op (spec.md §4.2).
    pub async fn run(self: &Arc<Self>) -> Result<(), SdError> {
        if self.succeeded.load(Ordering::Acquire) {
            return Ok(());
        }

        let table_for_cb = self.table.clone();
        let client_slot_for_cb = self.client_slot.clone();
        let connected_before_for_cb = self.connected_before.clone();
        let start_message_for_cb = self.start_message();

        let options = async_nats::ConnectOptions::new().event_callback(move |event| {
            let table = table_for_cb.clone();
            let client_slot = client_slot_for_cb.clone();
            let connected_before = connected_before_for_cb.clone();
            let start_message = start_message_for_cb.clone();
            async move {
                match event {
                    async_nats::Event::Disconnected => {
                        warn!("bus disconnected");
                        table.pause_pruning();
                    }
                    async_nats::Event::Connected => {
                        if connected_before.load(Ordering::Acquire) {
                            if let Some(client) = client_slot.get() {
                                info!("bus reconnected, host scrubbed");
                                if let Ok(payload) = serde_json::to_vec(&start_message) {
                                    let _ = client.publish(START_SUBJECT, payload.into()).await;
                                }
                            }
                            table.resume_pruning().await;
                        }
                    }
                    async_nats::Event::ClientError(ref e) => {
                        warn!(error = %e, "bus client error");
                    }
                    _ => {}
                }
            }
        });

        let client = options
            .connect(self.opts.nats_urls.clone())
            .await
            .map_err(|e| SdError::BusConnect(e.to_string()))?;
        let _ = self.client_slot.set(client.clone());
        self.connected_before.store(true, Ordering::Release);

        let start_payload = serde_json::to_vec(&self.start_message())
            .expect("StartMessage always serializes");
        client
            .publish(START_SUBJECT, start_payload.into())
            .await
            .map_err(|e| SdError::BusConnect(e.to_string()))?;

        let mut greet_sub = client
            .subscribe(GREET_SUBJECT)
            .await
            .map_err(|e| SdError::BusConnect(e.to_string()))?;
        client
            .flush()
            .await
            .map_err(|e| SdError::BusConnect(e.to_string()))?;
        {
            let client = client.clone();
            let start_message = self.start_message();
            tokio::spawn(async move {
                while let Some(msg) = greet_sub.next().await {
                    if let Some(reply) = msg.reply {
                        if let Ok(payload) = serde_json::to_vec(&start_message) {
                            let _ = client.publish(reply, payload.into()).await;
                        }
                    }
                }
            });
        }

        let mut register_sub = client
            .subscribe(REGISTER_SUBJECT)
            .await
            .map_err(|e| SdError::BusConnect(e.to_string()))?;
        {
            let table = self.table.clone();
            let metrics = self.metrics.clone();
            tokio::spawn(async move {
                while let Some(msg) = register_sub.next().await {
                    match parse_register(&msg.payload) {
                        Ok(reg) => {
                            table.add(&reg.uris, &reg.host).await;
                            metrics.incr_register();
                        }
                        Err(e) => {
                            metrics.incr_malformed();
                            info!(
                                error = %e,
                                payload = %String::from_utf8_lossy(&msg.payload),
                                "dropping malformed register message"
                            );
                        }
                    }
                }
            });
        }

        let mut unregister_sub = client
            .subscribe(UNREGISTER_SUBJECT)
            .await
            .map_err(|e| SdError::BusConnect(e.to_string()))?;
        {
            let table = self.table.clone();
            let metrics = self.metrics.clone();
            tokio::spawn(async move {
                while let Some(msg) = unregister_sub.next().await {
                    match parse_unregister(&msg.payload) {
                        Ok(reg) => {
                            table.remove(&reg.uris, &reg.host).await;
                            metrics.incr_unregister();
                        }
                        Err(e) => {
                            metrics.incr_malformed();
                            info!(
                                error = %e,
                                payload = %String::from_utf8_lossy(&msg.payload),
                                "dropping malformed unregister message"
                            );
                        }
                    }
                }
            });
        }

        {
            let table = self.table.clone();
            let warmed_up = self.warmed_up.clone();
            let warm_duration = self.opts.warm_duration;
            tokio::spawn(async move {
                tokio::time::sleep(warm_duration).await;
                if !warmed_up.swap(true, Ordering::AcqRel) {
                    table.set_warm();
                    debug!("warm-up window elapsed, lookups now served");
                }
            });
        }

        *self.client.lock().await = Some(client);
        self.succeeded.store(true, Ordering::Release);
        Ok(())
    }

    /// Releases the connection. Safe to call multiple times.
    pub async fn close(&self) {
        let _ = self.client.lock().await.take();
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_id_from_index_and_random_suffix() {
        let opts = SubscriberOptions {
            nats_urls: "nats://127.0.0.1:4222".to_string(),
            index: 3,
            host: "10.0.0.5".to_string(),
            minimum_register_interval_in_seconds: 10,
            prune_threshold_in_seconds: 120,
            warm_duration: Duration::from_secs(30),
        };
        let id = opts.generate_id();
        assert!(id.starts_with("3-"));
        assert_eq!(id.len(), "3-".len() + 6);
    }

    #[tokio::test]
    async fn close_is_idempotent_without_a_connection() {
        let table = AddressTable::new(
            Duration::from_secs(60),
            Duration::from_secs(10),
            Duration::from_secs(5),
        );
        let opts = SubscriberOptions {
            nats_urls: "nats://127.0.0.1:4222".to_string(),
            index: 1,
            host: "127.0.0.1".to_string(),
            minimum_register_interval_in_seconds: 10,
            prune_threshold_in_seconds: 120,
            warm_duration: Duration::from_secs(30),
        };
        let sub = Subscriber::new(table.clone(), opts, Arc::new(Metrics::new()));
        sub.close().await;
        sub.close().await;
        table.shutdown().await;
    }
}
