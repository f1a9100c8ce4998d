pub mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::time::Duration;
use tracing::info;

use crate::bus::{Subscriber, SubscriberOptions};
use crate::config::Config;
use crate::error::SdError;
use crate::table::AddressTable;
use crate::telemetry::Metrics;
use crate::tls;

pub use server::ControllerState;

/// Starts the table, subscriber, and HTTPS server in dependency order and
/// stops them in reverse on `shutdown` (spec.md §5 "ordered stop: stop
/// accepting new HTTP connections -> close bus connection -> shutdown
/// pruner task -> return").
pub async fn run(
    config: Config,
    local_host: String,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), SdError> {
    let metrics = Arc::new(Metrics::new());
    crate::telemetry::spawn_reporter(
        metrics.clone(),
        Duration::from_secs(config.metrics_emit_seconds.max(1)),
        "controller",
    );

    let table = AddressTable::new(
        Duration::from_secs(config.staleness_threshold_seconds),
        Duration::from_secs(config.pruning_interval_seconds),
        Duration::from_secs(config.resume_pruning_delay_seconds),
    );

    let subscriber = Subscriber::new(
        table.clone(),
        SubscriberOptions {
            nats_urls: config.nats_urls(),
            index: config.index,
            host: local_host,
            minimum_register_interval_in_seconds: 0,
            prune_threshold_in_seconds: config.staleness_threshold_seconds,
            warm_duration: Duration::from_secs(config.warm_duration_seconds),
        },
        metrics.clone(),
    );
    subscriber.run().await?;
    info!(id = subscriber.id(), "subscriber connected");

    let tls_config = tls::server_config(
        config.ca_cert.as_ref(),
        config.server_cert.as_ref(),
        config.server_key.as_ref(),
    )?;

    let addr: SocketAddr = format!("{}:{}", config.address, config.port)
        .parse()
        .map_err(|e| SdError::Bind(format!("invalid bind address: {e}")))?;

    let state = ControllerState { table: table.clone(), metrics };

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_shutdown = async move {
        let _ = shutdown_rx.await;
    };

    let mut server_task = tokio::spawn(server::serve(addr, tls_config, state, server_shutdown));

    // If `serve` exits on its own (e.g. a bind failure) before the shutdown
    // signal fires, that result must win the race and propagate — otherwise
    // a bind error is silently discarded and the process hangs forever with
    // no lookup server (spec.md §6/§7 "Bind ... Exits with code 1").
    let joined = tokio::select! {
        _ = shutdown => {
            info!("shutdown signal received, draining HTTPS server");
            let _ = shutdown_tx.send(());
            (&mut server_task).await
        }
        joined = &mut server_task => joined,
    };

    subscriber.close().await;
    table.shutdown().await;
    info!("controller stopped");

    match joined {
        Ok(result) => result,
        Err(join_err) => Err(SdError::Bind(join_err.to_string())),
    }
}
