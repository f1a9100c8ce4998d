pub mod client;
pub mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::error::SdError;
use crate::telemetry::Metrics;
use crate::tls;

pub use client::{ControllerClient, HttpsControllerClient};
pub use server::AdapterState;

/// Builds the mTLS client and serves the loopback gateway until `shutdown`
/// resolves (spec.md §4.4, §5).
pub async fn run(
    config: Config,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), SdError> {
    let https_client = tls::https_client(
        config.ca_cert.as_ref(),
        config.client_cert.as_ref(),
        config.client_key.as_ref(),
        &config.service_discovery_controller_address,
        config.service_discovery_controller_port,
    )?;

    let controller = Arc::new(HttpsControllerClient::new(
        https_client,
        config.service_discovery_controller_port,
    ));

    let metrics = Arc::new(Metrics::new());
    crate::telemetry::spawn_reporter(
        metrics.clone(),
        Duration::from_secs(config.metrics_emit_seconds.max(1)),
        "adapter",
    );

    let state = AdapterState { controller, metrics };

    let addr: SocketAddr = format!("{}:{}", config.address, config.port)
        .parse()
        .map_err(|e| SdError::Bind(format!("invalid bind address: {e}")))?;

    info!(%addr, "adapter listening");
    server::serve(addr, state, shutdown).await
}
