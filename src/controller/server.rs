use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::error::{HandlerError, SdError};
use crate::table::AddressTable;
use crate::telemetry::Metrics;

#[derive(Clone)]
pub struct ControllerState {
    pub table: Arc<AddressTable>,
    pub metrics: Arc<Metrics>,
}

/// One backend behind a hostname in the `/v1/registration/<host>` response.
/// `last_check_in`, `port`, `revision`, `service`, and `service_repo_name`
/// are always empty/zero in the original and are preserved here purely for
/// wire compatibility (spec.md §9 Ambiguity (b)).
#[derive(Debug, Serialize)]
struct RegistrationHost {
    ip_address: String,
    last_check_in: String,
    port: u32,
    revision: String,
    service: String,
    service_repo_name: String,
    tags: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct RegistrationResponse {
    env: String,
    service: String,
    hosts: Vec<RegistrationHost>,
}

#[derive(Debug, Serialize)]
struct RoutesEntry {
    hostname: String,
    ips: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RoutesResponse {
    addresses: Vec<RoutesEntry>,
}

/// `GET /v1/registration/<hostname>` (spec.md §4.3). The final path
/// segment is taken as the hostname verbatim, no further parsing.
async fn registration(
    State(state): State<ControllerState>,
    Path(raw_path): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    if !state.table.is_warm() {
        debug!("rejecting lookup: address table is not warm");
        return Err(HandlerError::NotWarm);
    }

    let hostname = raw_path.rsplit('/').next().unwrap_or(&raw_path).to_string();
    let ips = state.table.lookup(&hostname).await;
    let response = RegistrationResponse {
        env: String::new(),
        service: String::new(),
        hosts: ips
            .into_iter()
            .map(|ip| RegistrationHost {
                ip_address: ip,
                last_check_in: String::new(),
                port: 0,
                revision: String::new(),
                service: String::new(),
                service_repo_name: String::new(),
                tags: HashMap::new(),
            })
            .collect(),
    };

    state.metrics.incr_dns_request();
    let rendered = serde_json::to_string(&response).map_err(|_| HandlerError::Marshal)?;
    debug!(service_key = %hostname, response = %rendered, "registration lookup");
    Ok(Json(response))
}

/// `GET /routes` (spec.md §4.3): full table snapshot. Map iteration order
/// is unspecified; callers must accept any permutation.
async fn routes(State(state): State<ControllerState>) -> impl IntoResponse {
    let snapshot = state.table.get_all_addresses().await;
    let response = RoutesResponse {
        addresses: snapshot
            .into_iter()
            .map(|(hostname, ips)| RoutesEntry { hostname, ips })
            .collect(),
    };
    Json(response)
}

pub fn router(state: ControllerState) -> Router {
    Router::new()
        .route("/v1/registration/*hostname", get(registration))
        .route("/routes", get(routes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the mTLS HTTPS lookup server and serves until `shutdown` resolves.
/// Keepalives are disabled so a misbehaving or abusive client can't hold
/// idle connections open indefinitely (spec.md §4.3).
pub async fn serve(
    addr: SocketAddr,
    tls_config: rustls::ServerConfig,
    state: ControllerState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), SdError> {
    let app = router(state);
    let rustls_config = axum_server::tls_rustls::RustlsConfig::from_config(Arc::new(tls_config));

    let handle = axum_server::Handle::new();
    let handle_for_shutdown = handle.clone();
    tokio::spawn(async move {
        shutdown.await;
        handle_for_shutdown.graceful_shutdown(Some(std::time::Duration::from_secs(5)));
    });

    let mut server = axum_server::bind_rustls(addr, rustls_config).handle(handle);
    server.http_builder().http1().keep_alive(false);
    server
        .serve(app.into_make_service())
        .await
        .map_err(|e| SdError::Bind(e.to_string()))
}
