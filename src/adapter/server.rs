use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::adapter::client::ControllerClient;
use crate::error::SdError;
use crate::telemetry::Metrics;

#[derive(Clone)]
pub struct AdapterState {
    pub controller: Arc<dyn ControllerClient>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Deserialize)]
pub struct DohQueryParams {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    record_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct DohQuestion {
    name: String,
    #[serde(rename = "type")]
    record_type: i32,
}

#[derive(Debug, Serialize)]
struct DohAnswer {
    name: String,
    #[serde(rename = "type")]
    record_type: i32,
    #[serde(rename = "TTL")]
    ttl: u32,
    data: String,
}

/// Mirrors the Google DNS-over-HTTPS wire format so the colocated resolver
/// needs no special parsing (spec.md §1, §4.4).
#[derive(Debug, Serialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: i32,
    #[serde(rename = "TC")]
    tc: bool,
    #[serde(rename = "RD")]
    rd: bool,
    #[serde(rename = "RA")]
    ra: bool,
    #[serde(rename = "AD")]
    ad: bool,
    #[serde(rename = "CD")]
    cd: bool,
    #[serde(rename = "Question")]
    question: Vec<DohQuestion>,
    #[serde(rename = "Answer")]
    answer: Vec<DohAnswer>,
    #[serde(rename = "Additional")]
    additional: Vec<serde_json::Value>,
    edns_client_subnet: String,
}

impl DohResponse {
    fn empty(status: i32, question: Vec<DohQuestion>) -> Self {
        Self {
            status,
            tc: false,
            rd: false,
            ra: false,
            ad: false,
            cd: false,
            question,
            answer: Vec::new(),
            additional: Vec::new(),
            edns_client_subnet: "0.0.0.0/0".to_string(),
        }
    }
}

const A_RECORD: &str = "1";
const NOERROR: i32 = 0;
const SERVFAIL: i32 = 2;

/// `GET /?name=<fqdn>&type=<n>` (spec.md §4.4).
async fn lookup(
    State(state): State<AdapterState>,
    Query(params): Query<DohQueryParams>,
) -> Response {
    let record_type = params.record_type.unwrap_or_else(|| A_RECORD.to_string());
    let record_type_int: i32 = record_type.parse().unwrap_or(1);

    let name = match params.name {
        Some(n) if !n.is_empty() => n,
        _ => {
            let response = DohResponse::empty(SERVFAIL, Vec::new());
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    if record_type != A_RECORD {
        let response = DohResponse::empty(
            NOERROR,
            vec![DohQuestion {
                name,
                record_type: record_type_int,
            }],
        );
        return (StatusCode::OK, Json(response)).into_response();
    }

    state.metrics.incr_adapter_request();
    match state.controller.lookup(&name).await {
        Ok(ips) => {
            let mut response = DohResponse::empty(
                NOERROR,
                vec![DohQuestion {
                    name: name.clone(),
                    record_type: record_type_int,
                }],
            );
            response.answer = ips
                .into_iter()
                .map(|ip| DohAnswer {
                    name: name.clone(),
                    record_type: 1,
                    ttl: 0,
                    data: ip,
                })
                .collect();
            debug!(name = %name, answers = response.answer.len(), "adapter lookup");
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub fn router(state: AdapterState) -> Router {
    Router::new()
        .route("/", get(lookup))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(
    addr: SocketAddr,
    state: AdapterState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), SdError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| SdError::Bind(e.to_string()))?;
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| SdError::Bind(e.to_string()))
}
