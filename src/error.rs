use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub type Result<T, E = SdError> = std::result::Result<T, E>;

/// Errors surfaced across process boundaries (config load, TLS setup, bus
/// connect). Handler-local failures use the narrower error types in each
/// module and convert into an HTTP response directly.
#[derive(Debug, thiserror::Error)]
pub enum SdError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("bind error: {0}")]
    Bind(String),

    #[error("nats-connection-error: {0}")]
    BusConnect(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Maps onto the process exit codes from spec.md §7: config errors exit 2,
/// bind failures exit 1, bus connect failures at startup exit 2.
impl SdError {
    pub fn exit_code(&self) -> i32 {
        match self {
            SdError::Config(_) => 2,
            SdError::Bind(_) => 1,
            SdError::BusConnect(_) => 2,
            SdError::Tls(_) => 2,
            SdError::Io(_) => 2,
        }
    }
}

/// Lookup/routes handler errors. `NotWarm` renders the distinctive 500 body
/// the spec requires so callers can tell "not ready yet" apart from any
/// other failure.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("address table is not warm")]
    NotWarm,
    #[error("failed to render response")]
    Marshal,
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let body = self.to_string();
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Adapter-side errors: downstream RPC failure is surfaced verbatim to the
/// caller per spec.md §4.4/§7.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("missing required query parameter: name")]
    MissingName,
    #[error("Error querying Service Discover Controller: {0}")]
    ControllerRpc(String),
}
