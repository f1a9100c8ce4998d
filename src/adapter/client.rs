use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AdapterError;

/// Narrow capability seam for "ask the Controller who backs this
/// hostname" so the gateway's query-shaping logic is testable without a
/// live mTLS Controller (spec.md §9's test-double guidance applied to the
/// one external collaborator the Adapter has).
#[async_trait]
pub trait ControllerClient: Send + Sync {
    async fn lookup(&self, hostname: &str) -> Result<Vec<String>, AdapterError>;
}

#[derive(Debug, Deserialize)]
struct RegistrationHost {
    ip_address: String,
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    #[serde(default)]
    hosts: Vec<RegistrationHost>,
}

/// The production client: an mTLS `reqwest::Client` pointed at the
/// Controller's `/v1/registration/<hostname>` endpoint (spec.md §4.4).
pub struct HttpsControllerClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpsControllerClient {
    /// `client` must already carry a `resolve()` override from
    /// `tls::CONTROLLER_SERVER_NAME` to the real Controller socket (see
    /// `tls::https_client`); requests are built against that name, not the
    /// literal address, so TLS verification checks the Controller's
    /// certificate against `service-discovery-controller.internal`
    /// (spec.md §4.3) rather than an IP it was never issued for.
    pub fn new(client: reqwest::Client, sdc_port: u16) -> Self {
        Self {
            client,
            base_url: format!("https://{}:{sdc_port}", crate::tls::CONTROLLER_SERVER_NAME),
        }
    }
}

#[async_trait]
impl ControllerClient for HttpsControllerClient {
    async fn lookup(&self, hostname: &str) -> Result<Vec<String>, AdapterError> {
        let url = format!("{}/v1/registration/{}", self.base_url, hostname);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::ControllerRpc(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AdapterError::ControllerRpc(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let parsed: RegistrationResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::ControllerRpc(e.to_string()))?;

        Ok(parsed.hosts.into_iter().map(|h| h.ip_address).collect())
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory fake used by the gateway's own unit tests; keeps the
    /// Adapter's query-shaping logic testable without a network hop.
    #[derive(Default)]
    pub struct FakeControllerClient {
        pub hosts: Mutex<HashMap<String, Vec<String>>>,
        pub fail: Mutex<Option<String>>,
    }

    #[async_trait]
    impl ControllerClient for FakeControllerClient {
        async fn lookup(&self, hostname: &str) -> Result<Vec<String>, AdapterError> {
            if let Some(err) = self.fail.lock().await.clone() {
                return Err(AdapterError::ControllerRpc(err));
            }
            Ok(self
                .hosts
                .lock()
                .await
                .get(hostname)
                .cloned()
                .unwrap_or_default())
        }
    }
}
