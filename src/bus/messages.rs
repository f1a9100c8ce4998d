use serde::{Deserialize, Serialize};

/// Wire shape for `service-discovery.register` / `service-discovery.unregister`
/// (spec.md §6): `{"host": <ip>, "uris": [<fqdn>, ...]}`. Field names mirror
/// the original's wire format; semantically `host` is the backend IP.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryMessage {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub uris: Vec<String>,
}

/// The payload published on `service-discovery.start` and on any greet's
/// reply subject (spec.md §3, §6).
#[derive(Debug, Clone, Serialize)]
pub struct StartMessage {
    pub id: String,
    pub host: String,
    #[serde(rename = "minimumRegisterIntervalInSeconds")]
    pub minimum_register_interval_in_seconds: u64,
    #[serde(rename = "pruneThresholdInSeconds")]
    pub prune_threshold_in_seconds: u64,
}

/// A message failed JSON decode, or failed the validation rule for its
/// kind. Malformed messages are always logged and dropped, never fatal
/// (spec.md §3, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MalformedMessage {
    #[error("payload is not valid JSON")]
    InvalidJson,
    #[error("hostname list is empty")]
    EmptyHostnames,
    #[error("ip is empty on a register message")]
    EmptyIp,
}

/// Decodes and validates a `service-discovery.register` payload. Malformed
/// when JSON decode fails, the hostname list is empty, or the ip is empty
/// (spec.md §3).
pub fn parse_register(payload: &[u8]) -> Result<RegistryMessage, MalformedMessage> {
    let msg: RegistryMessage =
        serde_json::from_slice(payload).map_err(|_| MalformedMessage::InvalidJson)?;
    if msg.uris.is_empty() {
        return Err(MalformedMessage::EmptyHostnames);
    }
    if msg.host.is_empty() {
        return Err(MalformedMessage::EmptyIp);
    }
    Ok(msg)
}

/// Decodes and validates a `service-discovery.unregister` payload. Unlike
/// register, an empty `ip` is accepted by the parser (spec.md §3 / §9
/// Ambiguity (a)) — `AddressTable::remove` is exact-on-ip, so such messages
/// end up being effective no-ops, and that is preserved rather than
/// "fixed" into a broader remove-by-hostname-only behavior.
pub fn parse_unregister(payload: &[u8]) -> Result<RegistryMessage, MalformedMessage> {
    let msg: RegistryMessage =
        serde_json::from_slice(payload).map_err(|_| MalformedMessage::InvalidJson)?;
    if msg.uris.is_empty() {
        return Err(MalformedMessage::EmptyHostnames);
    }
    Ok(msg)
}
