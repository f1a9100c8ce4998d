//! Shared mTLS material loading for the Controller's HTTPS server and the
//! Adapter's outbound client, grounded on the teacher's
//! `src/security/tls.rs` `TlsManager`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::server::AllowAnyAuthenticatedClient;
use rustls::{Certificate, PrivateKey, RootCertStore, ServerConfig};

use crate::error::SdError;

/// Server name the Controller's certificate is issued for (spec.md §4.3
/// "server name service-discovery-controller.internal"). The Adapter's
/// outbound client always validates the Controller's certificate against
/// this name rather than the literal address it dials, via a resolver
/// override in `https_client` below.
pub const CONTROLLER_SERVER_NAME: &str = "service-discovery-controller.internal";

fn load_certs(path: &Path) -> Result<Vec<Certificate>, SdError> {
    let file = File::open(path)
        .map_err(|e| SdError::Tls(format!("opening certificate {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .map_err(|e| SdError::Tls(format!("parsing certificate {}: {e}", path.display())))?
        .into_iter()
        .map(Certificate)
        .collect();
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKey, SdError> {
    let file = File::open(path)
        .map_err(|e| SdError::Tls(format!("opening key {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    let keys = rustls_pemfile::pkcs8_private_keys(&mut reader)
        .map_err(|e| SdError::Tls(format!("parsing key {}: {e}", path.display())))?;
    if let Some(key) = keys.into_iter().next() {
        return Ok(PrivateKey(key));
    }

    let file = File::open(path)
        .map_err(|e| SdError::Tls(format!("re-opening key {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    let keys = rustls_pemfile::rsa_private_keys(&mut reader)
        .map_err(|e| SdError::Tls(format!("parsing RSA key {}: {e}", path.display())))?;
    keys.into_iter()
        .next()
        .map(PrivateKey)
        .ok_or_else(|| SdError::Tls(format!("no private key found in {}", path.display())))
}

fn root_store_from(path: &Path) -> Result<RootCertStore, SdError> {
    let mut store = RootCertStore::empty();
    for cert in load_certs(path)? {
        store
            .add(&cert)
            .map_err(|e| SdError::Tls(format!("adding CA cert to root store: {e}")))?;
    }
    Ok(store)
}

/// Builds the Controller's mTLS `ServerConfig`: TLS 1.2 minimum, client
/// certificates required and validated against `ca_cert_path`
/// (spec.md §4.3).
pub fn server_config(
    ca_cert_path: &Path,
    server_cert_path: &Path,
    server_key_path: &Path,
) -> Result<ServerConfig, SdError> {
    let cert_chain = load_certs(server_cert_path)?;
    let key = load_private_key(server_key_path)?;
    let client_roots = root_store_from(ca_cert_path)?;
    let verifier = AllowAnyAuthenticatedClient::new(client_roots);

    let mut config = ServerConfig::builder()
        .with_safe_default_cipher_suites()
        .with_safe_default_kx_groups()
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
        .map_err(|e| SdError::Tls(e.to_string()))?
        .with_client_cert_verifier(Arc::new(verifier))
        .with_single_cert(cert_chain, key)
        .map_err(|e| SdError::Tls(e.to_string()))?;

    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

/// Builds the Adapter's mTLS `reqwest::Client`, presenting `client_cert`/
/// `client_key` and trusting `ca_cert` for the Controller's server
/// certificate (spec.md §4.4).
///
/// `controller_addr`/`controller_port` are the actual socket the Controller
/// listens on (an IP in practice), but the cert it presents is issued for
/// `CONTROLLER_SERVER_NAME`. A bare `reqwest::Client` pointed straight at
/// the IP would send no SNI for that name and fail hostname verification,
/// so the client is built with a `resolve` override that maps
/// `CONTROLLER_SERVER_NAME` to the real socket address; callers build
/// request URLs against `CONTROLLER_SERVER_NAME` (see
/// `adapter::client::HttpsControllerClient`) so the TLS handshake actually
/// negotiates and verifies that name.
pub fn https_client(
    ca_cert_path: &Path,
    client_cert_path: &Path,
    client_key_path: &Path,
    controller_addr: &str,
    controller_port: u16,
) -> Result<reqwest::Client, SdError> {
    let ca_pem = std::fs::read(ca_cert_path)
        .map_err(|e| SdError::Tls(format!("reading CA cert: {e}")))?;
    let cert_pem = std::fs::read(client_cert_path)
        .map_err(|e| SdError::Tls(format!("reading client cert: {e}")))?;
    let key_pem = std::fs::read(client_key_path)
        .map_err(|e| SdError::Tls(format!("reading client key: {e}")))?;

    let ca_cert =
        reqwest::Certificate::from_pem(&ca_pem).map_err(|e| SdError::Tls(e.to_string()))?;
    let identity_pem = [cert_pem, key_pem].concat();
    let identity =
        reqwest::Identity::from_pem(&identity_pem).map_err(|e| SdError::Tls(e.to_string()))?;

    let controller_socket: std::net::SocketAddr = format!("{controller_addr}:{controller_port}")
        .parse()
        .map_err(|e| {
            SdError::Tls(format!(
                "invalid controller address {controller_addr}:{controller_port}: {e}"
            ))
        })?;

    reqwest::Client::builder()
        .use_rustls_tls()
        .https_only(true)
        .add_root_certificate(ca_cert)
        .identity(identity)
        .resolve(CONTROLLER_SERVER_NAME, controller_socket)
        .build()
        .map_err(|e| SdError::Tls(e.to_string()))
}
