//! TLS adapter over the transport seam (feature `tls`).
//!
//! The session only sees a duplex byte stream; this module produces one by
//! wrapping a TCP stream in rustls.

use crate::{
    Error,
    Result,
};
use rustls::{
    Certificate,
    ClientConfig,
    RootCertStore,
    ServerName,
};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::{
    client::TlsStream,
    TlsConnector,
};

/// TLS options for a session.
#[derive(Clone, Debug)]
pub struct SslOptions {
    /// Trust the platform certificate store.
    pub use_system_certs: bool,
    /// Additional PEM CA bundles.
    pub ca_cert_paths: Vec<PathBuf>,
    /// Override the SNI/verification name; defaults to the endpoint host.
    pub server_name: Option<String>,
}

impl Default for SslOptions {
    fn default() -> Self {
        Self {
            use_system_certs: true,
            ca_cert_paths: Vec::new(),
            server_name: None,
        }
    }
}

impl SslOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_ca_cert(mut self, path: PathBuf) -> Self {
        self.ca_cert_paths.push(path);
        self
    }

    pub fn use_system_certs(mut self, enabled: bool) -> Self {
        self.use_system_certs = enabled;
        self
    }

    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Build a rustls client config from these options.
    pub fn build_client_config(&self) -> Result<Arc<ClientConfig>> {
        let mut root_store = RootCertStore::empty();

        if self.use_system_certs {
            let certs =
                rustls_native_certs::load_native_certs().map_err(|e| {
                    Error::Connection(format!(
                        "Failed to load system certs: {}",
                        e
                    ))
                })?;
            for cert in certs {
                root_store.add(&Certificate(cert.0)).map_err(|e| {
                    Error::Connection(format!(
                        "Failed to add system cert: {}",
                        e
                    ))
                })?;
            }
        }

        for ca_path in &self.ca_cert_paths {
            let file = File::open(ca_path).map_err(|e| {
                Error::Connection(format!(
                    "Failed to open CA cert {:?}: {}",
                    ca_path, e
                ))
            })?;
            let mut reader = BufReader::new(file);
            let certs = rustls_pemfile::certs(&mut reader).map_err(|e| {
                Error::Connection(format!(
                    "Failed to parse CA cert {:?}: {}",
                    ca_path, e
                ))
            })?;
            for cert in certs {
                root_store.add(&Certificate(cert)).map_err(|e| {
                    Error::Connection(format!(
                        "Failed to add CA cert: {}",
                        e
                    ))
                })?;
            }
        }

        Ok(Arc::new(
            ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        ))
    }

    /// Run the TLS handshake over an established TCP stream.
    pub(crate) async fn wrap(
        &self,
        host: &str,
        stream: TcpStream,
    ) -> Result<TlsStream<TcpStream>> {
        let config = self.build_client_config()?;
        let connector = TlsConnector::from(config);

        let name = self.server_name.as_deref().unwrap_or(host);
        let domain = ServerName::try_from(name).map_err(|e| {
            Error::Connection(format!("Invalid server name '{}': {}", name, e))
        })?;

        connector.connect(domain, stream).await.map_err(|e| {
            Error::Connection(format!("TLS handshake failed: {}", e))
        })
    }
}
