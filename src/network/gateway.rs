//! Gateway - TCP listener that accepts incoming client streams.
//!
//! Binds one socket and spawns a [`SessionConnection`] task per accepted
//! connection. TLS is not a separate listener here: XMPP upgrades the
//! established stream via STARTTLS, so the acceptor built from the
//! configured certificate is handed to every connection for later use.

use crate::config::TlsConfig;
use crate::network::SessionConnection;
use crate::server::runtime::ServerRuntimeContext;
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::io::{BufReader, Cursor};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::{info, instrument, warn};

/// The Gateway accepts incoming TCP connections and spawns session tasks.
pub struct Gateway {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    server: Arc<ServerRuntimeContext>,
}

impl Gateway {
    /// Bind the gateway and load TLS material if configured.
    pub async fn bind(
        addr: SocketAddr,
        tls_config: Option<&TlsConfig>,
        server: Arc<ServerRuntimeContext>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Client listener bound");

        let tls = match tls_config {
            Some(tls_config) => {
                let acceptor = Self::load_tls(tls_config)?;
                info!(cert = %tls_config.cert_path, "STARTTLS enabled");
                Some(acceptor)
            }
            None => None,
        };

        Ok(Self {
            listener,
            tls,
            server,
        })
    }

    /// Load TLS certificates and create the acceptor.
    fn load_tls(config: &TlsConfig) -> anyhow::Result<TlsAcceptor> {
        let cert_file = std::fs::read(&config.cert_path)?;
        let cert_reader = &mut BufReader::new(Cursor::new(cert_file));
        let certs: Vec<CertificateDer> = certs(cert_reader).collect::<Result<Vec<_>, _>>()?;
        if certs.is_empty() {
            anyhow::bail!("No certificates found in {}", config.cert_path);
        }

        let key_file = std::fs::read(&config.key_path)?;
        let key_reader = &mut BufReader::new(Cursor::new(key_file));
        let mut keys: Vec<PrivateKeyDer> = pkcs8_private_keys(key_reader)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(PrivateKeyDer::from)
            .collect();
        if keys.is_empty() {
            anyhow::bail!("No private keys found in {}", config.key_path);
        }
        let key = keys.remove(0);

        let tls_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        Ok(TlsAcceptor::from(Arc::new(tls_config)))
    }

    /// The address the gateway actually bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the gateway, accepting connections forever.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let connection = SessionConnection::new(
                        addr,
                        Arc::clone(&self.server),
                        self.tls.clone(),
                    );
                    tokio::spawn(async move {
                        if let Err(err) = connection.run(stream).await {
                            warn!(%addr, error = %err, "Session ended with error");
                        }
                    });
                }
                Err(err) => {
                    warn!(error = %err, "Accept failed");
                }
            }
        }
    }
}
