//! Transport establishment: TCP, unix sockets and the TLS upgrade.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::config::{ConnectionSettings, TransportProtocol};
use crate::error::{Error, Result};

/// Object-safe alias for the byte transports a connection can run over.
pub trait AsyncIo: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncIo for T {}

/// A type-erased transport.
pub type BoxedIo = Box<dyn AsyncIo>;

/// Establish the raw transport selected by the settings.
///
/// Shared memory is accepted by the connection-string parser for
/// compatibility but cannot be served here; requesting it is a connection
/// error, not a parse error.
pub async fn connect(settings: &ConnectionSettings) -> Result<BoxedIo> {
    match settings.protocol {
        TransportProtocol::Tcp => {
            let address = (settings.server.as_str(), settings.port);
            let stream = tokio::time::timeout(
                settings.connect_timeout,
                TcpStream::connect(address),
            )
            .await
            .map_err(|_| {
                Error::Connection(format!(
                    "timed out connecting to {}:{}",
                    settings.server, settings.port
                ))
            })?
            .map_err(|err| {
                Error::Connection(format!(
                    "could not connect to {}:{}: {err}",
                    settings.server, settings.port
                ))
            })?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
        TransportProtocol::Pipe => connect_pipe(settings).await,
        TransportProtocol::SharedMemory => Err(Error::Connection(
            "shared memory transport is not supported on this platform".into(),
        )),
    }
}

#[cfg(unix)]
async fn connect_pipe(settings: &ConnectionSettings) -> Result<BoxedIo> {
    let path = settings.pipe_name.as_deref().ok_or_else(|| {
        Error::Connection("protocol=pipe requires a pipe name".into())
    })?;
    let stream = tokio::time::timeout(settings.connect_timeout, UnixStream::connect(path))
        .await
        .map_err(|_| Error::Connection(format!("timed out connecting to {path}")))?
        .map_err(|err| Error::Connection(format!("could not connect to {path}: {err}")))?;
    Ok(Box::new(stream))
}

#[cfg(not(unix))]
async fn connect_pipe(_settings: &ConnectionSettings) -> Result<BoxedIo> {
    Err(Error::Connection(
        "pipe transport is not supported on this platform".into(),
    ))
}

#[cfg(feature = "tls")]
mod tls {
    use std::sync::Arc;

    use rustls::pki_types::ServerName;
    use tokio_rustls::TlsConnector;

    use super::*;
    use crate::config::SslMode;

    /// Certificate verifier that accepts any server chain.
    ///
    /// Used for `Preferred`/`Required`, which encrypt the link without
    /// authenticating the peer, matching the classic driver defaults.
    #[derive(Debug)]
    struct AcceptAnyCertificate(rustls::crypto::CryptoProvider);

    impl rustls::client::danger::ServerCertVerifier for AcceptAnyCertificate {
        fn verify_server_cert(
            &self,
            _end_entity: &rustls::pki_types::CertificateDer<'_>,
            _intermediates: &[rustls::pki_types::CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: rustls::pki_types::UnixTime,
        ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error>
        {
            Ok(rustls::client::danger::ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &rustls::pki_types::CertificateDer<'_>,
            dss: &rustls::DigitallySignedStruct,
        ) -> std::result::Result<
            rustls::client::danger::HandshakeSignatureValid,
            rustls::Error,
        > {
            rustls::crypto::verify_tls12_signature(
                message,
                cert,
                dss,
                &self.0.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &rustls::pki_types::CertificateDer<'_>,
            dss: &rustls::DigitallySignedStruct,
        ) -> std::result::Result<
            rustls::client::danger::HandshakeSignatureValid,
            rustls::Error,
        > {
            rustls::crypto::verify_tls13_signature(
                message,
                cert,
                dss,
                &self.0.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            self.0
                .signature_verification_algorithms
                .supported_schemes()
        }
    }

    /// Upgrade an established transport to TLS.
    pub async fn upgrade(io: BoxedIo, settings: &ConnectionSettings) -> Result<BoxedIo> {
        let provider = rustls::crypto::ring::default_provider();

        let config = match settings.ssl_mode {
            SslMode::VerifyCa | SslMode::VerifyFull => {
                let mut roots = rustls::RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                rustls::ClientConfig::builder_with_provider(Arc::new(provider))
                    .with_safe_default_protocol_versions()
                    .map_err(|err| Error::Connection(format!("TLS setup failed: {err}")))?
                    .with_root_certificates(roots)
                    .with_no_client_auth()
            }
            _ => rustls::ClientConfig::builder_with_provider(Arc::new(provider.clone()))
                .with_safe_default_protocol_versions()
                .map_err(|err| Error::Connection(format!("TLS setup failed: {err}")))?
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
                .with_no_client_auth(),
        };

        let server_name = ServerName::try_from(settings.server.clone())
            .map_err(|_| Error::Connection(format!("invalid host name {}", settings.server)))?;

        let connector = TlsConnector::from(Arc::new(config));
        let stream = connector
            .connect(server_name, io)
            .await
            .map_err(|err| Error::Connection(format!("TLS handshake failed: {err}")))?;
        tracing::debug!(server = %settings.server, "TLS established");
        Ok(Box::new(stream))
    }
}

#[cfg(feature = "tls")]
pub use tls::upgrade as upgrade_tls;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_shared_memory_rejected() {
        let settings = ConnectionSettings::from_connection_string("protocol=memory").unwrap();
        let Err(err) = connect(&settings).await else {
            panic!("shared memory transport must be rejected");
        };
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.to_string().contains("shared memory"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pipe_requires_name() {
        let settings = ConnectionSettings::from_connection_string("protocol=unix").unwrap();
        let Err(err) = connect(&settings).await else {
            panic!("unix transport without a pipe name must be rejected");
        };
        assert!(err.to_string().contains("pipe name"));
    }
}
