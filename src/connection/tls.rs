//! TLS handshake for `tlsAuth` instances (`tls` feature).
//!
//! Trust comes from the configured CA bundle, or from the bundled web PKI
//! roots when none is set. `tlsSkipVerify` installs a verifier that accepts
//! any server certificate but still checks handshake signatures.

use crate::config::TlsSettings;
use crate::error::{DatasourceError, Result};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Run the client handshake over an established TCP stream.
pub async fn connect(tcp: TcpStream, host: &str, settings: &TlsSettings) -> Result<TlsStream<TcpStream>> {
    let config = client_config(settings)?;
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| DatasourceError::Tls(format!("invalid server name {host}: {e}")))?;
    TlsConnector::from(Arc::new(config))
        .connect(server_name, tcp)
        .await
        .map_err(|e| DatasourceError::Tls(format!("handshake with {host} failed: {e}")))
}

fn client_config(settings: &TlsSettings) -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| DatasourceError::Tls(e.to_string()))?;

    let builder = if settings.skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
    } else {
        builder.with_root_certificates(root_store(settings.ca_cert.as_deref())?)
    };

    match (&settings.client_cert, &settings.client_key) {
        (Some(cert), Some(key)) => {
            let certs = parse_certs(cert)?;
            let key = PrivateKeyDer::from_pem_slice(key.as_bytes())
                .map_err(|e| DatasourceError::Tls(format!("invalid client key: {e}")))?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| DatasourceError::Tls(format!("invalid client certificate: {e}")))
        }
        _ => Ok(builder.with_no_client_auth()),
    }
}

fn root_store(ca_cert: Option<&str>) -> Result<RootCertStore> {
    let mut store = RootCertStore::empty();
    match ca_cert {
        Some(pem) => {
            for cert in parse_certs(pem)? {
                store
                    .add(cert)
                    .map_err(|e| DatasourceError::Tls(format!("invalid CA certificate: {e}")))?;
            }
        }
        None => store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    Ok(store)
}

fn parse_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_slice_iter(pem.as_bytes())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| DatasourceError::Tls(format!("invalid PEM certificate: {e}")))?;
    if certs.is_empty() {
        return Err(DatasourceError::Tls("no certificate found in PEM".into()));
    }
    Ok(certs)
}

#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

// ── Tests ──────────────────────────────────────────────────────────
