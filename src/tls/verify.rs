//! Client-side trust helpers for self-signed peers.
//!
//! A certificate issued by [`SelfSignedProvider`](super::provider::SelfSignedProvider)
//! carries no publicly trusted chain and no subject alternative names, so a
//! connecting peer must either skip verification entirely or supply its own
//! pinning. [`client_config`] builds the matching rustls client
//! configuration for both cases: skip-verify for self-signed endpoints, or
//! webpki system roots for ordinary ones.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

/// Accepts any server certificate without validation.
///
/// Only suitable for talking to self-signed endpoints whose certificates
/// cannot be chain-validated. Signatures are still checked against the
/// presented certificate, so the connection remains encrypted and bound to
/// the peer's key; only the trust decision is skipped.
#[derive(Debug)]
pub struct InsecureVerifier {
    provider: Arc<CryptoProvider>,
}

impl InsecureVerifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            provider: Arc::new(rustls::crypto::aws_lc_rs::default_provider()),
        })
    }
}

impl ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Builds a rustls client configuration for connecting to this runtime.
///
/// With `insecure_skip_verify` set, certificate verification is disabled so
/// the self-signed certificate is accepted. Otherwise the configuration
/// trusts the webpki system roots, which a self-signed endpoint will fail.
pub fn client_config(insecure_skip_verify: bool) -> ClientConfig {
    let builder = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::aws_lc_rs::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .expect("default protocol versions supported by provider");

    if insecure_skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(InsecureVerifier::new())
            .with_no_client_auth()
    } else {
        let root_store =
            RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder
            .with_root_certificates(root_store)
            .with_no_client_auth()
    }
}
