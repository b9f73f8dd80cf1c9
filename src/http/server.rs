//! Connection serving: plain HTTP or TLS with a rotating self-signed
//! certificate.
//!
//! A [`ConnectionServer`] turns a router and a bound listener into a
//! running accept loop without blocking the caller. Two variants exist:
//! [`PlainServer`] serves the router unchanged, [`TlsServer`] wraps it in
//! TLS with a [`SelfSignedProvider`] installed as the per-handshake
//! certificate resolver. The variant is normally chosen from configuration
//! through [`connection_server`], which fails closed when TLS was requested
//! but the certificate provider cannot be built.

use std::net::TcpListener;
use std::sync::Arc;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::ServiceConfig;
use crate::tls::provider::{CertificateError, RotationConfig, SelfSignedProvider};
use crate::tls::verify;

/// Accept-loop failure, reported through the error sink rather than
/// returned from `serve`.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("Failed to prepare listener: {0}")]
    Listener(#[source] std::io::Error),

    #[error("Error serving connections: {0}")]
    Accept(#[source] std::io::Error),
}

/// A serving capability over a bound listener.
///
/// `serve` launches the accept loop on a detached task and returns
/// immediately. Failures inside the loop are logged and forwarded to the
/// variant's error sink when one was supplied; they are never returned
/// synchronously. Shutdown comes from outside, through the
/// [`Handle`] the variant was constructed with.
///
/// # Precondition
///
/// `serve` must be called at most once per instance. Calling it again on
/// the same instance is a programming error with undefined results; it is
/// not checked at runtime.
pub trait ConnectionServer: Send + Sync {
    fn serve(&self, app: Router, listener: TcpListener);
}

/// Serves the router over plain HTTP, with no further responsibilities.
pub struct PlainServer {
    handle: Handle,
    errors: Option<UnboundedSender<ServeError>>,
}

impl PlainServer {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            errors: None,
        }
    }

    /// Forwards accept-loop failures to `errors` in addition to logging
    /// them.
    pub fn with_error_sink(mut self, errors: UnboundedSender<ServeError>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// The handle driving this server: shutdown and bound-address
    /// discovery for the owning service.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }
}

impl ConnectionServer for PlainServer {
    fn serve(&self, app: Router, listener: TcpListener) {
        let handle = self.handle.clone();
        let errors = self.errors.clone();

        tokio::spawn(async move {
            tracing::info!("Serving plain HTTP");

            if let Err(err) = run_plain(app, listener, handle).await {
                report(errors.as_ref(), err);
            }
        });
    }
}

/// Serves the router over TLS, presenting whatever certificate the
/// provider currently holds at each handshake.
pub struct TlsServer {
    provider: Arc<SelfSignedProvider>,
    insecure_skip_verify: bool,
    handle: Handle,
    errors: Option<UnboundedSender<ServeError>>,
}

impl TlsServer {
    pub fn new(provider: Arc<SelfSignedProvider>, handle: Handle) -> Self {
        Self {
            provider,
            // Self-signed certificates cannot be chain-validated, so peers
            // skip verification unless told otherwise.
            insecure_skip_verify: true,
            handle,
            errors: None,
        }
    }

    /// Whether peers connecting through [`TlsServer::client_config`] skip
    /// certificate verification. Defaults to true.
    pub fn insecure_skip_verify(mut self, insecure: bool) -> Self {
        self.insecure_skip_verify = insecure;
        self
    }

    /// Forwards accept-loop failures to `errors` in addition to logging
    /// them.
    pub fn with_error_sink(mut self, errors: UnboundedSender<ServeError>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// The certificate provider answering this server's handshakes.
    pub fn provider(&self) -> &Arc<SelfSignedProvider> {
        &self.provider
    }

    /// Client configuration matching this server's trust model: skip-verify
    /// when `insecure_skip_verify` is set, webpki system roots otherwise.
    pub fn client_config(&self) -> rustls::ClientConfig {
        verify::client_config(self.insecure_skip_verify)
    }

    /// Builds the rustls server configuration with the provider installed
    /// as the per-handshake certificate resolver.
    fn rustls_server_config(&self) -> rustls::ServerConfig {
        let mut config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::aws_lc_rs::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .expect("default protocol versions supported by provider")
        .with_no_client_auth()
        .with_cert_resolver(self.provider.clone());

        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        config
    }
}

impl ConnectionServer for TlsServer {
    fn serve(&self, app: Router, listener: TcpListener) {
        let rustls_config = RustlsConfig::from_config(Arc::new(self.rustls_server_config()));
        let handle = self.handle.clone();
        let errors = self.errors.clone();

        tokio::spawn(async move {
            tracing::info!("Serving with TLS");

            if let Err(err) = run_tls(app, listener, rustls_config, handle).await {
                report(errors.as_ref(), err);
            }
        });
    }
}

/// Builds the serving capability selected by configuration.
///
/// Fail-closed: when TLS is enabled and the certificate provider cannot be
/// constructed, the error is returned and nothing is served. There is no
/// fallback to plain HTTP.
pub fn connection_server(
    config: &ServiceConfig,
    handle: Handle,
) -> Result<Box<dyn ConnectionServer>, CertificateError> {
    connection_server_with(config, handle, SelfSignedProvider::new)
}

/// [`connection_server`] with an explicit provider constructor.
///
/// The constructor is only invoked when TLS is enabled; plain serving runs
/// no certificate machinery at all. Callers that already hold key material
/// (or want to inject a construction failure) supply their own builder,
/// typically around [`SelfSignedProvider::from_key_pair`].
pub fn connection_server_with(
    config: &ServiceConfig,
    handle: Handle,
    build_provider: impl FnOnce(RotationConfig) -> Result<SelfSignedProvider, CertificateError>,
) -> Result<Box<dyn ConnectionServer>, CertificateError> {
    if config.tls.enabled {
        let provider = build_provider(config.tls.rotation())?;
        Ok(Box::new(
            TlsServer::new(Arc::new(provider), handle)
                .insecure_skip_verify(config.tls.insecure_skip_verify),
        ))
    } else {
        Ok(Box::new(PlainServer::new(handle)))
    }
}

async fn run_plain(app: Router, listener: TcpListener, handle: Handle) -> Result<(), ServeError> {
    listener.set_nonblocking(true).map_err(ServeError::Listener)?;

    axum_server::from_tcp(listener)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(ServeError::Accept)
}

async fn run_tls(
    app: Router,
    listener: TcpListener,
    rustls_config: RustlsConfig,
    handle: Handle,
) -> Result<(), ServeError> {
    listener.set_nonblocking(true).map_err(ServeError::Listener)?;

    axum_server::from_tcp_rustls(listener, rustls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(ServeError::Accept)
}

fn report(errors: Option<&UnboundedSender<ServeError>>, err: ServeError) {
    tracing::error!(error = %err, "Accept loop terminated");

    if let Some(sink) = errors {
        // A dropped receiver means nobody is listening; the log line above
        // already recorded the failure.
        let _ = sink.send(err);
    }
}
