//! Embers - an embeddable HTTP service runtime with rotating self-signed TLS.
//!
//! A host application hands Embers an [`axum::Router`] and a bound
//! listener; Embers serves it either as plain HTTP or behind TLS with a
//! self-managed, self-signed certificate that is regenerated in place once
//! it expires. The host never touches the accept loop: it picks a variant
//! (usually from configuration, via [`connection_server`]), calls `serve`
//! once, and controls shutdown through the `axum_server::Handle` it
//! supplied.
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use axum_server::Handle;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = embers::ServiceConfig::load("embers.toml")?;
//! let listener = std::net::TcpListener::bind(config.bind_addr())?;
//! let handle = Handle::new();
//!
//! // Fails here, before anything is served, if TLS was requested but the
//! // certificate provider cannot be built.
//! let server = embers::connection_server(&config, handle.clone())?;
//!
//! let app = Router::new().route("/", get(|| async { "hello" }));
//! server.serve(app, listener);
//!
//! let _addr = handle.listening().await; // resolved address, e.g. for registration
//! # Ok(())
//! # }
//! ```
//!
//! The certificate is self-signed and carries no subject alternative
//! names, so clients must skip verification or pin it explicitly;
//! [`tls::verify::client_config`] builds the matching client side.

pub mod config;
pub mod http;
pub mod tls;

pub use config::{ConfigError, ServiceConfig};
pub use http::server::{
    connection_server, connection_server_with, ConnectionServer, PlainServer, ServeError,
    TlsServer,
};
pub use tls::provider::{
    CertificateError, CertificateSnapshot, RotationConfig, SelfSignedProvider,
};
