//! End-to-end serving tests over ephemeral ports.
//!
//! These bind real listeners on 127.0.0.1:0, serve through the public
//! `ConnectionServer` contract, and talk to the result with real HTTP and
//! TLS clients.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use axum_server::Handle;
use tokio::net::TcpStream;
use x509_parser::prelude::*;

use embers::config::{HttpConfig, LoggingConfig, ServiceConfig, TlsSettings};
use embers::http::server::{
    connection_server, connection_server_with, ConnectionServer, PlainServer, TlsServer,
};
use embers::http::trace;
use embers::tls::provider::{
    CertificateError, RotationConfig, SelfSignedProvider, CERT_ORGANIZATION,
};
use embers::tls::verify;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("embers=debug")
        .try_init();
}

fn app(provider: Option<Arc<SelfSignedProvider>>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .layer(axum::middleware::from_fn_with_state(
            provider,
            trace::request_span,
        ))
}

fn bind_ephemeral() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port")
}

fn test_config(tls_enabled: bool) -> ServiceConfig {
    ServiceConfig {
        http: HttpConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        tls: TlsSettings {
            enabled: tls_enabled,
            ..TlsSettings::default()
        },
        logging: LoggingConfig::default(),
    }
}

#[tokio::test]
async fn plain_server_round_trip() {
    init_tracing();

    let listener = bind_ephemeral();
    let handle = Handle::new();
    let server = PlainServer::new(handle.clone());

    server.serve(app(None), listener);
    let addr = handle.listening().await.expect("server came up");

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "ok");

    handle.shutdown();
}

#[tokio::test]
async fn tls_server_round_trip_with_skip_verify() {
    init_tracing();

    let provider = Arc::new(SelfSignedProvider::new(RotationConfig::default()).unwrap());
    let listener = bind_ephemeral();
    let handle = Handle::new();
    let server = TlsServer::new(provider, handle.clone());

    server.serve(app(Some(server.provider().clone())), listener);
    let addr = handle.listening().await.expect("server came up");

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap();

    let response = client
        .get(format!("https://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "ok");

    handle.shutdown();
}

#[tokio::test]
async fn tls_server_presents_fixed_organization() {
    init_tracing();

    let provider = Arc::new(SelfSignedProvider::new(RotationConfig::default()).unwrap());
    let listener = bind_ephemeral();
    let handle = Handle::new();
    let server = TlsServer::new(provider, handle.clone());

    server.serve(app(Some(server.provider().clone())), listener);
    let addr = handle.listening().await.expect("server came up");

    // Raw handshake so the presented certificate can be inspected.
    let connector = tokio_rustls::TlsConnector::from(Arc::new(verify::client_config(true)));
    let tcp = TcpStream::connect(addr).await.unwrap();
    let server_name = rustls::pki_types::ServerName::try_from("localhost").unwrap();
    let tls = connector.connect(server_name, tcp).await.unwrap();

    let (_, session) = tls.get_ref();
    let peer_certs = session.peer_certificates().expect("peer certificates");
    let (_, cert) = X509Certificate::from_der(peer_certs[0].as_ref()).unwrap();

    let org = cert
        .subject()
        .iter_organization()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .expect("subject organization present");
    assert_eq!(org, CERT_ORGANIZATION);

    handle.shutdown();
}

#[tokio::test]
async fn factory_selects_variant_from_config() {
    init_tracing();

    // Plain when TLS is disabled.
    let listener = bind_ephemeral();
    let handle = Handle::new();
    let server = connection_server(&test_config(false), handle.clone()).unwrap();
    server.serve(app(None), listener);
    let addr = handle.listening().await.expect("server came up");

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert!(response.status().is_success());
    handle.shutdown();

    // TLS when enabled: a plain request is refused, a skip-verify TLS
    // request succeeds.
    let listener = bind_ephemeral();
    let handle = Handle::new();
    let server = connection_server(&test_config(true), handle.clone()).unwrap();
    server.serve(app(None), listener);
    let addr = handle.listening().await.expect("server came up");

    assert!(reqwest::get(format!("http://{addr}/health")).await.is_err());

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap();
    let response = client
        .get(format!("https://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    handle.shutdown();
}

#[test]
fn factory_fails_closed_when_provider_cannot_be_built() {
    // A keygen failure with TLS requested must surface from the factory;
    // no server is built and nothing can be served. No plain fallback.
    let result = connection_server_with(&test_config(true), Handle::new(), |rotation| {
        let key_pair = rcgen::KeyPair::generate_for(&rcgen::PKCS_ED25519).unwrap();
        SelfSignedProvider::from_key_pair(key_pair, rotation)
    });

    assert!(matches!(result, Err(CertificateError::KeyGeneration(_))));
}

#[tokio::test]
async fn plain_serving_runs_no_certificate_machinery() {
    init_tracing();

    // With TLS disabled the provider constructor must never run: a
    // constructor that always fails still yields a working plain server.
    let listener = bind_ephemeral();
    let handle = Handle::new();
    let server = connection_server_with(&test_config(false), handle.clone(), |_| {
        Err(CertificateError::KeyGeneration(
            "must not be invoked for plain serving".to_string(),
        ))
    })
    .unwrap();

    server.serve(app(None), listener);
    let addr = handle.listening().await.expect("server came up");

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert!(response.status().is_success());

    handle.shutdown();
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    init_tracing();

    let listener = bind_ephemeral();
    let handle = Handle::new();
    let server = PlainServer::new(handle.clone());

    server.serve(app(None), listener);
    let addr = handle.listening().await.expect("server came up");

    handle.shutdown();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    assert!(client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .is_err());
}
