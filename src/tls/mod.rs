//! Self-signed TLS support.
//!
//! Two halves:
//! - [`provider`]: the certificate lifecycle manager that generates a root
//!   key once, issues self-signed leaves from it, and rotates them on
//!   expiry at handshake time.
//! - [`verify`]: client-side trust helpers for peers connecting to a
//!   self-signed endpoint.

pub mod provider;
pub mod verify;

pub use provider::{
    CertificateError, CertificateSnapshot, RotationConfig, SelfSignedProvider, CERT_ORGANIZATION,
};
pub use verify::{client_config, InsecureVerifier};
