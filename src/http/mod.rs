//! HTTP serving with optional self-signed TLS.
//!
//! Two serving variants behind one trait:
//! - **Plain**: accepts connections with the router unchanged
//! - **TLS**: installs a rotating self-signed certificate resolver before
//!   accepting
//!
//! Plus the ambient pieces a host usually wants alongside the accept loop:
//! signal-driven graceful shutdown and rotation-aware request tracing.

pub mod server;
pub mod shutdown;
pub mod trace;

pub use server::{
    connection_server, connection_server_with, ConnectionServer, PlainServer, ServeError,
    TlsServer,
};
