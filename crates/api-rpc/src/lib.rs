//! JSON-RPC API Layer
//!
//! Serves the renderq dispatch queue to remote workers and submitters
//! (JSON-RPC 2.0 over HTTP).

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};
