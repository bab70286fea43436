// Renderq Core - Domain Logic & Ports
// NO infrastructure dependencies: storage, subprocess and RPC adapters
// live in the infra crates and are injected through the port traits.

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
