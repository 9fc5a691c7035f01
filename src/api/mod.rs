//! HTTP API.
//!
//! `build_router()` returns a composable `Router`; `start_server_on()`
//! binds it and hands back a `ServerHandle` for graceful shutdown.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::build_router;
pub use server::{start_server_on, ServerHandle, ServerSession};
pub use types::ApiContext;
