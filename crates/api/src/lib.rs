//! Forgewatch operator API library.
//!
//! Exposes configuration, state wiring, error handling and routes so the
//! binary entrypoint and the integration tests build the exact same app.

pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
