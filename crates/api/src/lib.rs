//! API server: HTTP routes, SSE fan-out, and event subscription.

pub mod config;
pub mod error;
pub mod routes;
pub mod sse;
pub mod state;
