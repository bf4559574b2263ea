//! Metered API gateway: authenticates a caller, reserves credits, proxies
//! the call to a catalogued inference service, settles the cost from the
//! measured latency and keeps a per-user request history.

pub mod api;
pub mod assets;
pub mod config;
pub mod identity;
pub mod pipeline;
pub mod server;
pub mod transport;
