pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod shutdown;

pub use app::{build_router, build_state, start_relay, RelayHandles};
