//! The storgate request mediator.
//!
//! An authenticating reverse proxy on the data path between CSI drivers and
//! backend storage arrays. Every inbound request walks the same chain:
//! path-clean → bearer authentication → coarse URL authorization →
//! credential substitution → per-path mediation (volume create/delete,
//! login interception, refresh, roles) → forward → quota accounting.

pub mod config;
pub mod errors;
pub mod forward;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod pathclean;
pub mod server;
pub mod state;

pub use config::ProxyConfig;
pub use errors::ApiError;
pub use state::AppState;
