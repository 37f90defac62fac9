//! # Custom Resource Definitions
//!
//! CRD types for the Gateway Config Controller.
//!
//! - [`Gateway`]: a gateway fleet and the configuration domains synchronized into it
//! - [`Repository`]: a configuration source (git, HTTP archive, local secret, state store)
//! - [`StateStore`]: a remote key-value store holding repository snapshots

mod gateway;
mod repository;
mod state_store;
mod status;

pub use gateway::*;
pub use repository::*;
pub use state_store::*;
pub use status::*;

/// API group shared by all custom resources
pub const API_GROUP: &str = "gateway-config.io";

fn default_true() -> bool {
    true
}
