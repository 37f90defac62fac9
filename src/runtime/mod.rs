//! # Runtime Module
//!
//! Process bootstrap, the probe server and the Gateway watch loop.

pub mod error_policy;
pub mod initialization;
pub mod server;
pub mod watch_loop;

pub use error_policy::*;
pub use initialization::*;
pub use server::*;
pub use watch_loop::*;
