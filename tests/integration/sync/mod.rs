//! Sync engine integration tests, organized by component.

pub mod common;

mod archive;
mod delivery;
mod gateway_client;
mod jobs;
mod repositories;
mod scheduler;
mod statestore;
