//! # Gateway Config Controller
//!
//! A Kubernetes controller that keeps fleets of API gateways in sync with
//! their declared configuration.
//!
//! ## Overview
//!
//! For every `Gateway` resource the controller registers one recurring job per
//! enabled configuration domain:
//!
//! 1. **Repositories** - git, HTTP archive, local Secret or state-store content
//!    delivered as graphman (or legacy restman) bundles
//! 2. **External secrets, keys and certificates** - Kubernetes Secrets applied
//!    as stored passwords, private keys and trusted certificates
//! 3. **Cluster properties and listen ports**
//! 4. **OAuth toolkit** - maintenance tasks, role-dependent policy overrides and
//!    certificate exchange between paired DMZ and internal gateways
//! 5. **Management pod election**
//!
//! Each bundle carries a fingerprint. A pod (or, for DB-backed fleets, the
//! Deployment) records the fingerprint it last applied as a label or
//! annotation, and a bundle is only delivered where the recorded value differs.

pub mod bundle;
pub mod cache;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod crd;
pub mod delivery;
pub mod error;
pub mod observability;
pub mod repository;
pub mod runtime;
pub mod scheduler;
pub mod statestore;
pub mod sync;
