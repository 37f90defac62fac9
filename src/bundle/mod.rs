//! # Bundles
//!
//! The graphman bundle model, canonical fingerprinting, per-domain builders and
//! repository bundle loading.
//!
//! Fingerprints are lowercase hex SHA-224 over the canonical JSON of the desired
//! entities. Equal desired state gives an equal fingerprint regardless of input
//! order, and the 56-character value fits a label.

pub mod builders;
mod kind;
mod model;
mod source;

pub use kind::{build_delete, BuiltBundle, BundleKind, DesiredState, Payload};
pub use model::{canonical_json, entity_identity, sha224_hex, Bundle};
pub use source::{load_from_files, load_from_tree, RepositoryPayload};
