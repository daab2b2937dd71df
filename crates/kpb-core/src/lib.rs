//! Core of `kpb`: the playbook model, condition evaluation and the ordered
//! rollout engine. Cluster access and manifest tooling sit behind the
//! [`cluster::ClusterAccessor`], [`manifest::ManifestBuilder`] and
//! [`manifest::ManifestApplier`] traits.

pub mod cancel;
pub mod cluster;
pub mod condition;
pub mod engine;
pub mod error;
pub mod event;
pub mod manifest;
pub mod paths;
pub mod playbook;
pub mod run;
pub mod substitution;
pub mod template;

pub use error::{PlaybookError, Result};
