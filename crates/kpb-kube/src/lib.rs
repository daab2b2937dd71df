//! [`ClusterAccessor`](kpb_core::cluster::ClusterAccessor) backed by the
//! Kubernetes API via `kube`.

mod access;
mod client;

pub use access::KubeAccess;
pub use client::connect;
