//! Kubernetes integration module.
//!
//! This module converts component descriptions into canonical resources,
//! validates them with server-side dry runs, and applies or removes them.

mod client;
mod deploy;
mod dry_run;
mod resource;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApplyOptions, ClusterClient, KubeClient, RestRequest};
pub use deploy::deploy;
pub use dry_run::{dry_run, dry_run_component, DryRunOutcome};
pub use resource::{api_path, kind_to_resource, K8sResource, RESERVED_KEYS};
