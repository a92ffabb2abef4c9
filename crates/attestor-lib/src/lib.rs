//! Workload attestation library
//!
//! This crate provides the core functionality for:
//! - Authenticating local channel peers by kernel-reported process id
//! - Resolving a process to its container via the CRI runtime
//! - Looking up the owning pod through the node-local kubelet
//! - Deriving identity selectors and serving the SPIFFE Workload API
//! - Health checks and observability

pub mod directory;
pub mod error;
pub mod health;
pub mod identity;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod proto;
pub mod runtime;
pub mod selectors;
pub mod transport;
pub mod workload_api;

#[cfg(test)]
mod testing;

pub use error::{AttestationError, ErrorKind, Result, Severity};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use identity::{IdentityMapper, ServiceAccountIdentityMapper};
pub use models::*;
pub use observability::{AttestorMetrics, StructuredLogger};
pub use pipeline::{Attestation, Attestor};
