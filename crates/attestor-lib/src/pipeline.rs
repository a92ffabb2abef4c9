//! Attestation pipeline
//!
//! Peer handle -> process id -> container -> workload record -> selectors.
//! Each step either yields its output or fails the whole attestation, and
//! the whole chain runs under one deadline.

use crate::directory::WorkloadDirectory;
use crate::error::{AttestationError, Result};
use crate::health::HealthRegistry;
use crate::models::{ContainerRecord, SelectorSet};
use crate::observability::{AttestorMetrics, OUTCOME_SUCCESS};
use crate::runtime::{ContainerResolver, ContainerRuntime};
use crate::selectors::derive_selectors;
use crate::transport::{PeerIdentitySource, PipeAuthInfo};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_ATTESTATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of a successful attestation
#[derive(Debug, Clone, Serialize)]
pub struct Attestation {
    pub process_id: u32,
    pub container: ContainerRecord,
    pub selectors: SelectorSet,
}

/// Runs the attestation steps against the node-local dependencies
pub struct Attestor {
    peers: Arc<dyn PeerIdentitySource>,
    resolver: ContainerResolver,
    directory: Arc<dyn WorkloadDirectory>,
    deadline: Duration,
    metrics: Option<AttestorMetrics>,
    health: Option<HealthRegistry>,
}

impl Attestor {
    pub fn new(
        peers: Arc<dyn PeerIdentitySource>,
        runtime: Arc<dyn ContainerRuntime>,
        directory: Arc<dyn WorkloadDirectory>,
    ) -> Self {
        Self {
            peers,
            resolver: ContainerResolver::new(runtime),
            directory,
            deadline: DEFAULT_ATTESTATION_TIMEOUT,
            metrics: None,
            health: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_metrics(mut self, metrics: AttestorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Attest the process on the other end of an authenticated connection
    pub async fn attest(&self, auth: &PipeAuthInfo) -> Result<Attestation> {
        self.run_with_deadline(async {
            let peer = self.peers.identify(auth)?;
            debug!(pid = peer.process_id, "Resolved peer process id");
            self.attest_process(peer.process_id).await
        })
        .await
    }

    /// Attest an explicitly supplied process id.
    ///
    /// Diagnostic entry point; the Workload API only ever attests kernel
    /// reported peers through [`Attestor::attest`].
    pub async fn attest_pid(&self, pid: u32) -> Result<Attestation> {
        self.run_with_deadline(self.attest_process(pid)).await
    }

    async fn attest_process(&self, pid: u32) -> Result<Attestation> {
        let container = self.resolver.resolve(pid).await?;
        debug!(pid, container_id = %container.container_id, "Resolved container");

        let pods = self.directory.list_workloads().await?;
        if let Some(metrics) = &self.metrics {
            metrics.set_pods_listed(pods.len() as i64);
        }

        let selectors = derive_selectors(&container.container_id, &pods)?;
        Ok(Attestation {
            process_id: pid,
            container,
            selectors,
        })
    }

    async fn run_with_deadline<F>(&self, steps: F) -> Result<Attestation>
    where
        F: std::future::Future<Output = Result<Attestation>>,
    {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.deadline, steps).await {
            Ok(result) => result,
            Err(_) => Err(AttestationError::Timeout(self.deadline)),
        };

        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(_) => OUTCOME_SUCCESS,
                Err(e) => e.kind().as_str(),
            };
            metrics.observe_attestation(started.elapsed().as_secs_f64(), outcome);
        }
        if let Some(health) = &self.health {
            health.record_attestation(&result).await;
        }
        result
    }
}
