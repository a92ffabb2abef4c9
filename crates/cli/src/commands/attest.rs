//! Offline attestation command

use anyhow::{Context, Result};
use attestor_lib::directory::KubeletClient;
use attestor_lib::transport::KernelPeerIdentitySource;
use attestor_lib::{Attestor, IdentityMapper, ServiceAccountIdentityMapper};
use colored::Colorize;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{DirectoryArgs, RuntimeArgs};
use crate::output::{print_info, print_json, print_selectors, print_table, ContainerRow, OutputFormat};

#[derive(Serialize)]
struct AttestReport<'a> {
    spiffe_id: Option<String>,
    #[serde(flatten)]
    attestation: &'a attestor_lib::Attestation,
}

/// Run pid -> container -> pod -> selectors and show the result
pub async fn attest_process(
    pid: u32,
    runtime: &RuntimeArgs,
    directory: &DirectoryArgs,
    trust_domain: &str,
    timeout: Duration,
    format: OutputFormat,
) -> Result<()> {
    let kubelet = KubeletClient::new(&directory.directory_config(timeout))
        .context("Failed to build kubelet client")?;
    let mapper = ServiceAccountIdentityMapper::new(trust_domain)?;

    let attestor = Attestor::new(
        Arc::new(KernelPeerIdentitySource::global()),
        Arc::new(runtime.runtime(timeout)),
        Arc::new(kubelet),
    )
    .with_deadline(timeout);

    let attestation = attestor.attest_pid(pid).await?;
    debug!(
        pid,
        container_id = %attestation.container.container_id,
        selectors = attestation.selectors.len(),
        "Attested process"
    );
    let spiffe_id = mapper.spiffe_id(&attestation).ok();

    match format {
        OutputFormat::Json => print_json(&AttestReport {
            spiffe_id,
            attestation: &attestation,
        })?,
        OutputFormat::Table => {
            print_table(&[ContainerRow::from(&attestation.container)]);
            match &spiffe_id {
                Some(id) => println!("SPIFFE ID: {}", id.cyan()),
                None => print_info("No SPIFFE ID: namespace or service account selector missing"),
            }
            print_selectors(&attestation.selectors);
        }
    }

    Ok(())
}
