//! Workload API client command

use anyhow::Result;
use attestor_lib::workload_api::WorkloadApiClient;
use colored::Colorize;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::output::{print_info, print_json, print_table, selector_rows, OutputFormat, SelectorRow};

#[derive(Serialize)]
struct FetchedIdentity {
    spiffe_id: String,
    selectors: Vec<SelectorRow>,
}

/// Ask the Workload API who the calling process is
pub async fn fetch_identity(socket_path: &str, timeout: Duration, format: OutputFormat) -> Result<()> {
    let mut client = WorkloadApiClient::connect(socket_path, timeout).await?;
    let response = client.fetch_x509svid().await?;
    debug!(socket = %socket_path, svids = response.svids.len(), "Fetched identities");

    let identities: Vec<FetchedIdentity> = response
        .svids
        .into_iter()
        .map(|svid| FetchedIdentity {
            selectors: selector_rows(svid.hint.split(',')),
            spiffe_id: svid.spiffe_id,
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&identities)?,
        OutputFormat::Table => {
            if identities.is_empty() {
                print_info("Workload API returned no identities");
            }
            for identity in &identities {
                println!("SPIFFE ID: {}", identity.spiffe_id.cyan());
                print_table(&identity.selectors);
            }
        }
    }

    Ok(())
}
