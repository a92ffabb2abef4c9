//! Container runtime lookup command

use anyhow::Result;
use attestor_lib::runtime::ContainerResolver;
use attestor_lib::AttestationError;
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::RuntimeArgs;
use crate::output::{print_error, print_json, print_success, print_table, ContainerRow, OutputFormat};

/// Find the container running `pid` as its main process
pub async fn resolve_container(
    pid: u32,
    runtime: &RuntimeArgs,
    timeout: Duration,
    format: OutputFormat,
) -> Result<()> {
    debug!(pid, runtime = %runtime.runtime_endpoint.display(), "Resolving container");
    let resolver = ContainerResolver::new(Arc::new(runtime.runtime(timeout)));

    let record = match tokio::time::timeout(timeout, resolver.resolve(pid)).await {
        Ok(result) => result,
        Err(_) => Err(AttestationError::Timeout(timeout)),
    };

    match record {
        Ok(record) => match format {
            OutputFormat::Json => print_json(&record)?,
            OutputFormat::Table => {
                print_success(&format!("pid {} runs in container", pid));
                print_table(&[ContainerRow::from(&record)]);
                println!("{}", record.runtime_metadata.dimmed());
            }
        },
        Err(AttestationError::AmbiguousContainer { pid, candidates }) => {
            print_error(&format!("pid {} is reported by {} containers", pid, candidates.len()));
            let rows: Vec<ContainerRow> = candidates.iter().map(ContainerRow::from).collect();
            print_table(&rows);
            anyhow::bail!("ambiguous container for pid {}", pid);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
