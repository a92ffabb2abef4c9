//! SPIFFE Workload API over the local attested channel

mod client;
mod service;

pub use client::WorkloadApiClient;
pub use service::{bind_socket, serve, WorkloadApiService};
