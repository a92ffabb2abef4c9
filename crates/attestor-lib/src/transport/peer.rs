//! Peer process identity extraction
//!
//! The process id of a local channel peer is read from the kernel
//! (`SO_PEERCRED` on Linux). The peer cannot influence the answer.

use super::{PeerHandle, PipeAuthInfo};
use crate::error::{AttestationError, Result};
use crate::models::PeerIdentity;
use std::sync::OnceLock;
use tracing::debug;

/// Source of trusted peer process ids
pub trait PeerIdentitySource: Send + Sync {
    /// Query the process id of the process holding the other end of the channel
    fn extract_process_id(&self, handle: &PeerHandle) -> Result<u32>;

    /// Resolve the full peer identity for an authenticated connection
    fn identify(&self, auth: &PipeAuthInfo) -> Result<PeerIdentity> {
        let process_id = self.extract_process_id(auth.handle())?;
        Ok(PeerIdentity {
            process_id,
            handle: auth.handle().clone(),
        })
    }
}

impl<T: PeerIdentitySource + ?Sized> PeerIdentitySource for &'static T {
    fn extract_process_id(&self, handle: &PeerHandle) -> Result<u32> {
        (**self).extract_process_id(handle)
    }
}

static KERNEL_SOURCE: OnceLock<KernelPeerIdentitySource> = OnceLock::new();

/// Kernel-backed peer identity source
///
/// Constructed once per process and read-only afterwards.
#[derive(Debug)]
pub struct KernelPeerIdentitySource {
    mechanism: &'static str,
}

impl KernelPeerIdentitySource {
    /// Process-wide instance
    pub fn global() -> &'static Self {
        KERNEL_SOURCE.get_or_init(|| {
            let source = Self {
                mechanism: Self::MECHANISM,
            };
            debug!(mechanism = source.mechanism, "Initialized kernel peer identity source");
            source
        })
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    const MECHANISM: &'static str = "SO_PEERCRED";

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const MECHANISM: &'static str = "unsupported";

    /// Name of the kernel facility used for the query
    pub fn mechanism(&self) -> &'static str {
        self.mechanism
    }
}

impl PeerIdentitySource for KernelPeerIdentitySource {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn extract_process_id(&self, handle: &PeerHandle) -> Result<u32> {
        use nix::sys::socket::{getsockopt, sockopt};

        let creds = getsockopt(handle, sockopt::PeerCredentials).map_err(|errno| {
            AttestationError::TransportQueryFailed {
                code: Some(errno as i32),
                message: format!("{}: {}", self.mechanism, errno.desc()),
            }
        })?;

        u32::try_from(creds.pid()).map_err(|_| AttestationError::TransportQueryFailed {
            code: None,
            message: format!("{} returned invalid pid {}", self.mechanism, creds.pid()),
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn extract_process_id(&self, _handle: &PeerHandle) -> Result<u32> {
        Err(AttestationError::TransportQueryFailed {
            code: None,
            message: "peer process id query is not supported on this platform".to_string(),
        })
    }
}
