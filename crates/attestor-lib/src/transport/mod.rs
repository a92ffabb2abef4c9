//! Transport credentials for the local Workload API channel
//!
//! Process attestation does not authenticate peers cryptographically. The
//! handshake only captures the OS handle of the accepted local channel so the
//! peer's process id can later be queried from the kernel. Only processes
//! allowed to open the channel can reach this code path.

mod peer;

pub use peer::{KernelPeerIdentitySource, PeerIdentitySource};

use crate::error::{AttestationError, Result};
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};
use tokio_stream::{Stream, StreamExt};
use tonic::transport::server::Connected;
use tracing::{debug, warn};

pub const SECURITY_PROTOCOL: &str = "spire-attestation";
pub const SECURITY_VERSION: &str = "0.2";
pub const DEFAULT_SERVER_NAME: &str = "spire-agent";
pub const AUTH_TYPE: &str = "pipe";

/// Connections that can expose the OS handle of a local channel
pub trait LocalChannel {
    /// Returns `None` when the connection is not a local channel
    fn channel_handle(&self) -> Option<BorrowedFd<'_>>;
}

impl LocalChannel for UnixStream {
    fn channel_handle(&self) -> Option<BorrowedFd<'_>> {
        Some(self.as_fd())
    }
}

impl LocalChannel for TcpStream {
    fn channel_handle(&self) -> Option<BorrowedFd<'_>> {
        None
    }
}

/// Shared duplicate of an accepted channel's descriptor.
///
/// The duplicate refers to the same socket, so kernel peer queries against it
/// answer for the original connection, and it stays valid for as long as any
/// request context holds it.
#[derive(Debug, Clone)]
pub struct PeerHandle(Arc<OwnedFd>);

impl PeerHandle {
    pub fn duplicate(fd: BorrowedFd<'_>) -> io::Result<Self> {
        Ok(Self(Arc::new(fd.try_clone_to_owned()?)))
    }
}

impl AsFd for PeerHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

/// Authenticated-peer information attached to every request on a connection
#[derive(Debug, Clone)]
pub struct PipeAuthInfo {
    handle: PeerHandle,
}

impl PipeAuthInfo {
    pub fn new(handle: PeerHandle) -> Self {
        Self { handle }
    }

    pub fn auth_type(&self) -> &'static str {
        AUTH_TYPE
    }

    pub fn handle(&self) -> &PeerHandle {
        &self.handle
    }
}

/// Protocol advertised by the credentials, distinct from TLS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub security_protocol: &'static str,
    pub security_version: &'static str,
    pub server_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Unestablished,
    Established,
}

/// Per-connection handshake
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Unestablished,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Outbound handshakes are refused in every state
    pub fn client<C>(&mut self, _conn: C) -> Result<AttestedConnection<C>> {
        Err(AttestationError::UnsupportedDirection)
    }

    /// Accept an inbound connection, capturing its channel handle.
    ///
    /// A connection without a channel handle is dropped, which closes it.
    pub fn server<C: LocalChannel>(&mut self, conn: C) -> Result<AttestedConnection<C>> {
        let handle = match conn.channel_handle() {
            Some(fd) => {
                PeerHandle::duplicate(fd).map_err(|e| AttestationError::TransportQueryFailed {
                    code: e.raw_os_error(),
                    message: format!("failed to duplicate channel handle: {e}"),
                })?
            }
            None => {
                drop(conn);
                return Err(AttestationError::NotAPipeConnection);
            }
        };

        self.state = HandshakeState::Established;
        Ok(AttestedConnection {
            inner: conn,
            auth: PipeAuthInfo::new(handle),
        })
    }
}

/// Transport credentials installed on the Workload API listener
#[derive(Debug, Clone)]
pub struct TransportCredentials {
    server_name: String,
}

impl Default for TransportCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportCredentials {
    pub fn new() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
        }
    }

    pub fn info(&self) -> ProtocolInfo {
        ProtocolInfo {
            security_protocol: SECURITY_PROTOCOL,
            security_version: SECURITY_VERSION,
            server_name: self.server_name.clone(),
        }
    }

    pub fn override_server_name(&mut self, name: impl Into<String>) {
        self.server_name = name.into();
    }

    pub fn client_handshake<C>(&self, conn: C) -> Result<AttestedConnection<C>> {
        Handshake::new().client(conn)
    }

    pub fn server_handshake<C: LocalChannel>(&self, conn: C) -> Result<AttestedConnection<C>> {
        Handshake::new().server(conn)
    }
}

/// A connection that completed the inbound handshake.
///
/// tonic copies [`PipeAuthInfo`] into the extensions of every request served
/// on this connection.
#[derive(Debug)]
pub struct AttestedConnection<C> {
    inner: C,
    auth: PipeAuthInfo,
}

impl<C> AttestedConnection<C> {
    pub fn auth_info(&self) -> &PipeAuthInfo {
        &self.auth
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C> Connected for AttestedConnection<C> {
    type ConnectInfo = PipeAuthInfo;

    fn connect_info(&self) -> Self::ConnectInfo {
        self.auth.clone()
    }
}

impl<C: AsyncRead + Unpin> AsyncRead for AttestedConnection<C> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<C: AsyncWrite + Unpin> AsyncWrite for AttestedConnection<C> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Run the inbound handshake over a stream of accepted connections.
///
/// Accept errors and rejected handshakes are logged and skipped so that one
/// bad peer never stops the server.
pub fn attested_incoming<S, C>(
    connections: S,
    credentials: TransportCredentials,
) -> impl Stream<Item = io::Result<AttestedConnection<C>>>
where
    S: Stream<Item = io::Result<C>>,
    C: LocalChannel,
{
    connections.filter_map(move |accepted| match accepted {
        Ok(conn) => match credentials.server_handshake(conn) {
            Ok(attested) => {
                debug!("Local channel handshake established");
                Some(Ok(attested))
            }
            Err(e) => {
                warn!(error = %e, "Rejected inbound connection");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "Failed to accept connection");
            None
        }
    })
}
