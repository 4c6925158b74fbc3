//! Outbound connection capability.
//!
//! The request handler only needs "open a stream to `host:port`" and "what
//! local address did that stream get", so it depends on [`Dialer`] rather
//! than on [`TcpStream`] directly.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Dialer opens destination streams for CONNECT requests
pub trait Dialer: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// dial connects to a "host:port" target, resolving names as needed
    fn dial(&self, target: &str) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// local_addr reports the address the dialed stream is bound to
    fn local_addr(&self, stream: &Self::Stream) -> io::Result<SocketAddr>;
}

/// TcpDialer dials with the operating system's TCP stack
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, target: &str) -> io::Result<TcpStream> {
        TcpStream::connect(target).await
    }

    fn local_addr(&self, stream: &TcpStream) -> io::Result<SocketAddr> {
        stream.local_addr()
    }
}
