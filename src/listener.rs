use crate::error::{Error, Result};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

/// Listener hands out accepted client connections
pub trait Listener: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// ListenerFactory produces a bound, listening socket for a port
pub trait ListenerFactory: Send + Sync + 'static {
    type Listener: Listener;

    fn create(&self, port: u16) -> impl Future<Output = Result<Self::Listener>> + Send;
}

impl Listener for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// TcpListenerFactory binds TCP listeners on a fixed host
#[derive(Debug, Clone)]
pub struct TcpListenerFactory {
    pub host: String,
}

/// TcpListenerFactory implementation block
impl TcpListenerFactory {
    /// new is a constructor for the TcpListenerFactory type
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl Default for TcpListenerFactory {
    /// Listens on every interface
    fn default() -> Self {
        Self::new("0.0.0.0")
    }
}

impl ListenerFactory for TcpListenerFactory {
    type Listener = TcpListener;

    async fn create(&self, port: u16) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.host, port);
        TcpListener::bind(&addr)
            .await
            .map_err(|source| Error::Bind { addr, source })
    }
}
