use crate::auth::negotiate_auth;
use crate::commands::handle_socks_request;
use crate::dial::{Dialer, TcpDialer};
use crate::error::Result;
use crate::relay::Relay;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::{Instrument, Span, debug, info};

/// Handler serves one accepted client connection to completion.
///
/// The connection is owned by the handler and is closed by the time the
/// returned future resolves, whatever the outcome.
pub trait Handler: Send + Sync + 'static {
    fn handle<S>(&self, conn: S) -> impl Future<Output = Result<()>> + Send
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static;
}

/// Socks5Handler runs the SOCKS5 CONNECT flow: handshake, request, dial,
/// reply, then relay
pub struct Socks5Handler<D = TcpDialer> {
    dialer: D,
    span: Option<Span>,
}

impl Socks5Handler<TcpDialer> {
    pub fn new() -> Self {
        Self::with_dialer(TcpDialer)
    }
}

impl Default for Socks5Handler<TcpDialer> {
    fn default() -> Self {
        Self::new()
    }
}

/// Socks5Handler implementation block
impl<D: Dialer> Socks5Handler<D> {
    /// with_dialer builds a handler that opens destinations through `dialer`
    pub fn with_dialer(dialer: D) -> Self {
        Self { dialer, span: None }
    }

    /// with_span sets the span every handled connection logs under.
    /// Without one, logs stay in the caller's span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// handle_socks5 handles the full client/server SOCKS5 protocol flow
    async fn handle_socks5<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        // Reads are buffered; the same reader is relayed so nothing the
        // client sent after its request is lost
        let mut stream = BufReader::new(stream);

        // Negotiate authentication with client
        negotiate_auth(&mut stream).await?;
        debug!("handshake complete");

        // Handle connection request from client
        let outbound = handle_socks_request(&mut stream, &self.dialer).await?;
        debug!("request processed");

        // Proxy
        let transfer = Relay::new(stream, outbound).run().await?;

        info!(
            "connection closed: {} bytes from client, {} bytes from server",
            transfer.from_client, transfer.from_destination
        );

        Ok(())
    }
}

impl<D: Dialer> Handler for Socks5Handler<D> {
    fn handle<S>(&self, conn: S) -> impl Future<Output = Result<()>> + Send
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let span = self.span.clone().unwrap_or_else(Span::current);
        self.handle_socks5(conn).instrument(span)
    }
}
