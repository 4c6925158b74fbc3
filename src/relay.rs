//! Full-duplex byte relay between a client and its destination.
//!
//! The destination -> client direction runs on a spawned task while the
//! caller copies client -> destination. Neither direction cancels the other:
//! when one side reaches EOF its peer's write half is shut down and the
//! remaining direction drains on its own. Dropping a running relay aborts
//! the spawned direction too, so cancelling the caller closes both sockets.

use crate::error::{Error, RelayError, Result};
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::task::JoinHandle;
use tracing::debug;

/// Transfer counts bytes moved in each direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transfer {
    pub from_client: u64,
    pub from_destination: u64,
}

/// Relay holds both endpoints of an established CONNECT
pub struct Relay<C, D> {
    pub inbound: C,
    pub outbound: D,
}

/// Relay implementation block
impl<C, D> Relay<C, D>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    D: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(inbound: C, outbound: D) -> Self {
        Self { inbound, outbound }
    }

    /// run copies bytes both ways until each direction has finished.
    /// Both endpoints are closed by the time it returns
    pub async fn run(self) -> Result<Transfer> {
        let (mut client_r, mut client_w) = tokio::io::split(self.inbound);
        let (mut dest_r, mut dest_w) = tokio::io::split(self.outbound);

        // Destination -> client
        let mut downstream = AbortOnDrop(tokio::spawn(async move {
            let copied = tokio::io::copy(&mut dest_r, &mut client_w).await;
            close_write(&mut client_w, "client").await;
            copied
        }));

        // Client -> destination
        let upstream = tokio::io::copy(&mut client_r, &mut dest_w).await;
        close_write(&mut dest_w, "destination").await;

        // Always collect the spawned direction, even if ours failed
        let downstream = match (&mut downstream.0).await {
            Ok(copied) => copied,
            Err(e) => Err(io::Error::other(e)),
        };

        match (upstream, downstream) {
            (Ok(from_client), Ok(from_destination)) => Ok(Transfer {
                from_client,
                from_destination,
            }),
            (upstream, downstream) => Err(Error::Relay(RelayError {
                client_to_destination: upstream.err(),
                destination_to_client: downstream.err(),
            })),
        }
    }
}

/// AbortOnDrop ties a spawned relay direction to the future that owns it
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// close_write half-closes a relay sink so its peer sees EOF
async fn close_write<T>(half: &mut WriteHalf<T>, side: &str)
where
    T: AsyncRead + AsyncWrite,
{
    // Peers that already went away make this fail; nothing is left to tell them
    if let Err(e) = half.shutdown().await {
        debug!("shutdown {} write half: {}", side, e);
    }
}
