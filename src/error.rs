//! Error types for the proxy.
//!
//! Every per-connection failure is an [`Error`]; the server logs it and
//! keeps serving other connections. Only [`Error::Bind`] is fatal.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Field names a frame byte check can fail on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Version,
    Command,
    AddressType,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Version => "version",
            Field::Command => "command",
            Field::AddressType => "address type",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Malformed or unsupported values sent by a client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A fixed-vocabulary byte held a value outside its allowed set
    #[error("unexpected {field} 0x{value:02x}")]
    UnexpectedByte { field: Field, value: u8 },

    /// Handshake offered no method the server accepts
    #[error("no acceptable authentication method offered")]
    NoAcceptableAuthMethod,
}

/// Errors that can occur while serving SOCKS5 clients.
#[derive(Error, Debug)]
pub enum Error {
    /// Client sent a malformed or unsupported field
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] Violation),

    /// Stream ended before a frame part was complete
    #[error("truncated input reading {what}: {source}")]
    TruncatedInput {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    /// Transport failure on either endpoint
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Destination could not be reached
    #[error("dial {target}: {source}")]
    Dial {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Dialed socket's local address is not IPv4
    #[error("unsupported bound address {0}")]
    UnsupportedBoundAddress(SocketAddr),

    /// Writing a failure reply failed after `cause` was hit
    #[error("{cause}; writing reply also failed: {source}")]
    ReplyWrite {
        cause: Box<Error>,
        #[source]
        source: io::Error,
    },

    /// One or both relay directions failed
    #[error("relay failed: {0}")]
    Relay(RelayError),

    /// Listening socket could not be created
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Listening socket failed to accept one connection
    #[error("accept: {0}")]
    Accept(#[source] io::Error),
}

impl Error {
    /// truncated wraps a read error, tagging short reads with the frame part
    /// being read
    pub(crate) fn truncated(what: &'static str) -> impl FnOnce(io::Error) -> Error {
        move |source| match source.kind() {
            io::ErrorKind::UnexpectedEof => Error::TruncatedInput { what, source },
            _ => Error::Io(source),
        }
    }

    /// with_reply_failure joins `self` with a failed reply write
    pub(crate) fn with_reply_failure(self, source: io::Error) -> Error {
        Error::ReplyWrite {
            cause: Box::new(self),
            source,
        }
    }
}

/// RelayError holds the per-direction failures of a relay; at least one
/// side is always set
#[derive(Debug)]
pub struct RelayError {
    pub client_to_destination: Option<io::Error>,
    pub destination_to_client: Option<io::Error>,
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.client_to_destination, &self.destination_to_client) {
            (Some(up), Some(down)) => {
                write!(f, "client->destination: {up}; destination->client: {down}")
            }
            (Some(up), None) => write!(f, "client->destination: {up}"),
            (None, Some(down)) => write!(f, "destination->client: {down}"),
            (None, None) => f.write_str("no error"),
        }
    }
}

impl std::error::Error for RelayError {}
