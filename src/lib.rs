//! A lightweight SOCKS5 proxy library
//!
//! ## SOCKS5 Implementation
//!
//! - Features:
//!     - CONNECT
//!     - No Authentication
//!     - IPv4 and domain name targets
//!     - Async using tokio, one task per connection plus one per relay
//!     - Graceful drain of in-flight connections on shutdown
//! - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
//!
//! Handlers, dialers and listeners are small traits, so the protocol code
//! runs equally over TCP sockets and in-memory pipes.
//!
//! # Example
//! ```no_run
//! use socks5_proxy::{Socks5Handler, Socks5Server, TcpListenerFactory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Socks5Server::new(TcpListenerFactory::default(), Socks5Handler::new())
//!         .with_port(1080);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod auth;
pub mod codec;
pub mod commands;
pub mod dial;
pub mod error;
pub mod handler;
pub mod listener;
pub mod protocol;
pub mod relay;
pub mod server;

// Re-export main types at crate root for convenience
pub use dial::{Dialer, TcpDialer};
pub use error::{Error, Result};
pub use handler::{Handler, Socks5Handler};
pub use listener::{Listener, ListenerFactory, TcpListenerFactory};
pub use protocol::{AddressType, AuthMethod, Command, ReplyCode, Version};
pub use relay::{Relay, Transfer};
pub use server::{DEFAULT_PORT, ShutdownPolicy, Socks5Server};
