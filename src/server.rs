use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::listener::{Listener, ListenerFactory};
use std::future::{Future, pending};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, Span, error, info, info_span, warn};

/// Default SOCKS5 listening port
pub const DEFAULT_PORT: u16 = 5555;

/// Pause after a failed accept so persistent errors (EMFILE) don't spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// ShutdownPolicy decides what happens to in-flight connections once the
/// server stops accepting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Wait for every handler to finish on its own
    #[default]
    Drain,
    /// Cancel running handlers, closing their sockets
    Abort,
}

/// Socks5Server accepts connections and dispatches each one to a handler
/// task
pub struct Socks5Server<F: ListenerFactory, H> {
    pub port: u16,
    pub shutdown_policy: ShutdownPolicy,
    factory: F,
    handler: Arc<H>,
    listener: Option<F::Listener>,
    span: Span,
}

/// Socks5Server implementation block
impl<F, H> Socks5Server<F, H>
where
    F: ListenerFactory,
    H: Handler,
{
    /// new is a constructor for the Socks5Server type
    pub fn new(factory: F, handler: H) -> Self {
        Self {
            port: DEFAULT_PORT,
            shutdown_policy: ShutdownPolicy::default(),
            factory,
            handler: Arc::new(handler),
            listener: None,
            span: Span::none(),
        }
    }

    /// with_port selects the listening port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// with_shutdown_policy selects how in-flight connections end
    pub fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    /// with_span sets the span server and per-connection logs nest under
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// bind creates the listener up front and returns its address
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr()?);
        }

        let listener = self.listen().await?;
        let addr = listener.local_addr()?;
        self.listener = Some(listener);
        Ok(addr)
    }

    /// listen asks the factory for a listener on the configured port
    async fn listen(&self) -> Result<F::Listener> {
        let listener = self.factory.create(self.port).await?;
        let addr = listener.local_addr()?;

        self.span.in_scope(|| info!("SOCKS5 proxy listening on {}", addr));

        Ok(listener)
    }

    /// run serves connections forever
    pub async fn run(self) -> Result<()> {
        self.run_until(pending()).await
    }

    /// run_until serves connections until `shutdown` resolves, then ends
    /// in-flight connections according to the shutdown policy
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut listener = match self.listener.take() {
            Some(listener) => listener,
            None => self.listen().await?,
        };
        let span = self.span.clone();
        let policy = self.shutdown_policy;

        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        // Listen for connections to proxy
        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                // Reap finished connections so the set stays small
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        span.in_scope(|| report_join_error(e));
                    }
                }

                accepted = listener.accept() => {
                    let (inbound, peer_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            span.in_scope(|| warn!("{}", Error::Accept(e)));
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };

                    let conn_span = info_span!(parent: &span, "conn", peer = %peer_addr);
                    let handler = Arc::clone(&self.handler);

                    // Spawn async task
                    tasks.spawn(
                        async move {
                            info!("new client");

                            // Send connection to connection handler
                            match handler.handle(inbound).await {
                                Ok(()) => info!("connection handled"),
                                Err(e) => error!("connection error: {}", e),
                            }
                        }
                        .instrument(conn_span),
                    );
                }
            }
        }

        // Stop accepting before waiting on anything
        drop(listener);

        span.in_scope(|| {
            info!(
                "shutting down, {} connection(s) in flight ({:?})",
                tasks.len(),
                policy
            )
        });

        if policy == ShutdownPolicy::Abort {
            tasks.abort_all();
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                span.in_scope(|| report_join_error(e));
            }
        }

        Ok(())
    }
}

/// join_failure names how a connection task ended without returning
fn join_failure(e: &JoinError) -> &'static str {
    if e.is_panic() { "panicked" } else { "was cancelled" }
}

/// report_join_error logs a connection task that never reached its own
/// result logging
fn report_join_error(e: JoinError) {
    if e.is_panic() {
        error!("connection task {}: {}", join_failure(&e), e);
    } else {
        info!("connection task {}", join_failure(&e));
    }
}
