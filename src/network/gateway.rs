//! Gateway - TCP listener that accepts incoming connections.
//!
//! The Gateway binds to a socket, early-rejects banned peers, and spawns
//! a Connection task for each accepted client.

use crate::handlers::Registry;
use crate::network::Connection;
use crate::state::Hub;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// The Gateway accepts incoming TCP connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    hub: Arc<Hub>,
    registry: Arc<Registry>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Gateway {
    /// Bind the gateway to the specified address.
    pub async fn bind(
        addr: SocketAddr,
        hub: Arc<Hub>,
        registry: Arc<Registry>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Gateway listening");
        Ok(Self {
            listener,
            hub,
            registry,
            shutdown_tx,
        })
    }

    /// The actually bound address (relevant when binding port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown.
    pub async fn run(self) -> std::io::Result<()> {
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        // Banned peers still get the handshake so the
                        // rejection frame can reach them; no session is
                        // ever created for them.
                        let banned = self.hub.bans().contains(&addr.ip().to_string());
                        if banned {
                            info!(%addr, "Rejecting banned peer");
                        } else {
                            debug!(%addr, "Connection accepted");
                        }

                        let hub = Arc::clone(&self.hub);
                        let registry = Arc::clone(&self.registry);
                        let shutdown_rx = self.shutdown_tx.subscribe();
                        tokio::spawn(async move {
                            let connection =
                                Connection::new(stream, addr, banned, hub, registry, shutdown_rx);
                            if let Err(e) = connection.run().await {
                                debug!(%addr, error = %e, "Connection error");
                            }
                            debug!(%addr, "Connection closed");
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
                _ = shutdown.recv() => {
                    info!("Gateway shutting down");
                    break Ok(());
                }
            }
        }
    }
}
