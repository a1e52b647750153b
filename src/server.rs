//! Server bootstrap: wires the catalog, ban store, credential rotator,
//! hub, background tasks, and gateway together.

use crate::config::Config;
use crate::db::Database;
use crate::handlers::Registry;
use crate::network::Gateway;
use crate::security::{secret, AdminSecret, BanStore};
use crate::state::Hub;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// A running chatterd instance.
pub struct Server {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    gateway_task: JoinHandle<()>,
}

impl Server {
    /// Start everything and return once the listener is bound.
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let db = Database::new(&config.database.path).await?;
        let active_rooms = db.rooms().active_names().await?;
        info!(count = active_rooms.len(), "Loaded active rooms");

        let bans = BanStore::load(config.security.ban_file.as_str());
        let admin_secret = AdminSecret::init(config.security.admin_secret_file.as_str()).await;

        let (shutdown_tx, _) = broadcast::channel(8);
        let (hub, mut disconnect_rx) = Hub::new(
            Arc::clone(&config),
            db,
            bans,
            Arc::clone(&admin_secret),
            active_rooms,
        );

        // Disconnect worker: fan-out paths report broken peers here
        // instead of unregistering inline.
        {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                while let Some(sid) = disconnect_rx.recv().await {
                    hub.unregister(sid).await;
                }
            });
        }

        secret::spawn_rotation_task(
            admin_secret,
            Duration::from_secs(config.security.rotation_secs),
            shutdown_tx.subscribe(),
        );

        // Liveness sweep over every live session.
        {
            let hub = Arc::clone(&hub);
            let mut shutdown_rx = shutdown_tx.subscribe();
            let period = Duration::from_secs(config.server.sweep_interval_secs);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => hub.sweep().await,
                        _ = shutdown_rx.recv() => break,
                    }
                }
            });
        }

        let registry = Arc::new(Registry::new());
        let gateway = Gateway::bind(
            config.server.listen,
            Arc::clone(&hub),
            registry,
            shutdown_tx.clone(),
        )
        .await?;
        let local_addr = gateway.local_addr()?;

        let gateway_task = tokio::spawn(async move {
            if let Err(e) = gateway.run().await {
                error!(error = %e, "Gateway failed");
            }
        });

        Ok(Self {
            local_addr,
            shutdown_tx,
            gateway_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal every task to stop; existing connections are dropped.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// A handle the signal watcher can trigger shutdown with.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Wait for the accept loop to finish.
    pub async fn wait(self) {
        let _ = self.gateway_task.await;
    }
}
