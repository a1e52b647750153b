//! Test server management.
//!
//! Spawns chatterd instances on an ephemeral port with all state files in
//! a temporary directory.

#![allow(dead_code)]

use chatterd::{Config, Server};
use std::net::SocketAddr;
use std::path::PathBuf;

/// A test server instance.
pub struct TestServer {
    server: Server,
    addr: SocketAddr,
    data_dir: tempfile::TempDir,
}

impl TestServer {
    /// Spawn a new test server with default tuning.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn a test server after applying `adjust` to the base config.
    pub async fn spawn_with(adjust: impl FnOnce(&mut Config)) -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;
        let mut config = Config::default();
        config.server.listen = "127.0.0.1:0".parse()?;
        config.database.path = path_string(data_dir.path().join("rooms.db"));
        config.security.admin_secret_file = path_string(data_dir.path().join("admin.txt"));
        config.security.ban_file = path_string(data_dir.path().join("banned.txt"));
        adjust(&mut config);

        let server = Server::start(config).await?;
        let addr = server.local_addr();
        Ok(Self {
            server,
            addr,
            data_dir,
        })
    }

    /// Address clients should connect to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The current admin secret, read from the persisted file the same
    /// way an operator would.
    pub fn admin_secret(&self) -> String {
        std::fs::read_to_string(self.data_dir.path().join("admin.txt"))
            .expect("admin secret file")
            .trim_end()
            .to_string()
    }

    /// Path of the persisted ban set.
    pub fn ban_file(&self) -> PathBuf {
        self.data_dir.path().join("banned.txt")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}

fn path_string(path: PathBuf) -> String {
    path.to_string_lossy().into_owned()
}
