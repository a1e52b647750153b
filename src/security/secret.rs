//! Rotating admin credential.
//!
//! A 12-character alphanumeric secret drawn from the OS CSPRNG, written
//! atomically to a well-known file and regenerated on a fixed period.
//! Elevation is sticky: rotation never demotes an already elevated session.

use parking_lot::RwLock;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::sync::broadcast;
use tracing::{info, warn};

const SECRET_LEN: usize = 12;

pub struct AdminSecret {
    current: RwLock<String>,
    path: PathBuf,
}

impl AdminSecret {
    /// Generate the initial secret and persist it.
    pub async fn init(path: impl Into<PathBuf>) -> Arc<Self> {
        let secret = Arc::new(Self {
            current: RwLock::new(generate()),
            path: path.into(),
        });
        secret.persist().await;
        secret
    }

    /// Replace the secret and persist the new one.
    pub async fn rotate(&self) {
        *self.current.write() = generate();
        self.persist().await;
        info!("Admin secret rotated");
    }

    /// Constant-time comparison against the current secret.
    pub fn verify(&self, candidate: &str) -> bool {
        let current = self.current.read();
        current.as_bytes().ct_eq(candidate.as_bytes()).into()
    }

    async fn persist(&self) {
        let path = self.path.clone();
        let secret = self.current.read().clone();
        let result = tokio::task::spawn_blocking(move || write_atomic(&path, &secret)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to persist admin secret"),
            Err(e) => warn!(error = %e, "Admin secret writer task failed"),
        }
    }

    #[cfg(test)]
    pub fn current_for_tests(&self) -> String {
        self.current.read().clone()
    }
}

fn generate() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

/// Write via a temp file and rename so readers never see a torn secret.
fn write_atomic(path: &Path, secret: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, format!("{secret}\n"))?;
    std::fs::rename(&tmp, path)
}

/// Long-lived rotation task parked on a monotonic interval.
pub fn spawn_rotation_task(
    secret: Arc<AdminSecret>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; the secret already exists.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => secret.rotate().await,
                _ = shutdown.recv() => break,
            }
        }
    });
}
