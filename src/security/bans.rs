//! Durable set of banned peer addresses.
//!
//! The in-memory set is the authoritative cache; the backing file is
//! rewritten in full on every mutation. Bans take effect immediately even
//! if the flush fails.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct BanStore {
    path: PathBuf,
    addrs: Mutex<HashSet<String>>,
}

impl BanStore {
    /// Load the persisted set. A missing file means no bans; lines that do
    /// not carry the `IP:` prefix are ignored.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut addrs = HashSet::new();
        match std::fs::read_to_string(&path) {
            Ok(raw) => {
                for line in raw.lines() {
                    if let Some(addr) = line.trim().strip_prefix("IP:") {
                        addrs.insert(addr.to_string());
                    }
                }
                info!(count = addrs.len(), path = %path.display(), "Loaded banned addresses");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read ban file");
            }
        }
        Self {
            path,
            addrs: Mutex::new(addrs),
        }
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.addrs.lock().contains(addr)
    }

    /// Ban an address and rewrite the backing file. The set is updated
    /// before the flush, so the ban holds even when persistence fails.
    pub async fn add(&self, addr: String) {
        let snapshot: Vec<String> = {
            let mut addrs = self.addrs.lock();
            addrs.insert(addr);
            addrs.iter().cloned().collect()
        };
        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || write_ban_file(&path, &snapshot)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to persist ban file"),
            Err(e) => warn!(error = %e, "Ban file writer task failed"),
        }
    }
}

fn write_ban_file(path: &Path, addrs: &[String]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    for addr in addrs {
        writeln!(file, "IP:{addr}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_no_bans() {
        let dir = tempfile::tempdir().unwrap();
        let store = BanStore::load(dir.path().join("banned.txt"));
        assert!(!store.contains("10.0.0.1"));
    }

    #[test]
    fn load_parses_ip_lines_and_ignores_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banned.txt");
        std::fs::write(&path, "IP:10.0.0.1\ngarbage\nHOST:example\n IP:10.0.0.2\n").unwrap();
        let store = BanStore::load(&path);
        assert!(store.contains("10.0.0.1"));
        assert!(store.contains("10.0.0.2"));
        assert!(!store.contains("example"));
    }

    #[tokio::test]
    async fn add_persists_the_whole_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banned.txt");
        let store = BanStore::load(&path);
        store.add("10.0.0.1".to_string()).await;
        store.add("10.0.0.2".to_string()).await;
        assert!(store.contains("10.0.0.1"));

        let reloaded = BanStore::load(&path);
        assert!(reloaded.contains("10.0.0.1"));
        assert!(reloaded.contains("10.0.0.2"));
    }
}
