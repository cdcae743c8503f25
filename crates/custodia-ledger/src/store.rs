//! Durable storage for [`LedgerSnapshot`]s.
//!
//! The engine persists a snapshot after every ledger transition while it
//! still holds the state lock, so whatever a store returns from `load` sits
//! on a transition boundary. Withdrawals are written ahead: the reservation
//! is durable before any asset leaves custody.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use custodia_types::{CustodiaError, Result};

use crate::snapshot::LedgerSnapshot;

pub trait StateStore: Send + Sync {
    /// The last persisted snapshot, or `None` on first start.
    fn load(&self) -> Result<Option<LedgerSnapshot>>;

    /// Replace the persisted snapshot.
    fn persist(&self, snapshot: &LedgerSnapshot) -> Result<()>;
}

// =================================================================
// MemoryStore
// =================================================================

/// Keeps the latest snapshot in memory. Survives engine restarts within one
/// process, which is what tests need.
///
/// Writes can be switched to fail to exercise storage outages.
#[derive(Debug, Default)]
pub struct MemoryStore {
    latest: Mutex<Option<LedgerSnapshot>>,
    writes: Mutex<u64>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `persist` calls.
    #[must_use]
    pub fn writes(&self) -> u64 {
        *self.writes.lock()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<LedgerSnapshot>> {
        Ok(self.latest.lock().clone())
    }

    fn persist(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CustodiaError::Storage("memory store writes disabled".into()));
        }
        *self.latest.lock() = Some(snapshot.clone());
        *self.writes.lock() += 1;
        Ok(())
    }
}

// =================================================================
// FileStore
// =================================================================

/// One JSON snapshot file, replaced atomically: write `<path>.tmp`, fsync,
/// rename over `<path>`.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl StateStore for FileStore {
    fn load(&self) -> Result<Option<LedgerSnapshot>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot on disk");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot = LedgerSnapshot::from_json(&bytes)?;
        info!(
            path = %self.path.display(),
            balances = snapshot.balances.len(),
            nonces = snapshot.nonces.len(),
            pending = snapshot.pending.len(),
            "Snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    fn persist(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let data = snapshot.to_json()?;
        let tmp = self.tmp_path();
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| {
            CustodiaError::Storage(format!(
                "rename {} -> {}: {e}",
                tmp.display(),
                self.path.display()
            ))
        })?;
        debug!(path = %self.path.display(), bytes = data.len(), "Snapshot persisted");
        Ok(())
    }
}
