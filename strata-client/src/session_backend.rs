//! Where a [`PersistedSession`] lives between runs.
//!
//! * [`BinaryFileBackend`]: one file in the binary session format (default).
//! * [`InMemoryBackend`]: process memory only, for tests and throwaway sessions.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::session::PersistedSession;

// ─── Trait ────────────────────────────────────────────────────────────────────

/// Storage for one session.
pub trait SessionBackend: Send + Sync {
    /// Replace the stored session.
    fn save(&self, session: &PersistedSession) -> io::Result<()>;

    /// The stored session, or `None` if nothing was saved yet.
    fn load(&self) -> io::Result<Option<PersistedSession>>;

    /// Forget the stored session.  Deleting nothing is not an error.
    fn delete(&self) -> io::Result<()>;

    /// Short name for log messages.
    fn name(&self) -> &str;
}

// ─── BinaryFileBackend ────────────────────────────────────────────────────────

/// Session file on disk.
///
/// Saves go through a sibling `.tmp` file that is renamed over the target,
/// so a crash mid-write leaves the previous session intact.
pub struct BinaryFileBackend {
    path: PathBuf,
}

impl BinaryFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionBackend for BinaryFileBackend {
    fn save(&self, session: &PersistedSession) -> io::Result<()> {
        let tmp = self.tmp_path();
        session.save(&tmp)?;
        fs::rename(&tmp, &self.path)
    }

    fn load(&self) -> io::Result<Option<PersistedSession>> {
        match PersistedSession::load(&self.path) {
            Ok(session) => Ok(Some(session)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn delete(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str { "binary-file" }
}

// ─── InMemoryBackend ─────────────────────────────────────────────────────────

/// Keeps the session in memory; it is gone when the process exits.
#[derive(Default)]
pub struct InMemoryBackend {
    data: Mutex<Option<PersistedSession>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PersistedSession>> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionBackend for InMemoryBackend {
    fn save(&self, session: &PersistedSession) -> io::Result<()> {
        *self.lock() = Some(session.clone());
        Ok(())
    }

    fn load(&self) -> io::Result<Option<PersistedSession>> {
        Ok(self.lock().clone())
    }

    fn delete(&self) -> io::Result<()> {
        *self.lock() = None;
        Ok(())
    }

    fn name(&self) -> &str { "in-memory" }
}
