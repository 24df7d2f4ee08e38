use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::warn;

/// Persisted map of sheet name → checksum of the last-synced CSV text.
pub type SyncState = HashMap<String, String>;

/// Store for the sync state, abstracted so tests can run without real files.
pub trait StateStore: Send + Sync {
    /// Load the last persisted state. Missing or corrupt data yields an
    /// empty map rather than an error; the only cost is re-converting sheets
    /// that were already synced.
    fn load(&self) -> SyncState;

    /// Replace the persisted state in full.
    fn save(&self, state: &SyncState) -> Result<()>;
}

/// JSON-file-backed store: a single object of name → checksum pairs.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    /// Open a store at `path`, creating parent directories up front so an
    /// unusable location fails at startup rather than after a full pass.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path: PathBuf = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating state directory {}", parent.display()))?;
        }
        Ok(Self { path })
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> SyncState {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(_) => return SyncState::new(),
        };
        match serde_json::from_str(&text) {
            Ok(state) => state,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "state file unreadable, starting fresh");
                SyncState::new()
            }
        }
    }

    fn save(&self, state: &SyncState) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).context("creating state temp file")?;
        serde_json::to_writer_pretty(&mut tmp, state).context("serializing sync state")?;
        tmp.write_all(b"\n").context("writing sync state")?;
        tmp.persist(&self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
