//! Persisted daemon state.
//!
//! The usage ledger, the last chat exchange and the runtime settings survive
//! restarts. They live in one JSON file (`~/.markpilot/state.json` by
//! default) that is loaded at startup and replaced after every mutation.
//! Cached completions are never persisted.

// Author: kelexine (https://github.com/kelexine)

use crate::client::ChatMessage;
use crate::config::Settings;
use crate::error::{PilotError, Result};
use crate::ledger::{Clock, CostLedger, CostLedgerState};
use chrono::Duration;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Usage older than this is dropped when the state is opened.
const USAGE_RETENTION_DAYS: i64 = 400;

/// The most recent chat conversation and the answer to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatHistory {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub response: String,
}

/// On-disk layout of the state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub usage: CostLedgerState,
    #[serde(default)]
    pub chat_history: ChatHistory,
    /// Toggles changed at runtime. Absent until the first change.
    #[serde(default)]
    pub settings: Option<Settings>,
}

impl PersistedState {
    /// Reads the state file. A missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No state file at {}, starting fresh", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| PilotError::State(format!("Failed to read {}: {}", path.display(), e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| PilotError::State(format!("Invalid state file {}: {}", path.display(), e)))
    }

    /// Writes the state file, readable by the owner only.
    ///
    /// The new contents go to a temporary file in the same directory which
    /// then replaces the old file, so a failed write leaves the previous
    /// state intact.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PilotError::State(format!("Serialization failure: {}", e)))?;

        let mut file = NamedTempFile::new_in(parent)
            .map_err(|e| PilotError::State(format!("Failed to create temp file in {}: {}", parent.display(), e)))?;

        file.write_all(json.as_bytes())
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| PilotError::State(format!("Disk write failure: {}", e)))?;

        #[cfg(unix)]
        {
            fs::set_permissions(file.path(), fs::Permissions::from_mode(0o600))?;
        }

        file.persist(path)
            .map_err(|e| PilotError::State(format!("Failed to replace {}: {}", path.display(), e.error)))?;

        Ok(())
    }
}

/// Owns the live ledger, chat history and settings and writes them back to
/// disk.
pub struct StateStore {
    path: PathBuf,
    ledger: Arc<CostLedger>,
    chat_history: RwLock<ChatHistory>,
    settings: RwLock<Option<Settings>>,
    /// Serializes writers so an older snapshot never overwrites a newer one.
    write_lock: Mutex<()>,
}

impl StateStore {
    /// Loads the state at `path` and resumes the ledger from it.
    pub fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.into();
        let state = PersistedState::load(&path)?;

        let ledger = CostLedger::from_state(state.usage, clock.clone());
        let cutoff = clock.today() - Duration::days(USAGE_RETENTION_DAYS);
        let pruned = ledger.prune_before(cutoff);
        if pruned > 0 {
            info!("Pruned {} days of usage history before {}", pruned, cutoff);
        }

        Ok(Self {
            path,
            ledger: Arc::new(ledger),
            chat_history: RwLock::new(state.chat_history),
            settings: RwLock::new(state.settings),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ledger(&self) -> Arc<CostLedger> {
        self.ledger.clone()
    }

    pub fn chat_history(&self) -> ChatHistory {
        self.chat_history.read().clone()
    }

    /// Settings saved by an earlier run, if any were ever changed.
    pub fn settings(&self) -> Option<Settings> {
        self.settings.read().clone()
    }

    /// Replaces the stored settings and saves.
    pub fn record_settings(&self, settings: Settings) -> Result<()> {
        *self.settings.write() = Some(settings);
        self.save()
    }

    /// Replaces the stored conversation and saves.
    pub fn record_chat(&self, messages: Vec<ChatMessage>, response: String) -> Result<()> {
        *self.chat_history.write() = ChatHistory { messages, response };
        self.save()
    }

    pub fn clear_chat_history(&self) -> Result<()> {
        *self.chat_history.write() = ChatHistory::default();
        info!("Chat history cleared");
        self.save()
    }

    /// Writes the current ledger and chat history to disk.
    pub fn save(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        let state = PersistedState {
            usage: self.ledger.snapshot(),
            chat_history: self.chat_history(),
            settings: self.settings(),
        };
        state.save(&self.path)?;
        debug!("Saved state to {}", self.path.display());
        Ok(())
    }

    /// Like [`save`](Self::save), but only logs failures.
    pub fn save_or_warn(&self) {
        if let Err(e) = self.save() {
            warn!("Failed to persist state: {}", e);
        }
    }

    /// Saves on the blocking pool without waiting for the write. Must be
    /// called within a tokio runtime.
    pub fn save_in_background(self: &Arc<Self>) -> JoinHandle<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.save_or_warn())
    }
}
