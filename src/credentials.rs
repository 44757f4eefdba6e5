//! API key persistence
//!
//! The pane only ever stores one secret, under the fixed identifier
//! [`API_KEY_ID`]. Reads never fail: anything unreadable counts as "no key".

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Entry name the key is stored under
pub const API_KEY_ID: &str = "apiKey";

/// Persistent home for the API key
pub trait CredentialStore: Send + Sync {
    /// Previously saved key, if any
    fn load(&self) -> Option<String>;

    /// Persist `key`, replacing whatever was there
    fn save(&self, key: &str) -> Result<()>;

    /// Forget the key
    fn clear(&self) -> Result<()>;
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

// ═══════════════════════════════════════════════════════════════
// FILE STORE
// ═══════════════════════════════════════════════════════════════

/// JSON object file of string entries, written owner-only
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at ~/.config/draftpane/credentials.json
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(crate::config::credentials_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(entries)?;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        // mode() only applies on creation; tighten a file that already existed
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict {}", self.path.display()))?;
        }

        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<String> {
        match self.read_entries() {
            Ok(mut entries) => entries.remove(API_KEY_ID).and_then(non_blank),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable credential store");
                None
            }
        }
    }

    fn save(&self, key: &str) -> Result<()> {
        // Unreadable content is replaced rather than blocking the save
        let mut entries = self.read_entries().unwrap_or_default();
        entries.insert(API_KEY_ID.to_string(), key.to_string());
        self.write_entries(&entries)?;
        debug!(path = %self.path.display(), "api key saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        // A corrupt file is replaced with an empty object
        let mut entries = self.read_entries().unwrap_or_default();
        entries.remove(API_KEY_ID);
        self.write_entries(&entries)?;
        debug!(path = %self.path.display(), "api key cleared");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
// MEMORY STORE
// ═══════════════════════════════════════════════════════════════

/// Process-local store, lost on exit
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    key: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: &str) -> Self {
        Self {
            key: Mutex::new(Some(key.to_string())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<String> {
        let guard = match self.key.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone().and_then(non_blank)
    }

    fn save(&self, key: &str) -> Result<()> {
        let mut guard = self
            .key
            .lock()
            .map_err(|_| anyhow::anyhow!("credential store lock poisoned"))?;
        *guard = Some(key.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .key
            .lock()
            .map_err(|_| anyhow::anyhow!("credential store lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}
