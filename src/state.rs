use crate::resource::account::AccountRecord;
use crate::resource::content::ContentRecord;
use crate::resource::room::RoomRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::RecordChange;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// State Structures
// ============================================================================

/// Records of every resource mxform manages, keyed by label
///
/// Records hold access tokens, so the file is written owner-only.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MxformState {
    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,

    /// Accounts (`user.*`)
    #[serde(default)]
    pub users: BTreeMap<String, AccountRecord>,

    /// Media (`content.*`)
    #[serde(default)]
    pub content: BTreeMap<String, ContentRecord>,

    /// Rooms (`room.*`)
    #[serde(default)]
    pub rooms: BTreeMap<String, RoomRecord>,

    #[serde(skip)]
    path: PathBuf,
}

// ============================================================================
// MxformState Implementation
// ============================================================================

impl MxformState {
    /// Default state file for a manifest: `<stem>.state.toml` beside it
    pub fn path_for_manifest(manifest: &Path) -> PathBuf {
        let stem = manifest
            .file_stem()
            .map_or_else(|| "mxform".into(), |s| s.to_string_lossy());
        manifest.with_file_name(format!("{stem}.state.toml"))
    }

    /// Empty state bound to `path`
    pub fn new(path: &Path) -> Self {
        Self {
            last_updated: Utc::now(),
            users: BTreeMap::new(),
            content: BTreeMap::new(),
            rooms: BTreeMap::new(),
            path: path.to_path_buf(),
        }
    }

    /// Load state from disk, or return empty state if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file {} does not exist, using empty state", path.display());
            return Ok(Self::new(path));
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let mut state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
        state.path = path.to_path_buf();

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save state to disk
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(&self).context("Failed to serialize state to TOML")?;

        write_private(&self.path, &content)
            .with_context(|| format!("Failed to write state file: {}", self.path.display()))?;

        log::debug!("Saved state to {}", self.path.display());
        Ok(())
    }

    /// Update the last_updated timestamp and save
    pub fn touch(&mut self) -> Result<()> {
        self.last_updated = Utc::now();
        self.save()
    }

    /// Number of recorded resources across all kinds
    pub fn len(&self) -> usize {
        self.users.len() + self.content.len() + self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Apply a record change to one kind's records
pub fn store<R>(records: &mut BTreeMap<String, R>, label: &str, change: RecordChange<R>) {
    match change {
        RecordChange::Store(record) => {
            records.insert(label.to_string(), record);
        }
        RecordChange::Remove => {
            records.remove(label);
        }
        RecordChange::Keep => {}
    }
}

/// Write a file that only its owner can read, from the moment it is created
#[cfg(unix)]
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies to newly created files.
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(content.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    fs::write(path, content)
}

// ============================================================================
// Tests
// ============================================================================
