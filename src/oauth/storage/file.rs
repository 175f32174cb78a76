//! File-backed store with secure permissions.
//!
//! All keys live in one JSON object on disk, with:
//! - File permissions set to 0600 on Unix (owner read/write only)
//! - Parent directories created with 0700 permissions
//! - Automatic `~` expansion to home directory
//! - Atomic writes via temp file + rename
//! - An unreadable file reads as empty and is replaced on the next write

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

use super::KeyValueStore;
use crate::oauth::error::{Error, Result};

/// Application directory under the platform data directory.
const APP_DIR: &str = "bloggate";

/// Default store file name.
const STORE_FILE: &str = "session.json";

/// File permissions for the store file (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

type Entries = BTreeMap<String, String>;

/// File-backed key-value store.
///
/// # File Format
///
/// ```json
/// {
///   "google:session": "{\"access_token\":\"...\",...}",
///   "google:user_record": "{\"id\":\"...\",...}"
/// }
/// ```
///
/// The file is rewritten in full on every change. Clones share a write lock,
/// so their read-modify-write cycles do not interleave. Separate processes
/// are not coordinated; a single CLI instance is assumed.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Create a store at `path`. A leading `~` expands to the home directory.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the path starts with `~` and the home
    /// directory cannot be determined.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = expand_tilde(path.as_ref())?;
        Ok(Self::at(path))
    }

    /// Store under the platform data directory
    /// (`~/.local/share/bloggate/session.json` on Linux).
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the data directory cannot be determined.
    pub fn default_path() -> Result<Self> {
        let dir = dirs::data_dir()
            .ok_or_else(|| Error::config("Cannot determine data directory"))?;
        Ok(Self::at(dir.join(APP_DIR).join(STORE_FILE)))
    }

    fn at(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed file contents, or `None` if the file exists but is not a JSON
    /// object of strings.
    async fn read_file(&self) -> Result<Option<Entries>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Some(Entries::new())),
            Err(e) => {
                return Err(Error::storage(format!(
                    "Failed to read store file '{}': {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(Some(Entries::new()));
        }

        match serde_json::from_str(&content) {
            Ok(entries) => Ok(Some(entries)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Store file is unreadable, treating it as empty");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, entries))]
    async fn write_file(&self, entries: &Entries) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Error::storage(format!(
                        "Failed to create directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(DIR_MODE);
                    tokio::fs::set_permissions(parent, perms)
                        .await
                        .map_err(|e| {
                            Error::storage(format!(
                                "Failed to set directory permissions on '{}': {}",
                                parent.display(),
                                e
                            ))
                        })?;
                }
            }
        }

        let content = serde_json::to_string_pretty(entries)?;

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &content).await.map_err(|e| {
            Error::storage(format!(
                "Failed to write temp file '{}': {}",
                temp_path.display(),
                e
            ))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(FILE_MODE);
            tokio::fs::set_permissions(&temp_path, perms)
                .await
                .map_err(|e| {
                    Error::storage(format!(
                        "Failed to set file permissions on '{}': {}",
                        temp_path.display(),
                        e
                    ))
                })?;
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(Error::storage(format!(
                "Failed to rename '{}' to '{}': {}",
                temp_path.display(),
                self.path.display(),
                e
            )));
        }

        Ok(())
    }

    async fn remove_file(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(format!(
                "Failed to remove store file '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_file().await?.and_then(|mut entries| entries.remove(key)))
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_file().await?.unwrap_or_default();
        entries.insert(key.to_string(), value.to_string());
        self.write_file(&entries).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !self.path.exists() {
            return Ok(());
        }

        let Some(mut entries) = self.read_file().await? else {
            return self.remove_file().await;
        };
        if entries.remove(key).is_none() {
            return Ok(());
        }

        if entries.is_empty() {
            self.remove_file().await
        } else {
            self.write_file(&entries).await
        }
    }
}

/// Expand `~` prefix to user's home directory.
fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();
    if let Some(rest) = path_str.strip_prefix('~') {
        let home =
            dirs::home_dir().ok_or_else(|| Error::config("Cannot determine home directory"))?;
        if rest.is_empty() {
            Ok(home)
        } else {
            let rest = rest.strip_prefix('/').unwrap_or(rest);
            Ok(home.join(rest))
        }
    } else {
        Ok(path.to_path_buf())
    }
}
