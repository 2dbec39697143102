//! Credential persistence
//!
//! Credentials are owned by a [`CredentialStore`]; only the auth flow
//! writes them. The file-backed store keeps one TOML file per
//! client/system pair under the platform config directory.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use directories::ProjectDirs;

use crate::config::Options;
use crate::error::{Error, Result};

use super::tokens::Credentials;

/// Durable key-value persistence for the credential record.
pub trait CredentialStore: Send + Sync {
    /// Stored credentials, if any.
    fn get(&self) -> Option<Credentials>;
    /// Replace the stored credentials.
    fn set(&self, credentials: &Credentials) -> Result<()>;
    /// Remove all stored credentials.
    fn clear(&self) -> Result<()>;
}

/// TOML file store, namespaced by client id and system id.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store under the platform config dir for the given account/system pair.
    pub fn for_options(options: &Options) -> Result<Self> {
        let proj_dirs = ProjectDirs::from("com", "nibe-poller", "nibe-poller")
            .ok_or_else(|| Error::Store("could not determine config directory".to_string()))?;
        let path = proj_dirs
            .config_dir()
            .join(format!("{}_{}.toml", options.client_id, options.system_id));
        Ok(Self { path })
    }

    /// Store backed by an explicit file path.
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    fn read(&self) -> anyhow::Result<Option<Credentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).context("Failed to read credential file")?;
        let credentials = toml::from_str(&content).context("Failed to parse credential file")?;
        Ok(Some(credentials))
    }
}

impl CredentialStore for FileStore {
    fn get(&self) -> Option<Credentials> {
        match self.read() {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::warn!("ignoring unreadable credential file: {:#}", e);
                None
            }
        }
    }

    fn set(&self, credentials: &Credentials) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::Store("credential path has no parent".to_string()))?;
        fs::create_dir_all(dir)
            .map_err(|e| Error::Store(format!("failed to create config directory: {}", e)))?;

        let content = toml::to_string_pretty(credentials)
            .map_err(|e| Error::Store(format!("failed to serialize credentials: {}", e)))?;
        fs::write(&self.path, content)
            .map_err(|e| Error::Store(format!("failed to write credential file: {}", e)))?;

        // Restrictive permissions, the file contains tokens.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.path, perms)
                .map_err(|e| Error::Store(format!("failed to set file permissions: {}", e)))?;
        }

        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Store(format!(
                "failed to remove credential file: {}",
                e
            ))),
        }
    }
}

/// In-memory store for tests and embedders that manage persistence themselves.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Option<Credentials>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded store.
    pub fn with(credentials: Credentials) -> Self {
        Self {
            inner: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self) -> Option<Credentials> {
        self.inner.lock().unwrap().clone()
    }

    fn set(&self, credentials: &Credentials) -> Result<()> {
        *self.inner.lock().unwrap() = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.inner.lock().unwrap() = None;
        Ok(())
    }
}
