//! Session directory registry.
//!
//! Each in-flight pairing attempt owns one directory under the configured
//! root, named deterministically from the phone number. The external
//! protocol library writes whatever credential files it needs in there;
//! this store only creates, reads, and deletes the directory itself.

use std::path::{Path, PathBuf};

use crate::error::SessionError;
use crate::phone::PhoneNumber;

/// Name of the credential file the protocol library persists.
pub const CREDS_FILE: &str = "creds.json";

/// Filesystem-backed registry of per-number session directories.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at `root`. The root itself is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory holding all session directories.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the session directory for a number.
    pub fn dir_for(&self, number: &PhoneNumber) -> PathBuf {
        self.root.join(number.session_dir_name())
    }

    /// Whether a session directory currently exists for a number.
    pub fn exists(&self, number: &PhoneNumber) -> bool {
        self.dir_for(number).is_dir()
    }

    /// Wipe any previous directory for the number and create a fresh one.
    ///
    /// A new pairing attempt always starts from an empty directory;
    /// last writer wins, leftovers from earlier attempts are never merged.
    pub fn prepare(&self, number: &PhoneNumber) -> Result<PathBuf, SessionError> {
        self.remove(number)?;
        let dir = self.dir_for(number);
        std::fs::create_dir_all(&dir).map_err(|source| SessionError::Io {
            number: number.to_string(),
            source,
        })?;
        Ok(dir)
    }

    /// Recursively delete the session directory for a number.
    ///
    /// Missing directories are fine; every exit path of a pairing attempt
    /// calls this and later calls must stay no-ops.
    pub fn remove(&self, number: &PhoneNumber) -> Result<(), SessionError> {
        let dir = self.dir_for(number);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionError::Io {
                number: number.to_string(),
                source,
            }),
        }
    }

    /// Remove a session directory by raw number string.
    ///
    /// Used by the cache sweeper, which only has the evicted key.
    pub fn remove_raw(&self, number: &str) -> Result<(), SessionError> {
        let dir = self.root.join(format!("session_{number}"));
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionError::Io {
                number: number.to_string(),
                source,
            }),
        }
    }

    /// Read the persisted credential file for a number.
    pub fn read_credentials(&self, number: &PhoneNumber) -> Result<Vec<u8>, SessionError> {
        let path = self.dir_for(number).join(CREDS_FILE);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SessionError::CredentialsNotFound {
                    number: number.to_string(),
                })
            }
            Err(source) => Err(SessionError::Io {
                number: number.to_string(),
                source,
            }),
        }
    }
}
