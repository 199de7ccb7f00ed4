//! Credential persistence.
//!
//! A [`TokenStore`] is a tiny key/value holder for the access and refresh
//! tokens. Two keys are used everywhere, [`ACCESS_TOKEN_KEY`] and
//! [`REFRESH_TOKEN_KEY`]; nothing in the client reads a token from anywhere
//! else.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use storefront_core::TokenPair;
use thiserror::Error;

/// Key holding the access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Errors raised by persistent token stores.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    /// The backing file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The backing file exists but is not a JSON object of strings.
    #[error("corrupt token file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Persistent holder of the current credential.
///
/// No validation of token structure is performed on save.
pub trait TokenStore: Send + Sync {
    /// Persist `tokens`, replacing whatever was stored.
    ///
    /// # Errors
    ///
    /// Returns `TokenStoreError` if the backing storage cannot be written.
    fn save(&self, tokens: &TokenPair) -> Result<(), TokenStoreError>;

    /// The stored credential, if any.
    ///
    /// # Errors
    ///
    /// Returns `TokenStoreError` if the backing storage cannot be read.
    fn read(&self) -> Result<Option<TokenPair>, TokenStoreError>;

    /// Remove both tokens.
    ///
    /// # Errors
    ///
    /// Returns `TokenStoreError` if the backing storage cannot be written.
    fn clear(&self) -> Result<(), TokenStoreError>;
}

type Entries = BTreeMap<String, String>;

fn to_entries(tokens: &TokenPair) -> Entries {
    let mut entries = Entries::new();
    entries.insert(ACCESS_TOKEN_KEY.to_owned(), tokens.access.expose().to_owned());
    if let Some(refresh) = &tokens.refresh {
        entries.insert(REFRESH_TOKEN_KEY.to_owned(), refresh.expose().to_owned());
    }
    entries
}

fn from_entries(mut entries: Entries) -> Option<TokenPair> {
    let access = entries.remove(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())?;
    let refresh = entries.remove(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty());
    Some(TokenPair::new(access, refresh))
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local store; forgets everything when dropped.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<Entries>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `tokens`.
    #[must_use]
    pub fn with_tokens(tokens: &TokenPair) -> Self {
        Self {
            entries: Mutex::new(to_entries(tokens)),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TokenStore for MemoryTokenStore {
    fn save(&self, tokens: &TokenPair) -> Result<(), TokenStoreError> {
        *self.entries() = to_entries(tokens);
        Ok(())
    }

    fn read(&self) -> Result<Option<TokenPair>, TokenStoreError> {
        Ok(from_entries(self.entries().clone()))
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        let mut entries = self.entries();
        entries.remove(ACCESS_TOKEN_KEY);
        entries.remove(REFRESH_TOKEN_KEY);
        Ok(())
    }
}

// =============================================================================
// File store
// =============================================================================

/// JSON file holding `{"access_token": ..., "refresh_token": ...}`.
///
/// Other keys already present in the file are preserved. On Unix the file is
/// created with mode `0600`.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store backed by `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> TokenStoreError {
        TokenStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn load(&self) -> Result<Entries, TokenStoreError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Entries::new()),
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| TokenStoreError::Corrupt {
                    path: self.path.clone(),
                    source,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn write(&self, entries: &Entries) -> Result<(), TokenStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let bytes = serde_json::to_vec_pretty(entries).map_err(|source| {
            TokenStoreError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;

        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = self.path.with_extension("tmp");
        write_private(&tmp, &bytes).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::io::Write as _;
    use std::os::unix::fs::OpenOptionsExt as _;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::write(path, bytes)
}

impl TokenStore for FileTokenStore {
    fn save(&self, tokens: &TokenPair) -> Result<(), TokenStoreError> {
        let mut entries = self.load().unwrap_or_default();
        entries.remove(REFRESH_TOKEN_KEY);
        entries.extend(to_entries(tokens));
        self.write(&entries)
    }

    fn read(&self) -> Result<Option<TokenPair>, TokenStoreError> {
        Ok(from_entries(self.load()?))
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        let mut entries = match self.load() {
            Ok(entries) => entries,
            // An unreadable file holds no usable credential; overwrite it.
            Err(TokenStoreError::Corrupt { .. }) => Entries::new(),
            Err(e) => return Err(e),
        };
        let had_tokens = entries.remove(ACCESS_TOKEN_KEY).is_some()
            | entries.remove(REFRESH_TOKEN_KEY).is_some();
        if !had_tokens && !self.path.exists() {
            return Ok(());
        }
        self.write(&entries)
    }
}
