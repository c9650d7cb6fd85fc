//! Credential storage.
//!
//! The gateway credential set (endpoint, token, device token, device id) is
//! loaded once at client construction and written back whenever it changes:
//! device-id generation before the first handshake, device-token rotation
//! after a successful one. The file store writes
//! `~/.molt/credentials.json` with 0o600 permissions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current credentials file schema version.
const CREDENTIALS_VERSION: u32 = 1;

/// Default credentials file name.
const CREDENTIALS_FILE_NAME: &str = "credentials.json";

/// Errors raised by credential stores.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Filesystem failure reading or writing the credentials file.
    #[error("credentials io error: {0}")]
    Io(#[from] std::io::Error),

    /// The credentials file is not valid JSON.
    #[error("credentials parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The persisted gateway credential set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Credentials {
    /// Gateway endpoint URL, when the user overrode the configured default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Shared gateway token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Device token rotated by the gateway on each successful handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
    /// Persistent device identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl Credentials {
    /// Whether enough is configured to attempt a connection.
    pub fn is_configured(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// On-disk envelope around [`Credentials`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsFile {
    version: u32,
    #[serde(flatten)]
    credentials: Credentials,
    last_updated: String,
}

/// Seam between the engine and wherever credentials live.
///
/// The engine only ever loads the whole set and stores the whole set; the
/// storage format is opaque to it.
pub trait CredentialStore: Send + Sync {
    /// Load the current credential set. A missing or unreadable backing
    /// store yields the empty set.
    fn load(&self) -> Credentials;

    /// Persist the credential set, replacing the previous one.
    fn store(&self, credentials: &Credentials) -> Result<(), CredentialError>;
}

impl<S: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<S> {
    fn load(&self) -> Credentials {
        (**self).load()
    }

    fn store(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        (**self).store(credentials)
    }
}

/// File-backed credential store.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store backed by the default location (`~/.molt/credentials.json`).
    pub fn default_location() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        Self::new(PathBuf::from(home).join(".molt").join(CREDENTIALS_FILE_NAME))
    }

    /// Path this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Credentials {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Credentials::default(),
            Err(e) => {
                tracing::warn!("failed to read credentials file: {e}");
                return Credentials::default();
            }
        };

        match serde_json::from_str::<CredentialsFile>(&data) {
            Ok(file) if file.version == CREDENTIALS_VERSION => file.credentials,
            Ok(file) => {
                tracing::warn!("unsupported credentials version: {}", file.version);
                Credentials::default()
            }
            Err(e) => {
                tracing::warn!("failed to parse credentials file: {e}");
                Credentials::default()
            }
        }
    }

    fn store(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = CredentialsFile {
            version: CREDENTIALS_VERSION,
            credentials: credentials.clone(),
            last_updated: chrono::Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, &json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&self.path, perms);
        }

        Ok(())
    }
}

/// In-memory credential store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: parking_lot::Mutex<Credentials>,
}

impl MemoryCredentialStore {
    /// Empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with an initial credential set.
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: parking_lot::Mutex::new(credentials),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Credentials {
        self.credentials.lock().clone()
    }

    fn store(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        *self.credentials.lock() = credentials.clone();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
