// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout and persistence.
//!
//! Specify the layout of the configuration file that the installer writes, and
//! that every subcommand reads. The file is a single JSON object:
//!
//! ```text
//! {
//!   "github_username": "alice",
//!   "github_token": "ghp_...",
//!   "clone_directory": "~/mygit-repos"
//! }
//! ```
//!
//! Additional optional fields tune the hosting service and network behavior,
//! but a file holding only the three fields above is always valid.
//!
//! # Persistence
//!
//! The configuration file is only readable by its owner (mode 600), and its
//! parent directory is only traversable by its owner (mode 700). Writes are
//! always full overwrites done through a temporary file that is renamed into
//! place, so an interrupted write never leaves a half-written configuration
//! behind.

use crate::path::DEFAULT_CLONE_DIRECTORY;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::{debug, instrument};

/// Fixed-length marker printed in place of a token.
pub const REDACTION_MARKER: &str = "****************";

/// Connector configuration layout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Login name at the hosting service.
    #[serde(rename = "github_username", default)]
    pub username: String,

    /// Personal access token for the hosting service.
    #[serde(rename = "github_token", default)]
    pub token: SecretToken,

    /// Directory that holds all local clones.
    #[serde(default = "default_clone_directory")]
    pub clone_directory: PathBuf,

    /// Host of the hosting service used to build remote URLs.
    #[serde(default = "default_host")]
    pub host: String,

    /// Base URL of the hosting service REST API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Validate token against the hosting service before network operations.
    #[serde(default)]
    pub validate_token: bool,

    /// Ask before continuing when token belongs to a different login.
    #[serde(default)]
    pub confirm_identity_mismatch: bool,

    /// Upper bound on network operations in seconds.
    #[serde(default = "default_network_timeout_secs")]
    pub network_timeout_secs: u64,
}

impl Config {
    /// Construct new configuration from the three base fields.
    ///
    /// Everything else takes its default value.
    pub fn new(
        username: impl Into<String>,
        token: impl Into<SecretToken>,
        clone_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
            clone_directory: clone_directory.into(),
            host: default_host(),
            api_url: default_api_url(),
            validate_token: false,
            confirm_identity_mismatch: false,
            network_timeout_secs: default_network_timeout_secs(),
        }
    }

    /// Obtain credentials for network operations.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::MissingCredentials`] if username or token are
    ///   empty.
    pub fn credentials(&self) -> Result<Credentials> {
        if self.username.trim().is_empty() || self.token.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }

        Ok(Credentials {
            username: self.username.clone(),
            token: self.token.clone(),
        })
    }

    /// Network timeout as a [`Duration`].
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs.max(1))
    }

    /// Human readable summary that never reveals the token.
    pub fn summary(&self) -> ConfigSummary<'_> {
        ConfigSummary { config: self }
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: Config = serde_json::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on clone directory field.
        config.clone_directory = PathBuf::from(
            shellexpand::full(config.clone_directory.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );

        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.summary(), fmt)
    }
}

/// Redacted view of a [`Config`] for display purposes.
#[derive(Debug)]
pub struct ConfigSummary<'a> {
    config: &'a Config,
}

impl Display for ConfigSummary<'_> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let token_state = if self.config.token.is_empty() {
            "not configured"
        } else {
            "configured"
        };

        writeln!(fmt, "GitHub Username: {}", self.config.username)?;
        writeln!(fmt, "GitHub Token:    {REDACTION_MARKER} ({token_state})")?;
        writeln!(
            fmt,
            "Clone Directory: {}",
            self.config.clone_directory.display()
        )?;
        writeln!(fmt, "Host:            {}", self.config.host)
    }
}

/// Token that refuses to show itself.
///
/// Only serialization and [`SecretToken::expose`] reveal the raw value. Both
/// [`Debug`] and [`Display`] print a fixed-length redaction marker.
#[derive(Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SecretToken(String);

impl SecretToken {
    /// Construct new secret token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Reveal raw token value.
    ///
    /// Only hand this to the credential callback or an HTTP authorization
    /// header, never to a log line or error message.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if token is empty.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for SecretToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for SecretToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl Debug for SecretToken {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "SecretToken({REDACTION_MARKER})")
    }
}

impl Display for SecretToken {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(REDACTION_MARKER)
    }
}

/// Username and token pair used to authenticate against the hosting service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub token: SecretToken,
}

impl Credentials {
    /// Construct new credentials.
    pub fn new(username: impl Into<String>, token: impl Into<SecretToken>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    /// Scrub credentials from arbitrary text.
    ///
    /// Replaces the raw token, and any `user:token@` userinfo, with `***`.
    /// Used on every message that comes back from external tools before it
    /// is stored in an error or logged.
    pub fn redact(&self, text: impl AsRef<str>) -> String {
        let mut text = text.as_ref().to_string();
        let token = self.token.expose();
        if !token.is_empty() {
            let userinfo = format!("{}:{token}@", self.username);
            text = text.replace(&userinfo, "***@");
            text = text.replace(token, "***");
        }

        text
    }
}

/// Load configuration file.
///
/// # Errors
///
/// - Return [`ConfigError::NotFound`] if configuration file does not exist.
/// - Return [`ConfigError::Read`] if configuration file cannot be read.
/// - Return [`ConfigError::Deserialize`] if configuration file is malformed.
#[instrument(level = "debug")]
pub fn read_config(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => ConfigError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ConfigError::Read {
            source: err,
            path: path.to_path_buf(),
        },
    })?;
    debug!("loaded configuration from {}", path.display());

    data.parse()
}

/// Write configuration file atomically.
///
/// Serializes the full configuration into a temporary file next to the
/// target, flushes it to disk, and renames it over the target. Creates a
/// missing parent directory with owner-only permissions, but leaves the
/// permissions of an existing one alone.
///
/// # Errors
///
/// - Return [`ConfigError::Write`] if any file system operation fails.
/// - Return [`ConfigError::Serialize`] if configuration cannot be serialized.
#[instrument(skip(config), level = "debug")]
pub fn write_config(path: &Path, config: &Config) -> Result<()> {
    let write_err = |source: std::io::Error| ConfigError::Write {
        source,
        path: path.to_path_buf(),
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    // INVARIANT: Only tighten permissions of a directory created here.
    if !parent.exists() {
        mkdirp::mkdirp(&parent).map_err(write_err)?;
        restrict_dir_permissions(&parent).map_err(write_err)?;
    }

    let data = serde_json::to_string_pretty(config).map_err(ConfigError::Serialize)? + "\n";
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config.json".into());
    let tmp_path = parent.join(format!(".{file_name}.tmp-{}", std::process::id()));

    let result = write_private_file(&tmp_path, data.as_bytes())
        .and_then(|_| fs::rename(&tmp_path, path));
    if let Err(err) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(write_err(err));
    }
    debug!("wrote configuration to {}", path.display());

    Ok(())
}

fn write_private_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(unix)]
fn restrict_dir_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn restrict_dir_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn default_clone_directory() -> PathBuf {
    PathBuf::from(DEFAULT_CLONE_DIRECTORY)
}

fn default_host() -> String {
    "github.com".into()
}

fn default_api_url() -> String {
    "https://api.github.com".into()
}

fn default_network_timeout_secs() -> u64 {
    30
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file does not exist.
    #[error("configuration not found at {path:?}, run the installer or 'mygit config set' first")]
    NotFound { path: PathBuf },

    /// Username or token not set.
    #[error("configuration has no username or token, run 'mygit config set' first")]
    MissingCredentials,

    /// Configuration file cannot be read.
    #[error("failed to read configuration at {path:?}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Configuration file cannot be written.
    #[error("failed to write configuration at {path:?}")]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error("invalid configuration file: {0}")]
    Deserialize(#[source] serde_json::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(serde_json::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
