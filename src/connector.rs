// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Credential-scoped repository connector.
//!
//! The [`Connector`] turns a repository reference plus the loaded
//! configuration into version control operations and script execution:
//!
//! - __clone__: fetch a repository into the clone store.
//! - __pull__: integrate remote changes into an existing clone.
//! - __run__: execute a script from a clone, cloning it first if needed.
//! - __list__: enumerate the clones in the clone store.
//!
//! Every network operation runs inside a [`CredentialScope`], so no clone is
//! ever left with credentials in its persisted origin URL. Every message that
//! comes back from the version control client is redacted before it becomes
//! part of a [`ConnectorError`].

use crate::{
    config::{Config, ConfigError},
    forge::{ForgeError, HostingApi, HttpClient, Identity},
    git::{CredentialScope, Git2Client, GitError, VersionControl},
    prompt::{Confirm, PromptError},
    repo::{RefError, RepoRef},
    store::{CloneStore, LocalClone, StoreError},
};

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};
use tracing::{debug, info, instrument, warn};

/// Options for [`Connector::clone_repo`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CloneOptions {
    /// Remove existing destination before cloning.
    pub force: bool,
}

/// Options for [`Connector::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Skip confirmation prompt.
    pub yes: bool,
}

/// Repository connector.
///
/// Owns the configuration for the lifetime of one invocation, and reaches
/// version control only through `V`.
pub struct Connector<V = Git2Client>
where
    V: VersionControl,
{
    config: Config,
    store: CloneStore,
    vcs: V,
}

impl<V> Connector<V>
where
    V: VersionControl,
{
    /// Construct new connector.
    pub fn new(config: Config, vcs: V) -> Self {
        let store = CloneStore::open(&config.clone_directory);
        Self { config, store, vcs }
    }

    /// Loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Clone store backing this connector.
    pub fn store(&self) -> &CloneStore {
        &self.store
    }

    /// Version control client backing this connector.
    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Locate existing local clone of target repository.
    pub fn locate(&self, reference: &RepoRef) -> Option<PathBuf> {
        self.store.locate(&self.vcs, reference)
    }

    /// Clone target repository into clone store.
    ///
    /// Returns path to the new local clone. The destination is either fully
    /// cloned with a credential-free origin URL, or absent.
    ///
    /// # Errors
    ///
    /// - Return [`ConnectorError::ConfigurationMissing`] if username or token
    ///   are not configured.
    /// - Return [`ConnectorError::DestinationExists`] if the destination
    ///   exists and `force` is not set.
    /// - Return [`ConnectorError::NetworkTimeout`] if the remote stops
    ///   responding.
    /// - Return [`ConnectorError::CloneFailed`] if cloning fails otherwise.
    #[instrument(skip(self), level = "debug")]
    pub fn clone_repo(&self, reference: &RepoRef, opts: CloneOptions) -> Result<PathBuf> {
        let credentials = self.config.credentials()?;
        let dest = self.store.placement(&self.vcs, reference);

        if dest.exists() {
            if !opts.force {
                return Err(ConnectorError::DestinationExists { path: dest });
            }

            info!("remove existing directory {}", dest.display());
            if let Err(error) = fs::remove_dir_all(&dest) {
                warn!("cannot remove {}: {error}", dest.display());
            }
        }

        mkdirp::mkdirp(self.store.root()).map_err(|source| ConnectorError::Io {
            source,
            path: self.store.root().to_path_buf(),
        })?;

        let url = reference.https_url(&self.config.host);
        info!("cloning {reference} into {}", dest.display());
        let scope = CredentialScope::acquire(&self.vcs, dest.clone(), url.as_str(), &credentials);
        match self.vcs.clone_repo(&url, &dest, scope.credentials()) {
            Ok(()) => {}
            // INVARIANT: Someone else's directory appeared meanwhile, leave it be.
            Err(GitError::DestinationExists) => {
                scope.disarm();
                return Err(ConnectorError::DestinationExists { path: dest });
            }
            Err(error) => {
                remove_partial_clone(&dest);
                return Err(match error {
                    GitError::Timeout(message) => ConnectorError::NetworkTimeout {
                        message: credentials.redact(message),
                    },
                    error => ConnectorError::CloneFailed {
                        reference: reference.clone(),
                        message: credentials.redact(error.to_string()),
                    },
                });
            }
        }
        drop(scope);

        info!("cloned {reference} into {}", dest.display());
        Ok(dest)
    }

    /// Pull latest changes of target repository into its local clone.
    ///
    /// Never clones. Returns the report of the version control client.
    ///
    /// # Errors
    ///
    /// - Return [`ConnectorError::ConfigurationMissing`] if username or token
    ///   are not configured.
    /// - Return [`ConnectorError::NotCloned`] if there is no local clone.
    /// - Return [`ConnectorError::NetworkTimeout`] if the remote stops
    ///   responding.
    /// - Return [`ConnectorError::PullFailed`] if fetching or merging fails.
    #[instrument(skip(self), level = "debug")]
    pub fn pull(&self, reference: &RepoRef) -> Result<String> {
        let credentials = self.config.credentials()?;
        let path = self
            .locate(reference)
            .ok_or_else(|| ConnectorError::NotCloned {
                reference: reference.clone(),
            })?;

        info!("pulling latest changes for {reference}");
        let url = reference.https_url(&self.config.host);
        let scope = CredentialScope::acquire(&self.vcs, path.clone(), url, &credentials);
        let report = self
            .vcs
            .pull(&path, scope.credentials())
            .map_err(|error| match error {
                GitError::Timeout(message) => ConnectorError::NetworkTimeout {
                    message: credentials.redact(message),
                },
                error => ConnectorError::PullFailed {
                    reference: reference.clone(),
                    message: credentials.redact(error.to_string()),
                },
            })?;
        drop(scope);

        Ok(credentials.redact(report))
    }

    /// Run script from local clone of target repository.
    ///
    /// Clones the repository first if there is no local clone, but never pulls
    /// an existing one. Unless `yes` is set, asks for confirmation through
    /// `confirm` first. The script runs with the clone root as its working
    /// directory, inherits standard streams, and receives `args` verbatim.
    ///
    /// Returns the exit code of the script.
    ///
    /// # Errors
    ///
    /// - Return any error of [`Connector::clone_repo`] if cloning is needed.
    /// - Return [`ConnectorError::ScriptNotFound`] if the script does not
    ///   exist, or resolves outside the clone.
    /// - Return [`ConnectorError::PermissionDenied`] if the script is not
    ///   executable.
    /// - Return [`ConnectorError::AbortedByUser`] if the user declines.
    #[instrument(skip(self, confirm), level = "debug")]
    pub fn run(
        &self,
        reference: &RepoRef,
        script: &str,
        args: &[String],
        opts: RunOptions,
        confirm: &impl Confirm,
    ) -> Result<i32> {
        let root = match self.locate(reference) {
            Some(root) => root,
            None => {
                info!("{reference} is not cloned yet");
                self.clone_repo(reference, CloneOptions::default())?
            }
        };

        let script_path = resolve_script(&root, script)?;
        ensure_executable(&script_path)?;

        if !opts.yes {
            let question = format!(
                "Run {} from {reference}?",
                command_line(&script_path, args)
            );
            if !confirm.confirm(&question)? {
                return Err(ConnectorError::AbortedByUser);
            }
        }

        info!("running {}", command_line(&script_path, args));
        let status = Command::new(&script_path)
            .args(args)
            .current_dir(&root)
            .status()
            .map_err(|source| match source.kind() {
                ErrorKind::PermissionDenied => ConnectorError::PermissionDenied {
                    script: script_path.clone(),
                },
                _ => ConnectorError::Io {
                    source,
                    path: script_path.clone(),
                },
            })?;

        let code = exit_code_of(status);
        debug!("{} exited with {code}", script_path.display());
        Ok(code)
    }

    /// List local clones in clone store.
    ///
    /// Never touches the network.
    ///
    /// # Errors
    ///
    /// - Return [`ConnectorError::Store`] if the clone store cannot be read.
    pub fn list(&self) -> Result<Vec<LocalClone>> {
        Ok(self.store.list(&self.vcs)?)
    }
}

/// Validate configured token against the hosting service.
///
/// A token of another login only warns, unless the configuration asks for
/// confirmation, in which case declining aborts.
///
/// # Errors
///
/// - Return [`ConnectorError::InvalidToken`] if the token is rejected.
/// - Return [`ConnectorError::NetworkTimeout`] if the service stops responding.
/// - Return [`ConnectorError::AbortedByUser`] if the user declines to continue
///   with another login.
#[instrument(skip_all, level = "debug")]
pub async fn check_token<H>(
    api: &HostingApi<H>,
    config: &Config,
    confirm: &impl Confirm,
) -> Result<()>
where
    H: HttpClient,
{
    let credentials = config.credentials()?;
    match api.validate_token(&credentials).await? {
        Identity::Matches => {
            debug!("token belongs to {}", credentials.username);
            Ok(())
        }
        Identity::Mismatch { login } => {
            warn!(
                "token belongs to {login}, not to configured user {}",
                credentials.username
            );
            if config.confirm_identity_mismatch
                && !confirm.confirm(&format!("Continue as {login}?"))?
            {
                return Err(ConnectorError::AbortedByUser);
            }

            Ok(())
        }
    }
}

/// Resolve script path relative to clone root.
///
/// # Errors
///
/// - Return [`ConnectorError::ScriptNotFound`] if the script does not exist,
///   is not a regular file, or resolves outside of `root`.
pub fn resolve_script(root: &Path, script: &str) -> Result<PathBuf> {
    let not_found = |reason: String| ConnectorError::ScriptNotFound {
        script: script.to_string(),
        reason,
    };

    let root = root.canonicalize().map_err(|source| ConnectorError::Io {
        source,
        path: root.to_path_buf(),
    })?;
    let resolved = root
        .join(script)
        .canonicalize()
        .map_err(|_| not_found(format!("does not exist in {}", root.display())))?;

    // INVARIANT: Canonical script path must stay inside canonical clone root.
    if !resolved.starts_with(&root) {
        return Err(not_found(format!("resolves outside of {}", root.display())));
    }

    if !resolved.is_file() {
        return Err(not_found("is not a regular file".into()));
    }

    Ok(resolved)
}

#[cfg(unix)]
fn ensure_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(|source| ConnectorError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    if metadata.permissions().mode() & 0o111 == 0 {
        return Err(ConnectorError::PermissionDenied {
            script: path.to_path_buf(),
        });
    }

    Ok(())
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) -> Result<()> {
    Ok(())
}

fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

fn command_line(script: &Path, args: &[String]) -> String {
    let mut words = vec![script.to_string_lossy().into_owned()];
    words.extend(args.iter().cloned());
    shlex::try_join(words.iter().map(String::as_str)).unwrap_or_else(|_| words.join(" "))
}

fn remove_partial_clone(dest: &Path) {
    if !dest.exists() {
        return;
    }

    debug!("remove partial clone at {}", dest.display());
    if let Err(error) = fs::remove_dir_all(dest) {
        warn!("cannot remove partial clone at {}: {error}", dest.display());
    }
}

/// All possible error types of connector operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Configuration file or credentials are missing.
    #[error(transparent)]
    ConfigurationMissing(ConfigError),

    /// Configuration file is unusable.
    #[error(transparent)]
    Config(ConfigError),

    /// Repository reference is malformed.
    #[error(transparent)]
    InvalidReference(#[from] RefError),

    /// Token rejected by hosting service.
    #[error("token rejected by hosting service (HTTP {status}), check configured token")]
    InvalidToken { status: u16 },

    /// Clone destination already exists.
    #[error("repository already exists at {:?}, use --force to re-clone or 'mygit pull' to update", path.display())]
    DestinationExists { path: PathBuf },

    /// Repository has no local clone.
    #[error("repository {reference} is not cloned, clone it first with 'mygit clone {reference}'")]
    NotCloned { reference: RepoRef },

    /// Clone failed.
    #[error("failed to clone {reference}: {message}")]
    CloneFailed { reference: RepoRef, message: String },

    /// Pull failed.
    #[error("failed to pull {reference}:\n{message}")]
    PullFailed { reference: RepoRef, message: String },

    /// Script cannot be resolved inside the clone.
    #[error("script {script:?} {reason}")]
    ScriptNotFound { script: String, reason: String },

    /// Script is not executable.
    #[error("script {:?} is not executable", script.display())]
    PermissionDenied { script: PathBuf },

    /// Network operation ran out of time.
    #[error("network operation timed out: {message}")]
    NetworkTimeout { message: String },

    /// User declined to continue.
    #[error("aborted by user")]
    AbortedByUser,

    /// Hosting service API failed.
    #[error(transparent)]
    Forge(ForgeError),

    /// Clone store cannot be read.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Confirmation prompt failed.
    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// File system access failed.
    #[error("failed to access {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl ConnectorError {
    /// Process exit code to report this error with.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AbortedByUser => 0,
            Self::CloneFailed { .. } | Self::PullFailed { .. } | Self::NetworkTimeout { .. } => 2,
            Self::PermissionDenied { .. } => 126,
            _ => 1,
        }
    }
}

impl From<ConfigError> for ConnectorError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::NotFound { .. } | ConfigError::MissingCredentials => {
                Self::ConfigurationMissing(error)
            }
            error => Self::Config(error),
        }
    }
}

impl From<ForgeError> for ConnectorError {
    fn from(error: ForgeError) -> Self {
        match error {
            ForgeError::InvalidToken { status } => Self::InvalidToken { status },
            ForgeError::Timeout => Self::NetworkTimeout {
                message: "no response from hosting service".into(),
            },
            error => Self::Forge(error),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = ConnectorError> = std::result::Result<T, E>;
