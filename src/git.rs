// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control access.
//!
//! Everything the connector needs from a version control client is expressed
//! through the [`VersionControl`] trait: clone, pull, read and rewrite the
//! remote URL, and summarize HEAD. The default implementation,
//! [`Git2Client`], performs network operations in-process through libgit2,
//! and only shells out to the `git` binary to merge diverged histories.
//!
//! # Credential Handling
//!
//! Credentials are handed to libgit2 through its credential callback. Thus,
//! the token never shows up as a command line argument visible to process
//! listings, never becomes part of a persisted remote URL, and never lands in
//! reflog messages or `FETCH_HEAD`. Network operations may only be started
//! from inside a [`CredentialScope`], which guarantees that the persisted
//! remote URL is credential-free once the operation is over.

pub mod scope;

pub use scope::CredentialScope;

use crate::config::Credentials;

use auth_git2::GitAuthenticator;
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    Config, ErrorClass, ErrorCode, FetchOptions, RemoteCallbacks, Repository,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    ffi::OsStr,
    fmt::{Display, Formatter, Result as FmtResult},
    path::Path,
    process::Command,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// Name of the remote every local clone tracks.
pub const ORIGIN: &str = "origin";

/// Layer of indirection for version control operations.
pub trait VersionControl {
    /// Clone repository at `url` into `dest`.
    fn clone_repo(&self, url: &str, dest: &Path, credentials: &Credentials) -> Result<()>;

    /// Fetch current branch from origin, and integrate it into the work tree.
    ///
    /// Returns a short human readable report of what happened.
    fn pull(&self, path: &Path, credentials: &Credentials) -> Result<String>;

    /// Rewrite URL of origin remote.
    fn set_remote_url(&self, path: &Path, url: &str) -> Result<()>;

    /// Current URL of origin remote, if any.
    fn remote_url(&self, path: &Path) -> Result<Option<String>>;

    /// Summary of checked out branch and commit.
    fn head_summary(&self, path: &Path) -> Result<HeadSummary>;
}

/// Summary of HEAD of a local clone.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeadSummary {
    /// Checked out branch, or `None` when detached.
    pub branch: Option<String>,

    /// Abbreviated commit id.
    pub commit: Option<String>,

    /// First line of commit message.
    pub summary: Option<String>,
}

impl Display for HeadSummary {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let Some(commit) = &self.commit else {
            return fmt.write_str("(no commits)");
        };

        match &self.branch {
            Some(branch) => write!(fmt, "{branch} @ {commit}")?,
            None => write!(fmt, "(detached) @ {commit}")?,
        }

        if let Some(summary) = &self.summary {
            write!(fmt, " {summary}")?;
        }

        Ok(())
    }
}

/// Version control access through libgit2.
///
/// Network timeouts are process-wide settings of libgit2, so constructing a
/// client applies its timeout to every later libgit2 network operation.
#[derive(Debug, Clone)]
pub struct Git2Client {
    show_progress: bool,
}

impl Git2Client {
    /// Construct new libgit2 client with a network timeout.
    pub fn new(timeout: Duration) -> Self {
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

        // SAFETY: No other thread is running libgit2 operations while options
        // are set; clients are built before any repository is touched.
        unsafe {
            if let Err(error) = git2::opts::set_server_connect_timeout_in_milliseconds(millis) {
                warn!("cannot set connect timeout: {}", error.message());
            }
            if let Err(error) = git2::opts::set_server_timeout_in_milliseconds(millis) {
                warn!("cannot set server timeout: {}", error.message());
            }
        }

        Self {
            show_progress: true,
        }
    }

    /// Disable progress bar for transfers.
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    fn progress_bar(&self, message: impl Into<String>) -> Result<ProgressBar> {
        if !self.show_progress {
            return Ok(ProgressBar::hidden());
        }

        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<40}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_message(message.into());
        bar.enable_steady_tick(Duration::from_millis(100));

        Ok(bar)
    }
}

impl Default for Git2Client {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl VersionControl for Git2Client {
    /// Clone repository at `url` into `dest`.
    ///
    /// The progress of the clone is displayed through a progress bar labeled
    /// with the destination, never with the URL.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::DestinationExists`] if `dest` exists and is not an
    ///   empty directory.
    /// - Return [`GitError::Timeout`] if the remote stops responding.
    /// - Return [`GitError::Git2`] if any other libgit2 operation fails.
    #[instrument(skip(self, url, credentials), level = "debug")]
    fn clone_repo(&self, url: &str, dest: &Path, credentials: &Credentials) -> Result<()> {
        let label = dest
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bar = self.progress_bar(label)?;
        let authenticator = authenticator(credentials);
        let config = Config::open_default()?;

        let mut throttle = Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            if throttle.elapsed() > Duration::from_millis(10) {
                throttle = Instant::now();
                bar.set_length(progress.total_objects() as u64);
                bar.set_position(progress.received_objects() as u64);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        let result = RepoBuilder::new().fetch_options(fo).clone(url, dest);
        bar.finish_and_clear();

        match result {
            Ok(_) => {
                debug!("cloned into {}", dest.display());
                Ok(())
            }
            Err(error) if error.code() == ErrorCode::Exists => Err(GitError::DestinationExists),
            Err(error) => Err(classify(error)),
        }
    }

    /// Fetch current branch from origin, and integrate it into the work tree.
    ///
    /// Fast-forwards are applied in-process with a safe checkout, so local
    /// modifications that would be overwritten abort the pull. Diverged
    /// histories are handed to `git merge`, whose output is returned or
    /// surfaced verbatim on conflicts.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::DetachedHead`] if no branch is checked out.
    /// - Return [`GitError::Timeout`] if the remote stops responding.
    /// - Return [`GitError::Syscall`] if `git merge` fails.
    /// - Return [`GitError::Git2`] if any other libgit2 operation fails.
    #[instrument(skip(self, credentials), level = "debug")]
    fn pull(&self, path: &Path, credentials: &Credentials) -> Result<String> {
        let repo = Repository::open(path)?;
        let head = repo.head()?;
        if !head.is_branch() {
            return Err(GitError::DetachedHead);
        }
        let branch = head.shorthand().ok_or(GitError::DetachedHead)?.to_string();
        let head_ref = head.name().ok_or(GitError::DetachedHead)?.to_string();
        drop(head);

        let bar = self.progress_bar(format!("{ORIGIN}/{branch}"))?;
        let authenticator = authenticator(credentials);
        let config = repo.config()?;

        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            bar.set_length(progress.total_objects() as u64);
            bar.set_position(progress.received_objects() as u64);
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        let mut remote = repo.find_remote(ORIGIN)?;
        let fetched = remote.fetch(&[branch.as_str()], Some(&mut fo), None);
        bar.finish_and_clear();
        fetched.map_err(classify)?;

        let fetch_head = repo.find_reference("FETCH_HEAD")?;
        let fetch_commit = repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = repo.merge_analysis(&[&fetch_commit])?;

        if analysis.is_up_to_date() {
            info!("{branch} already up to date");
            return Ok("Already up to date.".into());
        }

        if analysis.is_fast_forward() {
            let target = repo.find_object(fetch_commit.id(), None)?;
            repo.checkout_tree(&target, Some(CheckoutBuilder::new().safe()))?;
            let mut reference = repo.find_reference(&head_ref)?;
            reference.set_target(fetch_commit.id(), "pull: fast-forward")?;
            repo.set_head(&head_ref)?;

            let short = short_id(&fetch_commit.id());
            info!("fast-forward {branch} to {short}");
            return Ok(format!("Fast-forward {branch} to {short}."));
        }

        // INVARIANT: Let git itself report merge conflicts, never resolve them.
        info!("{branch} diverged from {ORIGIN}/{branch}, merging");
        syscall_non_interactive(path, "git", ["merge", "--no-edit", "FETCH_HEAD"])
    }

    fn set_remote_url(&self, path: &Path, url: &str) -> Result<()> {
        let repo = Repository::open(path)?;
        repo.remote_set_url(ORIGIN, url)?;
        Ok(())
    }

    fn remote_url(&self, path: &Path) -> Result<Option<String>> {
        let repo = Repository::open(path)?;
        let url = match repo.find_remote(ORIGIN) {
            Ok(remote) => remote.url().map(str::to_owned),
            Err(error) if error.code() == ErrorCode::NotFound => None,
            Err(error) => return Err(error.into()),
        };

        Ok(url)
    }

    fn head_summary(&self, path: &Path) -> Result<HeadSummary> {
        let repo = Repository::open(path)?;
        let head = match repo.head() {
            Ok(head) => head,
            Err(error)
                if matches!(error.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) =>
            {
                return Ok(HeadSummary::default());
            }
            Err(error) => return Err(error.into()),
        };

        let branch = if head.is_branch() {
            head.shorthand().map(str::to_owned)
        } else {
            None
        };
        let commit = head.peel_to_commit()?;

        Ok(HeadSummary {
            branch,
            commit: Some(short_id(&commit.id())),
            summary: commit.summary().map(str::to_owned),
        })
    }
}

fn authenticator(credentials: &Credentials) -> GitAuthenticator {
    GitAuthenticator::new_empty()
        .add_plaintext_credentials(
            "*",
            credentials.username.clone(),
            credentials.token.expose(),
        )
        .try_password_prompt(0)
}

fn classify(error: git2::Error) -> GitError {
    let message = error.message().to_ascii_lowercase();
    if matches!(error.class(), ErrorClass::Net | ErrorClass::Http | ErrorClass::Os)
        && (message.contains("timed out") || message.contains("timeout"))
    {
        return GitError::Timeout(error.message().to_string());
    }

    GitError::Git2(error)
}

fn short_id(oid: &git2::Oid) -> String {
    let mut id = oid.to_string();
    id.truncate(7);
    id
}

/// Run command in target directory, and capture its output.
///
/// Stdout and stderr are combined into one message with trailing newlines
/// chomped. A non-zero exit status turns that message into an error.
fn syscall_non_interactive(
    cwd: &Path,
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let output = Command::new(cmd.as_ref())
        .args(args)
        .current_dir(cwd)
        .output()?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(stdout.as_str());
    }

    if !stderr.is_empty() {
        message.push_str(stderr.as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    let message = message.trim_end_matches(['\r', '\n']).to_string();

    if !output.status.success() {
        return Err(GitError::Syscall(format!(
            "command {:?} failed:\n{message}",
            cmd.as_ref()
        )));
    }

    Ok(message)
}

/// Version control error types.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Clone destination already exists, and is not empty.
    #[error("destination already exists and is not an empty directory")]
    DestinationExists,

    /// No branch checked out to pull into.
    #[error("HEAD is detached, check out a branch before pulling")]
    DetachedHead,

    /// Remote stopped responding.
    #[error("network operation timed out: {0}")]
    Timeout(String),

    /// External command failed.
    #[error("{0}")]
    Syscall(String),

    /// External command could not be started.
    #[error(transparent)]
    Spawn(#[from] std::io::Error),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error("{}", .0.message())]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = GitError> = std::result::Result<T, E>;
