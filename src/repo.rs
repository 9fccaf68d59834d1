// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository references and remote URLs.
//!
//! A __repository reference__ is the `owner/repo` token that the user hands to
//! every subcommand. It names a remote repository on the configured hosting
//! service, and it is the only thing used to derive both the local path of a
//! clone and the remote URL to fetch from.
//!
//! Remote URLs produced here are always __credential-free__, i.e., they
//! contain the host and repository path but never a username or token.
//! Credentials travel to the version-control client through a separate
//! in-process channel instead (see [`crate::git::scope`]).

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Reference to a remote repository in `owner/repo` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoRef {
    owner: String,
    name: String,
}

impl RepoRef {
    /// Construct new repository reference.
    ///
    /// # Errors
    ///
    /// - Return [`RefError`] if either component is not a valid owner or
    ///   repository name.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let owner = owner.into();
        let name = name.into();
        validate_owner(&owner)?;

        // INVARIANT: Accept "repo.git", but store bare repository name.
        let name = match name.strip_suffix(".git") {
            Some(stripped) => stripped.to_string(),
            None => name,
        };
        validate_component(&name)?;

        Ok(Self { owner, name })
    }

    /// Owner of the repository, i.e., user or organization name.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Name of the repository.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory name used when the plain repository name is already taken by
    /// another owner's clone.
    pub fn qualified_dir_name(&self) -> String {
        format!("{}{QUALIFIED_SEPARATOR}{}", self.owner, self.name)
    }

    /// Recover reference from a qualified directory name, e.g., `acme__widgets`.
    pub fn from_qualified_dir_name(dir_name: &str) -> Option<Self> {
        let (owner, name) = dir_name.split_once(QUALIFIED_SEPARATOR)?;
        Self::new(owner, name).ok()
    }

    /// Build credential-free HTTPS remote URL for target host.
    pub fn https_url(&self, host: &str) -> String {
        format!("https://{host}/{}/{}.git", self.owner, self.name)
    }

    /// Recover reference from a remote URL.
    ///
    /// Understands HTTPS URLs (with or without embedded userinfo) and SCP-like
    /// SSH URLs, e.g., `git@github.com:owner/repo.git`.
    pub fn from_remote_url(url: &str) -> Option<Self> {
        let path = match url.split_once("://") {
            Some((_, rest)) => {
                let rest = strip_userinfo(rest);
                rest.split_once('/')?.1
            }
            None => url.split_once(':')?.1,
        };

        let path = path.trim_end_matches('/');
        let (owner, name) = path.rsplit_once('/')?;
        let owner = owner.rsplit('/').next()?;
        Self::new(owner, name).ok()
    }
}

impl FromStr for RepoRef {
    type Err = RefError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.contains("://") || input.contains('@') || input.contains(':') {
            return Err(RefError::LooksLikeUrl(input.to_string()));
        }

        let (owner, name) = input
            .split_once('/')
            .ok_or_else(|| RefError::Format(input.to_string()))?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(RefError::Format(input.to_string()));
        }

        Self::new(owner, name)
    }
}

impl Display for RepoRef {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}/{}", self.owner, self.name)
    }
}

/// Remove any embedded username or token from a remote URL.
///
/// URLs without a scheme, or without userinfo, are returned unchanged.
pub fn strip_credentials(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => format!("{scheme}://{}", strip_userinfo(rest)),
        None => url.to_string(),
    }
}

/// Check if remote URL carries embedded userinfo.
pub fn has_credentials(url: &str) -> bool {
    strip_credentials(url) != url
}

fn strip_userinfo(authority_and_path: &str) -> &str {
    let authority_end = authority_and_path
        .find('/')
        .unwrap_or(authority_and_path.len());
    match authority_and_path[..authority_end].rfind('@') {
        Some(at) => &authority_and_path[at + 1..],
        None => authority_and_path,
    }
}

/// Owners are user or organization logins: ASCII alphanumerics and `-`.
///
/// Keeps the first `__` of a qualified directory name the owner separator.
fn validate_owner(owner: &str) -> Result<()> {
    let valid = !owner.is_empty()
        && owner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(RefError::InvalidComponent(owner.to_string()));
    }

    Ok(())
}

fn validate_component(component: &str) -> Result<()> {
    if component.is_empty() || component == "." || component == ".." {
        return Err(RefError::InvalidComponent(component.to_string()));
    }

    let valid = component
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(RefError::InvalidComponent(component.to_string()));
    }

    Ok(())
}

const QUALIFIED_SEPARATOR: &str = "__";

/// Repository reference parsing errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RefError {
    /// Input is not of the form `owner/repo`.
    #[error("invalid repository {0:?}, expected format 'owner/repo'")]
    Format(String),

    /// Input contains a URL or credentials instead of a plain reference.
    #[error("invalid repository {0:?}, pass 'owner/repo' instead of a URL")]
    LooksLikeUrl(String),

    /// Owner or repository name contains invalid characters.
    #[error("invalid owner or repository name {0:?}")]
    InvalidComponent(String),
}

/// Friendly result alias :3
pub type Result<T, E = RefError> = std::result::Result<T, E>;
