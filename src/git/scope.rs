// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Scoped credential acquisition.
//!
//! A [`CredentialScope`] brackets every network operation on a local clone:
//!
//! 1. __Acquire__: lend the credentials to the version control client.
//! 2. __Use__: run the network operation with [`CredentialScope::credentials`].
//! 3. __Release__: rewrite the persisted origin URL to its credential-free
//!    form.
//!
//! Release happens in [`Drop`], so it runs on every exit path of the
//! protected operation: success, early return through `?`, and unwinding
//! panics alike. A clone that a client or an older tool left with a token
//! embedded in its origin URL is scrubbed the same way.

use crate::{
    config::Credentials,
    git::{VersionControl, ORIGIN},
    repo::has_credentials,
};

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Guard that keeps the origin URL of a local clone credential-free.
pub struct CredentialScope<'a, V>
where
    V: VersionControl + ?Sized,
{
    vcs: &'a V,
    path: PathBuf,
    clean_url: String,
    credentials: &'a Credentials,
    armed: bool,
}

impl<'a, V> CredentialScope<'a, V>
where
    V: VersionControl + ?Sized,
{
    /// Acquire credentials for network operations on clone at `path`.
    ///
    /// The clone does not need to exist yet, e.g., when the scope protects
    /// the clone operation itself.
    pub fn acquire(
        vcs: &'a V,
        path: impl Into<PathBuf>,
        clean_url: impl Into<String>,
        credentials: &'a Credentials,
    ) -> Self {
        let path = path.into();
        debug!("acquire credentials for {}", path.display());

        Self {
            vcs,
            path,
            clean_url: clean_url.into(),
            credentials,
            armed: true,
        }
    }

    /// Credentials lent to the protected operation.
    pub fn credentials(&self) -> &Credentials {
        self.credentials
    }

    /// Path of local clone under protection.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Give up the scope without touching the clone.
    ///
    /// For when the path turned out to belong to somebody else, e.g., a
    /// directory that appeared while the protected clone was running.
    pub fn disarm(mut self) {
        debug!("disarm credential scope of {}", self.path.display());
        self.armed = false;
    }

    fn release(&self) {
        if !self.armed {
            return;
        }

        // INVARIANT: Nothing to strip if the protected operation left no clone.
        if !self.path.join(".git").exists() {
            return;
        }

        match self.vcs.remote_url(&self.path) {
            Ok(Some(url)) if url == self.clean_url => return,
            Ok(Some(url)) if has_credentials(&url) => {
                debug!("strip credentials from {ORIGIN} of {}", self.path.display())
            }
            Ok(_) => {}
            Err(error) => warn!(
                "cannot read {ORIGIN} of {}: {}",
                self.path.display(),
                self.credentials.redact(error.to_string())
            ),
        }

        if let Err(error) = self.vcs.set_remote_url(&self.path, &self.clean_url) {
            warn!(
                "cannot reset {ORIGIN} of {} to {}: {}",
                self.path.display(),
                self.clean_url,
                self.credentials.redact(error.to_string())
            );
        }
    }
}

impl<V> Drop for CredentialScope<'_, V>
where
    V: VersionControl + ?Sized,
{
    fn drop(&mut self) {
        self.release();
    }
}
