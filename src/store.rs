// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Clone store management.
//!
//! Every local clone lives in one place called the __clone store__, which is
//! the clone directory from the configuration file.
//!
//! # Clone Store Layout
//!
//! A clone of `owner/repo` is placed at `<clone store>/repo`. When that
//! directory is already occupied by a clone of another owner's repository of
//! the same name, the clone is placed at `<clone store>/owner__repo` instead.
//! Owners on the hosting service cannot contain underscores, so the first
//! `__` of a directory name always separates owner from repository.
//!
//! The identity of an existing clone is determined by the URL of its origin
//! remote. Directory names only serve as a fallback for clones without one.
//!
//! Only the top-level of the clone store is evaluated. A directory counts as
//! a local clone if it contains a `.git` entry.

use crate::{
    git::{HeadSummary, VersionControl},
    repo::RepoRef,
};

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Store of local clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneStore {
    root: PathBuf,
}

impl CloneStore {
    /// Open clone store at target path.
    ///
    /// Does not touch the file system. The store directory is only created
    /// once something is cloned into it.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path to clone store directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locate existing local clone of target repository.
    pub fn locate<V>(&self, vcs: &V, reference: &RepoRef) -> Option<PathBuf>
    where
        V: VersionControl + ?Sized,
    {
        let plain = self.root.join(reference.name());
        if plain.exists() {
            match self.identify(vcs, &plain) {
                Some(found) if &found != reference => {}
                _ => return Some(plain),
            }
        }

        let qualified = self.root.join(reference.qualified_dir_name());
        qualified.exists().then_some(qualified)
    }

    /// Determine where target repository is, or would be, cloned to.
    ///
    /// Returns the existing location if the repository is already present.
    /// Otherwise, returns the plain location if it is free, or the qualified
    /// location if another owner's clone occupies the plain one.
    pub fn placement<V>(&self, vcs: &V, reference: &RepoRef) -> PathBuf
    where
        V: VersionControl + ?Sized,
    {
        if let Some(path) = self.locate(vcs, reference) {
            return path;
        }

        let plain = self.root.join(reference.name());
        if plain.exists() {
            debug!(
                "{} taken by another repository, using qualified name",
                plain.display()
            );
            return self.root.join(reference.qualified_dir_name());
        }

        plain
    }

    /// Determine which repository a local clone belongs to.
    ///
    /// Prefers the origin URL. Falls back to the directory name when it uses
    /// the qualified `owner__repo` form.
    pub fn identify<V>(&self, vcs: &V, path: &Path) -> Option<RepoRef>
    where
        V: VersionControl + ?Sized,
    {
        if path.join(".git").exists() {
            if let Ok(Some(url)) = vcs.remote_url(path) {
                if let Some(reference) = RepoRef::from_remote_url(&url) {
                    return Some(reference);
                }
            }
        }

        path.file_name()
            .and_then(|name| RepoRef::from_qualified_dir_name(&name.to_string_lossy()))
    }

    /// List all local clones in clone store.
    ///
    /// A missing clone store simply has no clones.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::ReadStore`] if clone store cannot be read.
    #[instrument(skip(self, vcs), level = "debug")]
    pub fn list<V>(&self, vcs: &V) -> Result<Vec<LocalClone>>
    where
        V: VersionControl + ?Sized,
    {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("clone store {} does not exist", self.root.display());
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(StoreError::ReadStore {
                    source: err,
                    path: self.root.clone(),
                })
            }
        };

        let mut clones = Vec::new();
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if !path.is_dir() || !path.join(".git").exists() {
                continue;
            }

            let head = match vcs.head_summary(&path) {
                Ok(head) => Some(head),
                Err(error) => {
                    warn!("cannot read HEAD of {}: {error}", path.display());
                    None
                }
            };

            clones.push(LocalClone {
                reference: self.identify(vcs, &path),
                path,
                head,
            });
        }
        clones.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(clones)
    }
}

/// Local clone entry of clone store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalClone {
    /// Repository the clone belongs to, if it can be determined.
    pub reference: Option<RepoRef>,

    /// Path to the working copy.
    pub path: PathBuf,

    /// Summary of HEAD, if readable.
    pub head: Option<HeadSummary>,
}

impl LocalClone {
    /// Name to show for the clone.
    pub fn display_name(&self) -> String {
        match &self.reference {
            Some(reference) => reference.to_string(),
            None => self
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

/// All possible error types for clone store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Clone store directory cannot be read.
    #[error("failed to read clone directory {:?}", path.display())]
    ReadStore {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
