// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Private repository connector.
//!
//! Authenticate once with a hosting service, then clone, pull, list, and run
//! scripts from private repositories without entering credentials again. The
//! configuration written by the installer supplies the username, token, and
//! clone directory; the [`Connector`] does the rest.
//!
//! # Credential Hygiene
//!
//! The token is only ever handed to libgit2 through its in-process credential
//! callback, or to the hosting service API as an authorization header. It
//! never appears in command lines, persisted remote URLs, log lines, error
//! messages, or `config show` output.

pub mod config;
pub mod connector;
pub mod forge;
pub mod git;
pub mod path;
pub mod prompt;
pub mod repo;
pub mod store;

pub use config::{Config, Credentials, SecretToken};
pub use connector::{check_token, CloneOptions, Connector, ConnectorError, RunOptions};
pub use git::{Git2Client, VersionControl};
pub use repo::RepoRef;
pub use store::{CloneStore, LocalClone};
