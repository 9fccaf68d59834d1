// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{config, files_containing, FakeVcs, RepoFixture, RepoKind, TOKEN};

use anyhow::Result;
use git2::{Repository, RepositoryState};
use mygit::{CloneOptions, Connector, ConnectorError, RepoRef};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{env::current_dir, fs};

const WIDGETS: &str = "https://github.com/acme/widgets.git";

#[sealed_test]
fn pull_without_clone_is_not_cloned() -> Result<()> {
    let store = current_dir()?.join("repos");
    let connector = Connector::new(config(&store), FakeVcs::new());
    let reference: RepoRef = "acme/widgets".parse()?;

    let result = connector.pull(&reference);
    match result {
        Err(error @ ConnectorError::NotCloned { .. }) => {
            assert_eq!(error.exit_code(), 1);
            assert!(error.to_string().contains("mygit clone acme/widgets"));
        }
        other => panic!("expected not cloned, got {other:?}"),
    }
    assert!(!store.join("widgets").exists());
    assert_eq!(connector.vcs().network_calls(), 0);

    Ok(())
}

#[sealed_test]
fn pull_fast_forwards_clone() -> Result<()> {
    let upstream = RepoFixture::new(current_dir()?.join("upstream/widgets.git"), RepoKind::Bare)?;
    upstream.stage_and_commit("README.md", "widgets\n")?;
    let store = current_dir()?.join("repos");
    let vcs = FakeVcs::new().with_remote(WIDGETS, upstream.path());
    let connector = Connector::new(config(&store), vcs);
    let reference: RepoRef = "acme/widgets".parse()?;

    let path = connector.clone_repo(&reference, CloneOptions::default())?;
    let report = connector.pull(&reference)?;
    assert_eq!(report, "Already up to date.");
    assert_eq!(connector.vcs().network_calls(), 2);

    upstream.stage_and_commit("CHANGELOG.md", "v2\n")?;
    let report = connector.pull(&reference)?;
    assert!(report.starts_with("Fast-forward main to "));
    assert_eq!(fs::read_to_string(path.join("CHANGELOG.md"))?, "v2\n");

    let origin = Repository::open(&path)?
        .find_remote("origin")?
        .url()
        .map(str::to_owned);
    assert_eq!(origin, Some(WIDGETS.to_string()));
    assert!(files_containing(&path.join(".git"), TOKEN)?.is_empty());

    Ok(())
}

#[sealed_test]
fn pull_failure_restores_clean_origin() -> Result<()> {
    let upstream = RepoFixture::new(current_dir()?.join("upstream/widgets.git"), RepoKind::Bare)?;
    upstream.stage_and_commit("README.md", "widgets\n")?;
    let store = current_dir()?.join("repos");
    let vcs = FakeVcs::new().with_remote(WIDGETS, upstream.path());
    let connector = Connector::new(config(&store), vcs);
    let reference: RepoRef = "acme/widgets".parse()?;
    let path = connector.clone_repo(&reference, CloneOptions::default())?;

    // INVARIANT: Upstream vanishes between clone and pull.
    fs::remove_dir_all(upstream.path())?;

    let result = connector.pull(&reference);
    match result {
        Err(error @ ConnectorError::PullFailed { .. }) => {
            assert_eq!(error.exit_code(), 2);
            assert!(!error.to_string().contains(TOKEN));
        }
        other => panic!("expected pull failure, got {other:?}"),
    }

    let origin = Repository::open(&path)?
        .find_remote("origin")?
        .url()
        .map(str::to_owned);
    assert_eq!(origin, Some(WIDGETS.to_string()));

    Ok(())
}

fn diverged_clone() -> Result<(RepoFixture, Connector<FakeVcs>, RepoRef)> {
    let upstream = RepoFixture::new(current_dir()?.join("upstream/widgets.git"), RepoKind::Bare)?;
    upstream.stage_and_commit("README.md", "widgets\n")?;
    let store = current_dir()?.join("repos");
    let vcs = FakeVcs::new().with_remote(WIDGETS, upstream.path());
    let connector = Connector::new(config(&store), vcs);
    let reference: RepoRef = "acme/widgets".parse()?;
    connector.clone_repo(&reference, CloneOptions::default())?;

    Ok((upstream, connector, reference))
}

#[sealed_test]
fn pull_merges_diverged_history() -> Result<()> {
    let (upstream, connector, reference) = diverged_clone()?;
    let path = current_dir()?.join("repos").join("widgets");
    RepoFixture::open(&path)?.stage_and_commit("LOCAL.md", "mine\n")?;
    upstream.stage_and_commit("UPSTREAM.md", "theirs\n")?;

    connector.pull(&reference)?;
    assert_eq!(fs::read_to_string(path.join("LOCAL.md"))?, "mine\n");
    assert_eq!(fs::read_to_string(path.join("UPSTREAM.md"))?, "theirs\n");

    let repo = Repository::open(&path)?;
    assert_eq!(repo.head()?.peel_to_commit()?.parent_count(), 2);

    Ok(())
}

#[sealed_test]
fn pull_surfaces_conflicts_without_resolving() -> Result<()> {
    let (upstream, connector, reference) = diverged_clone()?;
    let path = current_dir()?.join("repos").join("widgets");
    RepoFixture::open(&path)?.stage_and_commit("README.md", "local edit\n")?;
    upstream.stage_and_commit("README.md", "upstream edit\n")?;
    let local_head = Repository::open(&path)?.head()?.peel_to_commit()?.id();

    let result = connector.pull(&reference);
    match result {
        Err(error @ ConnectorError::PullFailed { .. }) => {
            let message = error.to_string();
            assert!(message.contains("CONFLICT"), "{message}");
            assert!(message.contains("README.md"), "{message}");
            assert!(!message.contains(TOKEN));
            assert_eq!(error.exit_code(), 2);
        }
        other => panic!("expected pull failure, got {other:?}"),
    }

    let repo = Repository::open(&path)?;
    assert_eq!(repo.state(), RepositoryState::Merge);
    assert_eq!(repo.head()?.peel_to_commit()?.id(), local_head);
    assert!(fs::read_to_string(path.join("README.md"))?.contains("<<<<<<<"));

    let origin = repo.find_remote("origin")?.url().map(str::to_owned);
    assert_eq!(origin, Some(WIDGETS.to_string()));
    assert!(files_containing(&path.join(".git"), TOKEN)?.is_empty());

    Ok(())
}
