// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{config, FakeVcs, RepoFixture, RepoKind};

use anyhow::Result;
use mygit::{CloneOptions, Connector};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{env::current_dir, fs};

#[sealed_test]
fn list_without_store_is_empty() -> Result<()> {
    let connector = Connector::new(config(current_dir()?.join("repos")), FakeVcs::new());
    assert!(connector.list()?.is_empty());

    Ok(())
}

#[sealed_test]
fn list_shows_clones_and_skips_other_entries() -> Result<()> {
    let upstream = RepoFixture::new(current_dir()?.join("upstream/widgets.git"), RepoKind::Bare)?;
    upstream.stage_and_commit("README.md", "widgets\n")?;
    let store = current_dir()?.join("repos");
    let vcs = FakeVcs::new().with_remote("https://github.com/acme/widgets.git", upstream.path());
    let connector = Connector::new(config(&store), vcs);
    connector.clone_repo(&"acme/widgets".parse()?, CloneOptions::default())?;

    fs::create_dir_all(store.join("notes"))?;
    fs::write(store.join("stray.txt"), "not a clone")?;
    let scratch = RepoFixture::new(store.join("scratch"), RepoKind::Normal)?;
    scratch.stage_and_commit("TODO.md", "nothing\n")?;

    let clones = connector.list()?;
    let names = clones
        .iter()
        .map(|clone| clone.display_name())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["scratch".to_string(), "acme/widgets".to_string()]);

    let head = clones[1]
        .head
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    assert!(head.starts_with("main @ "));
    assert!(head.ends_with("chore: add \"README.md\""));
    assert_eq!(connector.vcs().network_calls(), 1);

    Ok(())
}
