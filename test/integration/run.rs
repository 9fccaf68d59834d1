// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{config, Answer, FakeVcs, RepoFixture, RepoKind};

use anyhow::Result;
use indoc::indoc;
use mygit::{Connector, ConnectorError, RepoRef, RunOptions};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{env::current_dir, fs, path::Path};

const WIDGETS: &str = "https://github.com/acme/widgets.git";

fn connector(upstream: &RepoFixture) -> Result<Connector<FakeVcs>> {
    let store = current_dir()?.join("repos");
    let vcs = FakeVcs::new().with_remote(WIDGETS, upstream.path());
    Ok(Connector::new(config(store), vcs))
}

fn upstream() -> Result<RepoFixture> {
    let fixture = RepoFixture::new(current_dir()?.join("upstream/widgets.git"), RepoKind::Bare)?;
    fixture.stage_and_commit("README.md", "widgets\n")?;
    fixture.stage_and_commit_script(
        "build.sh",
        indoc! {r#"
            #!/bin/sh
            printf '%s\n' "$@" > args.txt
            exit 0
        "#},
    )?;
    fixture.stage_and_commit_script("fail.sh", "#!/bin/sh\nexit 1\n")?;
    fixture.stage_and_commit_script("three.sh", "#!/bin/sh\nexit 3\n")?;
    fixture.stage_and_commit_script("missing.sh", "#!/bin/sh\nno-such-command-anywhere\n")?;
    fixture.stage_and_commit("plain.sh", "#!/bin/sh\nexit 0\n")?;
    Ok(fixture)
}

fn yes() -> RunOptions {
    RunOptions { yes: true }
}

#[sealed_test]
fn run_clones_missing_repository_first() -> Result<()> {
    let upstream = upstream()?;
    let connector = connector(&upstream)?;
    let reference: RepoRef = "acme/widgets".parse()?;

    let args = vec!["--target".to_string(), "two words".to_string()];
    let code = connector.run(&reference, "build.sh", &args, yes(), &Answer::no())?;
    assert_eq!(code, 0);

    let root = current_dir()?.join("repos").join("widgets");
    assert_eq!(
        fs::read_to_string(root.join("args.txt"))?,
        "--target\ntwo words\n"
    );

    Ok(())
}

#[sealed_test]
fn run_mirrors_script_exit_code() -> Result<()> {
    let upstream = upstream()?;
    let connector = connector(&upstream)?;
    let reference: RepoRef = "acme/widgets".parse()?;

    for (script, expect) in [("fail.sh", 1), ("three.sh", 3), ("missing.sh", 127)] {
        let code = connector.run(&reference, script, &[], yes(), &Answer::no())?;
        assert_eq!(code, expect, "exit code of {script}");
    }

    Ok(())
}

#[sealed_test]
fn run_never_pulls_existing_clone() -> Result<()> {
    let upstream = upstream()?;
    let connector = connector(&upstream)?;
    let reference: RepoRef = "acme/widgets".parse()?;

    connector.run(&reference, "three.sh", &[], yes(), &Answer::no())?;
    assert_eq!(connector.vcs().network_calls(), 1);
    upstream.stage_and_commit_script("late.sh", "#!/bin/sh\nexit 0\n")?;

    let result = connector.run(&reference, "late.sh", &[], yes(), &Answer::no());
    assert!(matches!(result, Err(ConnectorError::ScriptNotFound { .. })));
    assert_eq!(connector.vcs().network_calls(), 1);

    Ok(())
}

#[sealed_test]
fn run_rejects_script_outside_clone() -> Result<()> {
    let upstream = upstream()?;
    let connector = connector(&upstream)?;
    let reference: RepoRef = "acme/widgets".parse()?;
    let marker = current_dir()?.join("pwned");
    let evil = current_dir()?.join("repos").join("evil.sh");
    fs::create_dir_all(current_dir()?.join("repos"))?;
    fs::write(&evil, format!("#!/bin/sh\ntouch {}\n", marker.display()))?;
    make_executable(&evil)?;

    let result = connector.run(&reference, "../evil.sh", &[], yes(), &Answer::yes());
    match result {
        Err(error @ ConnectorError::ScriptNotFound { .. }) => assert_eq!(error.exit_code(), 1),
        other => panic!("expected script not found, got {other:?}"),
    }
    assert!(!marker.exists());

    Ok(())
}

#[cfg(unix)]
#[sealed_test]
fn run_refuses_non_executable_script() -> Result<()> {
    let upstream = upstream()?;
    let connector = connector(&upstream)?;

    let result = connector.run(&"acme/widgets".parse()?, "plain.sh", &[], yes(), &Answer::yes());
    match result {
        Err(error @ ConnectorError::PermissionDenied { .. }) => assert_eq!(error.exit_code(), 126),
        other => panic!("expected permission denied, got {other:?}"),
    }

    Ok(())
}

#[sealed_test]
fn run_declined_never_executes() -> Result<()> {
    let upstream = upstream()?;
    let connector = connector(&upstream)?;
    let answer = Answer::no();

    let result = connector.run(
        &"acme/widgets".parse()?,
        "build.sh",
        &["hello".into()],
        RunOptions::default(),
        &answer,
    );
    assert!(matches!(result, Err(ConnectorError::AbortedByUser)));

    let root = current_dir()?.join("repos").join("widgets");
    assert!(!root.join("args.txt").exists());
    let asked = answer.asked();
    assert_eq!(asked.len(), 1);
    assert!(asked[0].contains("build.sh hello"));
    assert!(asked[0].ends_with("from acme/widgets?"));

    Ok(())
}

#[sealed_test]
fn run_confirmed_executes() -> Result<()> {
    let upstream = upstream()?;
    let connector = connector(&upstream)?;

    let code = connector.run(
        &"acme/widgets".parse()?,
        "build.sh",
        &[],
        RunOptions::default(),
        &Answer::yes(),
    )?;
    assert_eq!(code, 0);
    assert!(current_dir()?
        .join("repos/widgets/args.txt")
        .exists());

    Ok(())
}

fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}
