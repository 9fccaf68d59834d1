// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use mygit::{
    check_token,
    config::{read_config, write_config, Config},
    forge::{HostingApi, ReqwestClient},
    path::{default_config_path, DEFAULT_CLONE_DIRECTORY},
    prompt::TerminalConfirm,
    CloneOptions, Connector, ConnectorError, Git2Client, RepoRef, RunOptions, SecretToken,
};

use anyhow::Result;
use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Text};
use std::{
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const EXAMPLES: &str = "\
Examples:
  mygit clone owner/repo                 Clone a private repository
  mygit clone owner/repo --force         Force re-clone
  mygit pull owner/repo                  Pull latest changes
  mygit run owner/repo script.sh         Clone if needed and run a script
  mygit run owner/repo build.sh -- -v    Pass arguments starting with '-'
  mygit list                             List cloned repositories
  mygit config                           Show configuration";

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "mygit [options] <command>",
    subcommand_help_heading = "Commands",
    after_help = EXAMPLES,
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    async fn run(self) -> Result<i32> {
        let config_path = match self.config {
            Some(path) => path,
            None => default_config_path()?,
        };

        match self.command {
            Some(Command::Clone(opts)) => run_clone(&config_path, opts).await,
            Some(Command::Pull(opts)) => run_pull(&config_path, opts).await,
            Some(Command::Run(opts)) => run_script(&config_path, opts).await,
            Some(Command::List(opts)) => run_list(&config_path, opts).await,
            Some(Command::Config(opts)) => run_config(&config_path, opts),
            None => {
                Cli::command().print_help()?;
                Ok(0)
            }
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Clone a private repository.
    #[command(override_usage = "mygit clone [options] <owner/repo>")]
    Clone(CloneArgs),

    /// Pull latest changes of a cloned repository.
    #[command(override_usage = "mygit pull [options] <owner/repo>")]
    Pull(PullArgs),

    /// Clone repository if needed, and run a script from it.
    #[command(override_usage = "mygit run [options] <owner/repo> <script> [-- <args>...]")]
    Run(RunArgs),

    /// List cloned repositories.
    #[command(override_usage = "mygit list [options]")]
    List(ListArgs),

    /// Show or set configuration.
    #[command(override_usage = "mygit config [show | set [options]]")]
    Config(ConfigArgs),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CloneArgs {
    /// Repository to clone.
    #[arg(value_name = "owner/repo")]
    pub repository: String,

    /// Remove existing clone and clone again.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PullArgs {
    /// Repository to pull.
    #[arg(value_name = "owner/repo")]
    pub repository: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RunArgs {
    /// Repository holding the script.
    #[arg(value_name = "owner/repo")]
    pub repository: String,

    /// Path to script relative to repository root.
    #[arg(value_name = "script")]
    pub script: String,

    /// Arguments for the script.
    #[arg(value_name = "args")]
    pub script_args: Vec<String>,

    /// Skip confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ListArgs {
    /// List repositories visible to the token on the hosting service instead.
    #[arg(short, long)]
    pub remote: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ConfigArgs {
    #[command(subcommand)]
    pub command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Show current configuration without revealing the token.
    Show,

    /// Write a new configuration, prompting for anything not given.
    Set(SetArgs),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SetArgs {
    /// Login name at the hosting service.
    #[arg(short, long, value_name = "name")]
    pub username: Option<String>,

    /// Directory to clone repositories into.
    #[arg(short, long, value_name = "path")]
    pub clone_directory: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    let code = match run().await {
        Ok(code) => code,
        Err(error) => report(&error),
    };

    exit(code)
}

async fn run() -> Result<i32> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            error.print()?;
            return Ok(usage_exit_code(error.kind()));
        }
    };

    cli.run().await
}

// INVARIANT: Usage errors exit with 1, leaving 2 to clone and pull failures.
fn usage_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
        _ => 1,
    }
}

fn report(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<ConnectorError>() {
        Some(ConnectorError::AbortedByUser) => {
            info!("aborted by user");
            ConnectorError::AbortedByUser.exit_code()
        }
        Some(connector_error) => {
            error!("{error:?}");
            connector_error.exit_code()
        }
        None => {
            error!("{error:?}");
            1
        }
    }
}

fn open_connector(config_path: &Path) -> Result<Connector> {
    let config = read_config(config_path).map_err(ConnectorError::from)?;
    let vcs = Git2Client::new(config.network_timeout());
    Ok(Connector::new(config, vcs))
}

fn hosting_api(config: &Config) -> Result<HostingApi> {
    let http = ReqwestClient::new(config.network_timeout()).map_err(ConnectorError::from)?;
    Ok(HostingApi::new(http, config.api_url.as_str()))
}

async fn preflight(config: &Config) -> Result<()> {
    if !config.validate_token {
        return Ok(());
    }

    check_token(&hosting_api(config)?, config, &TerminalConfirm).await?;
    Ok(())
}

fn parse_reference(input: &str) -> Result<RepoRef> {
    Ok(input.parse::<RepoRef>().map_err(ConnectorError::from)?)
}

async fn run_clone(config_path: &Path, opts: CloneArgs) -> Result<i32> {
    let reference = parse_reference(&opts.repository)?;
    let connector = open_connector(config_path)?;
    preflight(connector.config()).await?;

    let path = connector.clone_repo(&reference, CloneOptions { force: opts.force })?;
    println!("{}", path.display());

    Ok(0)
}

async fn run_pull(config_path: &Path, opts: PullArgs) -> Result<i32> {
    let reference = parse_reference(&opts.repository)?;
    let connector = open_connector(config_path)?;
    if connector.locate(&reference).is_some() {
        preflight(connector.config()).await?;
    }

    let report = connector.pull(&reference)?;
    println!("{report}");

    Ok(0)
}

async fn run_script(config_path: &Path, opts: RunArgs) -> Result<i32> {
    let reference = parse_reference(&opts.repository)?;
    let connector = open_connector(config_path)?;
    if connector.locate(&reference).is_none() {
        preflight(connector.config()).await?;
    }

    let code = connector.run(
        &reference,
        &opts.script,
        &opts.script_args,
        RunOptions { yes: opts.yes },
        &TerminalConfirm,
    )?;

    Ok(code)
}

async fn run_list(config_path: &Path, opts: ListArgs) -> Result<i32> {
    let connector = open_connector(config_path)?;

    if opts.remote {
        let config = connector.config();
        let credentials = config.credentials().map_err(ConnectorError::from)?;
        let repositories = hosting_api(config)?
            .list_repositories(&credentials.token)
            .await
            .map_err(ConnectorError::from)?;
        for repository in &repositories {
            let visibility = if repository.private { " (private)" } else { "" };
            println!("{}{visibility}", repository.full_name);
        }
        info!("total: {} repositories", repositories.len());

        return Ok(0);
    }

    let clones = connector.list()?;
    if clones.is_empty() {
        info!(
            "no repositories cloned into {} yet",
            connector.store().root().display()
        );
        return Ok(0);
    }

    for clone in &clones {
        let head = clone
            .head
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "(unreadable)".into());
        println!(
            "{:<32} {:<48} {}",
            clone.display_name(),
            head,
            clone.path.display()
        );
    }
    info!("total: {} repositories", clones.len());

    Ok(0)
}

fn run_config(config_path: &Path, opts: ConfigArgs) -> Result<i32> {
    match opts.command {
        None | Some(ConfigCommand::Show) => {
            let config = read_config(config_path).map_err(ConnectorError::from)?;
            print!("{}", config.summary());
        }
        Some(ConfigCommand::Set(opts)) => run_config_set(config_path, opts)?,
    }

    Ok(0)
}

fn run_config_set(config_path: &Path, opts: SetArgs) -> Result<()> {
    let existing = read_config(config_path).ok();
    let mut config =
        existing.unwrap_or_else(|| Config::new("", SecretToken::default(), DEFAULT_CLONE_DIRECTORY));

    config.username = match opts.username {
        Some(username) => username,
        None => Text::new("GitHub username:")
            .with_default(&config.username)
            .prompt()?,
    };

    let token = Password::new("GitHub personal access token:")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .with_help_message("leave empty to keep the current token")
        .prompt()?;
    if !token.trim().is_empty() {
        config.token = SecretToken::new(token.trim());
    }

    config.clone_directory = match opts.clone_directory {
        Some(path) => path,
        None => PathBuf::from(
            Text::new("Clone directory:")
                .with_default(&config.clone_directory.to_string_lossy())
                .prompt()?,
        ),
    };

    // INVARIANT: Never persist a record that cannot be used afterwards.
    config.credentials().map_err(ConnectorError::from)?;

    write_config(config_path, &config)?;
    info!("configuration written to {}", config_path.display());

    Ok(())
}
