mod artifact;
mod collect;
mod config;
mod pr;
mod repo;
mod scope;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;
use tracing::{debug, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

use crate::collect::{CollectError, CollectRequest, DiffSource};
use crate::config::{Config, ConfigError};
use crate::pr::{Auth, GitHubClient, PrError};
use crate::repo::RepoError;

/// Collects a GitHub Pull Request's metadata and diff into a
/// markdown file, auto-detecting the PR from the current branch.
#[derive(Parser, Debug)]
#[command(name = "pr-collector", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect PR diff and metadata into a markdown file
    Collect(CollectArgs),

    /// List all open PRs for the repository
    ListPrs {
        /// Path to the git repository
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,

        /// GitHub token (or set GITHUB_TOKEN)
        #[arg(short, long)]
        token: Option<String>,
    },

    /// Manage configuration settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show information about pr-collector
    Info,
}

#[derive(Args, Debug)]
struct CollectArgs {
    /// PR number to collect (auto-detected from the current branch if omitted)
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    pr_number: Option<u64>,

    /// Path to the git repository
    #[arg(short, long, default_value = ".")]
    repo: PathBuf,

    /// Only include changes under this directory (relative to the repository root)
    #[arg(short, long)]
    dir: Option<String>,

    /// Output file, or directory to place the generated file in
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Don't print the markdown to stdout (requires an output location)
    #[arg(short, long)]
    silent: bool,

    /// GitHub token (or set GITHUB_TOKEN)
    #[arg(short, long)]
    token: Option<String>,

    /// Build the diff from local origin/<base>...origin/<head> instead of GitHub's
    #[arg(long)]
    local: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the configuration file location and settings
    Show,
    /// Create the configuration file with defaults
    Init,
    /// Store a GitHub token
    SetToken { token: String },
    /// Set the directory artifacts are written to when --output is omitted
    SetOutputDir { dir: PathBuf },
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Collect(#[from] CollectError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] PrError),

    #[error("{0}")]
    Usage(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            if let Some(hint) = hint_for(&err) {
                eprintln!("{}", hint.dimmed());
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Command::Collect(args) => run_collect(args).await,
        Command::ListPrs { repo, token } => run_list_prs(repo, token).await,
        Command::Config { action } => run_config(action),
        Command::Info => {
            print_info();
            Ok(())
        }
    }
}

async fn run_collect(args: CollectArgs) -> Result<(), AppError> {
    info!("loading configuration");
    let config = Config::load()?;

    let output = output_location(args.output, config.output.default_dir.clone(), args.silent)?;

    let auth = resolve_auth(&config, args.token);
    let client = GitHubClient::new(config.api_url(), config.timeout())?;

    let span = info_span!("collect", pr = ?args.pr_number, dir = ?args.dir);
    match args.pr_number {
        Some(number) => info!(pr = number, repo = %args.repo.display(), "collecting PR"),
        None => info!(repo = %args.repo.display(), "auto-detecting PR from current branch"),
    }

    let request = CollectRequest {
        pr_number: args.pr_number,
        repo_path: args.repo,
        target_dir: args.dir,
        output,
        diff_source: if args.local {
            DiffSource::Local
        } else {
            DiffSource::Remote
        },
    };
    let collected = collect::collect(&client, &request, &auth)
        .instrument(span)
        .await?;

    if !args.silent {
        println!("{}", collected.result.body);
    }
    match &collected.written_to {
        Some(path) => eprintln!(
            "{} {} ({} files)",
            "PR data collected:".green().bold(),
            path.display(),
            collected.result.included_files.len()
        ),
        None => debug!(filename = %collected.result.filename, "no output location, printed only"),
    }
    Ok(())
}

async fn run_list_prs(repo: PathBuf, token: Option<String>) -> Result<(), AppError> {
    let config = Config::load()?;
    let auth = resolve_auth(&config, token);
    let client = GitHubClient::new(config.api_url(), config.timeout())?;

    info!(repo = %repo.display(), "listing open PRs");
    let prs = collect::list_open_prs(&client, &repo, &auth).await?;

    if prs.is_empty() {
        println!("{}", "No open PRs found for this repository.".yellow());
        return Ok(());
    }

    println!(
        "{:<6} {:<50} {:<30} {:<16} {}",
        "PR #".bold(),
        "Title".bold(),
        "Branch".bold(),
        "Author".bold(),
        "Created".bold()
    );
    for pr in &prs {
        println!(
            "{:<6} {:<50} {:<30} {:<16} {}",
            format!("#{}", pr.number).cyan(),
            truncate(&pr.title, 50),
            truncate(&pr.branch, 30).green(),
            pr.author.blue(),
            pr.created.dimmed()
        );
    }
    Ok(())
}

fn run_config(action: ConfigAction) -> Result<(), AppError> {
    let path = config::config_file()?;
    match action {
        ConfigAction::Show => {
            Config::ensure_exists(&path)?;
            let config = Config::load_from(&path)?;
            println!("{} {}", "Configuration file:".bold(), path.display());
            println!();
            println!(
                "  github.token: {}",
                config.masked_token().unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  github.api_url: {}", config.api_url());
            println!("  github.timeout_secs: {}", config.timeout().as_secs());
            println!(
                "  output.default_dir: {}",
                config
                    .output
                    .default_dir
                    .as_deref()
                    .map(|dir| dir.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
        }
        ConfigAction::Init => {
            Config::ensure_exists(&path)?;
            println!("{} {}", "Configuration initialized at:".green(), path.display());
        }
        ConfigAction::SetToken { token } => {
            if token.trim().is_empty() {
                return Err(AppError::Usage("token value must not be empty".to_string()));
            }
            let mut config = load_existing(&path)?;
            config.set_token(token);
            config.save_to(&path)?;
            println!("{}", "GitHub token saved.".green());
        }
        ConfigAction::SetOutputDir { dir } => {
            let dir = expand_home(dir);
            let mut config = load_existing(&path)?;
            config.set_default_output_dir(dir.clone());
            config.save_to(&path)?;
            println!(
                "{} {}",
                "Default output directory set to:".green(),
                dir.display()
            );
        }
    }
    Ok(())
}

fn print_info() {
    println!("{}", env!("CARGO_PKG_NAME").blue().bold());
    println!();
    println!("{} {}", "Version:".bold(), env!("CARGO_PKG_VERSION"));
    println!("{} {}", "Description:".bold(), env!("CARGO_PKG_DESCRIPTION"));
    println!();
    println!("{}", "Use 'pr-collector collect --help' to get started.".dimmed());
}

/// The explicit --output wins over the configured default directory.
/// Suppressing stdout with nowhere to write is a usage error.
fn output_location(
    flag: Option<PathBuf>,
    configured: Option<PathBuf>,
    silent: bool,
) -> Result<Option<PathBuf>, AppError> {
    let output = flag.or(configured);
    if silent && output.is_none() {
        return Err(AppError::Usage(
            "--silent requires --output (or a configured default output directory)".to_string(),
        ));
    }
    Ok(output)
}

/// Token precedence: flag, then GITHUB_TOKEN, then the config file.
fn resolve_auth(config: &Config, flag: Option<String>) -> Auth {
    let token = config.github_token(flag, std::env::var(config::TOKEN_ENV).ok());
    if token.is_none() {
        eprintln!(
            "{}",
            "No GitHub token found - only public repositories will be accessible".dimmed()
        );
    }
    Auth::from_token(token)
}

fn load_existing(path: &std::path::Path) -> Result<Config, ConfigError> {
    if path.exists() {
        Config::load_from(path)
    } else {
        Ok(Config::default())
    }
}

fn expand_home(dir: PathBuf) -> PathBuf {
    match (dir.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => dir,
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let kept: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}

fn hint_for(err: &AppError) -> Option<&'static str> {
    match err {
        AppError::Collect(CollectError::Pr(PrError::PrNotFound { .. }))
        | AppError::Collect(CollectError::Pr(PrError::AuthenticationRequired { .. })) => Some(
            "If the repository is private, provide a token with --token, GITHUB_TOKEN or 'pr-collector config set-token'.",
        ),
        AppError::Collect(CollectError::Pr(PrError::NoMatchingPr { .. })) => {
            Some("Make sure the branch is pushed and has an open PR, or pass the PR number.")
        }
        AppError::Collect(CollectError::Pr(PrError::AmbiguousPr { .. }))
        | AppError::Collect(CollectError::Repo(RepoError::DetachedHead)) => {
            Some("Pass the PR number explicitly: pr-collector collect <NUMBER>")
        }
        AppError::Collect(CollectError::Pr(PrError::RateLimited { .. })) => {
            Some("Wait for the rate limit to reset or authenticate to raise it.")
        }
        AppError::Collect(CollectError::Repo(RepoError::RefNotFound { .. })) => {
            Some("Run 'git fetch origin' so both PR branches exist locally.")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_collect_args() {
        let cli = Cli::try_parse_from([
            "pr-collector", "collect", "42", "--dir", "src/auth", "-o", "out/", "--silent",
        ])
        .unwrap();
        match cli.command {
            Command::Collect(args) => {
                assert_eq!(args.pr_number, Some(42));
                assert_eq!(args.dir.as_deref(), Some("src/auth"));
                assert_eq!(args.output, Some(PathBuf::from("out/")));
                assert!(args.silent);
                assert!(!args.local);
                assert_eq!(args.repo, PathBuf::from("."));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_pr_number_must_be_positive() {
        assert!(Cli::try_parse_from(["pr-collector", "collect", "0"]).is_err());
        assert!(Cli::try_parse_from(["pr-collector", "collect", "abc"]).is_err());
    }

    #[test]
    fn test_parse_config_subcommands() {
        let cli = Cli::try_parse_from(["pr-collector", "config", "set-token", "ghp_x"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config { action: ConfigAction::SetToken { token } } if token == "ghp_x"
        ));
        let cli = Cli::try_parse_from(["pr-collector", "list-prs", "-r", "/tmp/repo"]).unwrap();
        assert!(matches!(cli.command, Command::ListPrs { .. }));
    }

    #[test]
    fn test_silent_requires_an_output_location() {
        let err = output_location(None, None, true).unwrap_err();
        assert!(matches!(err, AppError::Usage(message) if message.contains("--silent")));

        let configured = Some(PathBuf::from("/tmp/prs"));
        assert_eq!(
            output_location(None, configured.clone(), true).unwrap(),
            configured
        );
        assert_eq!(
            output_location(Some(PathBuf::from("out.md")), configured, false).unwrap(),
            Some(PathBuf::from("out.md"))
        );
        assert_eq!(output_location(None, None, false).unwrap(), None);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn test_hints_for_actionable_errors() {
        let err = AppError::Collect(CollectError::Repo(RepoError::DetachedHead));
        assert!(hint_for(&err).unwrap().contains("explicitly"));
        let err = AppError::Usage("x".to_string());
        assert!(hint_for(&err).is_none());
    }
}
