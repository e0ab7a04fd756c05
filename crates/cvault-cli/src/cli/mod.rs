//! CLI for the cvault course archiver.

mod auth;
mod commands;
mod prompt;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use cvault_core::config;
use std::path::PathBuf;

use commands::{run_archive, run_completions, run_man, run_status, ArchiveArgs};

/// Every discovered, eligible question is archived.
pub const EXIT_COMPLETE: i32 = 0;
/// The run finished but some questions failed, or it was cancelled.
pub const EXIT_INCOMPLETE: i32 = 1;
/// The run stopped early (authentication, ledger, disk full, bad input).
pub const EXIT_FATAL: i32 = 2;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "cvault")]
#[command(about = "cvault: resumable offline archive of an online course", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Archive every eligible question of a course (resumes earlier runs).
    Archive {
        /// Course assessments page URL.
        url: String,

        /// Directory that receives `{Course}_archive` (default: current directory).
        #[arg(long, short, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Assessment types to archive, comma separated (skips the prompt).
        #[arg(long, value_delimiter = ',', value_name = "TAGS", conflicts_with = "all_types")]
        types: Option<Vec<String>>,

        /// Archive every known type without asking.
        #[arg(long)]
        all_types: bool,

        /// With --all-types, also archive types cvault does not recognise.
        #[arg(long, requires = "all_types")]
        include_unknown: bool,

        /// Questions fetched concurrently (overrides config).
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Session cookies from a file instead of an interactive login.
        #[arg(long, value_name = "FILE")]
        cookies: Option<PathBuf>,

        /// Page the driver opens for the interactive login (default: the course URL).
        #[arg(long, value_name = "URL")]
        login_url: Option<String>,
    },

    /// Show ledger state of an existing archive.
    Status {
        /// The `{Course}_archive` directory.
        archive_dir: PathBuf,
    },

    /// Print shell completions.
    Completions {
        shell: Shell,
    },

    /// Print the man page (roff).
    Man,
}

impl CliCommand {
    /// Runs the parsed command and returns the process exit code.
    pub async fn run_from_args() -> Result<i32> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Archive {
                url,
                out,
                types,
                all_types,
                include_unknown,
                workers,
                cookies,
                login_url,
            } => {
                let mut cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                if let Some(n) = workers {
                    cfg.workers = n.max(1);
                }
                let out = match out {
                    Some(dir) => dir,
                    None => std::env::current_dir()?,
                };
                let args = ArchiveArgs {
                    url,
                    out,
                    types,
                    all_types,
                    include_unknown,
                    cookies,
                    login_url,
                };
                run_archive(cfg, args).await
            }
            CliCommand::Status { archive_dir } => run_status(&archive_dir),
            CliCommand::Completions { shell } => {
                run_completions(shell);
                Ok(EXIT_COMPLETE)
            }
            CliCommand::Man => {
                run_man()?;
                Ok(EXIT_COMPLETE)
            }
        }
    }
}
